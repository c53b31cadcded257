//! Account notification emails.
//!
//! Workflows hand a [`Notification`] to a [`Notifier`]. Registration mail is
//! spawned and detached via [`spawn_notification`]: it may complete after the
//! registering request has already returned, or not at all. Every other mail
//! is awaited through [`send_logged`], whose failures are logged and swallowed.

use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Registration { token: String },
    RegistrationConfirmed,
    PasswordReset { token: String },
    PasswordChanged,
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Registration { .. } => "registration",
            Notification::RegistrationConfirmed => "registration_confirmed",
            Notification::PasswordReset { .. } => "password_reset",
            Notification::PasswordChanged => "password_changed",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Notification::Registration { .. } => "Verify your email address",
            Notification::RegistrationConfirmed => "Your account is ready",
            Notification::PasswordReset { .. } => "Reset your password",
            Notification::PasswordChanged => "Your password was changed",
        }
    }

    fn link(&self, frontend_url: &str, username: &str) -> Option<String> {
        let base = frontend_url.trim_end_matches('/');
        let username = urlencoding::encode(username);
        match self {
            Notification::Registration { token } => Some(format!(
                "{base}/verify?username={username}&token={}",
                urlencoding::encode(token)
            )),
            Notification::PasswordReset { token } => Some(format!(
                "{base}/reset-password?username={username}&token={}",
                urlencoding::encode(token)
            )),
            _ => None,
        }
    }

    fn lead(&self) -> &'static str {
        match self {
            Notification::Registration { .. } => {
                "Thanks for signing up. Confirm your email address to activate your account."
            }
            Notification::RegistrationConfirmed => {
                "Your email address has been confirmed and your account is active."
            }
            Notification::PasswordReset { .. } => {
                "We received a request to reset your password. If this was not you, ignore this email."
            }
            Notification::PasswordChanged => {
                "The password for your account was just changed. If this was not you, reset it immediately."
            }
        }
    }

    pub fn render_text(&self, frontend_url: &str, username: &str) -> String {
        match self.link(frontend_url, username) {
            Some(link) => format!("Hello,\n\n{}\n\n{link}\n", self.lead()),
            None => format!("Hello,\n\n{}\n", self.lead()),
        }
    }

    pub fn render_html(&self, frontend_url: &str, username: &str) -> String {
        let link = self
            .link(frontend_url, username)
            .map(|l| format!("<p><a href=\"{l}\">{l}</a></p>"))
            .unwrap_or_default();
        format!(
            "<!DOCTYPE html><html><body><p>Hello,</p><p>{}</p>{link}</body></html>",
            self.lead()
        )
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, to: &str, notification: Notification) -> Result<(), NotifyError>;
}

/// Fire-and-forget delivery. The returned handle may be dropped.
pub fn spawn_notification(
    notifier: Arc<dyn Notifier>,
    to: String,
    notification: Notification,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        send_logged(notifier.as_ref(), &to, notification).await;
    })
}

/// Deliver and log the outcome; delivery failures never reach the caller.
pub async fn send_logged(notifier: &dyn Notifier, to: &str, notification: Notification) {
    let kind = notification.kind();
    match notifier.notify(to, notification).await {
        Ok(()) => tracing::info!(kind, "Sent notification email"),
        Err(e) => tracing::error!(kind, error = %e, "Failed to send notification email"),
    }
}

pub struct SmtpNotifier {
    mailer: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
    frontend_url: String,
}

impl SmtpNotifier {
    pub fn new(
        mailer: Arc<AsyncSmtpTransport<Tokio1Executor>>,
        smtp: &SmtpConfig,
        frontend_url: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            mailer,
            from: smtp.from.parse()?,
            frontend_url: frontend_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    #[tracing::instrument(skip(self, to, notification), fields(kind = notification.kind()))]
    async fn notify(&self, to: &str, notification: Notification) -> Result<(), NotifyError> {
        let text_body = notification.render_text(&self.frontend_url, to);
        let html_body = notification.render_html(&self.frontend_url, to);

        let email = lettre::Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(notification.subject())
            .header(lettre::message::header::MIME_VERSION_1_0)
            .message_id(None)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        self.mailer.send(email).await?;
        Ok(())
    }
}
