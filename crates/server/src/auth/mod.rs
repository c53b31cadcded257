//! Account workflows: registration, login for every source, password
//! recovery and access-token validation.
//!
//! Each workflow resolves exactly once, either with its payload or with an
//! [`AuthError`]. Rejections carry the `{status, key, value}` triple; store
//! failures propagate unchanged.

mod recovery;
mod validate;

use crate::access::AccessService;
use crate::config::TokenConfig;
use crate::error::{AuthError, AuthResult, ErrorKey, messages};
use crate::identity::{IdentityService, LoginSource, SocialProfile};
use crate::ip::IpAllowlist;
use crate::model::{
    Client, Credential, NewUser, Profile, PublicUser, User, UserType, epoch_millis,
};
use crate::notify::{Notification, Notifier, send_logged, spawn_notification};
use crate::password::{hash_password, is_strong_password};
use crate::session::Session;
use crate::store::{Store, UserPatch};
use crate::token::generate_random_token;
use axum::http::StatusCode;
use std::net::IpAddr;
use std::sync::Arc;
use time::OffsetDateTime;

/// Result of an address-based login.
#[derive(Debug, Clone)]
pub enum IpLogin {
    /// The address is allowed but maps to no account.
    Anonymous,
    User(User),
}

/// Result of a social login.
#[derive(Debug, Clone)]
pub enum SocialLogin {
    /// Browser path: outcome encoded into the client's redirect URI.
    Callback(String),
    /// Programmatic path.
    User(User),
}

pub struct AuthService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    access: AccessService,
    identity: IdentityService,
    tokens: Arc<TokenConfig>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        tokens: Arc<TokenConfig>,
        allowlist: IpAllowlist,
    ) -> Self {
        Self {
            access: AccessService::new(store.clone(), tokens.clone()),
            identity: IdentityService::new(store.clone(), allowlist),
            store,
            notifier,
            tokens,
        }
    }

    pub fn access(&self) -> &AccessService {
        &self.access
    }

    pub fn identity(&self) -> &IdentityService {
        &self.identity
    }

    /// Create an unvalidated basic account and mail its verification code.
    ///
    /// The mail is sent in the background; this returns without waiting for it.
    #[tracing::instrument(skip(self, draft), fields(username = %draft.username))]
    pub async fn register_user(&self, draft: NewUser) -> AuthResult<PublicUser> {
        if draft.username.parse::<lettre::Address>().is_err() {
            return Err(AuthError::rejected(
                StatusCode::CONFLICT,
                ErrorKey::EmailAddress,
                messages::EMAIL_INVALID,
            ));
        }
        if self
            .store
            .find_user_by_username(&draft.username)
            .await?
            .is_some()
        {
            return Err(AuthError::rejected(
                StatusCode::CONFLICT,
                ErrorKey::EmailAddress,
                messages::EMAIL_ALREADY_REGISTERED,
            ));
        }
        if !is_strong_password(&draft.password) {
            return Err(AuthError::weak_password(ErrorKey::Password));
        }

        let password_hash = hash_password(&draft.password)
            .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))?;
        let now = OffsetDateTime::now_utc();
        let token = generate_random_token();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: draft.username,
            user_type: UserType::Basic,
            credential: Credential {
                password_hash: Some(password_hash),
                reset_password_token: None,
            },
            access_token: Vec::new(),
            is_validated: false,
            registration_verification_token: Some(token.clone()),
            registration_verification_token_expiry: Some(
                epoch_millis(now) + self.tokens.registration_token_lifetime * 1000,
            ),
            profile: Profile {
                first_name: draft.first_name,
                last_name: draft.last_name,
                organisation: draft.organisation,
            },
            created_at: now,
        };
        self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, "Registered user");

        spawn_notification(
            self.notifier.clone(),
            user.username.clone(),
            Notification::Registration { token },
        );
        Ok(user.sanitized())
    }

    /// Confirm a registration code, validate the account and log it in.
    #[tracing::instrument(skip(self, token))]
    pub async fn verify_registration(
        &self,
        username: Option<&str>,
        token: Option<&str>,
    ) -> AuthResult<User> {
        let (Some(username), Some(token)) = (
            username.filter(|u| !u.is_empty()),
            token.filter(|t| !t.is_empty()),
        ) else {
            return Err(AuthError::rejected(
                StatusCode::BAD_REQUEST,
                ErrorKey::UnexpectedError,
                messages::VERIFICATION_PARAMS_MISSING,
            ));
        };

        let incorrect = || {
            AuthError::rejected(
                StatusCode::CONFLICT,
                ErrorKey::VerificationCode,
                messages::VERIFICATION_CODE_INCORRECT,
            )
        };
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or_else(incorrect)?;

        if let Some(expiry) = user.registration_verification_token_expiry
            && epoch_millis(OffsetDateTime::now_utc()) > expiry
        {
            return Err(AuthError::rejected(
                StatusCode::CONFLICT,
                ErrorKey::VerificationCode,
                messages::VERIFICATION_CODE_EXPIRED,
            ));
        }
        if user.registration_verification_token.as_deref() != Some(token) {
            return Err(incorrect());
        }

        let user = self
            .store
            .update_user(
                &user.id,
                UserPatch {
                    is_validated: Some(true),
                    registration_verification_token: Some(None),
                    registration_verification_token_expiry: Some(None),
                    ..Default::default()
                },
            )
            .await?
            .ok_or_else(incorrect)?;
        tracing::info!(user_id = %user.id, "Registration verified");

        let user = self.access.create_user_access_token(user, None).await?;
        send_logged(
            self.notifier.as_ref(),
            &user.username,
            Notification::RegistrationConfirmed,
        )
        .await;
        Ok(user)
    }

    /// The basic strategy: look up the account, check the password and
    /// require a validated account.
    pub async fn authenticate_credential(
        &self,
        username: &str,
        password: &str,
    ) -> AuthResult<User> {
        let source = LoginSource::Basic {
            username: username.to_string(),
            password: password.to_string(),
        };
        let user = self.identity.resolve(&source).await?.ok_or_else(|| {
            AuthError::rejected(
                StatusCode::UNAUTHORIZED,
                ErrorKey::Credential,
                messages::CREDENTIAL_INVALID,
            )
        })?;
        require_validated(user)
    }

    /// Authenticate and issue an access token.
    ///
    /// With a `client_id` this is the credentials flow: the client must have
    /// `credentials_flow` enabled and the token is bound to it.
    #[tracing::instrument(skip(self, password))]
    pub async fn login_basic(
        &self,
        username: &str,
        password: &str,
        client_id: Option<&str>,
    ) -> AuthResult<User> {
        let client = match client_id {
            Some(client_id) => {
                let client = self
                    .store
                    .find_client_by_id(client_id)
                    .await?
                    .ok_or_else(AuthError::client_not_found)?;
                if !client.credentials_flow {
                    return Err(AuthError::rejected(
                        StatusCode::FORBIDDEN,
                        ErrorKey::Client,
                        messages::CREDENTIALS_FLOW_DISABLED,
                    ));
                }
                Some(client)
            }
            None => None,
        };
        let user = self.authenticate_credential(username, password).await?;
        self.access.create_user_access_token(user, client.as_ref()).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn login_by_ip(&self, ip: IpAddr, client_id: Option<&str>) -> AuthResult<IpLogin> {
        let Some(user) = self.identity.resolve(&LoginSource::Ip(ip)).await? else {
            return Ok(IpLogin::Anonymous);
        };
        let user = require_validated(user)?;
        self.issue_for(user, client_id).await.map(IpLogin::User)
    }

    /// Link or create the canonical user for a social profile and, outside
    /// an authorization flow, issue an access token.
    ///
    /// During an authorization flow the bare user is returned; tokens are
    /// issued later by the code exchange.
    #[tracing::instrument(skip_all, fields(provider = %profile.provider))]
    pub async fn register_or_login_social(
        &self,
        profile: SocialProfile,
        client: Option<&Client>,
        session: &dyn Session,
    ) -> AuthResult<User> {
        let user = self
            .identity
            .resolve(&LoginSource::Social(profile))
            .await?
            .ok_or_else(AuthError::invalid_token)?;
        let user = require_validated(user)?;
        if session.is_authorization_flow().await {
            return Ok(user);
        }
        self.access.create_user_access_token(user, client).await
    }

    /// Social login, for ORCID or any other provider.
    ///
    /// With a client id every outcome, failures included, is encoded into a
    /// callback on the client's redirect URI. Without one, errors propagate.
    pub async fn login_social(
        &self,
        profile: SocialProfile,
        client_id: Option<&str>,
        session: &dyn Session,
    ) -> AuthResult<SocialLogin> {
        let Some(client_id) = client_id else {
            return self
                .register_or_login_social(profile, None, session)
                .await
                .map(SocialLogin::User);
        };

        let client = self
            .store
            .find_client_by_id(client_id)
            .await?
            .ok_or_else(AuthError::client_not_found)?;
        let Some(redirect_uri) = client.default_redirect_uri().map(str::to_string) else {
            return Err(AuthError::rejected(
                StatusCode::BAD_REQUEST,
                ErrorKey::RequestParameters,
                messages::INVALID_REDIRECT_URI,
            ));
        };

        let callback = match self
            .register_or_login_social(profile, Some(&client), session)
            .await
        {
            Ok(user) => match user.access_token.last() {
                Some(summary) => with_query(
                    &redirect_uri,
                    &format!(
                        "success=true&token={}",
                        urlencoding::encode(&summary.id_token)
                    ),
                ),
                None => with_query(&redirect_uri, "success=true"),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Social login failed");
                with_query(
                    &redirect_uri,
                    &format!("success=false&reason={}", urlencoding::encode(e.public_message())),
                )
            }
        };
        Ok(SocialLogin::Callback(callback))
    }

    async fn issue_for(&self, user: User, client_id: Option<&str>) -> AuthResult<User> {
        match client_id {
            Some(client_id) => {
                self.access
                    .create_user_access_token_for_client(user, client_id)
                    .await
            }
            None => self.access.create_user_access_token(user, None).await,
        }
    }
}

fn require_validated(user: User) -> AuthResult<User> {
    if user.is_validated {
        Ok(user)
    } else {
        Err(AuthError::rejected(
            StatusCode::UNAUTHORIZED,
            ErrorKey::User,
            messages::USER_NOT_VALIDATED,
        ))
    }
}

/// Append a raw query fragment, respecting an existing query string.
fn with_query(base: &str, query: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{query}")
}
