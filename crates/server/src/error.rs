//! Error taxonomy shared by every workflow.
//!
//! Domain rejections carry the uniform `{status, key, value}` triple consumed by
//! the HTTP layer. Store and internal failures are kept as separate variants so
//! they propagate unchanged to the caller.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Canned human-readable messages.
pub mod messages {
    pub const PASSWORD_RULE: &str = "Password must be at least 8 characters long and contain at least one number, one lowercase letter, one uppercase letter and one special character.";
    pub const PASSWORD_RECENTLY_USED: &str =
        "This password is recently used. Please choose a different password.";
    pub const OLD_PASSWORD_INCORRECT: &str = "Old password is incorrect.";
    pub const VERIFICATION_CODE_INCORRECT: &str = "Verification code is incorrect.";
    pub const VERIFICATION_CODE_EXPIRED: &str = "Verification code is expired.";
    pub const VERIFICATION_PARAMS_MISSING: &str = "Username and token are required.";
    pub const EMAIL_NOT_REGISTERED: &str = "This email address is not registered.";
    pub const EMAIL_ALREADY_REGISTERED: &str = "This email address is already registered.";
    pub const EMAIL_INVALID: &str = "This email address is not valid.";
    pub const RESET_TOKEN_INVALID: &str = "Reset password token is not valid.";
    pub const TOKEN_INVALID: &str = "Token is invalid.";
    pub const TOKEN_EXPIRED: &str = "Token has expired.";
    pub const INVALID_SIGNATURE: &str = "Invalid signature.";
    pub const USER_NOT_VALIDATED: &str = "User is not validated.";
    pub const CLIENT_NOT_FOUND: &str = "Client not found.";
    pub const CREDENTIALS_FLOW_DISABLED: &str =
        "This client is not allowed to use the credentials flow.";
    pub const CREDENTIAL_INVALID: &str = "Invalid username or password.";
    pub const SESSION_EXPIRED: &str = "Session has expired.";
    pub const MISSING_PARAMETERS: &str = "Missing required parameters.";
    pub const INVALID_GRANT_TYPE: &str = "Not a valid grant_type.";
    pub const INVALID_REDIRECT_URI: &str = "The redirect_uri is not registered for this client.";
    pub const INVALID_RESPONSE_TYPE: &str = "Only the 'code' response_type is supported.";
    pub const CLIENT_SECRET_STALE: &str = "The client secret has already been rotated.";
    pub const UNEXPECTED: &str = "An unexpected error occurred.";
}

/// Machine-readable error key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKey {
    EmailAddress,
    Password,
    NewPassword,
    OldPassword,
    VerificationCode,
    ResetPasswordToken,
    Token,
    InvalidSignature,
    RequestParameters,
    SessionError,
    UnexpectedError,
    User,
    Client,
    Credential,
}

impl ErrorKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKey::EmailAddress => "EMAIL_ADDRESS",
            ErrorKey::Password => "PASSWORD",
            ErrorKey::NewPassword => "NEW_PASSWORD",
            ErrorKey::OldPassword => "OLD_PASSWORD",
            ErrorKey::VerificationCode => "VERIFICATION_CODE",
            ErrorKey::ResetPasswordToken => "RESET_PASSWORD_TOKEN",
            ErrorKey::Token => "TOKEN",
            ErrorKey::InvalidSignature => "INVALID_SIGNATURE",
            ErrorKey::RequestParameters => "REQUEST_PARAMETERS",
            ErrorKey::SessionError => "SESSION_ERROR",
            ErrorKey::UnexpectedError => "UNEXPECTED_ERROR",
            ErrorKey::User => "USER",
            ErrorKey::Client => "CLIENT",
            ErrorKey::Credential => "CREDENTIAL",
        }
    }
}

impl fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal, user-facing rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    #[serde(skip)]
    pub status: StatusCode,
    pub key: ErrorKey,
    pub value: String,
    /// Only populated for `REQUEST_PARAMETERS` rejections.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_params: Vec<String>,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status.as_u16(), self.key, self.value)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Failed to sign token: {0}")]
    Signing(String),
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Token has expired")]
    Expired,
    #[error("Malformed token: {0}")]
    Malformed(String),
    #[error("Username claim does not match")]
    UsernameMismatch,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Rejected(Rejection),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn rejected(status: StatusCode, key: ErrorKey, value: impl Into<String>) -> Self {
        AuthError::Rejected(Rejection {
            status,
            key,
            value: value.into(),
            missing_params: Vec::new(),
        })
    }

    pub fn missing_params(params: Vec<String>) -> Self {
        AuthError::Rejected(Rejection {
            status: StatusCode::BAD_REQUEST,
            key: ErrorKey::RequestParameters,
            value: messages::MISSING_PARAMETERS.to_string(),
            missing_params: params,
        })
    }

    pub fn email_not_registered() -> Self {
        Self::rejected(
            StatusCode::NOT_FOUND,
            ErrorKey::EmailAddress,
            messages::EMAIL_NOT_REGISTERED,
        )
    }

    pub fn invalid_token() -> Self {
        Self::rejected(
            StatusCode::UNAUTHORIZED,
            ErrorKey::Token,
            messages::TOKEN_INVALID,
        )
    }

    pub fn client_not_found() -> Self {
        Self::rejected(
            StatusCode::NOT_FOUND,
            ErrorKey::Client,
            messages::CLIENT_NOT_FOUND,
        )
    }

    pub fn session_expired() -> Self {
        Self::rejected(
            StatusCode::UNAUTHORIZED,
            ErrorKey::SessionError,
            messages::SESSION_EXPIRED,
        )
    }

    pub fn weak_password(key: ErrorKey) -> Self {
        Self::rejected(StatusCode::CONFLICT, key, messages::PASSWORD_RULE)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            AuthError::Rejected(r) => Some(r),
            _ => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Rejected(r) => r.status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn key(&self) -> ErrorKey {
        match self {
            AuthError::Rejected(r) => r.key,
            _ => ErrorKey::UnexpectedError,
        }
    }

    /// Human-readable message, safe to show to end users.
    pub fn public_message(&self) -> &str {
        match self {
            AuthError::Rejected(r) => &r.value,
            _ => messages::UNEXPECTED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Rejected(rejection) => (rejection.status, Json(rejection)).into_response(),
            other => {
                tracing::error!(error = %other, "Request failed with an internal error");
                let body = Rejection {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    key: ErrorKey::UnexpectedError,
                    value: messages::UNEXPECTED.to_string(),
                    missing_params: Vec::new(),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
