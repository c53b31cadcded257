//! Domain records exchanged between the stores and the services.
//!
//! These are plain values; the SeaORM rows in [`crate::entity`] convert into
//! them at the store boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// Kind of account, derived from how the user first arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Basic,
    Ip,
    Social,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Basic => "basic",
            UserType::Ip => "ip",
            UserType::Social => "social",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(UserType::Basic),
            "ip" => Ok(UserType::Ip),
            "social" => Ok(UserType::Social),
            other => Err(format!("unknown user type '{other}'")),
        }
    }
}

/// Password material. The raw password never lands here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub password_hash: Option<String>,
    /// Single-use token issued by the forgot-password flow.
    pub reset_password_token: Option<String>,
}

/// `{token, id_token}` pair attached to a user after issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSummary {
    pub token: String,
    pub id_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organisation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub user_type: UserType,
    #[serde(skip)]
    pub credential: Credential,
    pub access_token: Vec<TokenSummary>,
    pub is_validated: bool,
    #[serde(skip)]
    pub registration_verification_token: Option<String>,
    /// Epoch milliseconds.
    #[serde(skip)]
    pub registration_verification_token_expiry: Option<i64>,
    pub profile: Profile,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// Strip credential material and issued tokens.
    pub fn sanitized(self) -> PublicUser {
        PublicUser {
            id: self.id,
            username: self.username,
            user_type: self.user_type,
            is_validated: self.is_validated,
            profile: self.profile,
        }
    }

    /// Claims-friendly snapshot embedded into ID tokens.
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            username: self.username.clone(),
            user_type: self.user_type,
            first_name: self.profile.first_name.clone(),
            last_name: self.profile.last_name.clone(),
        }
    }
}

/// A user with every secret and token removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub user_type: UserType,
    pub is_validated: bool,
    pub profile: Profile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub username: String,
    pub user_type: UserType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_name: Option<String>,
}

/// Registration draft as submitted by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub organisation: Option<String>,
}

/// Persisted session token.
#[derive(Debug, Clone, PartialEq)]
pub struct Access {
    pub id: String,
    pub token_type: String,
    pub token: String,
    pub id_token: String,
    pub scope: Vec<String>,
    /// Lifetime in seconds at issuance.
    pub expires_in: i64,
    pub expires_on: OffsetDateTime,
    pub user_id: String,
    pub client_id: Option<String>,
    pub authorization_code: Option<String>,
    pub created_at: OffsetDateTime,
}

impl Access {
    pub fn summary(&self) -> TokenSummary {
        TokenSummary {
            token: self.token.clone(),
            id_token: self.id_token.clone(),
        }
    }
}

/// OAuth2 relying party.
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub id: String,
    pub secret: String,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub credentials_flow: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Client {
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    pub fn default_redirect_uri(&self) -> Option<&str> {
        self.redirect_uris.first().map(String::as_str)
    }
}

/// Lifecycle of single-use grants (authorization codes and refresh tokens).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantStatus {
    Created,
    Used,
}

impl GrantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantStatus::Created => "created",
            GrantStatus::Used => "used",
        }
    }
}

impl FromStr for GrantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(GrantStatus::Created),
            "used" => Ok(GrantStatus::Used),
            other => Err(format!("unknown grant status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scope: Vec<String>,
    pub state: Option<String>,
    pub status: GrantStatus,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at < now
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshToken {
    pub token: String,
    pub status: GrantStatus,
    pub access_id: String,
    pub user_id: String,
    pub client_id: String,
    pub scope: Vec<String>,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl RefreshToken {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at < now
    }
}

/// Link between a canonical user and an external provider account.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityLink {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub subject: String,
    pub created_at: OffsetDateTime,
}

/// Parse a space-separated scope string.
pub fn parse_scope(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(String::from).collect()
}

pub fn join_scope(scope: &[String]) -> String {
    scope.join(" ")
}

/// Current time as epoch milliseconds.
pub fn epoch_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}
