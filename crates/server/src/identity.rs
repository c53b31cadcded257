//! Resolution of every login source to a canonical [`User`].
//!
//! Basic credentials, client addresses and social provider profiles are a
//! closed set of [`LoginSource`] variants. [`IdentityService::resolve`] turns
//! any of them into the stored user (creating it on first IP or social
//! login), or `None` when an address is allowed but carries no identity.

use crate::error::{AuthError, AuthResult, ErrorKey, messages};
use crate::ip::IpAllowlist;
use crate::model::{Credential, IdentityLink, Profile, User, UserType};
use crate::password::verify_password;
use crate::store::Store;
use axum::http::StatusCode;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocialProvider {
    Orcid,
    Google,
    GitHub,
    /// Generic OpenID Connect provider, by configured name.
    Oidc(String),
}

impl SocialProvider {
    /// Key stored in the identity table.
    pub fn key(&self) -> String {
        match self {
            SocialProvider::Orcid => "orcid".into(),
            SocialProvider::Google => "google".into(),
            SocialProvider::GitHub => "github".into(),
            SocialProvider::Oidc(name) => format!("oidc:{name}"),
        }
    }
}

impl fmt::Display for SocialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Profile asserted by a social provider after its own login completed.
#[derive(Debug, Clone)]
pub struct SocialProfile {
    pub provider: SocialProvider,
    /// Provider-specific subject identifier.
    pub subject: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organisation: Option<String>,
}

#[derive(Debug, Clone)]
pub enum LoginSource {
    Basic { username: String, password: String },
    Ip(IpAddr),
    Social(SocialProfile),
}

pub struct IdentityService {
    store: Arc<dyn Store>,
    allowlist: IpAllowlist,
}

impl IdentityService {
    pub fn new(store: Arc<dyn Store>, allowlist: IpAllowlist) -> Self {
        Self { store, allowlist }
    }

    pub async fn resolve(&self, source: &LoginSource) -> AuthResult<Option<User>> {
        match source {
            LoginSource::Basic { username, password } => {
                self.resolve_basic(username, password).await.map(Some)
            }
            LoginSource::Ip(ip) => self.resolve_ip(ip).await,
            LoginSource::Social(profile) => self.resolve_social(profile).await.map(Some),
        }
    }

    async fn resolve_basic(&self, username: &str, password: &str) -> AuthResult<User> {
        let invalid = || {
            AuthError::rejected(
                StatusCode::UNAUTHORIZED,
                ErrorKey::Credential,
                messages::CREDENTIAL_INVALID,
            )
        };
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or_else(invalid)?;
        match user.credential.password_hash.as_deref() {
            Some(hash) if verify_password(password, hash) => Ok(user),
            _ => Err(invalid()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn resolve_ip(&self, ip: &IpAddr) -> AuthResult<Option<User>> {
        let Some(identity) = self.allowlist.classify(ip) else {
            return Ok(None);
        };
        if let Some(user) = self.store.find_user_by_username(&identity.username).await? {
            return Ok(Some(user));
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: identity.username,
            user_type: identity.user_type,
            credential: Credential::default(),
            access_token: Vec::new(),
            is_validated: identity.validated,
            registration_verification_token: None,
            registration_verification_token_expiry: None,
            profile: Profile::default(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, "Created user for IP login");
        Ok(Some(user))
    }

    /// Find the user linked to the provider subject, link by email, or create.
    ///
    /// The asserted email must be a valid address, and an existing account is
    /// only linked once it has been validated.
    #[tracing::instrument(skip(self, profile), fields(provider = %profile.provider))]
    async fn resolve_social(&self, profile: &SocialProfile) -> AuthResult<User> {
        if profile.email.parse::<lettre::Address>().is_err() {
            return Err(AuthError::rejected(
                StatusCode::CONFLICT,
                ErrorKey::EmailAddress,
                messages::EMAIL_INVALID,
            ));
        }
        let provider = profile.provider.key();

        if let Some(link) = self.store.find_identity(&provider, &profile.subject).await?
            && let Some(user) = self.store.find_user_by_id(&link.user_id).await?
        {
            return Ok(user);
        }

        let user = match self.store.find_user_by_username(&profile.email).await? {
            Some(user) if !user.is_validated => {
                tracing::warn!(user_id = %user.id, "Refusing to link an unvalidated account");
                return Err(AuthError::rejected(
                    StatusCode::UNAUTHORIZED,
                    ErrorKey::User,
                    messages::USER_NOT_VALIDATED,
                ));
            }
            Some(user) => user,
            None => {
                let user = User {
                    id: uuid::Uuid::new_v4().to_string(),
                    username: profile.email.clone(),
                    user_type: UserType::Social,
                    credential: Credential::default(),
                    access_token: Vec::new(),
                    is_validated: true,
                    registration_verification_token: None,
                    registration_verification_token_expiry: None,
                    profile: Profile {
                        first_name: profile.first_name.clone(),
                        last_name: profile.last_name.clone(),
                        organisation: profile.organisation.clone(),
                    },
                    created_at: OffsetDateTime::now_utc(),
                };
                self.store.insert_user(&user).await?;
                tracing::info!(user_id = %user.id, "Created user for social login");
                user
            }
        };

        self.store
            .insert_identity(&IdentityLink {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                provider,
                subject: profile.subject.clone(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await?;
        tracing::info!(user_id = %user.id, "Linked external identity");
        Ok(user)
    }

    pub async fn linked_identities(&self, user_id: &str) -> AuthResult<Vec<IdentityLink>> {
        Ok(self.store.find_identities_for_user(user_id).await?)
    }
}
