//! Access (session token) issuance.
//!
//! Every issuance first sweeps the user's expired Access records. The sweep
//! and the insert are not transactional; a failed insert after a successful
//! sweep is harmless because the sweep is idempotent.

use crate::config::TokenConfig;
use crate::error::{AuthError, AuthResult};
use crate::model::{Access, Client, User};
use crate::store::Store;
use crate::token::{IdTokenClaims, create_jwt_token, generate_random_token};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

pub const TOKEN_TYPE_BEARER: &str = "Bearer";

pub struct AccessService {
    store: Arc<dyn Store>,
    tokens: Arc<TokenConfig>,
}

impl AccessService {
    pub fn new(store: Arc<dyn Store>, tokens: Arc<TokenConfig>) -> Self {
        Self { store, tokens }
    }

    /// Remove the user's expired Access records; returns how many went.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired(&self, user_id: &str) -> AuthResult<u64> {
        let removed = self
            .store
            .remove_expired_access(user_id, OffsetDateTime::now_utc())
            .await?;
        if removed > 0 {
            tracing::debug!(removed, "Removed expired access records");
        }
        Ok(removed)
    }

    /// Sweep, then persist a new Access bound to `user` and optionally `client`.
    ///
    /// The ID token is signed with the client secret when a client is given,
    /// otherwise with the process-wide secret.
    #[tracing::instrument(
        skip_all,
        fields(user_id = %user.id, client_id = client.map(|c| c.id.as_str()))
    )]
    pub async fn issue_access(
        &self,
        user: &User,
        client: Option<&Client>,
        scope: Vec<String>,
        authorization_code: Option<String>,
    ) -> AuthResult<Access> {
        self.sweep_expired(&user.id).await?;

        let now = OffsetDateTime::now_utc();
        let claims = IdTokenClaims {
            iss: self.tokens.issuer_url.clone(),
            sub: user.id.clone(),
            aud: client.map(|c| c.id.clone()),
            exp: (now + Duration::seconds(self.tokens.id_token_lifetime)).unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            username: user.username.clone(),
            user: Some(user.snapshot()),
        };
        let secret = client.map_or(self.tokens.secret.as_str(), |c| c.secret.as_str());
        let id_token = create_jwt_token(&claims, secret)?;

        let access = Access {
            id: uuid::Uuid::new_v4().to_string(),
            token_type: TOKEN_TYPE_BEARER.to_string(),
            token: generate_random_token(),
            id_token,
            scope,
            expires_in: self.tokens.access_token_lifetime,
            expires_on: now + Duration::seconds(self.tokens.access_token_lifetime),
            user_id: user.id.clone(),
            client_id: client.map(|c| c.id.clone()),
            authorization_code,
            created_at: now,
        };
        self.store.insert_access(&access).await?;
        tracing::info!(access_id = %access.id, "Issued access token");
        Ok(access)
    }

    /// Issue an Access with the default scope and attach its summary to the user.
    pub async fn create_user_access_token(
        &self,
        mut user: User,
        client: Option<&Client>,
    ) -> AuthResult<User> {
        let scope = crate::model::parse_scope(&self.tokens.default_scope);
        let access = self.issue_access(&user, client, scope, None).await?;
        user.access_token.push(access.summary());
        Ok(user)
    }

    /// Like [`Self::create_user_access_token`], resolving the client first.
    pub async fn create_user_access_token_for_client(
        &self,
        user: User,
        client_id: &str,
    ) -> AuthResult<User> {
        let client = self
            .store
            .find_client_by_id(client_id)
            .await?
            .ok_or_else(AuthError::client_not_found)?;
        self.create_user_access_token(user, Some(&client)).await
    }
}
