use super::AuthService;
use crate::error::{AuthError, AuthResult, ErrorKey, TokenError, messages};
use crate::model::{Access, User};
use crate::token::{AudienceClaim, IdTokenClaims, decode_jwt_token};
use axum::http::StatusCode;
use time::{Duration, OffsetDateTime};

impl AuthService {
    /// Introspect an ID token and slide its Access record's expiry.
    ///
    /// The audience is read without verification to pick the signing secret
    /// (client secret or process-wide), then the stored record is fetched and
    /// only then is the signature checked. Each stage short-circuits.
    #[tracing::instrument(skip_all)]
    pub async fn validate_access_token(&self, id_token: &str) -> AuthResult<Access> {
        let peeked: AudienceClaim =
            decode_jwt_token(id_token, "", false).map_err(|_| AuthError::invalid_token())?;

        let client = match peeked.aud.as_deref() {
            Some(client_id) => Some(
                self.store
                    .find_client_by_id(client_id)
                    .await?
                    .ok_or_else(AuthError::invalid_token)?,
            ),
            None => None,
        };

        let access = self
            .store
            .find_access_by_id_token(id_token)
            .await?
            .ok_or_else(AuthError::invalid_token)?;

        let secret = client
            .as_ref()
            .map_or(self.tokens.secret.as_str(), |c| c.secret.as_str());
        decode_jwt_token::<IdTokenClaims>(id_token, secret, true).map_err(|e| match e {
            TokenError::InvalidSignature => AuthError::rejected(
                StatusCode::UNAUTHORIZED,
                ErrorKey::InvalidSignature,
                messages::INVALID_SIGNATURE,
            ),
            TokenError::Expired => AuthError::rejected(
                StatusCode::UNAUTHORIZED,
                ErrorKey::Token,
                messages::TOKEN_EXPIRED,
            ),
            _ => AuthError::invalid_token(),
        })?;

        let now = OffsetDateTime::now_utc();
        let until = now + Duration::seconds(self.tokens.access_token_lifetime);
        let access = self
            .store
            .extend_access(&access.id_token, now, until)
            .await?
            .ok_or_else(AuthError::invalid_token)?;
        tracing::debug!(access_id = %access.id, "Access token validated");
        Ok(access)
    }

    /// Validate the token and load the user it was issued to.
    pub async fn current_user(&self, id_token: &str) -> AuthResult<User> {
        let access = self.validate_access_token(id_token).await?;
        self.store
            .find_user_by_id(&access.user_id)
            .await?
            .ok_or_else(AuthError::invalid_token)
    }

    /// Remove every Access record carrying `id_token`; returns whether any existed.
    #[tracing::instrument(skip_all)]
    pub async fn logout(&self, id_token: &str) -> AuthResult<bool> {
        if self.store.find_access_by_id_token(id_token).await?.is_none() {
            return Ok(false);
        }
        let removed = self.store.remove_access_by_id_token(id_token).await?;
        tracing::info!(removed, "Logged out");
        Ok(removed > 0)
    }
}
