//! OAuth2 / OpenID Connect provider side.
//!
//! - `authorize` issues single-use authorization codes
//! - `exchange` implements the token endpoint state machine
//!   (`authorization_code` and `refresh_token` grants)
//! - `discovery` builds the OpenID configuration document
//!
//! Protocol failures of the exchange are not errors: they resolve to
//! [`TokenExchange::Redirect`] carrying a pre-built callback URL. Only
//! infrastructure failures and request-shape rejections are `Err`.

mod authorize;
pub mod discovery;
mod exchange;

pub use authorize::{AuthorizationGrant, AuthorizeRequest};
pub use exchange::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, TokenRequest};

use crate::access::AccessService;
use crate::config::TokenConfig;
use crate::error::{AuthError, AuthResult, ErrorKey, messages};
use crate::store::Store;
use crate::token::generate_random_token;
use axum::http::StatusCode;
use serde::Serialize;
use std::sync::Arc;

/// Tokens returned by a successful exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
    pub id_token: String,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenExchange {
    Issued(TokenBundle),
    /// `redirect_uri?error=invalid_grant&message=...`
    Redirect(String),
}

impl TokenExchange {
    pub fn tokens(&self) -> Option<&TokenBundle> {
        match self {
            TokenExchange::Issued(bundle) => Some(bundle),
            TokenExchange::Redirect(_) => None,
        }
    }

    pub fn callback_url(&self) -> Option<&str> {
        match self {
            TokenExchange::Redirect(url) => Some(url),
            TokenExchange::Issued(_) => None,
        }
    }
}

pub struct OAuth2Service {
    store: Arc<dyn Store>,
    access: AccessService,
    tokens: Arc<TokenConfig>,
}

impl OAuth2Service {
    pub fn new(store: Arc<dyn Store>, tokens: Arc<TokenConfig>) -> Self {
        Self {
            access: AccessService::new(store.clone(), tokens.clone()),
            store,
            tokens,
        }
    }

    /// Rotate a client secret, but only if `current_secret` is still the
    /// stored one. Returns the new secret.
    #[tracing::instrument(skip(self, current_secret))]
    pub async fn regenerate_client_secret(
        &self,
        client_id: &str,
        current_secret: &str,
    ) -> AuthResult<String> {
        let replacement = generate_random_token();
        if self
            .store
            .swap_client_secret(client_id, current_secret, &replacement)
            .await?
        {
            tracing::info!("Client secret rotated");
            return Ok(replacement);
        }

        match self.store.find_client_by_id(client_id).await? {
            Some(_) => Err(AuthError::rejected(
                StatusCode::CONFLICT,
                ErrorKey::Client,
                messages::CLIENT_SECRET_STALE,
            )),
            None => Err(AuthError::client_not_found()),
        }
    }
}
