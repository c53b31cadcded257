use super::{OAuth2Service, TokenBundle, TokenExchange};
use crate::access::TOKEN_TYPE_BEARER;
use crate::error::{AuthError, AuthResult, ErrorKey, messages};
use crate::model::{Access, GrantStatus, RefreshToken, User, join_scope};
use crate::token::generate_random_token;
use axum::http::StatusCode;
use serde::Deserialize;
use std::net::IpAddr;
use time::{Duration, OffsetDateTime};

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

const CODE_INVALID: &str = "Authorization code is invalid.";
const CODE_USED: &str = "Authorization code already used.";
const CODE_EXPIRED: &str = "Authorization code has expired.";
const CODE_WRONG_CLIENT: &str = "The code was not issued for this client.";
const CODE_WRONG_REDIRECT: &str = "The redirect_uri does not match the authorization request.";
const REFRESH_INVALID: &str = "Refresh token is invalid.";
const REFRESH_USED: &str = "Refresh token already used.";
const REFRESH_EXPIRED: &str = "Refresh token has expired.";
const REFRESH_WRONG_CLIENT: &str = "The refresh token was not issued for this client.";

/// Token endpoint parameters. For the `refresh_token` grant, `code`
/// carries the refresh token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

struct ValidatedRequest<'a> {
    grant_type: &'a str,
    code: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
}

impl TokenRequest {
    fn validate(&self) -> AuthResult<ValidatedRequest<'_>> {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.is_empty())
        }

        let fields = [
            ("grant_type", present(&self.grant_type)),
            ("code", present(&self.code)),
            ("client_id", present(&self.client_id)),
            ("client_secret", present(&self.client_secret)),
            ("redirect_uri", present(&self.redirect_uri)),
        ];
        let missing: Vec<String> = fields
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name.to_string())
            .collect();

        match fields.map(|(_, value)| value) {
            [
                Some(grant_type),
                Some(code),
                Some(client_id),
                Some(client_secret),
                Some(redirect_uri),
            ] => Ok(ValidatedRequest {
                grant_type,
                code,
                client_id,
                client_secret,
                redirect_uri,
            }),
            _ => Err(AuthError::missing_params(missing)),
        }
    }
}

fn invalid_grant(redirect_uri: &str, message: &str) -> TokenExchange {
    TokenExchange::Redirect(format!(
        "{redirect_uri}?error=invalid_grant&message={message}"
    ))
}

impl OAuth2Service {
    /// Exchange an authorization code or a refresh token for a token bundle.
    #[tracing::instrument(
        skip_all,
        fields(
            grant_type = request.grant_type.as_deref(),
            client_id = request.client_id.as_deref(),
            ip = ?request_ip
        )
    )]
    pub async fn token(
        &self,
        request: &TokenRequest,
        request_ip: Option<IpAddr>,
    ) -> AuthResult<TokenExchange> {
        let request = request.validate()?;
        match request.grant_type {
            GRANT_AUTHORIZATION_CODE => self.exchange_authorization_code(&request).await,
            GRANT_REFRESH_TOKEN => self.exchange_refresh_token(&request).await,
            _ => Err(AuthError::rejected(
                StatusCode::BAD_REQUEST,
                ErrorKey::RequestParameters,
                messages::INVALID_GRANT_TYPE,
            )),
        }
    }

    async fn exchange_authorization_code(
        &self,
        request: &ValidatedRequest<'_>,
    ) -> AuthResult<TokenExchange> {
        let redirect_uri = request.redirect_uri;
        let Some(code) = self.store.find_authorization_code(request.code).await? else {
            return Ok(invalid_grant(redirect_uri, CODE_INVALID));
        };
        if code.status == GrantStatus::Used {
            return Ok(invalid_grant(redirect_uri, CODE_USED));
        }

        let client = self
            .store
            .find_client_by_credentials(request.client_id, request.client_secret)
            .await?;
        let Some(client) = client.filter(|c| c.id == code.client_id) else {
            tracing::warn!("Authorization code presented by another client");
            return Ok(invalid_grant(redirect_uri, CODE_WRONG_CLIENT));
        };
        if code.redirect_uri != redirect_uri {
            return Ok(invalid_grant(redirect_uri, CODE_WRONG_REDIRECT));
        }
        if code.is_expired(OffsetDateTime::now_utc()) {
            return Ok(invalid_grant(redirect_uri, CODE_EXPIRED));
        }

        if !self.store.consume_authorization_code(&code.code).await? {
            tracing::warn!("Lost authorization code redemption race");
            return Ok(invalid_grant(redirect_uri, CODE_USED));
        }
        let Some(user) = self.store.find_user_by_id(&code.user_id).await? else {
            return Ok(invalid_grant(redirect_uri, CODE_INVALID));
        };

        let access = self
            .access
            .issue_access(&user, Some(&client), code.scope.clone(), Some(code.code))
            .await?;
        let bundle = self.finish(&user, &client.id, access).await?;
        tracing::info!(user_id = %user.id, "Authorization code redeemed");
        Ok(TokenExchange::Issued(bundle))
    }

    async fn exchange_refresh_token(
        &self,
        request: &ValidatedRequest<'_>,
    ) -> AuthResult<TokenExchange> {
        let redirect_uri = request.redirect_uri;
        let Some(refresh) = self.store.find_refresh_token(request.code).await? else {
            return Ok(invalid_grant(redirect_uri, REFRESH_INVALID));
        };
        if refresh.status == GrantStatus::Used {
            return Ok(invalid_grant(redirect_uri, REFRESH_USED));
        }

        let client = self
            .store
            .find_client_by_credentials(request.client_id, request.client_secret)
            .await?;
        let Some(client) = client.filter(|c| c.id == refresh.client_id) else {
            return Ok(invalid_grant(redirect_uri, REFRESH_WRONG_CLIENT));
        };
        if refresh.is_expired(OffsetDateTime::now_utc()) {
            return Ok(invalid_grant(redirect_uri, REFRESH_EXPIRED));
        }

        if !self.store.consume_refresh_token(&refresh.token).await? {
            return Ok(invalid_grant(redirect_uri, REFRESH_USED));
        }
        let Some(user) = self.store.find_user_by_id(&refresh.user_id).await? else {
            return Ok(invalid_grant(redirect_uri, REFRESH_INVALID));
        };

        let access = self
            .access
            .issue_access(&user, Some(&client), refresh.scope.clone(), None)
            .await?;
        let bundle = self.finish(&user, &client.id, access).await?;
        tracing::info!(user_id = %user.id, "Refresh token redeemed");
        Ok(TokenExchange::Issued(bundle))
    }

    /// Mint the follow-up refresh token and assemble the bundle.
    async fn finish(
        &self,
        user: &User,
        client_id: &str,
        access: Access,
    ) -> AuthResult<TokenBundle> {
        let now = OffsetDateTime::now_utc();
        let refresh = RefreshToken {
            token: generate_random_token(),
            status: GrantStatus::Created,
            access_id: access.id.clone(),
            user_id: user.id.clone(),
            client_id: client_id.to_string(),
            scope: access.scope.clone(),
            expires_at: now + Duration::seconds(self.tokens.refresh_token_lifetime),
            created_at: now,
        };
        self.store.insert_refresh_token(&refresh).await?;

        Ok(TokenBundle {
            access_token: access.token,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in: access.expires_in,
            refresh_token: refresh.token,
            id_token: access.id_token,
            scope: join_scope(&access.scope),
        })
    }
}
