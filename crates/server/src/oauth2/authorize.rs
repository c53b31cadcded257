use super::OAuth2Service;
use crate::error::{AuthError, AuthResult, ErrorKey, messages};
use crate::model::{AuthorizationCode, GrantStatus, User, parse_scope};
use crate::session::{Session, SessionKey};
use crate::token::generate_random_token;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

pub const RESPONSE_TYPE_CODE: &str = "code";

/// Query parameters of the authorize endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationGrant {
    pub code: String,
    /// Where the browser goes next, with `code` and `state` attached.
    pub redirect_url: String,
}

impl OAuth2Service {
    /// Issue an authorization code for an authenticated user.
    #[tracing::instrument(
        skip(self, request, user),
        fields(client_id = request.client_id.as_deref(), user_id = %user.id)
    )]
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
        user: &User,
    ) -> AuthResult<AuthorizationGrant> {
        let (Some(response_type), Some(client_id)) =
            (request.response_type.as_deref(), request.client_id.as_deref())
        else {
            let missing = [
                ("response_type", &request.response_type),
                ("client_id", &request.client_id),
            ]
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| name.to_string())
            .collect();
            return Err(AuthError::missing_params(missing));
        };
        if response_type != RESPONSE_TYPE_CODE {
            return Err(AuthError::rejected(
                StatusCode::BAD_REQUEST,
                ErrorKey::RequestParameters,
                messages::INVALID_RESPONSE_TYPE,
            ));
        }

        let client = self
            .store
            .find_client_by_id(client_id)
            .await?
            .ok_or_else(AuthError::client_not_found)?;
        let redirect_uri = match request.redirect_uri.as_deref() {
            Some(uri) if client.is_redirect_uri_allowed(uri) => Some(uri),
            Some(_) => None,
            None => client.default_redirect_uri(),
        }
        .ok_or_else(|| {
            AuthError::rejected(
                StatusCode::BAD_REQUEST,
                ErrorKey::RequestParameters,
                messages::INVALID_REDIRECT_URI,
            )
        })?
        .to_string();

        let now = OffsetDateTime::now_utc();
        let code = AuthorizationCode {
            code: generate_random_token(),
            client_id: client.id.clone(),
            user_id: user.id.clone(),
            redirect_uri: redirect_uri.clone(),
            response_type: response_type.to_string(),
            scope: parse_scope(
                request
                    .scope
                    .as_deref()
                    .unwrap_or(&self.tokens.default_scope),
            ),
            state: request.state.clone(),
            status: GrantStatus::Created,
            expires_at: now + Duration::seconds(self.tokens.authorization_code_lifetime),
            created_at: now,
        };
        self.store.insert_authorization_code(&code).await?;

        let mut redirect_url = url::Url::parse(&redirect_uri)
            .map_err(|e| AuthError::Internal(format!("stored redirect_uri is not a URL: {e}")))?;
        {
            let mut query = redirect_url.query_pairs_mut();
            query.append_pair("code", &code.code);
            if let Some(state) = &code.state {
                query.append_pair("state", state);
            }
        }
        tracing::info!("Issued authorization code");
        Ok(AuthorizationGrant {
            code: code.code,
            redirect_url: redirect_url.into(),
        })
    }

    /// Park an authorize request until the user has logged in.
    pub async fn save_pending_authorize(
        &self,
        session: &dyn Session,
        request: &AuthorizeRequest,
    ) -> AuthResult<()> {
        let client_id = request
            .client_id
            .clone()
            .ok_or_else(|| AuthError::missing_params(vec!["client_id".into()]))?;
        let payload = serde_json::to_value(request)
            .map_err(|e| AuthError::Internal(format!("failed to store authorize request: {e}")))?;
        session
            .set(SessionKey::PendingAuthorize(client_id), payload)
            .await;
        session
            .set(SessionKey::AuthorizationFlow, serde_json::Value::Bool(true))
            .await;
        Ok(())
    }

    /// Complete a parked authorize request for `client_id` on behalf of `user`.
    ///
    /// On success the session remembers `user` as its current user.
    pub async fn resume_authorization(
        &self,
        session: &dyn Session,
        client_id: &str,
        user: &User,
    ) -> AuthResult<AuthorizationGrant> {
        let payload = session
            .remove(&SessionKey::PendingAuthorize(client_id.to_string()))
            .await
            .ok_or_else(AuthError::session_expired)?;
        let request: AuthorizeRequest =
            serde_json::from_value(payload).map_err(|_| AuthError::session_expired())?;
        session.remove(&SessionKey::AuthorizationFlow).await;
        let grant = self.authorize(&request, user).await?;

        let snapshot = serde_json::to_value(user.snapshot())
            .map_err(|e| AuthError::Internal(format!("failed to store session user: {e}")))?;
        session.set(SessionKey::CurrentUser, snapshot).await;
        Ok(grant)
    }
}
