//! Authorize, token exchange and discovery endpoints.

use super::AppState;
use super::auth::{BearerToken, bearer_token};
use crate::error::{AuthError, ErrorKey, messages};
use crate::oauth2::discovery::OpenIdConfiguration;
use crate::oauth2::{AuthorizeRequest, GRANT_REFRESH_TOKEN, TokenExchange, TokenRequest};
use axum::{
    Form, Json, Router,
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::net::SocketAddr;

/// Cookie carrying the browser session id between authorize and resume.
pub const SESSION_COOKIE: &str = "idp_session";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/oauth2/authorize", get(authorize))
        .route("/oauth2/authorize/resume", post(resume_authorize))
        .route("/oauth2/token", post(token))
        .route(
            "/.well-known/openid-configuration",
            get(openid_configuration),
        )
}

#[derive(Debug, Deserialize)]
pub struct ResumeParams {
    pub client_id: Option<String>,
}

/// Form body of the token endpoint. `refresh_token` is accepted as an
/// alias for `code` on the refresh grant.
#[derive(Debug, Default, Deserialize)]
pub struct TokenForm {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

impl TokenForm {
    fn into_request(self, headers: &HeaderMap) -> TokenRequest {
        let (client_id, client_secret) = extract_client_credentials(headers, &self);
        let code = match self.grant_type.as_deref() {
            Some(GRANT_REFRESH_TOKEN) => self.code.or(self.refresh_token),
            _ => self.code,
        };
        TokenRequest {
            grant_type: self.grant_type,
            code,
            client_id,
            client_secret,
            redirect_uri: self.redirect_uri,
        }
    }
}

fn extract_client_credentials(
    headers: &HeaderMap,
    form: &TokenForm,
) -> (Option<String>, Option<String>) {
    // Try Basic auth first
    if let Some(auth) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        && let Ok(decoded) =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, auth)
        && let Ok(creds) = String::from_utf8(decoded)
        && let Some((id, secret)) = creds.split_once(':')
    {
        return (Some(id.to_string()), Some(secret.to_string()));
    }

    (form.client_id.clone(), form.client_secret.clone())
}

async fn token(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Result<Response, AuthError> {
    let request = form.into_request(&headers);
    match state.oauth2.token(&request, Some(addr.ip())).await? {
        TokenExchange::Issued(bundle) => Ok(Json(bundle).into_response()),
        TokenExchange::Redirect(url) => see_other(url),
    }
}

/// Issue a code for a Bearer-authenticated user. Anonymous requests are
/// parked in the browser session and sent to the login page.
async fn authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(request): Query<AuthorizeRequest>,
) -> Result<Response, AuthError> {
    if let Some(id_token) = bearer_token(&headers) {
        let user = state.auth.current_user(&id_token).await?;
        let grant = state.oauth2.authorize(&request, &user).await?;
        return see_other(grant.redirect_url);
    }

    let existing = jar.get(SESSION_COOKIE);
    let (session_id, session) = state.sessions.open(existing.map(Cookie::value));
    state
        .oauth2
        .save_pending_authorize(session.as_ref(), &request)
        .await?;
    let login = format!(
        "{}/login?client_id={}",
        state.frontend_url.trim_end_matches('/'),
        urlencoding::encode(request.client_id.as_deref().unwrap_or_default())
    );
    let response = see_other(login)?;
    Ok((jar.add(session_cookie(session_id)), response).into_response())
}

/// Complete the parked authorize request once the user has logged in.
async fn resume_authorize(
    State(state): State<AppState>,
    jar: CookieJar,
    BearerToken(id_token): BearerToken,
    Query(params): Query<ResumeParams>,
) -> Result<Response, AuthError> {
    let client_id = params
        .client_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AuthError::missing_params(vec!["client_id".into()]))?;
    let session = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.get(cookie.value()))
        .ok_or_else(AuthError::session_expired)?;
    let user = state.auth.current_user(&id_token).await?;
    let grant = state
        .oauth2
        .resume_authorization(session.as_ref(), &client_id, &user)
        .await?;
    see_other(grant.redirect_url)
}

fn session_cookie(id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

fn see_other(url: String) -> Result<Response, AuthError> {
    let location = HeaderValue::try_from(url).map_err(|_| {
        AuthError::rejected(
            StatusCode::BAD_REQUEST,
            ErrorKey::RequestParameters,
            messages::INVALID_REDIRECT_URI,
        )
    })?;
    Ok((StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response())
}

async fn openid_configuration(State(state): State<AppState>) -> Json<OpenIdConfiguration> {
    Json(state.oauth2.openid_configuration())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn test_basic_auth_overrides_form_credentials() {
        let mut headers = HeaderMap::new();
        let encoded = base64::engine::general_purpose::STANDARD.encode("client-a:secret-a");
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        let form = TokenForm {
            client_id: Some("client-b".into()),
            client_secret: Some("secret-b".into()),
            ..Default::default()
        };
        let request = form.into_request(&headers);
        assert_eq!(request.client_id.as_deref(), Some("client-a"));
        assert_eq!(request.client_secret.as_deref(), Some("secret-a"));
    }

    #[test]
    fn test_refresh_token_alias() {
        let form = TokenForm {
            grant_type: Some("refresh_token".into()),
            refresh_token: Some("r1".into()),
            ..Default::default()
        };
        assert_eq!(form.into_request(&HeaderMap::new()).code.as_deref(), Some("r1"));

        let form = TokenForm {
            grant_type: Some("authorization_code".into()),
            refresh_token: Some("r1".into()),
            ..Default::default()
        };
        assert_eq!(form.into_request(&HeaderMap::new()).code, None);
    }
}
