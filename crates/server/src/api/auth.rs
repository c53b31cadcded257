//! Account endpoints and the Bearer extractor.

use super::AppState;
use crate::auth::IpLogin;
use crate::error::AuthError;
use crate::model::{NewUser, PublicUser, User, join_scope};
use axum::{
    Json, Router,
    extract::{ConnectInfo, FromRequestParts, Query, State},
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// `Authorization: Bearer <id_token>`
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer_token(&parts.headers)
            .map(BearerToken)
            .ok_or_else(AuthError::invalid_token)
    }
}

/// The Bearer credential of `headers`, if one is present.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/verify", get(verify))
        .route("/login", post(login))
        .route("/login/ip", post(login_ip))
        .route("/logout", post(logout))
        .route("/password/forgot", post(forgot_password))
        .route("/password/forgot/verify", post(verify_forgot_password))
        .route("/password/reset", post(reset_password))
        .route("/password", put(update_password))
        .route("/validate", get(validate))
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    pub username: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClientParams {
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordVerifyRequest {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub username: String,
    pub password: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub scope: String,
    pub expires_in: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_on: time::OffsetDateTime,
}

async fn register(
    State(state): State<AppState>,
    Json(draft): Json<NewUser>,
) -> Result<(StatusCode, Json<PublicUser>), AuthError> {
    let user = state.auth.register_user(draft).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn verify(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<Json<User>, AuthError> {
    let user = state
        .auth
        .verify_registration(params.username.as_deref(), params.token.as_deref())
        .await?;
    Ok(Json(user))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<User>, AuthError> {
    let user = state
        .auth
        .login_basic(&body.username, &body.password, body.client_id.as_deref())
        .await?;
    Ok(Json(user))
}

async fn login_ip(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<ClientParams>,
) -> Result<Response, AuthError> {
    match state
        .auth
        .login_by_ip(addr.ip(), params.client_id.as_deref())
        .await?
    {
        IpLogin::User(user) => Ok(Json(user).into_response()),
        IpLogin::Anonymous => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn logout(
    State(state): State<AppState>,
    BearerToken(id_token): BearerToken,
) -> Result<StatusCode, AuthError> {
    state.auth.logout(&id_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<StatusCode, AuthError> {
    state.auth.forgot_password(&body.username).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn verify_forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordVerifyRequest>,
) -> Result<Json<SuccessResponse>, AuthError> {
    let success = state
        .auth
        .verify_forgot_password_token(&body.username, &body.token)
        .await?;
    Ok(Json(SuccessResponse { success }))
}

async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<SuccessResponse>, AuthError> {
    let success = state
        .auth
        .reset_password(&body.username, &body.password, &body.token)
        .await?;
    Ok(Json(SuccessResponse { success }))
}

async fn update_password(
    State(state): State<AppState>,
    BearerToken(id_token): BearerToken,
    Json(body): Json<UpdatePasswordRequest>,
) -> Result<Json<SuccessResponse>, AuthError> {
    let user = state.auth.current_user(&id_token).await?;
    let success = state
        .auth
        .update_password(&user.username, &body.old_password, &body.new_password)
        .await?;
    Ok(Json(SuccessResponse { success }))
}

async fn validate(
    State(state): State<AppState>,
    BearerToken(id_token): BearerToken,
) -> Result<Json<ValidateResponse>, AuthError> {
    let access = state.auth.validate_access_token(&id_token).await?;
    Ok(Json(ValidateResponse {
        user_id: access.user_id,
        client_id: access.client_id,
        scope: join_scope(&access.scope),
        expires_in: access.expires_in,
        expires_on: access.expires_on,
    }))
}
