//! HTTP glue.
//!
//! - `auth` - account endpoints (/auth/*)
//! - `oauth2` - authorize, token exchange and discovery (/oauth2/*,
//!   /.well-known/*)
//!
//! Handlers only translate between HTTP and the services; every rejection
//! renders through [`crate::error::AuthError`]'s `IntoResponse`.

pub mod auth;
pub mod oauth2;

use crate::AppResources;
use crate::auth::AuthService;
use crate::ip::IpAllowlist;
use crate::oauth2::OAuth2Service;
use crate::session::SessionRegistry;
use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub oauth2: Arc<OAuth2Service>,
    pub sessions: Arc<SessionRegistry>,
    /// Login page that parked authorize requests are sent to.
    pub frontend_url: String,
}

impl AppState {
    pub fn new(resources: &AppResources) -> Self {
        let tokens = Arc::new(resources.config.tokens.clone());
        Self {
            auth: Arc::new(AuthService::new(
                resources.store.clone(),
                resources.notifier.clone(),
                tokens.clone(),
                IpAllowlist::new(resources.config.ip_login.clone()),
            )),
            oauth2: Arc::new(OAuth2Service::new(resources.store.clone(), tokens)),
            sessions: Arc::new(SessionRegistry::new()),
            frontend_url: resources.config.frontend_url.clone(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/auth", auth::router())
        .merge(oauth2::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the web server on the configured address.
#[tracing::instrument(skip(resources))]
pub async fn start_webserver(resources: AppResources) -> color_eyre::Result<()> {
    let addr = resources.config.listen_addr.clone();
    let app = router(AppState::new(&resources));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server running");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
