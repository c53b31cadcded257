use identity_provider::AppResources;
use identity_provider::api::start_webserver;
use identity_provider::config::load_config;
use identity_provider::notify::SmtpNotifier;
use identity_provider::store::DbStore;
use lettre::{AsyncSmtpTransport, Tokio1Executor, transport::smtp::authentication::Credentials};
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "identity_provider=info,sea_orm=info,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    initialize_tracing();

    let config = Arc::new(load_config()?);

    let db = Arc::new(Database::connect(&config.database_url).await?);

    let creds = Credentials::new(config.smtp.username.clone(), config.smtp.password.clone());
    let mailer = Arc::new(
        AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp.server)?
            .port(config.smtp.port)
            .credentials(creds)
            .build(),
    );
    let notifier = SmtpNotifier::new(mailer, &config.smtp, config.frontend_url.clone())?;

    tracing::info!(
        issuer = %config.tokens.issuer_url,
        ip_rules = config.ip_login.len(),
        "identity provider configuration"
    );

    let resources = AppResources {
        store: Arc::new(DbStore::new(db)),
        notifier: Arc::new(notifier),
        config,
    };
    start_webserver(resources).await
}
