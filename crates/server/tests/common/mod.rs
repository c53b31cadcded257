//! Shared fixtures: in-memory SQLite schema, a recording notifier and
//! pre-wired services.
#![allow(dead_code)]

use async_trait::async_trait;
use identity_provider::{
    AppResources,
    auth::AuthService,
    config::{AppConfig, IpLoginRule, SmtpConfig, TokenConfig},
    ip::IpAllowlist,
    model::{Client, Credential, Profile, User, UserType},
    notify::{Notification, Notifier, NotifyError},
    oauth2::OAuth2Service,
    password::hash_password,
    store::{ClientStore, DbStore, UserStore},
};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;

pub const SECRET: &str = "test-signing-secret-0123456789abcdef";
pub const ISSUER: &str = "https://id.example.com";
pub const CLIENT_ID: &str = "client-app";
pub const CLIENT_SECRET: &str = "client-app-secret";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const STRONG_PASSWORD: &str = "Password1!";

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE idp_user (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        user_type TEXT NOT NULL,
        password_hash TEXT NULL,
        reset_password_token TEXT NULL,
        is_validated INTEGER NOT NULL DEFAULT 0,
        registration_verification_token TEXT NULL,
        registration_verification_token_expiry INTEGER NULL,
        first_name TEXT NULL,
        last_name TEXT NULL,
        organisation TEXT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE idp_client (
        id TEXT PRIMARY KEY,
        secret TEXT NOT NULL,
        name TEXT NOT NULL,
        redirect_uris TEXT NOT NULL,
        credentials_flow INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE idp_access (
        id TEXT PRIMARY KEY,
        token TEXT NOT NULL UNIQUE,
        id_token TEXT NOT NULL UNIQUE,
        token_type TEXT NOT NULL,
        scope TEXT NOT NULL,
        expires_in INTEGER NOT NULL,
        expires_on TEXT NOT NULL,
        user_id TEXT NOT NULL,
        client_id TEXT NULL,
        authorization_code TEXT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE idp_authorization_code (
        code TEXT PRIMARY KEY,
        client_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        redirect_uri TEXT NOT NULL,
        response_type TEXT NOT NULL,
        scope TEXT NOT NULL,
        state TEXT NULL,
        status TEXT NOT NULL DEFAULT 'created',
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE idp_refresh_token (
        token TEXT PRIMARY KEY,
        status TEXT NOT NULL DEFAULT 'created',
        access_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        client_id TEXT NOT NULL,
        scope TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE idp_identity (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        provider TEXT NOT NULL,
        subject TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (provider, subject)
    );"#,
];

/// Create a test database with all identity tables.
pub async fn create_test_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    for statement in SCHEMA {
        db.execute(Statement::from_string(DbBackend::Sqlite, *statement))
            .await
            .expect("create table");
    }
    Arc::new(db)
}

/// Notifier that keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Notification)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, n)| n.kind() == kind)
            .count()
    }

    /// Wait for detached deliveries to land.
    pub async fn wait_for(&self, kind: &str, expected: usize) -> usize {
        for _ in 0..100 {
            if self.count(kind) >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.count(kind)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, to: &str, notification: Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), notification));
        Ok(())
    }
}

pub struct Harness {
    pub db: Arc<DatabaseConnection>,
    pub store: Arc<DbStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub tokens: Arc<TokenConfig>,
    pub auth: AuthService,
    pub oauth2: OAuth2Service,
}

pub fn token_config() -> TokenConfig {
    TokenConfig::new(SECRET, ISSUER)
}

pub async fn harness() -> Harness {
    harness_with_ip_rules(Vec::new()).await
}

pub async fn harness_with_ip_rules(rules: Vec<IpLoginRule>) -> Harness {
    let db = create_test_db().await;
    let store = Arc::new(DbStore::new(db.clone()));
    let notifier = Arc::new(RecordingNotifier::default());
    let tokens = Arc::new(token_config());
    let auth = AuthService::new(
        store.clone(),
        notifier.clone(),
        tokens.clone(),
        IpAllowlist::new(rules),
    );
    let oauth2 = OAuth2Service::new(store.clone(), tokens.clone());
    Harness {
        db,
        store,
        notifier,
        tokens,
        auth,
        oauth2,
    }
}

pub fn app_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        smtp: SmtpConfig {
            server: "localhost".into(),
            port: 25,
            username: "test".into(),
            password: "test".into(),
            from: "idp@example.com".into(),
        },
        frontend_url: ISSUER.into(),
        tokens: token_config(),
        ip_login: Vec::new(),
    }
}

impl Harness {
    pub fn resources(&self) -> AppResources {
        AppResources {
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            config: Arc::new(app_config()),
        }
    }

    pub async fn seed_client(&self, id: &str, secret: &str, redirect_uri: &str) -> Client {
        self.insert_client(id, secret, redirect_uri, false).await
    }

    /// `CLIENT_ID`, with the credentials flow enabled.
    pub async fn seed_default_client(&self) -> Client {
        self.insert_client(CLIENT_ID, CLIENT_SECRET, REDIRECT_URI, true).await
    }

    async fn insert_client(
        &self,
        id: &str,
        secret: &str,
        redirect_uri: &str,
        credentials_flow: bool,
    ) -> Client {
        let now = OffsetDateTime::now_utc();
        let client = Client {
            id: id.into(),
            secret: secret.into(),
            name: format!("{id} app"),
            redirect_uris: vec![redirect_uri.into()],
            credentials_flow,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_client(&client).await.expect("insert client");
        client
    }

    /// A basic account with `STRONG_PASSWORD`.
    pub async fn seed_user(&self, username: &str, validated: bool) -> User {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            user_type: UserType::Basic,
            credential: Credential {
                password_hash: Some(hash_password(STRONG_PASSWORD).expect("hash")),
                reset_password_token: None,
            },
            access_token: Vec::new(),
            is_validated: validated,
            registration_verification_token: None,
            registration_verification_token_expiry: None,
            profile: Profile::default(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.store.insert_user(&user).await.expect("insert user");
        user
    }

    pub async fn user(&self, username: &str) -> User {
        self.store
            .find_user_by_username(username)
            .await
            .expect("query")
            .expect("user exists")
    }
}
