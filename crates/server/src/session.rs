//! Key-value session seam.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// Snapshot of the logged-in user.
    CurrentUser,
    /// Set while an OAuth2 authorize request is in flight.
    AuthorizationFlow,
    /// Pending authorize request for the given client id.
    PendingAuthorize(String),
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::CurrentUser => f.write_str("current_user"),
            SessionKey::AuthorizationFlow => f.write_str("is_authorization_flow"),
            SessionKey::PendingAuthorize(client_id) => write!(f, "authorize:{client_id}"),
        }
    }
}

#[async_trait]
pub trait Session: Send + Sync {
    async fn get(&self, key: &SessionKey) -> Option<Value>;
    async fn set(&self, key: SessionKey, value: Value);
    async fn remove(&self, key: &SessionKey) -> Option<Value>;
    /// Drop every key.
    async fn destroy(&self);

    async fn is_authorization_flow(&self) -> bool {
        matches!(
            self.get(&SessionKey::AuthorizationFlow).await,
            Some(Value::Bool(true))
        )
    }
}

/// Process-local session, one per browser session.
#[derive(Default)]
pub struct MemorySession {
    values: DashMap<SessionKey, Value>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn get(&self, key: &SessionKey) -> Option<Value> {
        self.values.get(key).map(|v| v.value().clone())
    }

    async fn set(&self, key: SessionKey, value: Value) {
        self.values.insert(key, value);
    }

    async fn remove(&self, key: &SessionKey) -> Option<Value> {
        self.values.remove(key).map(|(_, v)| v)
    }

    async fn destroy(&self) {
        self.values.clear();
    }
}

/// Browser sessions by id, as carried in the session cookie.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<MemorySession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<MemorySession>> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    /// The session for `id`, or a fresh one under a new id.
    pub fn open(&self, id: Option<&str>) -> (String, Arc<MemorySession>) {
        if let Some(id) = id
            && let Some(session) = self.get(id)
        {
            return (id.to_string(), session);
        }
        let id = crate::token::generate_random_token();
        let session = Arc::new(MemorySession::new());
        self.sessions.insert(id.clone(), session.clone());
        (id, session)
    }
}
