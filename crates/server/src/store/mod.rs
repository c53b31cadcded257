//! Persistence seams consumed by the services.
//!
//! Every workflow talks to these traits only; [`DbStore`] is the SeaORM
//! implementation. Single-use transitions (`consume_*`) and expiry extension
//! must be atomic in the backing store: the caller trusts the returned flag.

mod db;

pub use db::DbStore;

use crate::error::StoreError;
use crate::model::{Access, AuthorizationCode, Client, IdentityLink, RefreshToken, User};
use async_trait::async_trait;
use time::OffsetDateTime;

pub type StoreResult<T> = Result<T, StoreError>;

/// Partial update of a user. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub password_hash: Option<String>,
    pub reset_password_token: Option<Option<String>>,
    pub is_validated: Option<bool>,
    pub registration_verification_token: Option<Option<String>>,
    pub registration_verification_token_expiry: Option<Option<i64>>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_id(&self, id: &str) -> StoreResult<Option<User>>;
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    /// Returns the updated user, or `None` when no such user exists.
    async fn update_user(&self, id: &str, patch: UserPatch) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn find_client_by_id(&self, client_id: &str) -> StoreResult<Option<Client>>;
    async fn find_client_by_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> StoreResult<Option<Client>>;
    async fn insert_client(&self, client: &Client) -> StoreResult<()>;
    /// Replace the secret only if it still equals `current`.
    async fn swap_client_secret(
        &self,
        client_id: &str,
        current: &str,
        replacement: &str,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn insert_access(&self, access: &Access) -> StoreResult<()>;
    async fn find_access_by_id_token(&self, id_token: &str) -> StoreResult<Option<Access>>;
    async fn find_access_for_user(&self, user_id: &str) -> StoreResult<Vec<Access>>;
    /// Delete the user's records with `expires_on < now`; returns the count.
    async fn remove_expired_access(&self, user_id: &str, now: OffsetDateTime) -> StoreResult<u64>;
    async fn remove_access_by_id_token(&self, id_token: &str) -> StoreResult<u64>;
    /// Push `expires_on` to `until`, but only while the record is still live
    /// at `now`. `None` means the record is missing or already expired.
    async fn extend_access(
        &self,
        id_token: &str,
        now: OffsetDateTime,
        until: OffsetDateTime,
    ) -> StoreResult<Option<Access>>;
}

#[async_trait]
pub trait AuthorizationCodeStore: Send + Sync {
    async fn insert_authorization_code(&self, code: &AuthorizationCode) -> StoreResult<()>;
    async fn find_authorization_code(&self, code: &str) -> StoreResult<Option<AuthorizationCode>>;
    /// Atomic created -> used. `false` if someone else got there first.
    async fn consume_authorization_code(&self, code: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> StoreResult<()>;
    async fn find_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>>;
    /// Atomic created -> used. `false` if already used.
    async fn consume_refresh_token(&self, token: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_identity(
        &self,
        provider: &str,
        subject: &str,
    ) -> StoreResult<Option<IdentityLink>>;
    async fn find_identities_for_user(&self, user_id: &str) -> StoreResult<Vec<IdentityLink>>;
    async fn insert_identity(&self, link: &IdentityLink) -> StoreResult<()>;
}

/// Everything the services need from persistence.
pub trait Store:
    UserStore
    + ClientStore
    + AccessStore
    + AuthorizationCodeStore
    + RefreshTokenStore
    + IdentityStore
{
}

impl<T> Store for T where
    T: UserStore
        + ClientStore
        + AccessStore
        + AuthorizationCodeStore
        + RefreshTokenStore
        + IdentityStore
{
}
