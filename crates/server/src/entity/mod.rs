//! SeaORM entities backing the identity stores.

pub mod access;
pub mod authorization_code;
pub mod client;
pub mod identity;
pub mod refresh_token;
pub mod user;
