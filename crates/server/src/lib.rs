//! An identity provider: password, IP and social login, access-token
//! lifecycle, and the OAuth2 / OpenID Connect authorization-code and
//! refresh-token exchange.
//!
//! Workflows live in [`auth`] and [`oauth2`]; persistence, mail and session
//! storage are reached through the traits in [`store`], [`notify`] and
//! [`session`].

use std::sync::Arc;

use crate::config::AppConfig;
use crate::notify::Notifier;
use crate::store::Store;

pub mod access;
pub mod api;
pub mod auth;
pub mod config;
pub mod entity;
pub mod error;
pub mod identity;
pub mod ip;
pub mod model;
pub mod notify;
pub mod oauth2;
pub mod password;
pub mod session;
pub mod store;
pub mod token;

#[derive(Clone)]
pub struct AppResources {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<AppConfig>,
}
