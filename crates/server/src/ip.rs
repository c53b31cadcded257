//! Address-based account resolution.

use crate::config::IpLoginRule;
use crate::model::UserType;
use std::net::IpAddr;

/// Account an address resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpIdentity {
    pub username: String,
    pub user_type: UserType,
    pub validated: bool,
}

/// Ordered CIDR rules; the first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct IpAllowlist {
    rules: Vec<IpLoginRule>,
}

impl IpAllowlist {
    pub fn new(rules: Vec<IpLoginRule>) -> Self {
        Self { rules }
    }

    pub fn classify(&self, ip: &IpAddr) -> Option<IpIdentity> {
        self.rules
            .iter()
            .find(|rule| rule.net.contains(ip))
            .map(|rule| IpIdentity {
                username: rule.username.clone(),
                user_type: rule.user_type,
                validated: rule.validated,
            })
    }
}
