use crate::model::UserType;
use serde::Deserialize;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Lifetimes are in seconds.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenConfig {
    /// Process-wide signing secret, used when no client secret applies.
    pub secret: String,
    /// Value of the `iss` claim and base of the discovery document.
    pub issuer_url: String,
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
    #[serde(default = "default_id_token_lifetime")]
    pub id_token_lifetime: i64,
    #[serde(default = "default_registration_token_lifetime")]
    pub registration_token_lifetime: i64,
    #[serde(default = "default_authorization_code_lifetime")]
    pub authorization_code_lifetime: i64,
    #[serde(default = "default_scope")]
    pub default_scope: String,
}

impl TokenConfig {
    /// Token settings with every lifetime at its default.
    pub fn new(secret: impl Into<String>, issuer_url: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer_url: issuer_url.into(),
            access_token_lifetime: default_access_token_lifetime(),
            refresh_token_lifetime: default_refresh_token_lifetime(),
            id_token_lifetime: default_id_token_lifetime(),
            registration_token_lifetime: default_registration_token_lifetime(),
            authorization_code_lifetime: default_authorization_code_lifetime(),
            default_scope: default_scope(),
        }
    }
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_refresh_token_lifetime() -> i64 {
    7 * 24 * 3600
}

fn default_id_token_lifetime() -> i64 {
    24 * 3600
}

fn default_registration_token_lifetime() -> i64 {
    24 * 3600
}

fn default_authorization_code_lifetime() -> i64 {
    600
}

fn default_scope() -> String {
    "openid profile email".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Maps requests from a network onto a fixed account.
#[derive(Clone, Debug, Deserialize)]
pub struct IpLoginRule {
    pub net: IpNet,
    /// Account that requests from `net` log in as.
    pub username: String,
    #[serde(default = "default_ip_user_type")]
    pub user_type: UserType,
    /// Whether the account is created already validated.
    #[serde(default = "default_true")]
    pub validated: bool,
}

fn default_ip_user_type() -> UserType {
    UserType::Ip
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub smtp: SmtpConfig,
    /// Base URL used in verification and reset links.
    pub frontend_url: String,
    pub tokens: TokenConfig,
    /// Networks allowed to log in by address. Examples: "10.0.0.0/8", "::1/128".
    #[serde(default)]
    pub ip_login: Vec<IpLoginRule>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.secret.len() < 32 {
            return Err(ConfigError::Validation(
                "tokens.secret must be at least 32 characters".into(),
            ));
        }
        if self.smtp.port == 0 {
            return Err(ConfigError::Validation("smtp.port must be > 0".into()));
        }
        let tokens = &self.tokens;
        for (name, lifetime) in [
            ("access_token_lifetime", tokens.access_token_lifetime),
            ("refresh_token_lifetime", tokens.refresh_token_lifetime),
            ("id_token_lifetime", tokens.id_token_lifetime),
            ("registration_token_lifetime", tokens.registration_token_lifetime),
            ("authorization_code_lifetime", tokens.authorization_code_lifetime),
        ] {
            if !(1..=MAX_TOKEN_LIFETIME).contains(&lifetime) {
                return Err(ConfigError::Validation(format!(
                    "tokens.{name} must be between 1 and {MAX_TOKEN_LIFETIME} seconds"
                )));
            }
        }
        Ok(())
    }
}

/// Upper bound for every configured token lifetime: one year, in seconds.
pub const MAX_TOKEN_LIFETIME: i64 = 366 * 24 * 60 * 60;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct IpNet {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl IpNet {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix as u32)
                };
                (u32::from(a) & mask) == (u32::from(*b) & mask)
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                let a_bytes = a.octets();
                let b_bytes = b.octets();
                let full_bytes = (self.prefix / 8) as usize;
                let rem_bits = self.prefix % 8;
                if full_bytes > 16 {
                    return false;
                }
                if a_bytes[..full_bytes] != b_bytes[..full_bytes] {
                    return false;
                }
                if rem_bits == 0 {
                    return true;
                }
                let mask = (!0u8) << (8 - rem_bits);
                (a_bytes[full_bytes] & mask) == (b_bytes[full_bytes] & mask)
            }
            _ => false,
        }
    }
}

impl FromStr for IpNet {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip_part, prefix_part) = s
            .split_once('/')
            .ok_or_else(|| "CIDR must contain '/'".to_string())?;
        let addr = IpAddr::from_str(ip_part).map_err(|e| format!("Invalid IP: {e}"))?;
        let prefix: u8 = prefix_part
            .parse()
            .map_err(|e| format!("Invalid prefix: {e}"))?;
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix as u32 > max {
            return Err("Prefix out of range".into());
        }
        Ok(IpNet { addr, prefix })
    }
}

impl TryFrom<String> for IpNet {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any variable matching the key path separated by double underscores
/// (e.g. `TOKENS__SECRET`) overrides the file value. A `.env` file is loaded
/// first when present.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let _ = dotenvy::dotenv();
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn sample_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            listen_addr: default_listen_addr(),
            smtp: SmtpConfig {
                server: "localhost".into(),
                port: 25,
                username: "u".into(),
                password: "p".into(),
                from: "idp@example.com".into(),
            },
            frontend_url: "https://id.example.com".into(),
            tokens: TokenConfig::new("0123456789abcdef0123456789abcdef", "https://id.example.com"),
            ip_login: Vec::new(),
        }
    }

    #[test]
    fn ipv4_basic_matching() {
        let net: IpNet = "192.168.1.0/24".parse().unwrap();
        assert!(net.contains(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42))));
        assert!(!net.contains(&IpAddr::V4(Ipv4Addr::new(192, 168, 2, 1))));
    }

    #[test]
    fn ipv4_prefix_zero() {
        let net: IpNet = "0.0.0.0/0".parse().unwrap();
        assert!(net.contains(&IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
    }

    #[test]
    fn ipv6_matching() {
        let net: IpNet = "2001:db8::/32".parse().unwrap();
        assert!(net.contains(&IpAddr::V6("2001:db8::1".parse::<Ipv6Addr>().unwrap())));
        assert!(!net.contains(&IpAddr::V6("2001:dead::1".parse::<Ipv6Addr>().unwrap())));
        let v4: IpNet = "10.0.0.0/8".parse().unwrap();
        assert!(!v4.contains(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }

    #[test]
    fn parse_rejects_bad_prefix() {
        assert!("192.168.0.0/33".parse::<IpNet>().is_err());
        assert!("10.0.0.1".parse::<IpNet>().is_err());
    }

    #[test]
    fn ip_login_rule_defaults() {
        let rule: IpLoginRule = serde_json::from_value(serde_json::json!({
            "net": "10.1.0.0/16",
            "username": "lab@example.com"
        }))
        .unwrap();
        assert_eq!(rule.user_type, UserType::Ip);
        assert!(rule.validated);
        assert_eq!(rule.net.prefix, 16);
    }

    #[test]
    fn ip_login_rule_rejects_bad_cidr() {
        let parsed: Result<IpLoginRule, _> = serde_json::from_value(serde_json::json!({
            "net": "not-a-net",
            "username": "lab@example.com"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn token_config_defaults() {
        let tokens = TokenConfig::new("s", "https://id.example.com");
        assert_eq!(tokens.access_token_lifetime, 3600);
        assert_eq!(tokens.refresh_token_lifetime, 604_800);
        assert_eq!(tokens.authorization_code_lifetime, 600);
        assert_eq!(tokens.default_scope, "openid profile email");
    }

    #[test]
    fn validate_rejects_short_secret() {
        let mut cfg = sample_config();
        assert!(cfg.validate().is_ok());
        cfg.tokens.secret = "short".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_zero_port() {
        let mut cfg = sample_config();
        cfg.smtp.port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_bounds_every_token_lifetime() {
        let mut cfg = sample_config();
        cfg.tokens.id_token_lifetime = i64::MAX;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Validation(msg)) if msg.contains("id_token_lifetime")
        ));

        let mut cfg = sample_config();
        cfg.tokens.registration_token_lifetime = MAX_TOKEN_LIFETIME + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = sample_config();
        cfg.tokens.authorization_code_lifetime = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = sample_config();
        cfg.tokens.refresh_token_lifetime = MAX_TOKEN_LIFETIME;
        assert!(cfg.validate().is_ok());
    }
}
