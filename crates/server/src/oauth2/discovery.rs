use super::OAuth2Service;
use super::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

impl OAuth2Service {
    pub fn openid_configuration(&self) -> OpenIdConfiguration {
        let issuer = self.tokens.issuer_url.trim_end_matches('/');
        OpenIdConfiguration {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{issuer}/oauth2/authorize"),
            token_endpoint: format!("{issuer}/oauth2/token"),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                GRANT_AUTHORIZATION_CODE.to_string(),
                GRANT_REFRESH_TOKEN.to_string(),
            ],
            subject_types_supported: vec!["public".to_string()],
            id_token_signing_alg_values_supported: vec!["HS256".to_string()],
            scopes_supported: self
                .tokens
                .default_scope
                .split_whitespace()
                .map(String::from)
                .collect(),
            token_endpoint_auth_methods_supported: vec![
                "client_secret_basic".to_string(),
                "client_secret_post".to_string(),
            ],
        }
    }
}
