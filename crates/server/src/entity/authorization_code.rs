//! Authorization Code entity - one-time codes exchanged for tokens.

use crate::error::StoreError;
use crate::model::{AuthorizationCode, join_scope, parse_scope};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "idp_authorization_code")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scope: String,
    pub state: Option<String>,
    /// "created" or "used"
    pub status: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for AuthorizationCode {
    type Error = StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let status = model
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("authorization code: {e}")))?;
        Ok(AuthorizationCode {
            code: model.code,
            client_id: model.client_id,
            user_id: model.user_id,
            redirect_uri: model.redirect_uri,
            response_type: model.response_type,
            scope: parse_scope(&model.scope),
            state: model.state,
            status,
            expires_at: model.expires_at,
            created_at: model.created_at,
        })
    }
}

impl From<&AuthorizationCode> for ActiveModel {
    fn from(code: &AuthorizationCode) -> Self {
        use sea_orm::ActiveValue::Set;
        ActiveModel {
            code: Set(code.code.clone()),
            client_id: Set(code.client_id.clone()),
            user_id: Set(code.user_id.clone()),
            redirect_uri: Set(code.redirect_uri.clone()),
            response_type: Set(code.response_type.clone()),
            scope: Set(join_scope(&code.scope)),
            state: Set(code.state.clone()),
            status: Set(code.status.as_str().to_string()),
            expires_at: Set(code.expires_at),
            created_at: Set(code.created_at),
        }
    }
}
