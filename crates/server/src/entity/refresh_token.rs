//! Refresh Token entity.

use crate::error::StoreError;
use crate::model::{RefreshToken, join_scope, parse_scope};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "idp_refresh_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub token: String,
    pub status: String,
    /// Access record issued together with this refresh token
    pub access_id: String,
    pub user_id: String,
    pub client_id: String,
    pub scope: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for RefreshToken {
    type Error = StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let status = model
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("refresh token: {e}")))?;
        Ok(RefreshToken {
            token: model.token,
            status,
            access_id: model.access_id,
            user_id: model.user_id,
            client_id: model.client_id,
            scope: parse_scope(&model.scope),
            expires_at: model.expires_at,
            created_at: model.created_at,
        })
    }
}

impl From<&RefreshToken> for ActiveModel {
    fn from(token: &RefreshToken) -> Self {
        use sea_orm::ActiveValue::Set;
        ActiveModel {
            token: Set(token.token.clone()),
            status: Set(token.status.as_str().to_string()),
            access_id: Set(token.access_id.clone()),
            user_id: Set(token.user_id.clone()),
            client_id: Set(token.client_id.clone()),
            scope: Set(join_scope(&token.scope)),
            expires_at: Set(token.expires_at),
            created_at: Set(token.created_at),
        }
    }
}
