//! Access entity - issued session tokens (bearer + ID token).

use crate::model::{Access, join_scope, parse_scope};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "idp_access")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub token: String,
    #[sea_orm(unique)]
    pub id_token: String,
    pub token_type: String,
    /// Space-separated scopes
    pub scope: String,
    pub expires_in: i64,
    pub expires_on: OffsetDateTime,
    pub user_id: String,
    pub client_id: Option<String>,
    pub authorization_code: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Access {
    fn from(model: Model) -> Self {
        Access {
            id: model.id,
            token_type: model.token_type,
            token: model.token,
            id_token: model.id_token,
            scope: parse_scope(&model.scope),
            expires_in: model.expires_in,
            expires_on: model.expires_on,
            user_id: model.user_id,
            client_id: model.client_id,
            authorization_code: model.authorization_code,
            created_at: model.created_at,
        }
    }
}

impl From<&Access> for ActiveModel {
    fn from(access: &Access) -> Self {
        use sea_orm::ActiveValue::Set;
        ActiveModel {
            id: Set(access.id.clone()),
            token: Set(access.token.clone()),
            id_token: Set(access.id_token.clone()),
            token_type: Set(access.token_type.clone()),
            scope: Set(join_scope(&access.scope)),
            expires_in: Set(access.expires_in),
            expires_on: Set(access.expires_on),
            user_id: Set(access.user_id.clone()),
            client_id: Set(access.client_id.clone()),
            authorization_code: Set(access.authorization_code.clone()),
            created_at: Set(access.created_at),
        }
    }
}
