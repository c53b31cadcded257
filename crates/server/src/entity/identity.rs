//! Identity entity - links users to external identity providers.
//!
//! One user may hold several links (ORCID, Google, GitHub, generic OIDC).

use crate::model::IdentityLink;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "idp_identity")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Reference to idp_user.id
    pub user_id: String,
    /// Identity provider name (e.g., "orcid", "google", "oidc:keycloak")
    pub provider: String,
    /// Provider-specific user identifier (subject claim in OIDC)
    pub subject: String,
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

impl From<Model> for IdentityLink {
    fn from(model: Model) -> Self {
        IdentityLink {
            id: model.id,
            user_id: model.user_id,
            provider: model.provider,
            subject: model.subject,
            created_at: model.created_at,
        }
    }
}
