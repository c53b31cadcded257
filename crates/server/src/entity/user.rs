//! User entity - canonical identity records.

use crate::error::StoreError;
use crate::model::{Credential, Profile, User};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "idp_user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub username: String,
    pub user_type: String,
    pub password_hash: Option<String>,
    pub reset_password_token: Option<String>,
    pub is_validated: bool,
    pub registration_verification_token: Option<String>,
    /// Epoch milliseconds
    pub registration_verification_token_expiry: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organisation: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::access::Entity")]
    Access,
    #[sea_orm(has_many = "super::identity::Entity")]
    Identities,
}

impl Related<super::access::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Access.def()
    }
}

impl Related<super::identity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Identities.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for User {
    type Error = StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let user_type = model
            .user_type
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("user {}: {e}", model.id)))?;
        Ok(User {
            id: model.id,
            username: model.username,
            user_type,
            credential: Credential {
                password_hash: model.password_hash,
                reset_password_token: model.reset_password_token,
            },
            access_token: Vec::new(),
            is_validated: model.is_validated,
            registration_verification_token: model.registration_verification_token,
            registration_verification_token_expiry: model.registration_verification_token_expiry,
            profile: Profile {
                first_name: model.first_name,
                last_name: model.last_name,
                organisation: model.organisation,
            },
            created_at: model.created_at,
        })
    }
}

impl From<&User> for ActiveModel {
    fn from(user: &User) -> Self {
        use sea_orm::ActiveValue::Set;
        ActiveModel {
            id: Set(user.id.clone()),
            username: Set(user.username.clone()),
            user_type: Set(user.user_type.to_string()),
            password_hash: Set(user.credential.password_hash.clone()),
            reset_password_token: Set(user.credential.reset_password_token.clone()),
            is_validated: Set(user.is_validated),
            registration_verification_token: Set(user.registration_verification_token.clone()),
            registration_verification_token_expiry: Set(
                user.registration_verification_token_expiry
            ),
            first_name: Set(user.profile.first_name.clone()),
            last_name: Set(user.profile.last_name.clone()),
            organisation: Set(user.profile.organisation.clone()),
            created_at: Set(user.created_at),
        }
    }
}
