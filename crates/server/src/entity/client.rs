//! OAuth2 Client entity.

use crate::error::StoreError;
use crate::model::Client;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "idp_client")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Shared secret, rotated with compare-and-swap
    pub secret: String,
    /// Human-readable client name
    pub name: String,
    /// JSON array of allowed redirect URIs
    pub redirect_uris: String,
    /// Whether the client may use the credentials flow
    pub credentials_flow: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse redirect URIs from JSON string
    pub fn redirect_uris_list(&self) -> Result<Vec<String>, StoreError> {
        serde_json::from_str(&self.redirect_uris)
            .map_err(|e| StoreError::Corrupt(format!("client {} redirect_uris: {e}", self.id)))
    }
}

impl TryFrom<Model> for Client {
    type Error = StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let redirect_uris = model.redirect_uris_list()?;
        Ok(Client {
            id: model.id,
            secret: model.secret,
            name: model.name,
            redirect_uris,
            credentials_flow: model.credentials_flow,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

impl TryFrom<&Client> for ActiveModel {
    type Error = StoreError;

    fn try_from(client: &Client) -> Result<Self, Self::Error> {
        use sea_orm::ActiveValue::Set;
        let redirect_uris = serde_json::to_string(&client.redirect_uris)
            .map_err(|e| StoreError::Corrupt(format!("client {} redirect_uris: {e}", client.id)))?;
        Ok(ActiveModel {
            id: Set(client.id.clone()),
            secret: Set(client.secret.clone()),
            name: Set(client.name.clone()),
            redirect_uris: Set(redirect_uris),
            credentials_flow: Set(client.credentials_flow),
            created_at: Set(client.created_at),
            updated_at: Set(client.updated_at),
        })
    }
}
