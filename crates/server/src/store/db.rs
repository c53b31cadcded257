use super::{
    AccessStore, AuthorizationCodeStore, ClientStore, IdentityStore, RefreshTokenStore,
    StoreResult, UserPatch, UserStore,
};
use crate::entity::{access, authorization_code, client, identity, refresh_token, user};
use crate::model::{
    Access, AuthorizationCode, Client, GrantStatus, IdentityLink, RefreshToken, User,
};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    sea_query::Expr,
};
use std::sync::Arc;
use time::OffsetDateTime;

/// SeaORM-backed store.
#[derive(Clone)]
pub struct DbStore {
    db: Arc<DatabaseConnection>,
}

impl DbStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for DbStore {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db.as_ref())
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        user::Entity::find_by_id(id.to_string())
            .one(self.db.as_ref())
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        user::ActiveModel::from(user).insert(self.db.as_ref()).await?;
        Ok(())
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> StoreResult<Option<User>> {
        let Some(existing) = user::Entity::find_by_id(id.to_string())
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(None);
        };

        let mut active: user::ActiveModel = existing.clone().into();
        if let Some(hash) = patch.password_hash {
            active.password_hash = Set(Some(hash));
        }
        if let Some(token) = patch.reset_password_token {
            active.reset_password_token = Set(token);
        }
        if let Some(validated) = patch.is_validated {
            active.is_validated = Set(validated);
        }
        if let Some(token) = patch.registration_verification_token {
            active.registration_verification_token = Set(token);
        }
        if let Some(expiry) = patch.registration_verification_token_expiry {
            active.registration_verification_token_expiry = Set(expiry);
        }

        let updated = if active.is_changed() {
            active.update(self.db.as_ref()).await?
        } else {
            existing
        };
        User::try_from(updated).map(Some)
    }
}

#[async_trait]
impl ClientStore for DbStore {
    async fn find_client_by_id(&self, client_id: &str) -> StoreResult<Option<Client>> {
        client::Entity::find_by_id(client_id.to_string())
            .one(self.db.as_ref())
            .await?
            .map(Client::try_from)
            .transpose()
    }

    async fn find_client_by_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> StoreResult<Option<Client>> {
        client::Entity::find()
            .filter(client::Column::Id.eq(client_id))
            .filter(client::Column::Secret.eq(client_secret))
            .one(self.db.as_ref())
            .await?
            .map(Client::try_from)
            .transpose()
    }

    async fn insert_client(&self, client: &Client) -> StoreResult<()> {
        client::ActiveModel::try_from(client)?
            .insert(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn swap_client_secret(
        &self,
        client_id: &str,
        current: &str,
        replacement: &str,
    ) -> StoreResult<bool> {
        let result = client::Entity::update_many()
            .col_expr(client::Column::Secret, Expr::value(replacement))
            .col_expr(
                client::Column::UpdatedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(client::Column::Id.eq(client_id))
            .filter(client::Column::Secret.eq(current))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }
}

#[async_trait]
impl AccessStore for DbStore {
    async fn insert_access(&self, access: &Access) -> StoreResult<()> {
        access::ActiveModel::from(access)
            .insert(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn find_access_by_id_token(&self, id_token: &str) -> StoreResult<Option<Access>> {
        Ok(access::Entity::find()
            .filter(access::Column::IdToken.eq(id_token))
            .one(self.db.as_ref())
            .await?
            .map(Access::from))
    }

    async fn find_access_for_user(&self, user_id: &str) -> StoreResult<Vec<Access>> {
        Ok(access::Entity::find()
            .filter(access::Column::UserId.eq(user_id))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(Access::from)
            .collect())
    }

    async fn remove_expired_access(&self, user_id: &str, now: OffsetDateTime) -> StoreResult<u64> {
        let result = access::Entity::delete_many()
            .filter(access::Column::UserId.eq(user_id))
            .filter(access::Column::ExpiresOn.lt(now))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }

    async fn remove_access_by_id_token(&self, id_token: &str) -> StoreResult<u64> {
        let result = access::Entity::delete_many()
            .filter(access::Column::IdToken.eq(id_token))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }

    async fn extend_access(
        &self,
        id_token: &str,
        now: OffsetDateTime,
        until: OffsetDateTime,
    ) -> StoreResult<Option<Access>> {
        let result = access::Entity::update_many()
            .col_expr(access::Column::ExpiresOn, Expr::value(until))
            .filter(access::Column::IdToken.eq(id_token))
            .filter(access::Column::ExpiresOn.gt(now))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.find_access_by_id_token(id_token).await
    }
}

#[async_trait]
impl AuthorizationCodeStore for DbStore {
    async fn insert_authorization_code(&self, code: &AuthorizationCode) -> StoreResult<()> {
        authorization_code::ActiveModel::from(code)
            .insert(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn find_authorization_code(&self, code: &str) -> StoreResult<Option<AuthorizationCode>> {
        authorization_code::Entity::find_by_id(code.to_string())
            .one(self.db.as_ref())
            .await?
            .map(AuthorizationCode::try_from)
            .transpose()
    }

    async fn consume_authorization_code(&self, code: &str) -> StoreResult<bool> {
        let result = authorization_code::Entity::update_many()
            .col_expr(
                authorization_code::Column::Status,
                Expr::value(GrantStatus::Used.as_str()),
            )
            .filter(authorization_code::Column::Code.eq(code))
            .filter(authorization_code::Column::Status.eq(GrantStatus::Created.as_str()))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }
}

#[async_trait]
impl RefreshTokenStore for DbStore {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> StoreResult<()> {
        refresh_token::ActiveModel::from(token)
            .insert(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        refresh_token::Entity::find_by_id(token.to_string())
            .one(self.db.as_ref())
            .await?
            .map(RefreshToken::try_from)
            .transpose()
    }

    async fn consume_refresh_token(&self, token: &str) -> StoreResult<bool> {
        let result = refresh_token::Entity::update_many()
            .col_expr(
                refresh_token::Column::Status,
                Expr::value(GrantStatus::Used.as_str()),
            )
            .filter(refresh_token::Column::Token.eq(token))
            .filter(refresh_token::Column::Status.eq(GrantStatus::Created.as_str()))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }
}

#[async_trait]
impl IdentityStore for DbStore {
    async fn find_identity(
        &self,
        provider: &str,
        subject: &str,
    ) -> StoreResult<Option<IdentityLink>> {
        Ok(identity::Entity::find()
            .filter(identity::Column::Provider.eq(provider))
            .filter(identity::Column::Subject.eq(subject))
            .one(self.db.as_ref())
            .await?
            .map(IdentityLink::from))
    }

    async fn find_identities_for_user(&self, user_id: &str) -> StoreResult<Vec<IdentityLink>> {
        Ok(identity::Entity::find()
            .filter(identity::Column::UserId.eq(user_id))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(IdentityLink::from)
            .collect())
    }

    async fn insert_identity(&self, link: &IdentityLink) -> StoreResult<()> {
        identity::ActiveModel {
            id: Set(link.id.clone()),
            user_id: Set(link.user_id.clone()),
            provider: Set(link.provider.clone()),
            subject: Set(link.subject.clone()),
            created_at: Set(link.created_at),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(())
    }
}
