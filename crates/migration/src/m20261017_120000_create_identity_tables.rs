//! Creates the identity provider tables:
//! - idp_user: canonical user accounts
//! - idp_client: registered OAuth2 clients
//! - idp_access: issued access/ID tokens
//! - idp_authorization_code: single-use authorization codes
//! - idp_refresh_token: single-use refresh tokens
//! - idp_identity: links to external identity providers

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IdpUser::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(IdpUser::Id).string().not_null().primary_key())
                    .col(
                        ColumnDef::new(IdpUser::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(IdpUser::UserType).string().not_null())
                    .col(ColumnDef::new(IdpUser::PasswordHash).string().null())
                    .col(ColumnDef::new(IdpUser::ResetPasswordToken).string().null())
                    .col(
                        ColumnDef::new(IdpUser::IsValidated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(IdpUser::RegistrationVerificationToken)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IdpUser::RegistrationVerificationTokenExpiry)
                            .big_integer()
                            .null(),
                    )
                    .col(ColumnDef::new(IdpUser::FirstName).string().null())
                    .col(ColumnDef::new(IdpUser::LastName).string().null())
                    .col(ColumnDef::new(IdpUser::Organisation).string().null())
                    .col(
                        ColumnDef::new(IdpUser::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdpClient::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(IdpClient::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(IdpClient::Secret).string().not_null())
                    .col(ColumnDef::new(IdpClient::Name).string().not_null())
                    .col(ColumnDef::new(IdpClient::RedirectUris).text().not_null())
                    .col(
                        ColumnDef::new(IdpClient::CredentialsFlow)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(IdpClient::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdpClient::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdpAccess::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(IdpAccess::Id).string().not_null().primary_key())
                    .col(
                        ColumnDef::new(IdpAccess::Token)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(IdpAccess::IdToken)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(IdpAccess::TokenType).string().not_null())
                    .col(ColumnDef::new(IdpAccess::Scope).text().not_null())
                    .col(ColumnDef::new(IdpAccess::ExpiresIn).big_integer().not_null())
                    .col(
                        ColumnDef::new(IdpAccess::ExpiresOn)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IdpAccess::UserId).string().not_null())
                    .col(ColumnDef::new(IdpAccess::ClientId).string().null())
                    .col(ColumnDef::new(IdpAccess::AuthorizationCode).string().null())
                    .col(
                        ColumnDef::new(IdpAccess::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_idp_access_user")
                            .from(IdpAccess::Table, IdpAccess::UserId)
                            .to(IdpUser::Table, IdpUser::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdpAuthorizationCode::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdpAuthorizationCode::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IdpAuthorizationCode::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IdpAuthorizationCode::UserId).string().not_null())
                    .col(
                        ColumnDef::new(IdpAuthorizationCode::RedirectUri)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdpAuthorizationCode::ResponseType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IdpAuthorizationCode::Scope).text().not_null())
                    .col(ColumnDef::new(IdpAuthorizationCode::State).text().null())
                    .col(
                        ColumnDef::new(IdpAuthorizationCode::Status)
                            .string()
                            .not_null()
                            .default("created"),
                    )
                    .col(
                        ColumnDef::new(IdpAuthorizationCode::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdpAuthorizationCode::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdpRefreshToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdpRefreshToken::Token)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IdpRefreshToken::Status)
                            .string()
                            .not_null()
                            .default("created"),
                    )
                    .col(ColumnDef::new(IdpRefreshToken::AccessId).string().not_null())
                    .col(ColumnDef::new(IdpRefreshToken::UserId).string().not_null())
                    .col(ColumnDef::new(IdpRefreshToken::ClientId).string().not_null())
                    .col(ColumnDef::new(IdpRefreshToken::Scope).text().not_null())
                    .col(
                        ColumnDef::new(IdpRefreshToken::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdpRefreshToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdpIdentity::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(IdpIdentity::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(IdpIdentity::UserId).string().not_null())
                    .col(ColumnDef::new(IdpIdentity::Provider).string().not_null())
                    .col(ColumnDef::new(IdpIdentity::Subject).string().not_null())
                    .col(
                        ColumnDef::new(IdpIdentity::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_idp_identity_user")
                            .from(IdpIdentity::Table, IdpIdentity::UserId)
                            .to(IdpUser::Table, IdpUser::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_idp_access_user_expires")
                    .table(IdpAccess::Table)
                    .col(IdpAccess::UserId)
                    .col(IdpAccess::ExpiresOn)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_idp_identity_provider_subject")
                    .table(IdpIdentity::Table)
                    .col(IdpIdentity::Provider)
                    .col(IdpIdentity::Subject)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_idp_identity_provider_subject")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_idp_access_user_expires").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(IdpIdentity::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdpRefreshToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdpAuthorizationCode::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdpAccess::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdpClient::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdpUser::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum IdpUser {
    Table,
    Id,
    Username,
    UserType,
    PasswordHash,
    ResetPasswordToken,
    IsValidated,
    RegistrationVerificationToken,
    RegistrationVerificationTokenExpiry,
    FirstName,
    LastName,
    Organisation,
    CreatedAt,
}

#[derive(DeriveIden)]
enum IdpClient {
    Table,
    Id,
    Secret,
    Name,
    RedirectUris,
    CredentialsFlow,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum IdpAccess {
    Table,
    Id,
    Token,
    IdToken,
    TokenType,
    Scope,
    ExpiresIn,
    ExpiresOn,
    UserId,
    ClientId,
    AuthorizationCode,
    CreatedAt,
}

#[derive(DeriveIden)]
enum IdpAuthorizationCode {
    Table,
    Code,
    ClientId,
    UserId,
    RedirectUri,
    ResponseType,
    Scope,
    State,
    Status,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum IdpRefreshToken {
    Table,
    Token,
    Status,
    AccessId,
    UserId,
    ClientId,
    Scope,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum IdpIdentity {
    Table,
    Id,
    UserId,
    Provider,
    Subject,
    CreatedAt,
}
