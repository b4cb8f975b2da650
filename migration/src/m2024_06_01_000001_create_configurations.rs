//! Migration to create the configurations table.
//!
//! One row per connector instance: provider endpoints, OAuth client credentials,
//! the device-flow state written by the worker, and the polling cadence.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Configurations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Configurations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Configurations::RootUrl).text().not_null())
                    .col(
                        ColumnDef::new(Configurations::AuthUrlPath)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Configurations::ApiRootUrl).text().not_null())
                    .col(ColumnDef::new(Configurations::ClientId).text().not_null())
                    .col(ColumnDef::new(Configurations::ClientSecret).text().not_null())
                    .col(ColumnDef::new(Configurations::DeviceCode).text().null())
                    .col(ColumnDef::new(Configurations::VerificationUri).text().null())
                    .col(
                        ColumnDef::new(Configurations::VerificationUriExpire)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Configurations::VerificationInterval)
                            .integer()
                            .null(),
                    )
                    .col(ColumnDef::new(Configurations::AccessToken).text().null())
                    .col(
                        ColumnDef::new(Configurations::AccessTokenExpire)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Configurations::RefreshToken).text().null())
                    .col(ColumnDef::new(Configurations::Enable).boolean().null())
                    .col(
                        ColumnDef::new(Configurations::RefreshInterval)
                            .integer()
                            .not_null()
                            .default(60),
                    )
                    .col(
                        ColumnDef::new(Configurations::RequestTimeout)
                            .integer()
                            .not_null()
                            .default(120),
                    )
                    .col(ColumnDef::new(Configurations::Active).boolean().null())
                    .col(ColumnDef::new(Configurations::UserId).text().null())
                    .col(ColumnDef::new(Configurations::ProjectId).text().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Configurations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Configurations {
    Table,
    Id,
    RootUrl,
    AuthUrlPath,
    ApiRootUrl,
    ClientId,
    ClientSecret,
    DeviceCode,
    VerificationUri,
    VerificationUriExpire,
    VerificationInterval,
    AccessToken,
    AccessTokenExpire,
    RefreshToken,
    Enable,
    RefreshInterval,
    RequestTimeout,
    Active,
    UserId,
    ProjectId,
}
