//! Migration to create the asset_attributes table.
//!
//! Each row tracks one (configuration, asset, subtype, attribute) series together
//! with the external device/register references and the sync cursor.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AssetAttributes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AssetAttributes::ConfigurationId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AssetAttributes::AssetId).integer().not_null())
                    .col(ColumnDef::new(AssetAttributes::Subtype).text().not_null())
                    .col(ColumnDef::new(AssetAttributes::AttributeName).text().not_null())
                    .col(ColumnDef::new(AssetAttributes::DeviceReference).text().not_null())
                    .col(
                        ColumnDef::new(AssetAttributes::RegisterReference)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AssetAttributes::LatestTs)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_asset_attributes")
                            .col(AssetAttributes::ConfigurationId)
                            .col(AssetAttributes::AssetId)
                            .col(AssetAttributes::Subtype)
                            .col(AssetAttributes::AttributeName),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_asset_attributes_configuration_id")
                            .from(AssetAttributes::Table, AssetAttributes::ConfigurationId)
                            .to(Configurations::Table, Configurations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_asset_attributes_configuration_id")
                    .table(AssetAttributes::Table)
                    .col(AssetAttributes::ConfigurationId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_asset_attributes_configuration_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(AssetAttributes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AssetAttributes {
    Table,
    ConfigurationId,
    AssetId,
    Subtype,
    AttributeName,
    DeviceReference,
    RegisterReference,
    LatestTs,
}

#[derive(DeriveIden)]
enum Configurations {
    Table,
    Id,
}
