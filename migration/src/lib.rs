//! Database migrations for the measurement connector.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2024_06_01_000001_create_configurations;
mod m2024_06_01_000002_create_asset_attributes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2024_06_01_000001_create_configurations::Migration),
            Box::new(m2024_06_01_000002_create_asset_attributes::Migration),
        ]
    }
}
