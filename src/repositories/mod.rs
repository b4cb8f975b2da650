//! # Repository Layer
//!
//! SeaORM-backed repositories plus the [`ConnectorStore`] seam the worker,
//! lifecycle manager and sync loop depend on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::device_flow::{Token, Verification};
use crate::error::Result;
use crate::models::asset_attribute::Model as AttributeModel;
use crate::models::configuration::Model as ConfigurationModel;

pub mod asset_attribute;
pub mod configuration;

pub use asset_attribute::{AssetAttributeRepository, AttributeFilter, NewAssetAttribute};
pub use configuration::{ConfigurationRepository, NewConfiguration};

/// Persistence operations used by the core. Keyed by configuration id.
#[async_trait]
pub trait ConnectorStore: Send + Sync {
    async fn list_configurations(&self) -> Result<Vec<ConfigurationModel>>;

    /// Fails with `NotFound` when the configuration does not exist.
    async fn get_configuration(&self, id: i64) -> Result<ConfigurationModel>;

    async fn set_active(&self, id: i64, active: bool) -> Result<()>;

    async fn save_verification(
        &self,
        id: i64,
        verification: &Verification,
        now: DateTime<Utc>,
    ) -> Result<()>;

    async fn save_token(&self, id: i64, token: &Token, now: DateTime<Utc>) -> Result<()>;

    async fn list_attributes(&self, configuration_id: i64) -> Result<Vec<AttributeModel>>;

    async fn save_attribute_cursor(
        &self,
        attribute: &AttributeModel,
        latest_ts: DateTime<Utc>,
    ) -> Result<()>;
}

/// [`ConnectorStore`] over a SeaORM connection.
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    configurations: ConfigurationRepository,
    attributes: AssetAttributeRepository,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            configurations: ConfigurationRepository::new(db.clone()),
            attributes: AssetAttributeRepository::new(db),
        }
    }

    pub fn configurations(&self) -> &ConfigurationRepository {
        &self.configurations
    }

    pub fn attributes(&self) -> &AssetAttributeRepository {
        &self.attributes
    }
}

#[async_trait]
impl ConnectorStore for SeaOrmStore {
    async fn list_configurations(&self) -> Result<Vec<ConfigurationModel>> {
        self.configurations.list().await
    }

    async fn get_configuration(&self, id: i64) -> Result<ConfigurationModel> {
        self.configurations.require(id).await
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<()> {
        self.configurations.set_active(id, active).await
    }

    async fn save_verification(
        &self,
        id: i64,
        verification: &Verification,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.configurations
            .save_verification(id, verification, now)
            .await
    }

    async fn save_token(&self, id: i64, token: &Token, now: DateTime<Utc>) -> Result<()> {
        self.configurations.save_token(id, token, now).await
    }

    async fn list_attributes(&self, configuration_id: i64) -> Result<Vec<AttributeModel>> {
        self.attributes
            .find(&AttributeFilter::for_configuration(configuration_id))
            .await
    }

    async fn save_attribute_cursor(
        &self,
        attribute: &AttributeModel,
        latest_ts: DateTime<Utc>,
    ) -> Result<()> {
        self.attributes.save_cursor(attribute, latest_ts).await
    }
}
