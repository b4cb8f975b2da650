//! Asset attribute repository for database operations
//!
//! Tracked attributes are keyed by (configuration, asset, subtype, attribute name).

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;

use crate::error::{ConnectorError, Result};
use crate::models::asset_attribute::{self, Column, Entity as AssetAttribute};

/// Fields accepted by [`AssetAttributeRepository::upsert`].
#[derive(Debug, Clone)]
pub struct NewAssetAttribute {
    pub configuration_id: i64,
    pub asset_id: i32,
    pub subtype: String,
    pub attribute_name: String,
    /// Global identifier of the asset, resolved by the caller.
    /// Source of the default device reference.
    pub global_asset_identifier: String,
    pub device_reference: Option<String>,
    pub register_reference: Option<String>,
    /// Initial cursor; defaults to the time of the upsert
    pub latest_ts: Option<DateTime<Utc>>,
}

/// Optional filters for [`AssetAttributeRepository::find`] and
/// [`AssetAttributeRepository::delete_matching`]. `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct AttributeFilter {
    pub configuration_id: Option<i64>,
    pub asset_id: Option<i32>,
    pub subtype: Option<String>,
    pub attribute_name: Option<String>,
}

impl AttributeFilter {
    pub fn for_configuration(configuration_id: i64) -> Self {
        Self {
            configuration_id: Some(configuration_id),
            ..Self::default()
        }
    }

    fn condition(&self) -> Condition {
        let mut condition = Condition::all();
        if let Some(id) = self.configuration_id {
            condition = condition.add(Column::ConfigurationId.eq(id));
        }
        if let Some(asset_id) = self.asset_id {
            condition = condition.add(Column::AssetId.eq(asset_id));
        }
        if let Some(subtype) = &self.subtype {
            condition = condition.add(Column::Subtype.eq(subtype.as_str()));
        }
        if let Some(name) = &self.attribute_name {
            condition = condition.add(Column::AttributeName.eq(name.as_str()));
        }
        condition
    }
}

/// Replaces `/` so the value can be used as a single URL path segment.
pub fn escape_reference(value: &str) -> String {
    value.trim().replace('/', "_")
}

/// Repository for asset attribute database operations
#[derive(Debug, Clone)]
pub struct AssetAttributeRepository {
    pub db: Arc<DatabaseConnection>,
}

impl AssetAttributeRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts the attribute or, when the key already exists, overwrites its
    /// references and cursor.
    pub async fn upsert(&self, new: NewAssetAttribute) -> Result<asset_attribute::Model> {
        let device_reference = new
            .device_reference
            .filter(|r| !r.is_empty())
            .unwrap_or(new.global_asset_identifier);
        let register_reference = new
            .register_reference
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| new.attribute_name.clone());

        let model = asset_attribute::ActiveModel {
            configuration_id: Set(new.configuration_id),
            asset_id: Set(new.asset_id),
            subtype: Set(new.subtype.clone()),
            attribute_name: Set(new.attribute_name.clone()),
            device_reference: Set(escape_reference(&device_reference)),
            register_reference: Set(escape_reference(&register_reference)),
            latest_ts: Set(new.latest_ts.unwrap_or_else(Utc::now)),
        };

        AssetAttribute::insert(model)
            .on_conflict(
                OnConflict::columns([
                    Column::ConfigurationId,
                    Column::AssetId,
                    Column::Subtype,
                    Column::AttributeName,
                ])
                .update_columns([
                    Column::DeviceReference,
                    Column::RegisterReference,
                    Column::LatestTs,
                ])
                .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;

        AssetAttribute::find_by_id((
            new.configuration_id,
            new.asset_id,
            new.subtype.clone(),
            new.attribute_name.clone(),
        ))
        .one(self.db.as_ref())
        .await?
        .ok_or_else(|| ConnectorError::NotFound {
            entity: "asset attribute",
            id: format!(
                "{}/{}/{}/{}",
                new.configuration_id, new.asset_id, new.subtype, new.attribute_name
            ),
        })
    }

    pub async fn find(&self, filter: &AttributeFilter) -> Result<Vec<asset_attribute::Model>> {
        Ok(AssetAttribute::find()
            .filter(filter.condition())
            .order_by_asc(Column::ConfigurationId)
            .order_by_asc(Column::AssetId)
            .order_by_asc(Column::Subtype)
            .order_by_asc(Column::AttributeName)
            .all(self.db.as_ref())
            .await?)
    }

    /// Deletes every attribute matching `filter`, returning how many rows went away.
    pub async fn delete_matching(&self, filter: &AttributeFilter) -> Result<u64> {
        let result = AssetAttribute::delete_many()
            .filter(filter.condition())
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }

    /// Writes only the cursor column of one attribute.
    pub async fn save_cursor(
        &self,
        attribute: &asset_attribute::Model,
        latest_ts: DateTime<Utc>,
    ) -> Result<()> {
        let result = AssetAttribute::update_many()
            .col_expr(Column::LatestTs, Expr::value(latest_ts))
            .filter(Column::ConfigurationId.eq(attribute.configuration_id))
            .filter(Column::AssetId.eq(attribute.asset_id))
            .filter(Column::Subtype.eq(attribute.subtype.as_str()))
            .filter(Column::AttributeName.eq(attribute.attribute_name.as_str()))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(ConnectorError::NotFound {
                entity: "asset attribute",
                id: format!(
                    "{}/{}/{}/{}",
                    attribute.configuration_id,
                    attribute.asset_id,
                    attribute.subtype,
                    attribute.attribute_name
                ),
            });
        }
        Ok(())
    }
}
