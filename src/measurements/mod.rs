//! Incremental measurement sync for tracked attributes.
//!
//! Each attribute is fetched, filtered against its cursor, delivered and only then
//! has its cursor advanced. A failed delivery keeps the cursor so the same samples
//! are retried on the next cycle.

pub mod convert;
pub mod delivery;
pub mod source;
pub mod value;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::models::{asset_attribute, configuration};
use crate::repositories::ConnectorStore;

pub use convert::{Conversion, Measurement, TrendSample, convert};
pub use delivery::{DeliveryClient, DeliveryOutcome};
pub use source::{PlatformTrendSource, TrendSource};
pub use value::NumericValue;

/// What one attribute sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub delivered: usize,
    /// `None` when there was nothing to send
    pub delivery: Option<DeliveryOutcome>,
    /// Cursor persisted by this sync, if it moved
    pub new_cursor: Option<DateTime<Utc>>,
}

/// Fetch, convert, deliver, advance cursor.
#[derive(Clone)]
pub struct AttributeSynchronizer {
    store: Arc<dyn ConnectorStore>,
    source: Arc<dyn TrendSource>,
    delivery: DeliveryClient,
}

impl AttributeSynchronizer {
    pub fn new(
        store: Arc<dyn ConnectorStore>,
        source: Arc<dyn TrendSource>,
        delivery: DeliveryClient,
    ) -> Self {
        Self {
            store,
            source,
            delivery,
        }
    }

    #[instrument(
        skip_all,
        fields(
            configuration_id = config.id,
            asset_id = attribute.asset_id,
            subtype = %attribute.subtype,
            attribute_name = %attribute.attribute_name
        )
    )]
    pub async fn sync_attribute(
        &self,
        config: &configuration::Model,
        attribute: &asset_attribute::Model,
    ) -> Result<SyncOutcome> {
        let samples = self
            .source
            .fetch_trends(attribute.asset_id, &attribute.subtype)
            .await?;
        let conversion = convert(&samples, &attribute.attribute_name, attribute.latest_ts);

        let delivery = if conversion.measurements.is_empty() {
            debug!("no new measurements");
            None
        } else {
            Some(
                self.delivery
                    .send(config, attribute, &conversion.measurements)
                    .await?,
            )
        };

        let new_cursor = if conversion.advanced_from(attribute.latest_ts) {
            self.store
                .save_attribute_cursor(attribute, conversion.cursor)
                .await?;
            Some(conversion.cursor)
        } else {
            None
        };

        if delivery.is_some() {
            info!(
                delivered = conversion.measurements.len(),
                cursor = %conversion.cursor,
                "measurements synced"
            );
        }

        Ok(SyncOutcome {
            delivered: conversion.measurements.len(),
            delivery,
            new_cursor,
        })
    }
}
