//! Data-trend queries against the platform.

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, instrument};

use super::convert::TrendSample;
use crate::error::{ConnectorError, Result};
use crate::platform::PlatformApi;

/// Source of historical samples for an (asset, subtype) pair.
#[async_trait]
pub trait TrendSource: Send + Sync {
    /// Returns the whole available series; filtering happens on the caller's side.
    async fn fetch_trends(&self, asset_id: i32, subtype: &str) -> Result<Vec<TrendSample>>;
}

/// Queries `{platform}/data-trends`.
#[derive(Debug, Clone)]
pub struct PlatformTrendSource {
    api: PlatformApi,
}

impl PlatformTrendSource {
    pub fn new(api: PlatformApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TrendSource for PlatformTrendSource {
    #[instrument(skip(self))]
    async fn fetch_trends(&self, asset_id: i32, subtype: &str) -> Result<Vec<TrendSample>> {
        let mut url = self.api.endpoint(&["data-trends"])?;
        // No time range: the full series is requested every cycle.
        url.query_pairs_mut()
            .append_pair("assetId", &asset_id.to_string())
            .append_pair("dataSubtype", subtype);

        let response = self.api.request(Method::GET, url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let samples: Vec<TrendSample> = response.json().await?;
        debug!(samples = samples.len(), "fetched data trends");
        Ok(samples)
    }
}
