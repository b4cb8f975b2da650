//! Pushes measurement batches to the provider's bulk-create endpoint.

use metrics::counter;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{instrument, warn};
use url::Url;

use super::convert::Measurement;
use crate::error::{ConnectorError, Result, cannot_be_a_base};
use crate::models::{asset_attribute, configuration};

/// How the ingestion endpoint accepted a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Created,
    /// The provider already had (some of) the data; treated as success
    Conflict,
}

#[derive(Debug, Clone)]
pub struct DeliveryClient {
    http: reqwest::Client,
    default_timeout: Duration,
}

impl DeliveryClient {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            default_timeout,
        }
    }

    pub fn with_client(http: reqwest::Client, default_timeout: Duration) -> Self {
        Self {
            http,
            default_timeout,
        }
    }

    /// `{apiRoot}/deviceRef/{device}/registerRef/{register}/measurements/_bulk_create`,
    /// with both references escaped as single path segments.
    pub fn bulk_create_url(api_root: &str, attribute: &asset_attribute::Model) -> Result<Url> {
        let mut url = Url::parse(api_root)?;
        url.path_segments_mut()
            .map_err(|_| cannot_be_a_base())?
            .pop_if_empty()
            .extend([
                "deviceRef",
                attribute.device_reference.as_str(),
                "registerRef",
                attribute.register_reference.as_str(),
                "measurements",
                "_bulk_create",
            ]);
        Ok(url)
    }

    /// Posts `measurements` with the configuration's access token. 201 and 409 succeed.
    #[instrument(
        skip_all,
        fields(
            configuration_id = config.id,
            asset_id = attribute.asset_id,
            attribute_name = %attribute.attribute_name
        )
    )]
    pub async fn send(
        &self,
        config: &configuration::Model,
        attribute: &asset_attribute::Model,
        measurements: &[Measurement],
    ) -> Result<DeliveryOutcome> {
        let url = Self::bulk_create_url(&config.api_root_url, attribute)?;
        let access_token = config.access_token.as_deref().unwrap_or_default();

        let response = self
            .http
            .post(url.clone())
            .bearer_auth(access_token)
            .timeout(config.request_timeout_or(self.default_timeout))
            .json(measurements)
            .send()
            .await
            .inspect_err(|_| {
                counter!("connector_delivery_failures_total").increment(1);
            })?;

        match response.status() {
            StatusCode::CREATED => {
                counter!("connector_measurements_delivered_total")
                    .increment(measurements.len() as u64);
                Ok(DeliveryOutcome::Created)
            }
            StatusCode::CONFLICT => {
                counter!("connector_delivery_conflicts_total").increment(1);
                warn!(url = %url, "measurements already recorded by provider");
                Ok(DeliveryOutcome::Conflict)
            }
            status => {
                counter!("connector_delivery_failures_total").increment(1);
                Err(ConnectorError::Delivery {
                    url: url.to_string(),
                    status: status.as_u16(),
                })
            }
        }
    }
}
