//! Shared HTTP access to the local building platform API.

use reqwest::{Client, Method, RequestBuilder};
use std::time::Duration;
use url::Url;

use crate::config::AppConfig;
use crate::error::{Result, cannot_be_a_base};

const API_KEY_HEADER: &str = "X-API-Key";

/// Base URL, API key and HTTP client for platform calls.
#[derive(Debug, Clone)]
pub struct PlatformApi {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl PlatformApi {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            api_key,
        })
    }

    /// Builds the client from process configuration. `None` when no platform URL is configured.
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>> {
        config
            .platform_api_url
            .as_deref()
            .map(|url| {
                Self::new(
                    url,
                    config.platform_api_key.clone(),
                    Duration::from_secs(config.platform_request_timeout_seconds),
                )
            })
            .transpose()
    }

    /// Appends `segments` (escaped) to the base URL.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| cannot_be_a_base())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }
}
