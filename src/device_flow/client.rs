//! HTTP client for the three device-flow exchanges.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, instrument};

use super::types::{Token, Verification};
use crate::error::{ConnectorError, Result};
use crate::models::configuration;

const DEVICE_SCOPE: &str = "offline_access measurement register device";
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEVICE_AUTH_SUFFIX: &str = "/protocol/openid-connect/auth/device";
const TOKEN_SUFFIX: &str = "/protocol/openid-connect/token";

/// Identity-service coordinates and client credentials of one configuration.
#[derive(Debug, Clone)]
pub struct AuthTarget {
    pub configuration_id: i64,
    pub root_url: String,
    pub auth_path: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
}

impl AuthTarget {
    pub fn from_configuration(config: &configuration::Model, fallback_timeout: Duration) -> Self {
        Self {
            configuration_id: config.id,
            root_url: config.root_url.clone(),
            auth_path: config.auth_url_path.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            timeout: config.request_timeout_or(fallback_timeout),
        }
    }

    fn endpoint(&self, suffix: &str) -> String {
        let base = format!("{}{}", self.root_url, self.auth_path);
        format!("{}{}", base.trim_end_matches('/'), suffix)
    }

    pub fn device_authorization_url(&self) -> String {
        self.endpoint(DEVICE_AUTH_SUFFIX)
    }

    pub fn token_url(&self) -> String {
        self.endpoint(TOKEN_SUFFIX)
    }
}

/// Stateless device-flow client. Every call uses the target's own timeout.
#[derive(Debug, Clone, Default)]
pub struct DeviceFlowClient {
    http: reqwest::Client,
}

impl DeviceFlowClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Starts a device authorization. Only HTTP 200 counts as success.
    #[instrument(skip_all, fields(configuration_id = target.configuration_id))]
    pub async fn request_verification(&self, target: &AuthTarget) -> Result<Verification> {
        let url = target.device_authorization_url();
        let form = [
            ("client_id", target.client_id.as_str()),
            ("client_secret", target.client_secret.as_str()),
            ("scope", DEVICE_SCOPE),
        ];

        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .timeout(target.timeout)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ConnectorError::RemoteAuth {
                url,
                status: Some(status.as_u16()),
            });
        }

        let verification: Verification = response.json().await?;
        debug!(
            expires_in = verification.expires_in,
            interval = verification.interval,
            "device authorization issued"
        );
        Ok(verification)
    }

    /// Polls the token endpoint with the device code of a pending authorization.
    #[instrument(skip_all, fields(configuration_id = target.configuration_id))]
    pub async fn poll_token(&self, target: &AuthTarget, device_code: &str) -> Result<Token> {
        let form = [
            ("client_id", target.client_id.as_str()),
            ("client_secret", target.client_secret.as_str()),
            ("device_code", device_code),
            ("grant_type", DEVICE_CODE_GRANT),
        ];
        self.exchange(target, &form).await
    }

    /// Trades the stored refresh token for a new token pair.
    #[instrument(skip_all, fields(configuration_id = target.configuration_id))]
    pub async fn refresh_token(
        &self,
        target: &AuthTarget,
        device_code: &str,
        refresh_token: &str,
    ) -> Result<Token> {
        let form = [
            ("client_id", target.client_id.as_str()),
            ("client_secret", target.client_secret.as_str()),
            ("device_code", device_code),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.exchange(target, &form).await
    }

    /// Posts to the token endpoint. An error code in the body wins over the HTTP status.
    async fn exchange(&self, target: &AuthTarget, form: &[(&str, &str)]) -> Result<Token> {
        let url = target.token_url();
        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .timeout(target.timeout)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let decoded = serde_json::from_str::<Token>(&body);

        if let Ok(token) = &decoded {
            if let Some(code) = token.error_code() {
                return Err(ConnectorError::OAuth {
                    code: code.to_string(),
                    description: token.error_description.clone(),
                });
            }
        }

        if status != StatusCode::OK {
            return Err(ConnectorError::RemoteAuth {
                url,
                status: Some(status.as_u16()),
            });
        }

        Ok(decoded?)
    }
}
