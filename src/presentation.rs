//! Read-back view of configurations with secrets obfuscated.

use serde::Serialize;

use crate::models::configuration;

/// Keeps the first third of `secret` (rounded down, counted in chars) and replaces the rest with `*`.
///
/// Strings shorter than three characters are masked completely.
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    let cutoff = len / 3;
    secret
        .chars()
        .enumerate()
        .map(|(i, c)| if i < cutoff { c } else { '*' })
        .collect()
}

/// Administrative representation of a configuration. Never carries tokens in clear text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationView {
    pub id: i64,
    pub root_url: String,
    pub auth_url_path: String,
    pub api_root_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub enable: bool,
    pub refresh_interval: i32,
    pub request_timeout: i32,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl From<&configuration::Model> for ConfigurationView {
    fn from(model: &configuration::Model) -> Self {
        Self {
            id: model.id,
            root_url: model.root_url.clone(),
            auth_url_path: model.auth_url_path.clone(),
            api_root_url: model.api_root_url.clone(),
            client_id: model.client_id.clone(),
            client_secret: mask_secret(&model.client_secret),
            verification_uri: model.verification_uri.clone(),
            refresh_token: model.refresh_token.as_deref().map(mask_secret),
            enable: model.is_enabled(),
            refresh_interval: model.refresh_interval,
            request_timeout: model.request_timeout,
            active: model.is_active(),
            user_id: model.user_id.clone(),
            project_id: model.project_id.clone(),
        }
    }
}
