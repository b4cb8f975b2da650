//! User notifications sent through the platform.

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::{ConnectorError, Result};
use crate::models::configuration;
use crate::platform::PlatformApi;

/// A message in every language the platform displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    pub de: String,
    pub en: String,
}

impl Translation {
    /// Asks the user to open the verification URL.
    pub fn verification_required(url: &str) -> Self {
        Self {
            de: format!(
                "Sie haben die App kürzlich eingerichtet. Um der App den Zugriff auf die API zu ermöglichen, müssen Sie Ihre Anmeldung verifizieren: {url}"
            ),
            en: format!(
                "You recently set up the app. To enable the app's access to the API, you must verify your login: {url}"
            ),
        }
    }

    pub fn verification_completed() -> Self {
        Self {
            de: "Verifikation der App war erfolgreich.".to_string(),
            en: "Verification of the app was successful.".to_string(),
        }
    }
}

/// Delivers a message to a user within a project.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: &str, project_id: &str, message: &Translation) -> Result<()>;
}

/// Notifies the owner of `config`. Configurations without a user are skipped with a warning.
pub async fn notify_owner(
    notifier: &dyn Notifier,
    config: &configuration::Model,
    message: &Translation,
) -> Result<()> {
    let Some(user_id) = config.user_id.as_deref().filter(|u| !u.is_empty()) else {
        warn!(
            configuration_id = config.id,
            "configuration has no user to notify"
        );
        return Ok(());
    };
    let project_id = config.project_id.as_deref().unwrap_or_default();
    notifier.notify(user_id, project_id, message).await
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationBody<'a> {
    user: &'a str,
    project_id: &'a str,
    message: &'a Translation,
}

/// Posts notifications to `{platform}/notifications`.
#[derive(Debug, Clone)]
pub struct PlatformNotifier {
    api: PlatformApi,
}

impl PlatformNotifier {
    pub fn new(api: PlatformApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Notifier for PlatformNotifier {
    #[instrument(skip(self, message))]
    async fn notify(&self, user_id: &str, project_id: &str, message: &Translation) -> Result<()> {
        let url = self.api.endpoint(&["notifications"])?;
        let body = NotificationBody {
            user: user_id,
            project_id,
            message,
        };

        let response = self
            .api
            .request(Method::POST, url.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        debug!("notification delivered");
        Ok(())
    }
}
