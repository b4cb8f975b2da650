//! Credential lifecycle of a configuration.
//!
//! [`classify`] derives the credential state from a stored configuration. The
//! [`LifecycleManager`] performs the single transition that state calls for and
//! persists the outcome only when the exchange fully succeeded.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

use crate::device_flow::{AuthTarget, DeviceFlowClient, Token};
use crate::error::{ConnectorError, Result};
use crate::models::configuration;
use crate::notify::{Notifier, Translation, notify_owner};
use crate::repositories::ConnectorStore;

/// Credential state of a configuration at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// No refresh token and no device authorization on record
    NoCredential,
    /// No refresh token and the stored verification URI has expired
    VerificationExpired,
    /// A device authorization is pending; the token endpoint has to be polled
    AwaitingUserAction,
    TokenValid,
    /// A refresh token exists but the access token is missing or expired
    TokenExpired,
}

impl CredentialState {
    /// Whether the device flow has to run before any data can be synced.
    pub fn needs_login(self) -> bool {
        matches!(
            self,
            Self::NoCredential | Self::VerificationExpired | Self::AwaitingUserAction
        )
    }
}

/// Pure classification of `config` at `now`.
pub fn classify(config: &configuration::Model, now: DateTime<Utc>) -> CredentialState {
    if config.is_login_needed() {
        let has_uri = config
            .verification_uri
            .as_deref()
            .is_some_and(|uri| !uri.is_empty());
        return match (has_uri, is_unexpired(config.verification_uri_expire, now)) {
            (true, true) => CredentialState::AwaitingUserAction,
            (true, false) => CredentialState::VerificationExpired,
            (false, _) => CredentialState::NoCredential,
        };
    }

    if is_access_token_valid(config, now) {
        CredentialState::TokenValid
    } else {
        CredentialState::TokenExpired
    }
}

/// The access token is non-empty and expires strictly after `now`.
pub fn is_access_token_valid(config: &configuration::Model, now: DateTime<Utc>) -> bool {
    config
        .access_token
        .as_deref()
        .is_some_and(|token| !token.is_empty())
        && is_unexpired(config.access_token_expire, now)
}

fn is_unexpired(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expiry.is_some_and(|at| at > now)
}

/// Result of one login step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginProgress {
    /// A new device authorization was issued and the user was asked to verify it
    VerificationIssued { poll_interval: Option<Duration> },
    /// The user approved the device and a token pair was stored
    Completed,
    /// Nothing to do, a refresh token is already on record
    AlreadyAuthenticated,
}

/// Drives credential transitions for configurations.
#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<dyn ConnectorStore>,
    notifier: Arc<dyn Notifier>,
    auth: DeviceFlowClient,
    default_timeout: Duration,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn ConnectorStore>,
        notifier: Arc<dyn Notifier>,
        auth: DeviceFlowClient,
        default_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            auth,
            default_timeout,
        }
    }

    fn target(&self, config: &configuration::Model) -> AuthTarget {
        AuthTarget::from_configuration(config, self.default_timeout)
    }

    /// Runs the device-flow step matching the current state of `config`.
    ///
    /// Without a usable verification a new one is requested, stored and announced
    /// to the owner; the token endpoint is not polled in the same step. With a
    /// pending verification the token endpoint is polled once. Failures leave the
    /// stored configuration untouched.
    #[instrument(skip_all, fields(configuration_id = config.id))]
    pub async fn advance_login(
        &self,
        config: &configuration::Model,
        now: DateTime<Utc>,
    ) -> Result<LoginProgress> {
        match classify(config, now) {
            CredentialState::NoCredential | CredentialState::VerificationExpired => {
                self.issue_verification(config, now).await
            }
            CredentialState::AwaitingUserAction => self.complete_verification(config, now).await,
            CredentialState::TokenValid | CredentialState::TokenExpired => {
                Ok(LoginProgress::AlreadyAuthenticated)
            }
        }
    }

    async fn issue_verification(
        &self,
        config: &configuration::Model,
        now: DateTime<Utc>,
    ) -> Result<LoginProgress> {
        info!(
            configuration_id = config.id,
            "requesting new device verification"
        );
        let verification = self.auth.request_verification(&self.target(config)).await?;
        self.store
            .save_verification(config.id, &verification, now)
            .await?;

        let message = Translation::verification_required(verification.user_facing_uri());
        if let Err(err) = notify_owner(self.notifier.as_ref(), config, &message).await {
            error!(
                configuration_id = config.id,
                error = %err,
                "failed to notify user about verification"
            );
        }

        let poll_interval = u64::try_from(verification.interval)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        Ok(LoginProgress::VerificationIssued { poll_interval })
    }

    async fn complete_verification(
        &self,
        config: &configuration::Model,
        now: DateTime<Utc>,
    ) -> Result<LoginProgress> {
        let device_code = config.device_code.as_deref().unwrap_or_default();
        let token = self.auth.poll_token(&self.target(config), device_code).await?;
        ensure_access_token_present(&token)?;

        self.store.save_token(config.id, &token, now).await?;
        info!(configuration_id = config.id, "device verification completed");

        let message = Translation::verification_completed();
        if let Err(err) = notify_owner(self.notifier.as_ref(), config, &message).await {
            error!(
                configuration_id = config.id,
                error = %err,
                "failed to notify user about completed verification"
            );
        }
        Ok(LoginProgress::Completed)
    }

    /// Returns a configuration with a valid access token, refreshing it first when expired.
    ///
    /// Fails with [`ConnectorError::LoginRequired`] when the device flow has not completed.
    #[instrument(skip_all, fields(configuration_id = config.id))]
    pub async fn ensure_access_token(
        &self,
        config: configuration::Model,
        now: DateTime<Utc>,
    ) -> Result<configuration::Model> {
        match classify(&config, now) {
            CredentialState::TokenValid => Ok(config),
            CredentialState::TokenExpired => self.refresh(&config, now).await,
            _ => Err(ConnectorError::LoginRequired {
                configuration_id: config.id,
            }),
        }
    }

    async fn refresh(
        &self,
        config: &configuration::Model,
        now: DateTime<Utc>,
    ) -> Result<configuration::Model> {
        let started = Instant::now();
        let device_code = config.device_code.as_deref().unwrap_or_default();
        let refresh_token = config.refresh_token.as_deref().unwrap_or_default();

        let result = self
            .auth
            .refresh_token(&self.target(config), device_code, refresh_token)
            .await
            .and_then(|token| ensure_access_token_present(&token).map(|_| token));

        let token = match result {
            Ok(token) => token,
            Err(err) => {
                counter!("connector_token_refresh_total", "outcome" => "failure").increment(1);
                warn!(
                    configuration_id = config.id,
                    error = %err,
                    "token refresh failed"
                );
                return Err(err);
            }
        };

        self.store.save_token(config.id, &token, now).await?;
        counter!("connector_token_refresh_total", "outcome" => "success").increment(1);
        info!(
            configuration_id = config.id,
            refresh_duration_ms = started.elapsed().as_millis() as u64,
            "access token refreshed"
        );

        self.store.get_configuration(config.id).await
    }
}

fn ensure_access_token_present(token: &Token) -> Result<()> {
    if token.access_token.is_empty() {
        return Err(ConnectorError::Validation(
            "token response carried no access token".to_string(),
        ));
    }
    Ok(())
}
