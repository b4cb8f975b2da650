//! # Connector Worker
//!
//! Runs passes over all configurations. Each enabled configuration gets its own
//! task, guarded by a per-configuration single-flight key: if the previous task
//! for a configuration is still running, the new pass skips it without touching
//! the store. Tasks pause at their end (verification interval or refresh
//! interval) to throttle re-entry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::lifecycle::{LifecycleManager, LoginProgress, classify};
use crate::measurements::AttributeSynchronizer;
use crate::models::configuration;
use crate::repositories::ConnectorStore;
use crate::single_flight::{FlightGuard, SingleFlight};

/// Timing parameters of the worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub tick: Duration,
    /// Pause after a login step when the provider advertised no poll interval
    pub default_verification_interval: Duration,
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            tick: Duration::from_secs(config.tick_seconds),
            default_verification_interval: Duration::from_secs(
                config.default_verification_interval_seconds,
            ),
        }
    }
}

/// Summary of one pass.
#[derive(Debug, Default)]
pub struct PassOutcome {
    pub dispatched: usize,
    /// Configurations skipped because their previous cycle was still running
    pub skipped_busy: usize,
    pub disabled: usize,
    /// Set on the one pass that logged the "please configure" notice
    pub empty_notice: bool,
    /// Handles of the dispatched cycles
    pub handles: Vec<JoinHandle<()>>,
}

impl PassOutcome {
    /// Waits for every dispatched cycle.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "configuration cycle panicked");
            }
        }
    }
}

/// Everything a single configuration cycle needs, cheap to clone into a task.
#[derive(Clone)]
struct CycleContext {
    store: Arc<dyn ConnectorStore>,
    lifecycle: LifecycleManager,
    sync: AttributeSynchronizer,
    settings: WorkerSettings,
    shutdown: CancellationToken,
}

pub struct Worker {
    ctx: CycleContext,
    flights: SingleFlight<i64>,
    empty_notice_logged: AtomicBool,
}

impl Worker {
    pub fn new(
        store: Arc<dyn ConnectorStore>,
        lifecycle: LifecycleManager,
        sync: AttributeSynchronizer,
        settings: WorkerSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ctx: CycleContext {
                store,
                lifecycle,
                sync,
                settings,
                shutdown,
            },
            flights: SingleFlight::new(),
            empty_notice_logged: AtomicBool::new(false),
        }
    }

    /// The registry guarding configuration cycles.
    pub fn flights(&self) -> &SingleFlight<i64> {
        &self.flights
    }

    /// Runs passes every tick until shutdown, then marks enabled configurations inactive.
    #[instrument(skip_all)]
    pub async fn run(&self) {
        info!(tick_seconds = self.ctx.settings.tick.as_secs(), "starting connector worker");

        loop {
            let started = Instant::now();
            match self.run_pass().await {
                Ok(outcome) => debug!(
                    dispatched = outcome.dispatched,
                    skipped_busy = outcome.skipped_busy,
                    disabled = outcome.disabled,
                    "pass completed"
                ),
                Err(err) => error!(error = %err, "pass failed"),
            }
            histogram!("connector_pass_duration_ms")
                .record(started.elapsed().as_secs_f64() * 1_000.0);

            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => {
                    info!("connector worker shutdown requested");
                    break;
                }
                _ = sleep(self.ctx.settings.tick) => {}
            }
        }

        self.deactivate_all().await;
        info!("connector worker stopped");
    }

    /// One pass: activate and dispatch every enabled configuration.
    pub async fn run_pass(&self) -> Result<PassOutcome> {
        let configurations = self.ctx.store.list_configurations().await?;
        let mut outcome = PassOutcome::default();

        if configurations.is_empty() {
            if !self.empty_notice_logged.swap(true, Ordering::SeqCst) {
                info!("no configurations found, please configure the connector");
                outcome.empty_notice = true;
            }
            return Ok(outcome);
        }

        for config in configurations {
            if !config.is_enabled() {
                outcome.disabled += 1;
                continue;
            }

            let Some(guard) = self.flights.try_acquire(config.id) else {
                outcome.skipped_busy += 1;
                counter!("connector_passes_skipped_busy_total").increment(1);
                debug!(configuration_id = config.id, "previous cycle still running, skipping");
                continue;
            };

            self.mark_active(&config).await;

            let ctx = self.ctx.clone();
            let needs_login = classify(&config, Utc::now()).needs_login();
            let handle = tokio::spawn(async move {
                if needs_login {
                    ctx.login_cycle(config, guard).await;
                } else {
                    ctx.sync_cycle(config, guard).await;
                }
            });
            outcome.handles.push(handle);
            outcome.dispatched += 1;
        }

        gauge!("connector_cycles_in_flight").set(self.flights.in_flight() as f64);
        Ok(outcome)
    }

    /// Re-asserts the active marker; an inactive configuration is flipped off and on again.
    async fn mark_active(&self, config: &configuration::Model) {
        if !config.is_active() {
            if let Err(err) = self.ctx.store.set_active(config.id, false).await {
                warn!(configuration_id = config.id, error = %err, "failed to reset active flag");
            }
        }
        if let Err(err) = self.ctx.store.set_active(config.id, true).await {
            warn!(configuration_id = config.id, error = %err, "failed to set active flag");
        }
    }

    /// Clears the active marker of every enabled configuration.
    pub async fn deactivate_all(&self) {
        let configurations = match self.ctx.store.list_configurations().await {
            Ok(configurations) => configurations,
            Err(err) => {
                error!(error = %err, "failed to load configurations for deactivation");
                return;
            }
        };
        for config in configurations.iter().filter(|c| c.is_enabled()) {
            if let Err(err) = self.ctx.store.set_active(config.id, false).await {
                warn!(configuration_id = config.id, error = %err, "failed to clear active flag");
            }
        }
    }
}

impl CycleContext {
    async fn login_cycle(self, config: configuration::Model, _guard: FlightGuard<i64>) {
        let advertised = match self.lifecycle.advance_login(&config, Utc::now()).await {
            Ok(LoginProgress::VerificationIssued { poll_interval }) => poll_interval,
            Ok(progress) => {
                debug!(configuration_id = config.id, ?progress, "login step finished");
                None
            }
            Err(err) if err.is_authorization_pending() => {
                info!(configuration_id = config.id, "waiting for user to verify the device");
                None
            }
            Err(err) => {
                error!(configuration_id = config.id, error = %err, "login step failed");
                None
            }
        };

        let stored = config
            .verification_interval
            .and_then(|secs| u64::try_from(secs).ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let wait = advertised
            .or(stored)
            .unwrap_or(self.settings.default_verification_interval);
        self.pause(wait).await;
    }

    async fn sync_cycle(self, config: configuration::Model, _guard: FlightGuard<i64>) {
        let interval = config.refresh_interval();
        let config_id = config.id;

        match self.lifecycle.ensure_access_token(config, Utc::now()).await {
            Ok(config) => self.sync_attributes(&config).await,
            Err(err) => {
                error!(
                    configuration_id = config_id,
                    error = %err,
                    "no valid access token, skipping sync"
                );
            }
        }

        self.pause(interval).await;
    }

    async fn sync_attributes(&self, config: &configuration::Model) {
        let attributes = match self.store.list_attributes(config.id).await {
            Ok(attributes) => attributes,
            Err(err) => {
                error!(
                    configuration_id = config.id,
                    error = %err,
                    "failed to load tracked attributes"
                );
                return;
            }
        };

        for attribute in &attributes {
            if let Err(err) = self.sync.sync_attribute(config, attribute).await {
                error!(
                    configuration_id = config.id,
                    asset_id = attribute.asset_id,
                    subtype = %attribute.subtype,
                    attribute_name = %attribute.attribute_name,
                    error = %err,
                    "attribute sync failed"
                );
            }
        }
    }

    /// Sleeps for `duration` unless shutdown fires first.
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = sleep(duration) => {}
        }
    }
}
