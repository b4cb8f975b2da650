//! # Measurement Connector Entry Point

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use measurement_connector::{
    config::ConfigLoader,
    db,
    device_flow::DeviceFlowClient,
    lifecycle::LifecycleManager,
    measurements::{AttributeSynchronizer, DeliveryClient, PlatformTrendSource},
    notify::PlatformNotifier,
    platform::PlatformApi,
    repositories::SeaOrmStore,
    telemetry,
    worker::{Worker, WorkerSettings},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "measurement-connector", version, about)]
struct Cli {
    /// Directory containing the layered `.env` files
    #[arg(long)]
    env_dir: Option<PathBuf>,

    /// Run a single pass, wait for its cycles and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = match cli.env_dir {
        Some(dir) => ConfigLoader::with_base_dir(dir),
        None => ConfigLoader::new(),
    };
    let config = loader.load()?;

    telemetry::init_tracing(&config)?;
    info!(profile = %config.profile, "configuration loaded");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(configuration = %redacted, "effective configuration");
    }

    let conn = db::init_pool(&config).await?;
    if config.worker.run_migrations {
        db::run_migrations(&conn).await?;
    }
    let store = Arc::new(SeaOrmStore::new(Arc::new(conn)));

    let platform = PlatformApi::from_config(&config)?
        .context("CONNECTOR_PLATFORM_API_URL is required to run the worker")?;
    let request_timeout = Duration::from_secs(config.worker.default_request_timeout_seconds);

    let lifecycle = LifecycleManager::new(
        store.clone(),
        Arc::new(PlatformNotifier::new(platform.clone())),
        DeviceFlowClient::new(),
        request_timeout,
    );
    let sync = AttributeSynchronizer::new(
        store.clone(),
        Arc::new(PlatformTrendSource::new(platform)),
        DeliveryClient::new(request_timeout),
    );

    let shutdown = CancellationToken::new();
    let worker = Worker::new(
        store,
        lifecycle,
        sync,
        WorkerSettings::from(&config.worker),
        shutdown.clone(),
    );

    if cli.once {
        let outcome = worker.run_pass().await?;
        // Cycles skip their trailing pause once cancelled.
        shutdown.cancel();
        outcome.join().await;
        worker.deactivate_all().await;
        return Ok(());
    }

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                signal_token.cancel();
            }
            Err(err) => error!(error = %err, "failed to listen for shutdown signal"),
        }
    });

    worker.run().await;
    Ok(())
}
