//! # driverhubd: driverhub daemon
//!
//! Composition root that wires the device-driver runtime together and runs
//! it until interrupted.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Initialise logging
//! - Construct the platform bus and the tokio-backed scheduler
//! - Construct the executor registry and bind enabled integrations to it
//! - Log outbound platform traffic
//! - Handle graceful shutdown (SIGINT): stop every driver and wait for it
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no driver logic belongs here.

mod config;

use std::sync::Arc;

use anyhow::Context as _;
use driverhub_adapter_virtual::VirtualIntegration;
use driverhub_app::context::DeviceDriverContext;
use driverhub_app::platform_bus::InProcessPlatformBus;
use driverhub_app::registry::ExecutorRegistry;
use driverhub_app::scheduler::TokioScheduler;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LoggingConfig};

type Registry = ExecutorRegistry<DeviceDriverContext<InProcessPlatformBus>>;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.filter).unwrap_or_else(|error| {
        eprintln!("invalid log filter {:?} ({error}), falling back to info", logging.filter);
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Log every message the drivers send to the platform.
fn spawn_platform_logger(bus: &InProcessPlatformBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(message) => tracing::debug!(
                    message_type = message.message_type(),
                    from = %message.source,
                    to = %message.destination,
                    correlation_id = ?message.correlation_id,
                    "to platform"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "platform logger lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.logging);
    tracing::info!(
        max_backlog = ?config.executor.max_backlog,
        request_timeout_ms = config.drivers.request_timeout_ms,
        "starting driverhubd"
    );

    let bus = InProcessPlatformBus::new(config.bus.capacity);
    spawn_platform_logger(&bus);

    let scheduler = TokioScheduler::current().context("scheduler needs a tokio runtime")?;
    let registry: Arc<Registry> = Arc::new(ExecutorRegistry::new(
        Arc::new(scheduler),
        config.executor.clone(),
    ));

    if config.integrations.virtual_enabled {
        let integration = VirtualIntegration::new(bus.clone(), config.drivers.clone())
            .with_poll_interval(config.integrations.poll_interval());
        let registry = Arc::clone(&registry);
        // Binding blocks until each driver has seen its lifecycle events.
        let devices = tokio::task::spawn_blocking(move || integration.setup(&registry)).await??;
        for device in &devices {
            tracing::info!(name = device.name, address = %device.address, "device bound");
        }
    } else {
        tracing::info!("virtual integration disabled");
    }

    tracing::info!(drivers = registry.len(), "driverhubd running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");

    tokio::task::spawn_blocking(move || registry.stop_all()).await?;

    tracing::info!("driverhubd stopped");
    Ok(())
}
