//! Fleet tracker - vehicle position ingestion and geofence alerting
//!
//! Subscribes to per-vehicle position reports over MQTT, stores every valid
//! sighting, and publishes a geofence alert to RabbitMQ whenever a sighting
//! falls inside a configured fence.
//!
//! Module structure:
//! - `domain/` - Core types (PositionReport, VehicleLocation, Geofence, alerts)
//! - `io/` - External interfaces (MQTT, Postgres, RabbitMQ, HTTP)
//! - `services/` - Business logic (LocationIngestor, GeofenceDetector)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use anyhow::Context;
use clap::Parser;
use fleet_tracker::infra::{Config, Metrics, StorageBackend};
use fleet_tracker::io::{
    AlertPublisher, AmqpAlertPublisher, ConnectionState, InMemoryLocationStore, LocationStore,
    PostgresLocationStore, QueryApi,
};
use fleet_tracker::services::{GeofenceDetector, LocationIngestor};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Fleet tracker - position ingestion and geofence alerting service
#[derive(Parser, Debug)]
#[command(name = "fleet-tracker", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-message visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "fleet_tracker_starting");

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path).with_env_overrides()?;

    fleet_tracker::infra::broker::start_embedded_broker(&config);

    info!(
        config_file = %config.config_file(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        mqtt_topic = %config.mqtt_topic(),
        mqtt_max_in_flight = %config.mqtt_max_in_flight(),
        storage = ?config.storage_backend(),
        exchange = %config.amqp_topology().exchange,
        geofences = %config.geofences().len(),
        publish_failure_policy = ?config.publish_failure_policy(),
        http_port = %config.http_port(),
        "config_loaded"
    );

    let store: Arc<dyn LocationStore> = match config.storage_backend() {
        StorageBackend::Postgres => {
            let store = PostgresLocationStore::connect(
                config.postgres_dsn(),
                config.postgres_max_connections(),
            )
            .await
            .context("Failed to connect to Postgres")?;
            store.init().await.context("Failed to initialize location schema")?;
            Arc::new(store)
        }
        StorageBackend::Memory => Arc::new(InMemoryLocationStore::new()),
    };

    let publisher: Arc<dyn AlertPublisher> = Arc::new(
        AmqpAlertPublisher::connect(config.amqp_url(), config.amqp_topology().clone())
            .await
            .context("Failed to connect to RabbitMQ")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let mqtt_state = ConnectionState::new();

    let detector = GeofenceDetector::new(publisher.clone(), config.geofences())
        .with_policy(config.publish_failure_policy());
    let ingestor = Arc::new(LocationIngestor::new(store.clone(), detector, metrics.clone()));

    // Start query API (if port > 0)
    let http_port = config.http_port();
    if http_port > 0 {
        let api = Arc::new(QueryApi::new(store, publisher, mqtt_state.clone()));
        let http_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) =
                fleet_tracker::io::start_http_server(http_port, api, http_shutdown).await
            {
                tracing::error!(error = %e, "http_server_error");
            }
        });
    }

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval.max(1)));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run subscriber until shutdown
    if let Err(e) =
        fleet_tracker::io::start_location_subscriber(&config, ingestor, mqtt_state, shutdown_rx)
            .await
    {
        tracing::error!(error = %e, "mqtt_subscriber_error");
    }

    metrics.report().log();
    info!("fleet_tracker_shutdown_complete");
    Ok(())
}
