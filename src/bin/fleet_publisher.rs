//! Fleet Publisher - synthetic position-report generator
//!
//! Publishes one report per tick for a random vehicle out of a small fixed
//! pool. Roughly 30% of reports land within a few tens of meters of the
//! default geofence so alerts show up end to end; the rest are uniformly
//! random coordinates.
//!
//! Usage:
//!   cargo run --bin fleet-publisher -- 2
//!   MQTT_BROKER=tcp://mosquitto:1883 cargo run --bin fleet-publisher -- 1

use clap::Parser;
use fleet_tracker::domain::PositionReport;
use fleet_tracker::infra::config::parse_broker_url;
use rand::Rng;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

const VEHICLE_POOL_SIZE: usize = 5;
const NEAR_FENCE_PROBABILITY: f64 = 0.3;
const FENCE_LATITUDE: f64 = -6.2088;
const FENCE_LONGITUDE: f64 = 106.8456;
/// Full width of the jitter box around the fence center, in degrees (~55 m)
const NEAR_FENCE_SPREAD: f64 = 0.0005;
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Parser, Debug)]
#[command(name = "fleet-publisher")]
#[command(about = "Publish synthetic vehicle position reports over MQTT")]
struct Args {
    /// Seconds between reports
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    interval_seconds: u64,

    /// MQTT client id
    #[arg(long, default_value = "fleet-mock-publisher")]
    client_id: String,
}

/// Plate-style id: one letter, four digits, three letters (e.g. B1234XYZ)
fn random_vehicle_id<R: Rng>(rng: &mut R) -> String {
    let mut letter = || UPPERCASE[rng.random_range(0..UPPERCASE.len())] as char;
    let prefix = letter();
    let suffix: String = (0..3).map(|_| letter()).collect();
    format!("{}{:04}{}", prefix, rng.random_range(0..10_000), suffix)
}

fn random_report<R: Rng>(rng: &mut R, pool: &[String], timestamp: i64) -> PositionReport {
    let vehicle_id = pool[rng.random_range(0..pool.len())].clone();

    let (latitude, longitude) = if rng.random_bool(NEAR_FENCE_PROBABILITY) {
        (
            FENCE_LATITUDE + (rng.random::<f64>() - 0.5) * NEAR_FENCE_SPREAD,
            FENCE_LONGITUDE + (rng.random::<f64>() - 0.5) * NEAR_FENCE_SPREAD,
        )
    } else {
        (rng.random_range(-90.0..=90.0), rng.random_range(-180.0..=180.0))
    };

    PositionReport { vehicle_id, latitude, longitude, timestamp }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();

    let broker = std::env::var("MQTT_BROKER")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "tcp://localhost:1883".to_string());
    let (host, port) = parse_broker_url(&broker)?;

    let mut mqtt_options = MqttOptions::new(args.client_id.as_str(), host.as_str(), port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    // Drive the connection; publishes are queued until it is up
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => info!("mqtt_connected"),
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "mqtt_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    let pool: Vec<String> = {
        let mut rng = rand::rng();
        (0..VEHICLE_POOL_SIZE).map(|_| random_vehicle_id(&mut rng)).collect()
    };

    info!(broker = %broker, interval_secs = %args.interval_seconds, vehicles = ?pool, "publisher_started");

    let mut interval = tokio::time::interval(Duration::from_secs(args.interval_seconds));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = random_report(&mut rand::rng(), &pool, chrono::Utc::now().timestamp());
                let topic = format!("/fleet/vehicle/{}/location", report.vehicle_id);
                let payload = serde_json::to_vec(&report)?;

                match client.publish(topic.as_str(), QoS::AtLeastOnce, false, payload).await {
                    Ok(()) => info!(
                        topic = %topic,
                        latitude = %report.latitude,
                        longitude = %report.longitude,
                        timestamp = %report.timestamp,
                        "report_published"
                    ),
                    Err(e) => error!(topic = %topic, error = %e, "report_publish_failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown_signal_received");
                let _ = client.disconnect().await;
                return Ok(());
            }
        }
    }
}
