//! MQTT client for receiving vehicle position reports
//!
//! Subscribes to one wildcard topic covering every vehicle. The client acks
//! each publish as soon as it arrives, whatever happens to it afterwards, so
//! delivery into the pipeline is at-most-once.

use crate::infra::config::Config;
use crate::services::LocationIngestor;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

/// Shared connection flag for health reporting
#[derive(Debug, Clone, Default)]
pub struct ConnectionState(Arc<AtomicBool>);

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Start the MQTT client and feed every publish to the ingestor
///
/// Up to `max_in_flight` messages are processed concurrently; when all slots
/// are busy the eventloop stops polling until one frees up.
pub async fn start_location_subscriber(
    config: &Config,
    ingestor: Arc<LocationIngestor>,
    state: ConnectionState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut mqttoptions =
        MqttOptions::new(config.mqtt_client_id(), config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    let topic = config.mqtt_topic().to_string();
    let slots = Arc::new(Semaphore::new(config.mqtt_max_in_flight()));

    info!(
        topic = %topic,
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        max_in_flight = %config.mqtt_max_in_flight(),
        "mqtt_subscriber_starting"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    state.set(false);
                    let _ = client.disconnect().await;
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!(topic = %publish.topic, bytes = %publish.payload.len(), "mqtt_location_received");
                        let permit = slots.clone().acquire_owned().await?;
                        let ingestor = ingestor.clone();
                        tokio::spawn(async move {
                            ingestor.handle(&publish.payload).await;
                            drop(permit);
                        });
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // Subscriptions do not survive a clean-session reconnect
                        state.set(true);
                        client.subscribe(topic.as_str(), QoS::AtLeastOnce).await?;
                        info!(topic = %topic, "mqtt_connected");
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        info!(topic = %topic, "mqtt_subscribed");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if state.is_connected() {
                            warn!("mqtt_disconnected");
                        }
                        state.set(false);
                        error!(error = %e, "mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
