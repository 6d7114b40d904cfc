//! AMQP (RabbitMQ) alert publisher.
//!
//! Alerts go to a fanout exchange; a durable queue is bound to it with an
//! empty routing key so every consumer of that queue sees every alert.

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{encode_alert, AlertPublisher, Result};
use crate::domain::GeofenceAlert;

/// Default exchange for fleet events.
pub const FLEET_EVENTS_EXCHANGE: &str = "fleet.events";

/// Default queue receiving geofence alerts.
pub const GEOFENCE_ALERTS_QUEUE: &str = "geofence_alerts";

/// Exchange/queue pair the alerts flow through.
#[derive(Clone, Debug, PartialEq)]
pub struct AmqpTopology {
    pub exchange: String,
    pub queue: String,
}

impl Default for AmqpTopology {
    fn default() -> Self {
        Self {
            exchange: FLEET_EVENTS_EXCHANGE.to_string(),
            queue: GEOFENCE_ALERTS_QUEUE.to_string(),
        }
    }
}

/// Declare the fanout exchange, the durable queue and the unfiltered binding.
///
/// Safe to call repeatedly; declarations are idempotent on the broker.
pub async fn declare_topology(channel: &Channel, topology: &AmqpTopology) -> Result<()> {
    channel
        .exchange_declare(
            &topology.exchange,
            ExchangeKind::Fanout,
            ExchangeDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_declare(
            &topology.queue,
            QueueDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_bind(
            &topology.queue,
            &topology.exchange,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    info!(exchange = %topology.exchange, queue = %topology.queue, "amqp_topology_declared");
    Ok(())
}

/// Publishes alerts over a single AMQP channel.
///
/// The channel sits behind an async mutex: concurrent ingest tasks take turns,
/// so at most one publish is in flight on the channel at any time.
pub struct AmqpAlertPublisher {
    connection: Connection,
    channel: Mutex<Channel>,
    topology: AmqpTopology,
}

impl AmqpAlertPublisher {
    /// Connect to `url`, open a channel and declare the topology.
    pub async fn connect(url: &str, topology: AmqpTopology) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        declare_topology(&channel, &topology).await?;

        info!(exchange = %topology.exchange, "amqp_publisher_connected");

        Ok(Self { connection, channel: Mutex::new(channel), topology })
    }

    pub fn topology(&self) -> &AmqpTopology {
        &self.topology
    }
}

#[async_trait]
impl AlertPublisher for AmqpAlertPublisher {
    async fn publish(&self, alert: &GeofenceAlert) -> Result<()> {
        let body = encode_alert(alert)?;
        let properties = BasicProperties::default().with_content_type("application/json".into());

        let channel = self.channel.lock().await;
        // mandatory = false: an unroutable alert is dropped by the broker
        channel
            .basic_publish(
                &self.topology.exchange,
                "",
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?
            .await?;

        debug!(
            vehicle_id = %alert.vehicle_id,
            event = %alert.event,
            exchange = %self.topology.exchange,
            "amqp_alert_published"
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }
}
