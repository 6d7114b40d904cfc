//! Alert publication onto the event bus.
//!
//! Alerts fan out to every bound consumer. Publishers never retry; a failed
//! publish is returned to the caller as-is.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::GeofenceAlert;

pub mod amqp;
pub mod memory;

pub use amqp::{AmqpAlertPublisher, AmqpTopology};
pub use memory::InMemoryAlertPublisher;

/// Errors surfaced by an [`AlertPublisher`].
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize alert: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("event bus unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, PublishError>;

/// Sink for geofence alerts.
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    /// Serialize and hand one alert to the bus.
    async fn publish(&self, alert: &GeofenceAlert) -> Result<()>;

    /// Whether the underlying transport is currently connected.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Encode an alert in its outbound wire format.
pub fn encode_alert(alert: &GeofenceAlert) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&alert.to_message())?)
}
