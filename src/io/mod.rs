//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT subscriber for vehicle position reports
//! - `store` - Location history storage (Postgres, in-memory)
//! - `publisher` - Geofence alert publication (RabbitMQ, in-memory)
//! - `http` - Read-only query API and health endpoint

pub mod http;
pub mod mqtt;
pub mod publisher;
pub mod store;

// Re-export commonly used types
pub use http::{start_http_server, QueryApi};
pub use mqtt::{start_location_subscriber, ConnectionState};
pub use publisher::{AlertPublisher, AmqpAlertPublisher, InMemoryAlertPublisher, PublishError};
pub use store::{InMemoryLocationStore, LocationStore, PostgresLocationStore, StoreError};
