//! Infrastructure - configuration, metrics, and broker
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, env overrides, defaults)
//! - `metrics` - Lock-free pipeline counters
//! - `broker` - Optional embedded MQTT broker (rumqttd)

pub mod broker;
pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, StorageBackend};
pub use metrics::Metrics;
