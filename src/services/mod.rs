//! Services - the ingest pipeline
//!
//! This module contains the core business logic services:
//! - `ingest` - Position-report handler (decode, validate, persist, detect)
//! - `geofence` - Geofence membership test and alert emission

pub mod geofence;
pub mod ingest;

// Re-export commonly used types
pub use geofence::{DetectError, GeofenceDetector, PublishFailurePolicy};
pub use ingest::{IngestError, IngestOutcome, LocationIngestor};
