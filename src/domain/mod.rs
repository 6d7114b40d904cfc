//! Domain models - position reports, sightings and geofences
//!
//! This module contains the canonical data types used throughout the system:
//! - `PositionReport` - raw report as decoded from the transport
//! - `VehicleLocation` - validated, persisted sighting
//! - `Geofence` / `GeofenceAlert` - circular fences and the alerts they raise
//! - `geo` - Haversine distance

pub mod geo;
pub mod types;

// Re-export commonly used types at module level
pub use types::{
    AlertMessage, Geofence, GeofenceAlert, GeofenceEvent, HistoryQuery, Location,
    PositionReport, ValidationError, Vehicle, VehicleLocation,
};
