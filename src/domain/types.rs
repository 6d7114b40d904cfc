//! Shared types for the fleet tracker

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw position report as published by a vehicle
///
/// Missing fields decode to their zero value so that an incomplete report is
/// rejected by validation with the offending field named, not by the decoder.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionReport {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
}

/// Reason a position report was rejected at ingress
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("vehicle_id: required")]
    MissingVehicleId,
    #[error("latitude: must be between -90 and 90 (got {0})")]
    LatitudeOutOfRange(f64),
    #[error("longitude: must be between -180 and 180 (got {0})")]
    LongitudeOutOfRange(f64),
    #[error("timestamp: must be positive (got {0})")]
    NonPositiveTimestamp(i64),
    #[error("timestamp: out of range (got {0})")]
    TimestampOutOfRange(i64),
}

impl ValidationError {
    /// Name of the wire field that failed validation
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingVehicleId => "vehicle_id",
            ValidationError::LatitudeOutOfRange(_) => "latitude",
            ValidationError::LongitudeOutOfRange(_) => "longitude",
            ValidationError::NonPositiveTimestamp(_) | ValidationError::TimestampOutOfRange(_) => {
                "timestamp"
            }
        }
    }
}

impl PositionReport {
    /// Check the ingress invariants, stopping at the first violation
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.vehicle_id.is_empty() {
            return Err(ValidationError::MissingVehicleId);
        }
        // RangeInclusive::contains is false for NaN
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::LongitudeOutOfRange(self.longitude));
        }
        if self.timestamp <= 0 {
            return Err(ValidationError::NonPositiveTimestamp(self.timestamp));
        }
        Ok(())
    }

    /// Validate and convert into the persisted domain record
    pub fn into_vehicle_location(self) -> Result<VehicleLocation, ValidationError> {
        self.validate()?;
        let timestamp = Utc
            .timestamp_opt(self.timestamp, 0)
            .single()
            .ok_or(ValidationError::TimestampOutOfRange(self.timestamp))?;

        Ok(VehicleLocation {
            vehicle_id: self.vehicle_id,
            location: Location {
                latitude: self.latitude,
                longitude: self.longitude,
                timestamp,
            },
        })
    }
}

/// A single positioned instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

/// One accepted sighting of a vehicle (append-only history record)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleLocation {
    pub vehicle_id: String,
    pub location: Location,
}

impl VehicleLocation {
    /// Unvalidated constructor; `None` if `unix_secs` is not a representable instant
    pub fn new(
        vehicle_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
        unix_secs: i64,
    ) -> Option<Self> {
        Some(Self {
            vehicle_id: vehicle_id.into(),
            location: Location {
                latitude,
                longitude,
                timestamp: Utc.timestamp_opt(unix_secs, 0).single()?,
            },
        })
    }

    /// Timestamp as seconds since the Unix epoch
    pub fn unix_timestamp(&self) -> i64 {
        self.location.timestamp.timestamp()
    }
}

/// Circular geofence, radius in meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
}

impl Geofence {
    pub fn new(latitude: f64, longitude: f64, radius: f64) -> Self {
        Self { latitude, longitude, radius }
    }

    /// Great-circle distance from the fence center to a position, in meters
    pub fn distance_to(&self, location: &Location) -> f64 {
        super::geo::haversine_m(
            (location.latitude, location.longitude),
            (self.latitude, self.longitude),
        )
    }

    /// Inclusive containment test (a point on the boundary is inside)
    pub fn contains(&self, location: &Location) -> bool {
        self.distance_to(location) <= self.radius
    }
}

/// Kind of geofence event; only entries are detected today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum GeofenceEvent {
    #[serde(rename = "geofence_entry")]
    Entry,
}

impl GeofenceEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeofenceEvent::Entry => "geofence_entry",
        }
    }
}

impl std::fmt::Display for GeofenceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert raised for one vehicle sighting inside one geofence
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceAlert {
    pub vehicle_id: String,
    pub event: GeofenceEvent,
    pub location: Location,
    /// Seconds since the Unix epoch, taken from the triggering sighting
    pub timestamp: i64,
}

impl GeofenceAlert {
    pub fn entry(vehicle_location: &VehicleLocation) -> Self {
        Self {
            vehicle_id: vehicle_location.vehicle_id.clone(),
            event: GeofenceEvent::Entry,
            location: vehicle_location.location,
            timestamp: vehicle_location.unix_timestamp(),
        }
    }

    /// Wire representation published on the event bus
    pub fn to_message(&self) -> AlertMessage {
        AlertMessage {
            vehicle_id: self.vehicle_id.clone(),
            event: self.event,
            location: AlertPosition {
                latitude: self.location.latitude,
                longitude: self.location.longitude,
            },
            timestamp: self.timestamp,
        }
    }
}

/// Outbound alert payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub vehicle_id: String,
    pub event: GeofenceEvent,
    pub location: AlertPosition,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// Inclusive time window over one vehicle's history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub vehicle_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl HistoryQuery {
    /// Build a query from Unix-second bounds; `None` if a bound is not representable
    pub fn from_unix(vehicle_id: impl Into<String>, start: i64, end: i64) -> Option<Self> {
        Some(Self {
            vehicle_id: vehicle_id.into(),
            start: Utc.timestamp_opt(start, 0).single()?,
            end: Utc.timestamp_opt(end, 0).single()?,
        })
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        *timestamp >= self.start && *timestamp <= self.end
    }
}

/// A vehicle that has reported at least once
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vehicle {
    pub vehicle_id: String,
}
