//! Location history storage.
//!
//! The store is an append-only log of vehicle sightings. Ingestion only ever
//! inserts; the query API reads.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{HistoryQuery, Vehicle, VehicleLocation};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryLocationStore;
pub use postgres::PostgresLocationStore;

/// Errors surfaced by a [`LocationStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no location recorded for vehicle {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable, queryable history of vehicle sightings.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Append one sighting. Fails only on storage or transport errors.
    async fn insert(&self, location: &VehicleLocation) -> Result<()>;

    /// Sighting with the greatest timestamp for `vehicle_id`, or `NotFound`.
    async fn get_latest(&self, vehicle_id: &str) -> Result<VehicleLocation>;

    /// Sightings with timestamp in `[start, end]`, ascending. Empty is not an error.
    async fn get_history(&self, query: &HistoryQuery) -> Result<Vec<VehicleLocation>>;

    /// Distinct vehicles that have ever reported, sorted by id.
    async fn get_all_vehicles(&self) -> Result<Vec<Vehicle>>;

    /// Liveness probe for health reporting.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
