//! PostgreSQL LocationStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::info;

use super::{LocationStore, Result, StoreError};
use crate::domain::{HistoryQuery, Location, Vehicle, VehicleLocation};

/// SQL for creating the sighting table.
pub const CREATE_VEHICLE_LOCATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS vehicle_locations (
    id BIGSERIAL PRIMARY KEY,
    vehicle_id TEXT NOT NULL,
    latitude DOUBLE PRECISION NOT NULL,
    longitude DOUBLE PRECISION NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_VEHICLE_LOCATIONS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_vehicle_locations_vehicle_ts
    ON vehicle_locations (vehicle_id, timestamp)
"#;

const INSERT_LOCATION: &str = "INSERT INTO vehicle_locations (vehicle_id, latitude, longitude, timestamp) \
     VALUES ($1, $2, $3, $4)";

const SELECT_LATEST: &str = "SELECT vehicle_id, latitude, longitude, timestamp FROM vehicle_locations \
     WHERE vehicle_id = $1 ORDER BY timestamp DESC, id DESC LIMIT 1";

const SELECT_HISTORY: &str = "SELECT vehicle_id, latitude, longitude, timestamp FROM vehicle_locations \
     WHERE vehicle_id = $1 AND timestamp >= $2 AND timestamp <= $3 ORDER BY timestamp ASC, id ASC";

const SELECT_VEHICLES: &str =
    "SELECT DISTINCT vehicle_id FROM vehicle_locations ORDER BY vehicle_id";

/// PostgreSQL implementation of LocationStore.
pub struct PostgresLocationStore {
    pool: PgPool,
}

impl PostgresLocationStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `dsn` and verify the connection.
    pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(dsn).await?;
        let store = Self::new(pool);
        store.ping().await?;
        Ok(store)
    }

    /// Create the schema if it does not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_VEHICLE_LOCATIONS_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_VEHICLE_LOCATIONS_INDEX).execute(&self.pool).await?;
        info!("vehicle_locations_schema_ready");
        Ok(())
    }

    fn row_to_location(row: &PgRow) -> Result<VehicleLocation> {
        Ok(VehicleLocation {
            vehicle_id: row.try_get("vehicle_id")?,
            location: Location {
                latitude: row.try_get("latitude")?,
                longitude: row.try_get("longitude")?,
                timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
            },
        })
    }
}

#[async_trait]
impl LocationStore for PostgresLocationStore {
    async fn insert(&self, location: &VehicleLocation) -> Result<()> {
        sqlx::query(INSERT_LOCATION)
            .bind(&location.vehicle_id)
            .bind(location.location.latitude)
            .bind(location.location.longitude)
            .bind(location.location.timestamp)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_latest(&self, vehicle_id: &str) -> Result<VehicleLocation> {
        let row = sqlx::query(SELECT_LATEST)
            .bind(vehicle_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(vehicle_id.to_string()))?;
        Self::row_to_location(&row)
    }

    async fn get_history(&self, query: &HistoryQuery) -> Result<Vec<VehicleLocation>> {
        let rows = sqlx::query(SELECT_HISTORY)
            .bind(&query.vehicle_id)
            .bind(query.start)
            .bind(query.end)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_location).collect()
    }

    async fn get_all_vehicles(&self) -> Result<Vec<Vehicle>> {
        let rows = sqlx::query(SELECT_VEHICLES).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| Ok(Vehicle { vehicle_id: row.try_get("vehicle_id")? }))
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
