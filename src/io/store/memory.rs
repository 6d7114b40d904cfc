//! In-memory location store for tests and local development

use std::collections::BTreeSet;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{LocationStore, Result, StoreError};
use crate::domain::{HistoryQuery, Vehicle, VehicleLocation};

/// Insertion-ordered sighting log held in memory.
#[derive(Default)]
pub struct InMemoryLocationStore {
    records: RwLock<Vec<VehicleLocation>>,
    fail_on_insert: RwLock<bool>,
}

impl InMemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert fail with `Unavailable`
    pub fn set_fail_on_insert(&self, fail: bool) {
        *self.fail_on_insert.write() = fail;
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Copy of every record in insertion order
    pub fn records(&self) -> Vec<VehicleLocation> {
        self.records.read().clone()
    }
}

#[async_trait]
impl LocationStore for InMemoryLocationStore {
    async fn insert(&self, location: &VehicleLocation) -> Result<()> {
        if *self.fail_on_insert.read() {
            return Err(StoreError::Unavailable("insert failure injected".to_string()));
        }
        self.records.write().push(location.clone());
        Ok(())
    }

    async fn get_latest(&self, vehicle_id: &str) -> Result<VehicleLocation> {
        // max_by_key keeps the last of equal maxima, i.e. the most recent insert on a tie
        self.records
            .read()
            .iter()
            .filter(|r| r.vehicle_id == vehicle_id)
            .max_by_key(|r| r.location.timestamp)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(vehicle_id.to_string()))
    }

    async fn get_history(&self, query: &HistoryQuery) -> Result<Vec<VehicleLocation>> {
        let mut matches: Vec<VehicleLocation> = self
            .records
            .read()
            .iter()
            .filter(|r| r.vehicle_id == query.vehicle_id && query.contains(&r.location.timestamp))
            .cloned()
            .collect();
        matches.sort_by_key(|r| r.location.timestamp);
        Ok(matches)
    }

    async fn get_all_vehicles(&self) -> Result<Vec<Vehicle>> {
        let ids: BTreeSet<String> =
            self.records.read().iter().map(|r| r.vehicle_id.clone()).collect();
        Ok(ids.into_iter().map(|vehicle_id| Vehicle { vehicle_id }).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_then_get_latest_round_trips() {
        let store = InMemoryLocationStore::new();
        let vl = VehicleLocation::new("B1234XYZ", -6.2088, 106.8456, 1715003456).unwrap();
        store.insert(&vl).await.unwrap();

        let latest = store.get_latest("B1234XYZ").await.unwrap();
        assert_eq!(latest, vl);
    }

    #[tokio::test]
    async fn test_get_latest_picks_greatest_timestamp_not_last_insert() {
        let store = InMemoryLocationStore::new();
        store.insert(&VehicleLocation::new("B1", 1.0, 1.0, 1715000200).unwrap()).await.unwrap();
        store.insert(&VehicleLocation::new("B1", 2.0, 2.0, 1715000100).unwrap()).await.unwrap();

        let latest = store.get_latest("B1").await.unwrap();
        assert_eq!(latest.unix_timestamp(), 1715000200);
    }

    #[tokio::test]
    async fn test_get_latest_unknown_vehicle_is_not_found() {
        let store = InMemoryLocationStore::new();
        let err = store.get_latest("UNKNOWN").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_history_inclusive_window_ascending() {
        let store = InMemoryLocationStore::new();
        for ts in [1715009999, 1714999999, 1715005000, 1715000000, 1715010000] {
            store.insert(&VehicleLocation::new("B1", -6.2, 106.8, ts).unwrap()).await.unwrap();
        }
        store.insert(&VehicleLocation::new("B2", -6.2, 106.8, 1715005000).unwrap()).await.unwrap();

        let query = HistoryQuery::from_unix("B1", 1715000000, 1715009999).unwrap();
        let history = store.get_history(&query).await.unwrap();
        let timestamps: Vec<i64> = history.iter().map(|r| r.unix_timestamp()).collect();
        assert_eq!(timestamps, vec![1715000000, 1715005000, 1715009999]);
    }

    #[tokio::test]
    async fn test_get_history_empty_is_ok() {
        let store = InMemoryLocationStore::new();
        let query = HistoryQuery::from_unix("B1", 1, 2).unwrap();
        assert!(store.get_history(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_all_vehicles_distinct_sorted() {
        let store = InMemoryLocationStore::new();
        for id in ["C3", "A1", "B2", "A1"] {
            store.insert(&VehicleLocation::new(id, 0.0, 0.0, 1).unwrap()).await.unwrap();
        }
        let ids: Vec<String> =
            store.get_all_vehicles().await.unwrap().into_iter().map(|v| v.vehicle_id).collect();
        assert_eq!(ids, vec!["A1", "B2", "C3"]);
    }

    #[tokio::test]
    async fn test_injected_insert_failure() {
        let store = InMemoryLocationStore::new();
        store.set_fail_on_insert(true);
        let vl = VehicleLocation::new("B1", 0.0, 0.0, 1).unwrap();
        assert!(matches!(store.insert(&vl).await, Err(StoreError::Unavailable(_))));
        assert!(store.is_empty());
    }
}
