//! End-to-end tests for the ingest pipeline and query API
//!
//! Wires the real ingestor, detector and query API over the in-memory store
//! and publisher.

use fleet_tracker::domain::{Geofence, GeofenceEvent, HistoryQuery};
use fleet_tracker::infra::Metrics;
use fleet_tracker::io::{
    ConnectionState, InMemoryAlertPublisher, InMemoryLocationStore, LocationStore, QueryApi,
};
use fleet_tracker::services::{GeofenceDetector, IngestError, LocationIngestor, PublishFailurePolicy};
use hyper::{Method, StatusCode};
use serde_json::json;
use std::sync::Arc;

struct Pipeline {
    ingestor: Arc<LocationIngestor>,
    store: Arc<InMemoryLocationStore>,
    publisher: Arc<InMemoryAlertPublisher>,
    metrics: Arc<Metrics>,
}

fn pipeline(geofences: Vec<Geofence>, policy: PublishFailurePolicy) -> Pipeline {
    let store = Arc::new(InMemoryLocationStore::new());
    let publisher = Arc::new(InMemoryAlertPublisher::new());
    let metrics = Arc::new(Metrics::new());
    let detector = GeofenceDetector::new(publisher.clone(), geofences).with_policy(policy);
    let ingestor = Arc::new(LocationIngestor::new(store.clone(), detector, metrics.clone()));
    Pipeline { ingestor, store, publisher, metrics }
}

fn report(vehicle_id: &str, latitude: f64, longitude: f64, timestamp: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "vehicle_id": vehicle_id,
        "latitude": latitude,
        "longitude": longitude,
        "timestamp": timestamp,
    }))
    .unwrap()
}

#[tokio::test]
async fn test_report_inside_fence_persists_and_alerts() {
    let p = pipeline(vec![Geofence::new(-6.2088, 106.8456, 50.0)], PublishFailurePolicy::Abort);

    p.ingestor.handle(&report("B1", -6.2088, 106.8456, 1715003456)).await;

    assert_eq!(p.store.len(), 1);
    let alerts = p.publisher.published_messages();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].vehicle_id, "B1");
    assert_eq!(alerts[0].event, GeofenceEvent::Entry);
    assert_eq!(alerts[0].location.latitude, -6.2088);
    assert_eq!(alerts[0].location.longitude, 106.8456);
    assert_eq!(alerts[0].timestamp, 1715003456);

    let wire = serde_json::to_value(&alerts[0]).unwrap();
    assert_eq!(
        wire,
        json!({
            "vehicle_id": "B1",
            "event": "geofence_entry",
            "location": {"latitude": -6.2088, "longitude": 106.8456},
            "timestamp": 1715003456
        })
    );
}

#[tokio::test]
async fn test_report_outside_fence_persists_without_alert() {
    let p = pipeline(vec![Geofence::new(-7.0, 107.0, 50.0)], PublishFailurePolicy::Abort);

    p.ingestor.handle(&report("B1", -6.2088, 106.8456, 1715003456)).await;

    assert_eq!(p.store.len(), 1);
    assert_eq!(p.publisher.published_count(), 0);
}

#[tokio::test]
async fn test_rejected_reports_leave_no_trace() {
    let p = pipeline(vec![Geofence::new(-6.2088, 106.8456, 50.0)], PublishFailurePolicy::Abort);

    p.ingestor.handle(b"{not json").await;
    p.ingestor.handle(&report("", -6.2088, 106.8456, 1715003456)).await;
    p.ingestor.handle(&report("B1", -6.2088, 181.0, 1715003456)).await;
    p.ingestor.handle(&report("B1", -6.2088, 106.8456, 0)).await;

    assert!(p.store.is_empty());
    assert_eq!(p.publisher.attempts(), 0);

    let summary = p.metrics.report();
    assert_eq!(summary.reports_received, 4);
    assert_eq!(summary.decode_failures, 1);
    assert_eq!(summary.validation_failures, 3);
}

#[tokio::test]
async fn test_overlapping_fences_abort_on_first_publish_failure() {
    let fences = vec![
        Geofence::new(-6.2088, 106.8456, 50.0),
        Geofence::new(-6.2088, 106.8456, 500.0),
    ];
    let p = pipeline(fences, PublishFailurePolicy::Abort);
    p.publisher.set_fail_on_publish(true);

    let err = p.ingestor.process(&report("B1", -6.2088, 106.8456, 1715003456)).await.unwrap_err();

    assert!(matches!(err, IngestError::Detect(_)));
    assert_eq!(p.store.len(), 1);
    assert_eq!(p.publisher.attempts(), 1);
}

#[tokio::test]
async fn test_overlapping_fences_continue_past_publish_failure() {
    let fences = vec![
        Geofence::new(-6.2088, 106.8456, 50.0),
        Geofence::new(-6.2088, 106.8456, 500.0),
    ];
    let p = pipeline(fences, PublishFailurePolicy::Continue);
    p.publisher.set_fail_on_publish(true);

    let err = p.ingestor.process(&report("B1", -6.2088, 106.8456, 1715003456)).await.unwrap_err();

    assert!(matches!(err, IngestError::Detect(_)));
    assert_eq!(p.publisher.attempts(), 2);
}

#[tokio::test]
async fn test_concurrent_reports_are_all_persisted() {
    let p = pipeline(vec![Geofence::new(-6.2088, 106.8456, 50.0)], PublishFailurePolicy::Abort);

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let ingestor = p.ingestor.clone();
            tokio::spawn(async move {
                ingestor.handle(&report(&format!("V{}", i % 4), -6.2088, 106.8456, 1715000000 + i)).await;
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(p.store.len(), 20);
    assert_eq!(p.publisher.published_count(), 20);
    assert_eq!(p.store.get_all_vehicles().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_ingested_reports_are_queryable() {
    let p = pipeline(Vec::new(), PublishFailurePolicy::Abort);
    for (lat, lon, ts) in [(-6.20, 106.80, 1715000000), (-6.21, 106.81, 1715005000), (-6.22, 106.82, 1715020000)] {
        p.ingestor.handle(&report("B1234XYZ", lat, lon, ts)).await;
    }

    let latest = p.store.get_latest("B1234XYZ").await.unwrap();
    assert_eq!(latest.unix_timestamp(), 1715020000);

    let window = HistoryQuery::from_unix("B1234XYZ", 1715000000, 1715009999).unwrap();
    assert_eq!(p.store.get_history(&window).await.unwrap().len(), 2);

    let api = QueryApi::new(p.store.clone(), p.publisher.clone(), ConnectionState::new());

    let (status, body) = api.route(&Method::GET, "/vehicles/B1234XYZ/location", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"vehicle_id": "B1234XYZ", "latitude": -6.22, "longitude": 106.82, "timestamp": 1715020000})
    );

    let (status, body) = api
        .route(&Method::GET, "/vehicles/B1234XYZ/history", Some("start=1715000000&end=1715009999"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["timestamp"], 1715000000);

    let (status, body) = api.route(&Method::GET, "/vehicles", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"vehicle_id": "B1234XYZ"}]));
}
