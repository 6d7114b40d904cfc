//! Location ingestor - decode, validate, persist, then detect
//!
//! One raw transport message in, at most one persisted sighting out. Every
//! failure is terminal for that message: it is logged and dropped, never
//! retried, and never reported back to the transport.

use crate::domain::{PositionReport, ValidationError, VehicleLocation};
use crate::infra::metrics::Metrics;
use crate::io::store::{LocationStore, StoreError};
use crate::services::geofence::{DetectError, GeofenceDetector};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Why a message did not make it through the whole pipeline
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid location message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Nothing was persisted and detection was skipped
    #[error("save location error: {0}")]
    Persist(#[source] StoreError),

    /// The sighting is persisted; alerting stopped part-way
    #[error("geofence check error: {0}")]
    Detect(#[source] DetectError),
}

/// Successful pass through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub location: VehicleLocation,
    pub alerts_published: usize,
}

/// The position-report handler
///
/// Holds no per-message state; `handle` is safe to run concurrently for
/// different messages.
pub struct LocationIngestor {
    store: Arc<dyn LocationStore>,
    detector: GeofenceDetector,
    metrics: Arc<Metrics>,
}

impl LocationIngestor {
    pub fn new(
        store: Arc<dyn LocationStore>,
        detector: GeofenceDetector,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { store, detector, metrics }
    }

    /// Transport entry point: run the pipeline and log whatever went wrong
    pub async fn handle(&self, payload: &[u8]) {
        match self.process(payload).await {
            Ok(outcome) => {
                debug!(
                    vehicle_id = %outcome.location.vehicle_id,
                    alerts = %outcome.alerts_published,
                    "location_ingested"
                );
            }
            Err(e @ IngestError::Decode(_)) => {
                warn!(error = %e, "location_decode_failed");
            }
            Err(IngestError::Validation(e)) => {
                warn!(field = %e.field(), error = %e, "location_validation_failed");
            }
            Err(e @ IngestError::Persist(_)) => {
                error!(error = %e, "location_persist_failed");
            }
            Err(e @ IngestError::Detect(_)) => {
                error!(error = %e, "geofence_check_failed");
            }
        }
    }

    /// Run decode -> validate -> persist -> detect for one payload
    pub async fn process(&self, payload: &[u8]) -> Result<IngestOutcome, IngestError> {
        self.metrics.record_report_received();

        let report: PositionReport = serde_json::from_slice(payload).inspect_err(|_| {
            self.metrics.record_decode_failure();
        })?;

        let location = report.into_vehicle_location().inspect_err(|_| {
            self.metrics.record_validation_failure();
        })?;

        if let Err(e) = self.store.insert(&location).await {
            self.metrics.record_persist_failure();
            return Err(IngestError::Persist(e));
        }
        self.metrics.record_location_persisted();

        match self.detector.check(&location).await {
            Ok(alerts_published) => {
                self.metrics.record_alerts_published(alerts_published as u64);
                Ok(IngestOutcome { location, alerts_published })
            }
            Err(e) => {
                self.metrics.record_alerts_published(e.published as u64);
                self.metrics.record_publish_failure();
                Err(IngestError::Detect(e))
            }
        }
    }
}
