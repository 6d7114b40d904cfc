//! Geofence detector - raises one alert per fence containing a sighting
//!
//! Stateless: every sighting inside a fence raises an `entry` alert, including
//! repeat sightings of a vehicle that never left. Fences are evaluated
//! independently, in configured order.

use crate::domain::{Geofence, GeofenceAlert, VehicleLocation};
use crate::io::publisher::{AlertPublisher, PublishError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// What to do with the remaining fences after a publish fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishFailurePolicy {
    /// Stop at the first failed publish; later fences are not evaluated
    #[default]
    Abort,
    /// Evaluate every fence, then return the first publish error
    Continue,
}

/// A failed check, with the alerts that did go out before it failed
#[derive(Debug, Error)]
#[error("{source} ({published} alerts published)")]
pub struct DetectError {
    pub published: usize,
    #[source]
    pub source: PublishError,
}

pub struct GeofenceDetector {
    publisher: Arc<dyn AlertPublisher>,
    geofences: Arc<[Geofence]>,
    policy: PublishFailurePolicy,
}

impl GeofenceDetector {
    pub fn new(publisher: Arc<dyn AlertPublisher>, geofences: impl Into<Arc<[Geofence]>>) -> Self {
        Self { publisher, geofences: geofences.into(), policy: PublishFailurePolicy::default() }
    }

    pub fn with_policy(mut self, policy: PublishFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn geofences(&self) -> &[Geofence] {
        &self.geofences
    }

    /// Check an already-persisted sighting against every fence
    ///
    /// Returns the number of alerts published.
    pub async fn check(&self, vehicle_location: &VehicleLocation) -> Result<usize, DetectError> {
        let mut published = 0;
        let mut first_error = None;

        for (index, fence) in self.geofences.iter().enumerate() {
            // contains() treats a NaN distance as outside
            if !fence.contains(&vehicle_location.location) {
                continue;
            }
            let distance_m = fence.distance_to(&vehicle_location.location);

            let alert = GeofenceAlert::entry(vehicle_location);
            match self.publisher.publish(&alert).await {
                Ok(()) => {
                    published += 1;
                    info!(
                        vehicle_id = %alert.vehicle_id,
                        geofence = %index,
                        distance_m = %format!("{distance_m:.1}"),
                        timestamp = %alert.timestamp,
                        "geofence_alert_published"
                    );
                }
                Err(e) => {
                    error!(
                        vehicle_id = %alert.vehicle_id,
                        geofence = %index,
                        error = %e,
                        "geofence_alert_publish_failed"
                    );
                    match self.policy {
                        PublishFailurePolicy::Abort => {
                            let skipped = self.geofences.len() - index - 1;
                            if skipped > 0 {
                                debug!(skipped = %skipped, "geofence_check_aborted");
                            }
                            return Err(DetectError { published, source: e });
                        }
                        PublishFailurePolicy::Continue => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
            }
        }

        match first_error {
            Some(source) => Err(DetectError { published, source }),
            None => Ok(published),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::publisher::InMemoryAlertPublisher;
    use crate::domain::GeofenceEvent;

    const JAKARTA: Geofence = Geofence { latitude: -6.2088, longitude: 106.8456, radius: 50.0 };
    const FAR_AWAY: Geofence = Geofence { latitude: -7.0, longitude: 107.0, radius: 50.0 };

    fn sighting(lat: f64, lon: f64) -> VehicleLocation {
        VehicleLocation::new("B1234XYZ", lat, lon, 1715003456).unwrap()
    }

    fn detector(geofences: Vec<Geofence>) -> (GeofenceDetector, Arc<InMemoryAlertPublisher>) {
        let publisher = Arc::new(InMemoryAlertPublisher::new());
        (GeofenceDetector::new(publisher.clone(), geofences), publisher)
    }

    #[tokio::test]
    async fn test_inside_geofence_raises_one_entry_alert() {
        let (detector, publisher) = detector(vec![JAKARTA]);

        let count = detector.check(&sighting(-6.2088, 106.8456)).await.unwrap();
        assert_eq!(count, 1);

        let alerts = publisher.take_published();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].vehicle_id, "B1234XYZ");
        assert_eq!(alerts[0].event, GeofenceEvent::Entry);
        assert_eq!(alerts[0].timestamp, 1715003456);
    }

    #[tokio::test]
    async fn test_center_with_zero_radius_is_inside() {
        let (detector, publisher) = detector(vec![Geofence::new(-6.2088, 106.8456, 0.0)]);
        detector.check(&sighting(-6.2088, 106.8456)).await.unwrap();
        assert_eq!(publisher.published_count(), 1);
    }

    #[tokio::test]
    async fn test_outside_geofence_raises_nothing() {
        let (detector, publisher) = detector(vec![JAKARTA]);
        let count = detector.check(&sighting(-7.0, 107.0)).await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(publisher.attempts(), 0);
    }

    #[tokio::test]
    async fn test_just_outside_radius() {
        // ~133m south of the center
        let (detector, publisher) = detector(vec![Geofence::new(-6.2088, 106.8456, 100.0)]);
        detector.check(&sighting(-6.2100, 106.8456)).await.unwrap();
        assert_eq!(publisher.published_count(), 0);
    }

    #[tokio::test]
    async fn test_antipodal_sighting_raises_nothing() {
        let (detector, publisher) = detector(vec![Geofence::new(-0.08, 180.0, 50.0)]);
        let count = detector.check(&sighting(0.08, 0.0)).await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(publisher.attempts(), 0);
    }

    #[tokio::test]
    async fn test_nan_distance_is_never_inside() {
        let (detector, publisher) = detector(vec![Geofence::new(-6.2088, 106.8456, f64::MAX)]);
        let count = detector.check(&sighting(f64::NAN, 106.8456)).await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(publisher.attempts(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_geofences_each_alert() {
        let (detector, publisher) = detector(vec![
            JAKARTA,
            Geofence::new(-6.2088, 106.8456, 100.0),
            FAR_AWAY,
        ]);
        let count = detector.check(&sighting(-6.2088, 106.8456)).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(publisher.published_count(), 2);
    }

    #[tokio::test]
    async fn test_no_geofences() {
        let (detector, publisher) = detector(Vec::new());
        assert_eq!(detector.check(&sighting(-6.2088, 106.8456)).await.unwrap(), 0);
        assert_eq!(publisher.attempts(), 0);
    }

    #[tokio::test]
    async fn test_repeat_sightings_alert_every_time() {
        let (detector, publisher) = detector(vec![JAKARTA]);
        for _ in 0..3 {
            detector.check(&sighting(-6.2088, 106.8456)).await.unwrap();
        }
        assert_eq!(publisher.published_count(), 3);
    }

    #[tokio::test]
    async fn test_publish_failure_aborts_remaining_geofences() {
        let (detector, publisher) = detector(vec![JAKARTA, JAKARTA, JAKARTA]);
        publisher.set_fail_on_publish(true);

        let result = detector.check(&sighting(-6.2088, 106.8456)).await;
        assert!(result.is_err());
        assert_eq!(publisher.attempts(), 1, "second and third fences must not be attempted");
    }

    #[tokio::test]
    async fn test_continue_policy_attempts_every_geofence() {
        let (detector, publisher) = detector(vec![JAKARTA, JAKARTA, JAKARTA]);
        let detector = detector.with_policy(PublishFailurePolicy::Continue);
        publisher.fail_from_attempt(2);

        let err = detector.check(&sighting(-6.2088, 106.8456)).await.unwrap_err();
        assert_eq!(err.published, 1);
        assert_eq!(publisher.attempts(), 3);
        assert_eq!(publisher.published_count(), 1);
    }

    #[tokio::test]
    async fn test_abort_reports_alerts_sent_before_failure() {
        let (detector, publisher) = detector(vec![JAKARTA, JAKARTA, JAKARTA]);
        publisher.fail_from_attempt(2);

        let err = detector.check(&sighting(-6.2088, 106.8456)).await.unwrap_err();
        assert_eq!(err.published, 1);
        assert!(matches!(err.source, PublishError::Unavailable(_)));
        assert_eq!(publisher.attempts(), 2);
    }
}
