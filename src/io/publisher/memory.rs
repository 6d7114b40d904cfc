//! In-memory alert publisher for testing.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{encode_alert, AlertPublisher, PublishError, Result};
use crate::domain::{AlertMessage, GeofenceAlert};

/// Records every publish attempt; can be told to fail.
#[derive(Default)]
pub struct InMemoryAlertPublisher {
    published: Mutex<Vec<GeofenceAlert>>,
    attempts: Mutex<usize>,
    /// Attempt number (1-based) from which publishes start failing
    fail_from_attempt: Mutex<Option<usize>>,
}

impl InMemoryAlertPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every publish
    pub fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_from_attempt.lock() = fail.then_some(1);
    }

    /// Succeed for the first `n - 1` attempts, fail from attempt `n` onwards
    pub fn fail_from_attempt(&self, n: usize) {
        *self.fail_from_attempt.lock() = Some(n);
    }

    /// Number of publish calls, successful or not
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().len()
    }

    pub fn take_published(&self) -> Vec<GeofenceAlert> {
        std::mem::take(&mut *self.published.lock())
    }

    /// Successfully published alerts, decoded back from their wire format
    pub fn published_messages(&self) -> Vec<AlertMessage> {
        self.published
            .lock()
            .iter()
            .filter_map(|alert| encode_alert(alert).ok())
            .filter_map(|body| serde_json::from_slice(&body).ok())
            .collect()
    }
}

#[async_trait]
impl AlertPublisher for InMemoryAlertPublisher {
    async fn publish(&self, alert: &GeofenceAlert) -> Result<()> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            *attempts += 1;
            *attempts
        };

        if matches!(*self.fail_from_attempt.lock(), Some(n) if attempt >= n) {
            return Err(PublishError::Unavailable("mock publish failure".to_string()));
        }

        encode_alert(alert)?;
        self.published.lock().push(alert.clone());
        Ok(())
    }
}
