//! Email-resend cooldown.
//!
//! The remaining wait is recomputed from the stored timestamp every time it
//! is asked for, so a view can poll `remaining` on each tick and stop when
//! it is torn down. Nothing here reschedules itself.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ApiError, StorageError};
use crate::storage::{KeyValueStore, EMAIL_VALIDATION_LAST_REQUEST_KEY};

pub const RESEND_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct ResendCooldown {
    store: Arc<dyn KeyValueStore>,
    period: Duration,
}

impl ResendCooldown {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            period: RESEND_COOLDOWN,
        }
    }

    fn last_request_ms(&self) -> Option<i64> {
        self.store
            .get(EMAIL_VALIDATION_LAST_REQUEST_KEY)
            .and_then(|value| value.parse().ok())
    }

    /// Time left before another resend is allowed, or `None` when allowed.
    pub fn remaining(&self, now_ms: i64) -> Option<Duration> {
        let last = self.last_request_ms()?;
        let elapsed = now_ms.saturating_sub(last).max(0) as u64;
        let period = self.period.as_millis() as u64;
        (elapsed < period).then(|| Duration::from_millis(period - elapsed))
    }

    /// Whole seconds left, rounded up, for display.
    pub fn remaining_secs(&self, now_ms: i64) -> u64 {
        self.remaining(now_ms)
            .map(|left| left.as_millis().div_ceil(1000) as u64)
            .unwrap_or(0)
    }

    pub fn check(&self, now_ms: i64) -> Result<(), ApiError> {
        match self.remaining_secs(now_ms) {
            0 => Ok(()),
            secs => Err(ApiError::Validation(format!(
                "Please wait {secs} seconds before requesting another email"
            ))),
        }
    }

    /// Start the cooldown. Called after a successful resend.
    pub fn record(&self, now_ms: i64) -> Result<(), StorageError> {
        self.store
            .set(EMAIL_VALIDATION_LAST_REQUEST_KEY, &now_ms.to_string())
    }
}

pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
