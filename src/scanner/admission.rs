//! Frame admission control
//!
//! Decides per frame whether it is worth a recognition job. Gates, in order:
//! one job in flight at most, a minimum interval since the last job finished,
//! and a minimum sharpness.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Why a frame was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionRejection {
    /// A recognition job is still running
    Busy,
    /// The minimum interval has not elapsed
    TooSoon,
    /// Sharpness below the focus threshold
    OutOfFocus,
}

/// Proof that a recognition job was admitted.
///
/// Hand it back through [`AdmissionController::release`] when the job ends.
/// Dropping it also frees the slot, without stamping the completion time.
#[must_use = "an admitted job must be released"]
#[derive(Debug)]
pub struct AdmissionPermit {
    admitted_at_ms: u64,
    _slot: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    pub fn admitted_at_ms(&self) -> u64 {
        self.admitted_at_ms
    }
}

/// Admission state and gates
#[derive(Debug)]
pub struct AdmissionController {
    interval_ms: u64,
    focus_threshold: f64,
    last_recognition_at_ms: Option<u64>,
    slot: Arc<Semaphore>,
}

impl AdmissionController {
    pub fn new(interval_ms: u64, focus_threshold: f64) -> Self {
        Self {
            interval_ms,
            focus_threshold,
            last_recognition_at_ms: None,
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn focus_threshold(&self) -> f64 {
        self.focus_threshold
    }

    /// Completion time of the last released job
    #[cfg(test)]
    pub fn last_recognition_at_ms(&self) -> Option<u64> {
        self.last_recognition_at_ms
    }

    /// Whether a recognition job holds the slot
    pub fn in_flight(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Try to admit a frame with sharpness `sharpness` at time `now_ms`
    pub fn admit(&mut self, now_ms: u64, sharpness: f64) -> Result<AdmissionPermit, AdmissionRejection> {
        if self.in_flight() {
            trace!("frame rejected at {}ms: job in flight", now_ms);
            return Err(AdmissionRejection::Busy);
        }

        if let Some(last) = self.last_recognition_at_ms {
            if now_ms.saturating_sub(last) < self.interval_ms {
                trace!("frame rejected at {}ms: {}ms since last job", now_ms, now_ms.saturating_sub(last));
                return Err(AdmissionRejection::TooSoon);
            }
        }

        // NaN never passes the focus gate
        if !(sharpness >= self.focus_threshold) {
            trace!("frame rejected at {}ms: sharpness {:.1} < {:.1}", now_ms, sharpness, self.focus_threshold);
            return Err(AdmissionRejection::OutOfFocus);
        }

        let slot = Arc::clone(&self.slot)
            .try_acquire_owned()
            .map_err(|_| AdmissionRejection::Busy)?;

        Ok(AdmissionPermit {
            admitted_at_ms: now_ms,
            _slot: slot,
        })
    }

    /// End the admitted job at `now_ms`, reopening admission after the interval
    pub fn release(&mut self, permit: AdmissionPermit, now_ms: u64) {
        self.last_recognition_at_ms = Some(now_ms);
        drop(permit);
    }
}
