//! Shared scan state for display collaborators

use serde::Serialize;

use super::messages::{ScanStatus, ScanUpdate};
use crate::analysis::Code;

/// Latest published output plus cycle counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct SharedScanState {
    /// Current best code
    pub estimate: Option<Code>,
    /// Status of the most recent cycle
    pub last_status: Option<ScanStatus>,
    /// Time of the most recent update
    pub last_update_ms: Option<u64>,
    /// Per-outcome counters
    pub counters: CycleCounters,
    /// Last error message (if any)
    pub last_error: Option<String>,
}

impl SharedScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one update into the state
    pub fn apply(&mut self, update: &ScanUpdate) {
        self.counters.count(&update.status);
        if let ScanStatus::RecognitionFailed { error } = &update.status {
            self.last_error = Some(error.clone());
        }
        self.estimate = update.estimate.clone();
        self.last_status = Some(update.status.clone());
        self.last_update_ms = Some(update.at_ms);
    }

    /// Set an error message
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}

/// How often each cycle outcome occurred
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleCounters {
    pub admitted: u64,
    pub busy: u64,
    pub too_soon: u64,
    pub out_of_focus: u64,
    pub no_candidate: u64,
    pub validated: u64,
    pub failed: u64,
}

impl CycleCounters {
    fn count(&mut self, status: &ScanStatus) {
        let counter = match status {
            ScanStatus::Admitted { .. } => &mut self.admitted,
            ScanStatus::Busy => &mut self.busy,
            ScanStatus::TooSoon => &mut self.too_soon,
            ScanStatus::OutOfFocus => &mut self.out_of_focus,
            ScanStatus::NoCandidate { .. } => &mut self.no_candidate,
            ScanStatus::Validated { .. } => &mut self.validated,
            ScanStatus::RecognitionFailed { .. } => &mut self.failed,
        };
        *counter += 1;
    }

    /// Frames that reached the recognizer and came back
    pub fn completed(&self) -> u64 {
        self.no_candidate + self.validated + self.failed
    }

    /// Frames skipped by admission control
    pub fn rejected(&self) -> u64 {
        self.busy + self.too_soon + self.out_of_focus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(status: ScanStatus) -> ScanUpdate {
        ScanUpdate {
            frame_seq: 0,
            at_ms: 7,
            status,
            estimate: None,
        }
    }

    #[test]
    fn test_apply_counts_and_tracks_errors() {
        let mut state = SharedScanState::new();
        state.apply(&update(ScanStatus::OutOfFocus));
        state.apply(&update(ScanStatus::TooSoon));
        state.apply(&update(ScanStatus::RecognitionFailed { error: "boom".into() }));

        assert_eq!(state.counters.rejected(), 2);
        assert_eq!(state.counters.completed(), 1);
        assert_eq!(state.last_error.as_deref(), Some("boom"));
        assert_eq!(state.last_update_ms, Some(7));
    }

    #[test]
    fn test_last_status_replaced() {
        let mut state = SharedScanState::new();
        state.apply(&update(ScanStatus::Busy));
        state.apply(&update(ScanStatus::NoCandidate { text: "??".into() }));
        assert_eq!(state.last_status.as_ref().map(ScanStatus::label), Some("no_candidate"));
    }
}
