//! Message types published by the scanner

use serde::Serialize;

use crate::analysis::Code;
use crate::scanner::AdmissionRejection;

/// Outcome of one frame cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanStatus {
    /// Frame submitted for recognition
    Admitted { job_id: String },
    /// Skipped: a job is still running
    Busy,
    /// Skipped: too soon after the last job
    TooSoon,
    /// Skipped: frame too blurry
    OutOfFocus,
    /// Recognized text held no valid code
    NoCandidate { text: String },
    /// A code was accepted from this frame
    Validated { code: Code, corrected: bool },
    /// The recognition engine failed
    RecognitionFailed { error: String },
}

impl ScanStatus {
    /// Short name for status lines
    pub fn label(&self) -> &'static str {
        match self {
            ScanStatus::Admitted { .. } => "admitted",
            ScanStatus::Busy => "busy",
            ScanStatus::TooSoon => "too_soon",
            ScanStatus::OutOfFocus => "out_of_focus",
            ScanStatus::NoCandidate { .. } => "no_candidate",
            ScanStatus::Validated { .. } => "validated",
            ScanStatus::RecognitionFailed { .. } => "recognition_failed",
        }
    }
}

impl From<AdmissionRejection> for ScanStatus {
    fn from(rejection: AdmissionRejection) -> Self {
        match rejection {
            AdmissionRejection::Busy => ScanStatus::Busy,
            AdmissionRejection::TooSoon => ScanStatus::TooSoon,
            AdmissionRejection::OutOfFocus => ScanStatus::OutOfFocus,
        }
    }
}

/// Published after every frame cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanUpdate {
    /// Frame the cycle belongs to
    pub frame_seq: u64,
    /// Clock time of the update
    pub at_ms: u64,
    /// What happened
    pub status: ScanStatus,
    /// Current best code, sticky across failed frames
    pub estimate: Option<Code>,
}
