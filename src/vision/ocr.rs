//! OCR (Optical Character Recognition) boundary
//!
//! The recognizer is a black box: it receives the preprocessed region and
//! eventually answers with the text it saw and a whole-pass confidence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::config::EngineSettings;
use crate::shared::ManualClock;

/// Recognition failures reported by an engine
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecognitionError {
    #[error("recognition failed: {0}")]
    Failed(String),
    #[error("recognition task aborted: {0}")]
    Aborted(String),
}

/// Work item handed to the engine
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    /// Sequence number of the source frame
    pub frame_seq: u64,
    /// Cropped, preprocessed region
    pub image: RgbaImage,
    /// Engine parameters forwarded verbatim
    pub params: EngineSettings,
}

/// Engine output for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    /// Raw recognized text
    pub text: String,
    /// Whole-pass confidence (0 - 100)
    pub confidence: f32,
}

/// Asynchronous text recognizer
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &str;

    /// Recognize text in the request image
    async fn recognize(&self, request: RecognitionRequest) -> Result<Recognition, RecognitionError>;
}

/// One canned engine answer
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedResponse {
    pub result: Result<Recognition, RecognitionError>,
    /// Simulated processing time
    pub latency_ms: u64,
}

impl ScriptedResponse {
    pub fn text(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            result: Ok(Recognition {
                text: text.into(),
                confidence,
            }),
            latency_ms: 0,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: Err(RecognitionError::Failed(message.into())),
            latency_ms: 0,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// Engine that answers from a per-frame script.
///
/// Frames without a scripted answer recognize as empty text. Latency either
/// advances a shared [`ManualClock`] (virtual time) or sleeps on the runtime.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    responses: HashMap<u64, ScriptedResponse>,
    clock: Option<ManualClock>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(responses: HashMap<u64, ScriptedResponse>) -> Self {
        Self {
            responses,
            ..Default::default()
        }
    }

    /// Advance `clock` by each response's latency instead of sleeping
    pub fn with_clock(mut self, clock: ManualClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn insert(&mut self, frame_seq: u64, response: ScriptedResponse) {
        self.responses.insert(frame_seq, response);
    }

    /// Number of recognize calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping recognize calls seen
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognitionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn recognize(&self, request: RecognitionRequest) -> Result<Recognition, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        trace!(
            "Scripted recognize for frame {} ({:?}, psm {}, oem {})",
            request.frame_seq,
            request.image.dimensions(),
            request.params.page_seg_mode,
            request.params.engine_mode
        );

        let response = self
            .responses
            .get(&request.frame_seq)
            .cloned()
            .unwrap_or_else(|| ScriptedResponse::text("", 0.0));

        if response.latency_ms > 0 {
            match &self.clock {
                Some(clock) => clock.advance(response.latency_ms),
                None => tokio::time::sleep(Duration::from_millis(response.latency_ms)).await,
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        response.result
    }
}
