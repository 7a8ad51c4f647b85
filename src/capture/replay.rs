//! Recorded scanning sessions
//!
//! A replay file is JSON lines, one object per camera frame:
//!
//! ```text
//! {"at_ms": 0, "sharpness": 140.0, "text": "AKE 12345 CI", "confidence": 91}
//! {"at_ms": 33, "sharpness": 12.5}
//! {"image": "frames/0002.png", "error": "engine timeout", "latency_ms": 300}
//! ```
//!
//! `text`/`confidence`/`error`/`latency_ms` describe what the recognizer
//! answered if that frame was submitted. Blank lines and lines starting with
//! `#` are skipped.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::{load_rgba, Frame, FrameSource, SourceError, DEFAULT_FRAME_PERIOD_MS};
use crate::vision::{ScriptedEngine, ScriptedResponse};

/// Size of frames that have no image on disk
pub const SYNTHETIC_FRAME_SIZE: (u32, u32) = (320, 240);
/// Sharpness of frames that have neither an image nor a recorded score
pub const SYNTHETIC_SHARPNESS: f64 = 1000.0;
/// Confidence used when a record has text but no confidence
pub const DEFAULT_CONFIDENCE: f32 = 100.0;

/// One recorded frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayRecord {
    /// Capture time; defaults to previous frame + one frame period
    pub at_ms: Option<u64>,
    /// Image file, relative to the replay file
    pub image: Option<PathBuf>,
    /// Synthetic frame width when there is no image
    pub width: Option<u32>,
    /// Synthetic frame height when there is no image
    pub height: Option<u32>,
    /// Recorded focus score; overrides measurement
    pub sharpness: Option<f64>,
    /// Recognizer text for this frame
    pub text: Option<String>,
    /// Recognizer confidence for this frame
    pub confidence: Option<f32>,
    /// Recognizer failure for this frame
    pub error: Option<String>,
    /// Time the recognizer took
    pub latency_ms: u64,
}

impl ReplayRecord {
    fn response(&self) -> Option<ScriptedResponse> {
        let response = match (&self.error, &self.text) {
            (Some(error), _) => ScriptedResponse::error(error.clone()),
            (None, Some(text)) => ScriptedResponse::text(text.clone(), self.confidence.unwrap_or(DEFAULT_CONFIDENCE)),
            (None, None) => return None,
        };
        Some(response.with_latency(self.latency_ms))
    }
}

/// A parsed replay file
#[derive(Debug, Clone, Default)]
pub struct Replay {
    pub records: Vec<ReplayRecord>,
    /// Directory image paths are resolved against
    pub base_dir: PathBuf,
}

impl Replay {
    pub fn parse(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let records = content
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            })
            .map(|(index, line)| {
                serde_json::from_str(line).with_context(|| format!("Invalid replay record on line {}", index + 1))
            })
            .collect::<Result<Vec<ReplayRecord>>>()?;

        Ok(Self {
            records,
            base_dir: base_dir.into(),
        })
    }

    /// Split into the frame stream and the engine that answers for it
    pub fn into_parts(self) -> (ReplaySource, ScriptedEngine) {
        let mut responses = HashMap::new();
        let mut frames = VecDeque::with_capacity(self.records.len());
        let mut at_ms = 0u64;

        for (index, record) in self.records.into_iter().enumerate() {
            let seq = index as u64;
            at_ms = match record.at_ms {
                Some(t) => t,
                None if index == 0 => 0,
                None => at_ms.saturating_add(DEFAULT_FRAME_PERIOD_MS),
            };
            if let Some(response) = record.response() {
                responses.insert(seq, response);
            }
            frames.push_back(PendingFrame {
                seq,
                at_ms,
                image: record.image.map(|p| self.base_dir.join(p)),
                size: (
                    record.width.unwrap_or(SYNTHETIC_FRAME_SIZE.0),
                    record.height.unwrap_or(SYNTHETIC_FRAME_SIZE.1),
                ),
                sharpness: record.sharpness,
            });
        }

        (ReplaySource { frames }, ScriptedEngine::new(responses))
    }
}

/// Read and parse a replay file
pub fn load_replay(path: &Path) -> Result<Replay> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay file {}", path.display()))?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Replay::parse(&content, base_dir)
}

#[derive(Debug, Clone)]
struct PendingFrame {
    seq: u64,
    at_ms: u64,
    image: Option<PathBuf>,
    size: (u32, u32),
    sharpness: Option<f64>,
}

/// Frames of a replay, loaded lazily
#[derive(Debug)]
pub struct ReplaySource {
    frames: VecDeque<PendingFrame>,
}

impl ReplaySource {
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(pending) = self.frames.pop_front() else {
            return Ok(None);
        };

        let frame = match &pending.image {
            Some(path) => Frame::new(pending.seq, pending.at_ms, load_rgba(path)?),
            None => {
                let (w, h) = pending.size;
                Frame::new(pending.seq, pending.at_ms, RgbaImage::new(w, h)).with_sharpness(SYNTHETIC_SHARPNESS)
            }
        };

        Ok(Some(match pending.sharpness {
            Some(sharpness) => frame.with_sharpness(sharpness),
            None => frame,
        }))
    }
}
