//! Recognition Pipeline
//!
//! Per admitted frame: pick the region, preprocess it, recognize it, read a
//! code out of the text and vote it into the running estimate.
//!
//! A cycle is split in two so the recognizer can run elsewhere:
//! [`Scanner::begin`] gates the frame and builds the request, and
//! [`Scanner::complete`] releases admission and folds in the result. Every
//! admitted job ends in `complete` or [`Scanner::abandon`].

pub mod admission;
pub mod live;

pub use admission::{AdmissionController, AdmissionPermit, AdmissionRejection};
pub use live::run_live;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, debug_span, info, trace, warn, Instrument};
use uuid::Uuid;

use crate::analysis::{Code, CodeReader, Observation, VotingAggregator};
use crate::capture::{Frame, FrameSource, SourceError};
use crate::config::{AppConfig, EngineSettings, OcrPreprocessing};
use crate::shared::{Clock, ManualClock, ScanStatus, ScanUpdate};
use crate::vision::{
    active_region, prepare_region, Recognition, RecognitionEngine, RecognitionError, RecognitionRequest, Region,
};

/// An admitted recognition job awaiting its result
#[must_use = "a started job must be completed or abandoned"]
#[derive(Debug)]
pub struct PendingJob {
    id: Uuid,
    frame_seq: u64,
    region: Region,
    permit: AdmissionPermit,
}

impl PendingJob {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn admitted_at_ms(&self) -> u64 {
        self.permit.admitted_at_ms()
    }

    /// The recognizer call for this job. Log lines from it, and from the
    /// engine underneath, carry the job id.
    pub fn recognition(
        &self,
        engine: Arc<dyn RecognitionEngine>,
        request: RecognitionRequest,
    ) -> impl Future<Output = Result<Recognition, RecognitionError>> + Send + 'static {
        let (id, frame_seq, region) = (self.id, self.frame_seq, self.region);
        async move {
            debug!(
                job = %id,
                "Recognizing frame {} region {:?} with the {} engine",
                frame_seq, region, engine.name()
            );
            let result = engine.recognize(request).await;
            trace!(job = %id, "Recognizer answered for frame {} (ok: {})", frame_seq, result.is_ok());
            result
        }
        .instrument(debug_span!("recognize", job = %id))
    }
}

/// Owns the admission state and voting window of one scanning session
pub struct Scanner {
    engine: Arc<dyn RecognitionEngine>,
    clock: Arc<dyn Clock>,
    admission: AdmissionController,
    reader: CodeReader,
    votes: VotingAggregator,
    user_region: Option<Region>,
    preprocess: OcrPreprocessing,
    engine_params: EngineSettings,
    estimate: Option<Code>,
}

impl Scanner {
    pub fn new(config: &AppConfig, engine: Arc<dyn RecognitionEngine>, clock: Arc<dyn Clock>) -> Self {
        let scan = &config.scan;
        Self {
            engine,
            clock,
            admission: AdmissionController::new(scan.interval_ms, scan.focus_threshold),
            reader: CodeReader::new(config.vocabulary.validator(), scan.candidate_strategy),
            votes: VotingAggregator::new(scan.window_capacity),
            user_region: config.region,
            preprocess: config.preprocess.clone(),
            engine_params: config.engine.clone(),
            estimate: None,
        }
    }

    /// Current published estimate
    pub fn estimate(&self) -> Option<&Code> {
        self.estimate.as_ref()
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    #[cfg(test)]
    pub fn votes(&self) -> &VotingAggregator {
        &self.votes
    }

    pub fn engine(&self) -> Arc<dyn RecognitionEngine> {
        Arc::clone(&self.engine)
    }

    /// Gate a frame and, if admitted, build its recognition request
    pub fn begin(&mut self, frame: &Frame) -> Result<(PendingJob, RecognitionRequest), ScanUpdate> {
        let now = self.clock.now_ms();
        let permit = self
            .admission
            .admit(now, frame.sharpness)
            .map_err(|rejection| self.update(frame.seq, now, rejection.into()))?;

        let (width, height) = frame.dimensions();
        let region = active_region(width, height, self.user_region);
        let image = prepare_region(&frame.image, region, &self.preprocess);

        let job = PendingJob {
            id: Uuid::new_v4(),
            frame_seq: frame.seq,
            region,
            permit,
        };
        debug!(
            job = %job.id,
            "Admitted frame {} at {}ms (sharpness {:.1}, region {:?})",
            frame.seq, now, frame.sharpness, region
        );

        let request = RecognitionRequest {
            frame_seq: frame.seq,
            image,
            params: self.engine_params.clone(),
        };
        Ok((job, request))
    }

    /// Release admission and fold the recognition result into the estimate
    pub fn complete(&mut self, job: PendingJob, result: Result<Recognition, RecognitionError>) -> ScanUpdate {
        let now = self.clock.now_ms();
        let PendingJob { id, frame_seq, permit, .. } = job;
        let admitted_at = permit.admitted_at_ms();
        self.admission.release(permit, now);
        trace!(job = %id, "Released admission at {}ms (admitted at {}ms)", now, admitted_at);

        let status = match result {
            Err(error) => {
                warn!(job = %id, "Recognition of frame {} failed: {}", frame_seq, error);
                ScanStatus::RecognitionFailed {
                    error: error.to_string(),
                }
            }
            Ok(recognition) => match self.reader.read(&recognition.text) {
                None => {
                    debug!(job = %id, "No valid code in {:?}", recognition.text);
                    ScanStatus::NoCandidate {
                        text: recognition.text,
                    }
                }
                Some(reading) => {
                    debug!(
                        job = %id,
                        "Read {} from {:?} (confidence {:.1}, corrected {})",
                        reading.code, reading.candidate, recognition.confidence, reading.corrected
                    );
                    self.votes
                        .record(Observation::new(reading.code.clone(), recognition.confidence, now));
                    self.refresh_estimate();
                    ScanStatus::Validated {
                        code: reading.code,
                        corrected: reading.corrected,
                    }
                }
            },
        };

        self.update(frame_seq, now, status)
    }

    /// Drop an admitted job without a result; admission reopens immediately
    pub fn abandon(&mut self, job: PendingJob) {
        debug!(job = %job.id, "Abandoned job for frame {}", job.frame_seq);
        drop(job);
    }

    /// Run one full cycle for `frame`, awaiting the recognizer inline
    pub async fn process_frame(&mut self, frame: &Frame) -> ScanUpdate {
        match self.begin(frame) {
            Err(rejected) => rejected,
            Ok((job, request)) => {
                let result = job.recognition(self.engine(), request).await;
                self.complete(job, result)
            }
        }
    }

    fn refresh_estimate(&mut self) {
        let estimate = self.votes.current_estimate();
        if estimate != self.estimate {
            if let Some(code) = &estimate {
                info!(
                    "Estimate is now {} ({:.0} confidence over {}/{} window slots)",
                    code,
                    self.votes.total_confidence(code),
                    self.votes.len(),
                    self.votes.capacity()
                );
            }
            self.estimate = estimate;
        }
    }

    fn update(&self, frame_seq: u64, at_ms: u64, status: ScanStatus) -> ScanUpdate {
        ScanUpdate {
            frame_seq,
            at_ms,
            status,
            estimate: self.estimate.clone(),
        }
    }
}

/// Drive a recorded session through `scanner` in virtual time.
///
/// The clock jumps to each frame's capture time (never backwards), and the
/// engine moves it further by its latency, so a frame captured while a job
/// was running is judged when that job has finished.
pub async fn run_replay<S, F>(
    scanner: &mut Scanner,
    source: &mut S,
    clock: &ManualClock,
    mut publish: F,
) -> Result<(), SourceError>
where
    S: FrameSource + ?Sized,
    F: FnMut(ScanUpdate),
{
    while let Some(frame) = source.next_frame()? {
        clock.advance_to(frame.captured_at_ms);
        publish(scanner.process_frame(&frame).await);
    }
    Ok(())
}
