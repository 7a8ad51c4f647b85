//! Live scanning loop
//!
//! Frames arrive on a fixed tick while at most one recognition job runs on
//! the runtime. Frames that land while the job runs are reported as busy.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use futures_util::future::OptionFuture;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{PendingJob, Scanner};
use crate::capture::FrameSource;
use crate::shared::{ScanStatus, ScanUpdate, SharedScanState};
use crate::vision::{Recognition, RecognitionError};

type RecognitionTask = JoinHandle<Result<Recognition, RecognitionError>>;

/// Scan `source` until it runs dry or `cancel` fires.
///
/// Every update goes to `state` and then down `updates`. A closed channel
/// does not stop the loop. Returns the scanner so callers can read the final
/// estimate.
pub async fn run_live<S>(
    mut scanner: Scanner,
    mut source: S,
    frame_period: Duration,
    updates: Sender<ScanUpdate>,
    state: Arc<RwLock<SharedScanState>>,
    cancel: CancellationToken,
) -> Scanner
where
    S: FrameSource,
{
    let mut ticker = tokio::time::interval(frame_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: Option<(PendingJob, RecognitionTask)> = None;
    let mut exhausted = false;

    let publish = |update: ScanUpdate| {
        state.write().apply(&update);
        if updates.send(update).is_err() {
            debug!("Update receiver dropped");
        }
    };

    info!(
        "Live scan started ({}ms frame period, {}ms interval, focus threshold {:.1})",
        frame_period.as_millis(),
        scanner.admission().interval_ms(),
        scanner.admission().focus_threshold()
    );

    loop {
        if exhausted && in_flight.is_none() {
            info!("Frame source exhausted");
            break;
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                if let Some((job, task)) = in_flight.take() {
                    task.abort();
                    scanner.abandon(job);
                }
                info!("Live scan cancelled");
                break;
            }

            Some(joined) = OptionFuture::from(in_flight.as_mut().map(|(_, task)| task)) => {
                let result = joined.unwrap_or_else(|e| Err(RecognitionError::Aborted(e.to_string())));
                if let Some((job, _)) = in_flight.take() {
                    publish(scanner.complete(job, result));
                }
            }

            _ = ticker.tick(), if !exhausted => {
                let frame = match source.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        exhausted = true;
                        continue;
                    }
                    Err(e) => {
                        warn!("Frame source error: {}", e);
                        state.write().set_error(e.to_string());
                        continue;
                    }
                };

                match scanner.begin(&frame) {
                    Err(rejected) => publish(rejected),
                    Ok((job, request)) => {
                        let task = tokio::spawn(job.recognition(scanner.engine(), request));
                        publish(ScanUpdate {
                            frame_seq: frame.seq,
                            at_ms: job.admitted_at_ms(),
                            status: ScanStatus::Admitted {
                                job_id: job.id().to_string(),
                            },
                            estimate: scanner.estimate().cloned(),
                        });
                        in_flight = Some((job, task));
                    }
                }
            }
        }
    }

    scanner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Code;
    use crate::capture::{Frame, MemorySource};
    use crate::config::AppConfig;
    use crate::scanner::log_capture::LogBuffer;
    use crate::shared::SystemClock;
    use crate::vision::{ScriptedEngine, ScriptedResponse};
    use image::RgbaImage;

    fn frames(count: u64) -> MemorySource {
        MemorySource::new((0..count).map(|i| Frame::new(i, i * 33, RgbaImage::new(32, 24)).with_sharpness(150.0)))
    }

    fn engine(count: u64, latency_ms: u64) -> Arc<ScriptedEngine> {
        let mut engine = ScriptedEngine::default();
        for seq in 0..count {
            engine.insert(seq, ScriptedResponse::text("AKE 12345 CI", 85.0).with_latency(latency_ms));
        }
        Arc::new(engine)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_job_in_flight() {
        let engine = engine(40, 100);
        let scanner = Scanner::new(&AppConfig::default(), engine.clone(), Arc::new(SystemClock::new()));
        let state = Arc::new(RwLock::new(SharedScanState::new()));
        let (tx, rx) = crossbeam_channel::unbounded();

        let scanner = run_live(
            scanner,
            frames(40),
            Duration::from_millis(33),
            tx,
            Arc::clone(&state),
            CancellationToken::new(),
        )
        .await;

        let updates: Vec<ScanUpdate> = rx.try_iter().collect();
        let count = |label: &str| updates.iter().filter(|u| u.status.label() == label).count();

        assert_eq!(engine.max_concurrent(), 1);
        assert!(count("busy") >= 1);
        assert!(count("too_soon") >= 1);
        assert!(count("validated") >= 2);
        assert_eq!(count("admitted"), count("validated"));
        assert_eq!(scanner.estimate().map(Code::as_str), Some("AKE12345CI"));
        assert!(!scanner.admission().in_flight());

        let state = state.read();
        assert_eq!(state.counters.validated as usize, count("validated"));
        assert_eq!(state.estimate.as_ref().map(Code::as_str), Some("AKE12345CI"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_running_job() {
        let engine = engine(10, 60_000);
        let scanner = Scanner::new(&AppConfig::default(), engine.clone(), Arc::new(SystemClock::new()));
        let state = Arc::new(RwLock::new(SharedScanState::new()));
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_live(
            scanner,
            frames(10),
            Duration::from_millis(33),
            tx,
            state,
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
        let scanner = task.await.unwrap();

        assert!(!scanner.admission().in_flight());
        assert!(scanner.estimate().is_none());
        assert!(rx.try_iter().all(|u| u.status.label() != "validated"));
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recognition_logs_carry_job_id() {
        let logs = LogBuffer::default();
        let _guard = tracing::subscriber::set_default(logs.subscriber());

        let scanner = Scanner::new(&AppConfig::default(), engine(1, 50), Arc::new(SystemClock::new()));
        let state = Arc::new(RwLock::new(SharedScanState::new()));
        let (tx, rx) = crossbeam_channel::unbounded();

        run_live(scanner, frames(1), Duration::from_millis(33), tx, state, CancellationToken::new()).await;

        let job_id = rx
            .try_iter()
            .find_map(|u| match u.status {
                ScanStatus::Admitted { job_id } => Some(job_id),
                _ => None,
            })
            .unwrap();
        let lines = logs.lines();
        for needle in ["Recognizing frame 0", "Scripted recognize for frame 0", "Released admission"] {
            let line = lines.iter().find(|l| l.contains(needle)).unwrap();
            assert!(line.contains(&job_id), "{}", line);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_does_not_stop_loop() {
        let engine = engine(3, 0);
        let scanner = Scanner::new(&AppConfig::default(), engine, Arc::new(SystemClock::new()));
        let state = Arc::new(RwLock::new(SharedScanState::new()));
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);

        let scanner = run_live(
            scanner,
            frames(3),
            Duration::from_millis(33),
            tx,
            Arc::clone(&state),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(scanner.estimate().map(Code::as_str), Some("AKE12345CI"));
        assert_eq!(state.read().counters.admitted, 1);
    }
}
