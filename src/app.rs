//! Application Coordinator
//!
//! Owns a live scanning session: the shared state, the update channel and
//! the background task running the scan loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::capture::FrameSource;
use crate::config::AppConfig;
use crate::scanner::{run_live, Scanner};
use crate::shared::{Clock, ScanUpdate, SharedScanState};
use crate::vision::RecognitionEngine;

/// Main application coordinator
pub struct ScannerApp {
    config: AppConfig,
    /// Latest estimate and counters, readable at any time
    pub shared_state: Arc<RwLock<SharedScanState>>,
    /// Per-frame updates from the scan loop
    pub updates: Receiver<ScanUpdate>,
    updates_tx: Sender<ScanUpdate>,
    cancel: CancellationToken,
    scan_handle: Option<JoinHandle<Scanner>>,
}

impl ScannerApp {
    pub fn new(config: AppConfig) -> Self {
        let (updates_tx, updates) = unbounded();
        Self {
            config,
            shared_state: Arc::new(RwLock::new(SharedScanState::new())),
            updates,
            updates_tx,
            cancel: CancellationToken::new(),
            scan_handle: None,
        }
    }

    /// Start scanning `source` on the runtime. Must be called within a tokio runtime.
    pub fn start_live<S>(
        &mut self,
        source: S,
        engine: Arc<dyn RecognitionEngine>,
        clock: Arc<dyn Clock>,
        frame_period: Duration,
    ) -> Result<()>
    where
        S: FrameSource + 'static,
    {
        if self.is_running() {
            anyhow::bail!("A scan is already running");
        }

        info!("Starting live scan with the {} engine", engine.name());
        let scanner = Scanner::new(&self.config, engine, clock);
        self.scan_handle = Some(tokio::spawn(run_live(
            scanner,
            source,
            frame_period,
            self.updates_tx.clone(),
            Arc::clone(&self.shared_state),
            self.cancel.child_token(),
        )));
        Ok(())
    }

    /// Check if the scan loop is still running
    pub fn is_running(&self) -> bool {
        self.scan_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the scan to end on its own and hand back the scanner.
    ///
    /// Cancel safe: the task handle is only released once the task has
    /// finished, so a dropped `wait` leaves the scan owned by the app.
    pub async fn wait(&mut self) -> Result<Option<Scanner>> {
        let Some(handle) = self.scan_handle.as_mut() else {
            return Ok(None);
        };
        let joined = handle.await;
        self.scan_handle = None;
        Ok(Some(joined.context("Scan task failed")?))
    }

    /// Cancel the scan and wait for the loop to stop
    pub async fn shutdown(&mut self) -> Result<Option<Scanner>> {
        self.cancel.cancel();
        self.wait().await
    }
}

impl Drop for ScannerApp {
    fn drop(&mut self) {
        // Stop the scan loop; an abandoned job is aborted by the loop itself
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Frame, MemorySource};
    use crate::shared::SystemClock;
    use crate::vision::{ScriptedEngine, ScriptedResponse};
    use image::RgbaImage;

    fn source() -> MemorySource {
        MemorySource::new((0..20).map(|i| Frame::new(i, i * 33, RgbaImage::new(16, 16)).with_sharpness(500.0)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_session_publishes_estimate() {
        let mut engine = ScriptedEngine::default();
        engine.insert(0, ScriptedResponse::text("RKN 54321 NH", 77.0).with_latency(40));

        let mut app = ScannerApp::new(AppConfig::default());
        app.start_live(source(), Arc::new(engine), Arc::new(SystemClock::new()), Duration::from_millis(33))
            .unwrap();
        assert!(app.start_live(source(), Arc::new(ScriptedEngine::default()), Arc::new(SystemClock::new()), Duration::from_millis(33)).is_err());

        let scanner = app.wait().await.unwrap().unwrap();
        assert_eq!(scanner.estimate().map(|c| c.as_str()), Some("RKN54321NH"));

        let state = app.shared_state.read();
        assert_eq!(state.counters.validated, 1);
        assert_eq!(state.counters.admitted + state.counters.rejected(), 20);
        assert_eq!(app.updates.try_iter().count() as u64, 21);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_after_interrupted_wait() {
        let mut engine = ScriptedEngine::default();
        engine.insert(0, ScriptedResponse::text("PMC67890BR", 90.0).with_latency(30_000));

        let mut app = ScannerApp::new(AppConfig::default());
        app.start_live(source(), Arc::new(engine), Arc::new(SystemClock::new()), Duration::from_millis(33))
            .unwrap();

        tokio::select! {
            result = app.wait() => panic!("scan ended before the timer: {:?}", result.map(|s| s.is_some())),
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
        assert!(app.is_running());

        let scanner = app.shutdown().await.unwrap();
        assert!(scanner.is_some_and(|s| !s.admission().in_flight()));
        assert!(!app.is_running());

        let published = app.updates.try_iter().count();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(app.updates.try_iter().count(), 0);
        assert!(published > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_scan() {
        let mut engine = ScriptedEngine::default();
        engine.insert(0, ScriptedResponse::text("AKE12345CI", 90.0).with_latency(30_000));

        let mut app = ScannerApp::new(AppConfig::default());
        app.start_live(source(), Arc::new(engine), Arc::new(SystemClock::new()), Duration::from_millis(33))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let scanner = app.shutdown().await.unwrap().unwrap();
        assert!(scanner.estimate().is_none());
        assert!(!app.is_running());
    }
}
