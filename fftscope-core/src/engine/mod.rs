//! `Visualizer`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! Visualizer::new()          → config validated, status = Idle
//!     └─► start()            → source open on the capture thread, status = Running
//!         └─► on_tick(sink)  → newest chunk → SpectrumFrame → sink   (every tick)
//!             └─► stop()     → flag set, bounded join, status = Stopped
//! ```
//!
//! Calling `start()`/`stop()` in the wrong state returns an error rather than
//! panicking. Dropping the visualizer stops and joins the capture thread if
//! one was started.
//!
//! ## Threading
//!
//! Only the capture thread runs in the background. Everything else, including
//! the FFT, happens on whichever thread calls `on_tick`, so the visualizer is
//! driven through `&mut self` and needs no interior locking of its own.

pub mod diagnostics;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    audio::{AudioCapture, AudioSource},
    config::{Controls, PipelineConfig},
    display::DisplaySink,
    error::Result,
    gain::GainController,
    ipc::events::{CaptureStatus, CaptureStatusEvent, FrameSummary},
    spectrum::{SpectrumFrame, SpectrumProcessor},
};

pub use diagnostics::{DiagnosticsSnapshot, PipelineDiagnostics};

/// Broadcast channel capacity: 64 status events buffered for slow consumers.
const BROADCAST_CAP: usize = 64;

/// The top-level visualizer handle.
pub struct Visualizer {
    config: PipelineConfig,
    capture: AudioCapture,
    processor: SpectrumProcessor,
    gain: GainController,
    controls: Controls,
    /// Broadcast sender for status events.
    status_tx: broadcast::Sender<CaptureStatusEvent>,
    /// Last status published, so each transition goes out once.
    published: CaptureStatus,
    /// Number of frames rendered so far.
    seq: u64,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl Visualizer {
    /// Build a visualizer around `source`. Does not start capturing.
    ///
    /// # Errors
    /// `ScopeError::InvalidConfig` if `config` fails validation.
    pub fn new(config: PipelineConfig, source: Box<dyn AudioSource>) -> Result<Self> {
        config.validate()?;
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let diagnostics = Arc::new(PipelineDiagnostics::default());
        let gain = GainController::new(config.low_db, config.high_db, config.ceiling)?;

        info!(
            sample_rate = config.sample_rate,
            chunk_size = config.chunk_size,
            window = ?config.window,
            source = %source.describe(),
            "visualizer configured"
        );

        Ok(Self {
            capture: AudioCapture::new(config.clone(), source, Arc::clone(&diagnostics)),
            processor: SpectrumProcessor::new(&config, Arc::clone(&diagnostics)),
            gain,
            controls: Controls::default(),
            status_tx,
            published: CaptureStatus::Idle,
            seq: 0,
            diagnostics,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start the capture thread.
    ///
    /// Blocks until the source is confirmed open (or fails), then returns.
    ///
    /// # Errors
    /// - `AlreadyRunning` / `NotRestartable` in the wrong state.
    /// - The source's open error (`NoDefaultInputDevice`, `AudioDevice`, ...).
    pub fn start(&mut self) -> Result<()> {
        if self.capture.status().status == CaptureStatus::Idle {
            self.diagnostics.reset();
        }
        match self.capture.start() {
            Ok(()) => {
                // The thread may already have moved on; later ticks catch up.
                self.publish(CaptureStatusEvent {
                    status: CaptureStatus::Running,
                    detail: None,
                });
                info!("visualizer started");
                Ok(())
            }
            Err(e) => {
                self.publish_status();
                Err(e)
            }
        }
    }

    /// Stop the capture thread and wait for it. A no-op if `start()` was
    /// never called.
    ///
    /// # Errors
    /// - `CaptureFailed` if the capture thread had died on a failure.
    /// - `JoinTimeout` if the thread did not exit in time.
    pub fn stop(&mut self) -> Result<()> {
        if self.capture.status().status == CaptureStatus::Idle {
            debug!("stop requested before start");
            return Ok(());
        }
        info!("visualizer stop requested");
        let result = self.capture.stop();
        self.publish_status();
        result
    }

    /// One display tick: report capture state changes, then render the
    /// newest chunk if there is one.
    ///
    /// Returns `None` when nothing new was captured; the sink keeps showing
    /// the previous frame.
    pub fn on_tick(&mut self, sink: &mut dyn DisplaySink) -> Option<&SpectrumFrame> {
        if let Some(event) = self.publish_status() {
            sink.show_status(&event);
        }
        let frame = self
            .processor
            .on_tick(self.capture.buffer(), self.controls, &mut self.gain, sink)?;
        self.seq += 1;
        Some(frame)
    }

    /// Summary of the most recent frame, numbered by render order.
    pub fn frame_summary(&self) -> Option<FrameSummary> {
        let frame = self.processor.last_frame()?;
        Some(FrameSummary::from_frame(
            self.seq,
            frame,
            self.processor.frequency_axis(),
        ))
    }

    pub fn last_frame(&self) -> Option<&SpectrumFrame> {
        self.processor.last_frame()
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    /// Replace the controls; takes effect on the next tick. The cutoff is
    /// clamped to `chunk_size / 2`.
    pub fn set_controls(&mut self, controls: Controls) {
        let cutoff_bins = controls.cutoff_bins.min(self.config.max_cutoff_bins());
        if cutoff_bins != controls.cutoff_bins {
            warn!(
                requested = controls.cutoff_bins,
                clamped = cutoff_bins,
                "cutoff beyond nyquist"
            );
        }
        self.controls = Controls {
            cutoff_bins,
            ..controls
        };
    }

    pub fn gain(&self) -> &GainController {
        &self.gain
    }

    /// Manual gain lives on the controller's decibel scale.
    pub fn gain_mut(&mut self) -> &mut GainController {
        &mut self.gain
    }

    pub fn time_axis(&self) -> &[f32] {
        self.processor.time_axis()
    }

    pub fn frequency_axis(&self) -> &[f32] {
        self.processor.frequency_axis()
    }

    /// Current capture status (snapshot).
    pub fn status(&self) -> CaptureStatusEvent {
        self.capture.status()
    }

    /// Subscribe to capture status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<CaptureStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    /// Broadcast the current capture status if it changed since the last
    /// publication.
    fn publish_status(&mut self) -> Option<CaptureStatusEvent> {
        let event = self.capture.status();
        self.publish(event)
    }

    fn publish(&mut self, event: CaptureStatusEvent) -> Option<CaptureStatusEvent> {
        if event.status == self.published {
            return None;
        }
        self.published = event.status;
        if event.status == CaptureStatus::Error {
            warn!(
                detail = event.detail.as_deref().unwrap_or(""),
                "capture stopped"
            );
        }
        let _ = self.status_tx.send(event.clone());
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Recorder;
    use crate::error::ScopeError;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Silence;

    struct SilenceRecorder {
        stop: Arc<AtomicBool>,
    }

    impl AudioSource for Silence {
        fn open(&mut self, _config: &PipelineConfig, stop: Arc<AtomicBool>) -> Result<Box<dyn Recorder>> {
            Ok(Box::new(SilenceRecorder { stop }))
        }
    }

    impl Recorder for SilenceRecorder {
        fn read_block(&mut self, frames: usize) -> Result<Vec<f32>> {
            std::thread::sleep(std::time::Duration::from_millis(1));
            if self.stop.load(Ordering::Acquire) {
                return Err(ScopeError::Interrupted);
            }
            Ok(vec![0.0; frames])
        }
    }

    fn visualizer() -> Visualizer {
        Visualizer::new(PipelineConfig::new(8_000, 8), Box::new(Silence)).expect("valid config")
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = PipelineConfig {
            ceiling: 0.0,
            ..PipelineConfig::new(8_000, 8)
        };
        assert!(matches!(
            Visualizer::new(cfg, Box::new(Silence)),
            Err(ScopeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn stop_before_start_is_a_noop() {
        let mut vis = visualizer();
        let mut rx = vis.subscribe_status();
        assert!(vis.stop().is_ok());
        assert_eq!(vis.status().status, CaptureStatus::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn start_and_stop_publish_each_transition_once() {
        let mut vis = visualizer();
        let mut rx = vis.subscribe_status();
        vis.start().expect("start");
        vis.stop().expect("stop");

        assert_eq!(rx.try_recv().expect("running").status, CaptureStatus::Running);
        assert_eq!(rx.try_recv().expect("stopped").status, CaptureStatus::Stopped);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn cutoff_is_clamped_below_nyquist() {
        let mut vis = visualizer();
        vis.set_controls(Controls {
            auto_gain: false,
            cutoff_bins: 100,
        });
        assert_eq!(vis.controls().cutoff_bins, 4);
        assert!(!vis.controls().auto_gain);
    }
}
