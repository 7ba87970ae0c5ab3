//! Background audio capture.
//!
//! # Threading
//!
//! ```text
//! AudioCapture::start()
//!     └─► spawn "fftscope-capture"
//!             ├─ AudioSource::open()   (handle created on THIS thread)
//!             ├─ open result ──► start() returns
//!             └─ loop { read_block(chunk_size) → CaptureBuffer::push; check stop }
//! ```
//!
//! Device handles such as `cpal::Stream` are `!Send` on Windows/macOS, so the
//! [`Recorder`] is opened, used and dropped on the capture thread. Only the
//! [`AudioSource`] factory crosses the thread boundary.
//!
//! # Cancellation
//!
//! One shared `AtomicBool`. The loop checks it after every completed block,
//! so a block that is in flight when `stop()` is called still reaches the
//! buffer. Recorders check it only while waiting for a block that has not
//! started and then return [`ScopeError::Interrupted`], which the loop
//! treats as a normal exit. Every other recorder error is a
//! capture failure: the thread stores it, logs it and returns it through the
//! join handle so `stop()` can hand it to the owner.

pub mod device;
pub mod mic;
pub mod wav;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    buffering::{chunk::AudioChunk, CaptureBuffer},
    config::PipelineConfig,
    engine::diagnostics::PipelineDiagnostics,
    error::{Result, ScopeError},
    ipc::events::{CaptureStatus, CaptureStatusEvent},
};

pub use mic::MicrophoneSource;
pub use wav::WavFileSource;

/// Factory for a blocking mono recorder. Moved onto the capture thread.
pub trait AudioSource: Send + 'static {
    /// Open the underlying device or file.
    ///
    /// `stop` is the capture thread's cancellation flag. A recorder waiting
    /// for the first sample of a block must poll it and return
    /// `ScopeError::Interrupted` once set; a block already started is
    /// completed and returned.
    fn open(&mut self, config: &PipelineConfig, stop: Arc<AtomicBool>) -> Result<Box<dyn Recorder>>;

    /// Short label for logs.
    fn describe(&self) -> String {
        "audio source".into()
    }
}

/// Open recording handle. Released on drop.
pub trait Recorder {
    /// Block until exactly `frames` mono samples are available and return them.
    fn read_block(&mut self, frames: usize) -> Result<Vec<f32>>;
}

struct Worker {
    handle: JoinHandle<Result<()>>,
    /// Never sent on; disconnects when the capture thread exits (or panics).
    done: Receiver<()>,
}

/// Owns the capture thread and the buffer it fills.
///
/// Lifecycle: `Idle → Running → Stopping → Stopped`, or `→ Error` on a
/// capture failure. A capture runs at most once.
pub struct AudioCapture {
    config: PipelineConfig,
    source: Option<Box<dyn AudioSource>>,
    buffer: CaptureBuffer,
    stop: Arc<AtomicBool>,
    state: Arc<Mutex<CaptureStatusEvent>>,
    worker: Option<Worker>,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl AudioCapture {
    pub fn new(
        config: PipelineConfig,
        source: Box<dyn AudioSource>,
        diagnostics: Arc<PipelineDiagnostics>,
    ) -> Self {
        Self {
            config,
            source: Some(source),
            buffer: CaptureBuffer::new(),
            stop: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(CaptureStatusEvent {
                status: CaptureStatus::Idle,
                detail: None,
            })),
            worker: None,
            diagnostics,
        }
    }

    /// Consumer handle to the chunks this capture produces.
    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    /// Snapshot of the current state and failure detail.
    pub fn status(&self) -> CaptureStatusEvent {
        self.state.lock().clone()
    }

    /// Launch the capture thread and wait until the source is open.
    ///
    /// # Errors
    /// - `AlreadyRunning` while a thread is active.
    /// - `NotRestartable` after the capture has finished.
    /// - Any open error from the source (`NoDefaultInputDevice`,
    ///   `AudioDevice`, `Wav`, ...).
    pub fn start(&mut self) -> Result<()> {
        match self.state.lock().status {
            CaptureStatus::Idle => {}
            CaptureStatus::Running | CaptureStatus::Stopping => {
                return Err(ScopeError::AlreadyRunning)
            }
            CaptureStatus::Stopped | CaptureStatus::Error => {
                return Err(ScopeError::NotRestartable)
            }
        }
        let Some(mut source) = self.source.take() else {
            return Err(ScopeError::NotRestartable);
        };

        self.stop.store(false, Ordering::SeqCst);
        let (open_tx, open_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);

        let config = self.config.clone();
        let buffer = self.buffer.clone();
        let stop = Arc::clone(&self.stop);
        let state = Arc::clone(&self.state);
        let diagnostics = Arc::clone(&self.diagnostics);
        let label = source.describe();

        let handle = thread::Builder::new()
            .name("fftscope-capture".into())
            .spawn(move || {
                let _done = done_tx;

                // ── Open (must happen on THIS thread) ────────────────────────
                let recorder = match source.open(&config, Arc::clone(&stop)) {
                    Ok(r) => r,
                    Err(e) => {
                        set_state(&state, CaptureStatus::Error, Some(e.to_string()));
                        let _ = open_tx.send(Err(e));
                        return Ok(());
                    }
                };
                set_state(&state, CaptureStatus::Running, None);
                let _ = open_tx.send(Ok(()));
                info!(source = %label, "capture started");

                // ── Capture loop ─────────────────────────────────────────────
                let outcome = capture_loop(recorder, &config, &buffer, &stop, &diagnostics);

                match &outcome {
                    Ok(()) => {
                        set_state(&state, CaptureStatus::Stopped, None);
                        info!("capture stopped");
                    }
                    Err(e) => {
                        error!("capture failed: {e}");
                        set_state(&state, CaptureStatus::Error, Some(e.to_string()));
                    }
                }
                outcome
            })?;

        match open_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(Worker {
                    handle,
                    done: done_rx,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent: the thread panicked.
                let _ = handle.join();
                let msg = "capture thread died while opening the source";
                set_state(&self.state, CaptureStatus::Error, Some(msg.into()));
                Err(ScopeError::CaptureFailed(msg.into()))
            }
        }
    }

    /// Ask the capture thread to finish its current block, then wait for it
    /// (at most `config.join_timeout()`).
    ///
    /// A no-op when `start()` never ran, and after a previous `stop()`.
    ///
    /// # Errors
    /// - `CaptureFailed` when the thread ended on a capture failure.
    /// - `JoinTimeout` when it did not exit in time; it is then detached.
    pub fn stop(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        let Some(worker) = self.worker.take() else {
            debug!("stop requested with no capture thread; nothing to join");
            return Ok(());
        };

        {
            let mut state = self.state.lock();
            if state.status == CaptureStatus::Running {
                state.status = CaptureStatus::Stopping;
            }
        }

        let timeout = self.config.join_timeout();
        match worker.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "capture thread did not exit in time; detaching");
                return Err(ScopeError::JoinTimeout(timeout));
            }
        }

        match worker.handle.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(ScopeError::CaptureFailed(msg))) => Err(ScopeError::CaptureFailed(msg)),
            Ok(Err(e)) => Err(ScopeError::CaptureFailed(e.to_string())),
            Err(_) => {
                let msg = "capture thread panicked";
                set_state(&self.state, CaptureStatus::Error, Some(msg.into()));
                Err(ScopeError::CaptureFailed(msg.into()))
            }
        }
    }

    /// Teardown: stop-and-join, logging instead of returning the outcome.
    pub fn close(&mut self) {
        if let Err(e) = self.stop() {
            warn!("capture teardown: {e}");
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.close();
    }
}

fn set_state(state: &Mutex<CaptureStatusEvent>, status: CaptureStatus, detail: Option<String>) {
    let mut guard = state.lock();
    guard.status = status;
    guard.detail = detail;
}

fn capture_loop(
    mut recorder: Box<dyn Recorder>,
    config: &PipelineConfig,
    buffer: &CaptureBuffer,
    stop: &AtomicBool,
    diagnostics: &PipelineDiagnostics,
) -> Result<()> {
    loop {
        let samples = match recorder.read_block(config.chunk_size) {
            Ok(samples) => samples,
            Err(e) if e.is_interrupt() => break,
            Err(e) => return Err(e),
        };
        if samples.len() != config.chunk_size {
            return Err(ScopeError::CaptureFailed(format!(
                "recorder returned {} samples, expected {}",
                samples.len(),
                config.chunk_size
            )));
        }

        buffer.push(AudioChunk::new(samples, config.sample_rate));
        diagnostics.chunks_captured.fetch_add(1, Ordering::Relaxed);

        if stop.load(Ordering::Acquire) {
            break;
        }
    }
    // Recorder drops here, releasing the device on this thread.
    drop(recorder);
    Ok(())
}
