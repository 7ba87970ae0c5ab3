//! # fftscope-core
//!
//! Live waveform + spectrum pipeline SDK.
//!
//! ## Architecture
//!
//! ```text
//! AudioSource ─► capture thread ─► CaptureBuffer (swap-drained)
//!   (cpal mic / WAV)                      │
//!                                   display tick
//!                                         │
//!                     SpectrumProcessor (rustfft) ◄── GainController ◄── DecibelScale
//!                                         │
//!                                    DisplaySink
//! ```
//!
//! The cpal callback only pushes into a lock-free ring. The FFT runs on the
//! tick, never under a lock.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod gain;
pub mod ipc;
pub mod spectrum;

// Convenience re-exports for downstream crates
pub use audio::{
    device::{list_input_devices, DeviceInfo},
    AudioSource, MicrophoneSource, Recorder, WavFileSource,
};
pub use config::{Controls, PipelineConfig};
pub use display::DisplaySink;
pub use engine::{DiagnosticsSnapshot, Visualizer};
pub use error::ScopeError;
pub use gain::{DecibelScale, GainController, ScaleChange, TickMark};
pub use ipc::events::{CaptureStatus, CaptureStatusEvent, FrameSummary};
pub use spectrum::{window::WindowKind, SpectrumFrame, SpectrumProcessor};
