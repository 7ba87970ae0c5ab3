//! Event types published by the visualizer.
//!
//! | Event | Source |
//! |-------|--------|
//! | `CaptureStatusEvent` | `Visualizer::subscribe_status()` broadcast |
//! | `FrameSummary` | built per rendered tick by `FrameSummary::from_frame` |

use serde::{Deserialize, Serialize};

use crate::spectrum::SpectrumFrame;

// ---------------------------------------------------------------------------
// Capture status
// ---------------------------------------------------------------------------

/// Lifecycle of the background capture thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    /// Constructed, `start()` not yet called.
    Idle,
    /// Capture thread is pulling blocks.
    Running,
    /// Stop requested; the thread finishes its current block.
    Stopping,
    /// Thread exited normally (stop request or end of source).
    Stopped,
    /// Thread died on a capture failure; visualization is frozen.
    Error,
}

impl CaptureStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CaptureStatus::Stopped | CaptureStatus::Error)
    }
}

/// Emitted whenever the capture status changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatusEvent {
    pub status: CaptureStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Frame summaries
// ---------------------------------------------------------------------------

/// Compact description of one rendered frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSummary {
    /// Monotonically increasing frame number.
    pub seq: u64,
    /// Frequency of the loudest displayed bin (Hz).
    pub peak_hz: f32,
    /// Displayed magnitude of that bin (after gain).
    pub peak_magnitude: f32,
    /// Multiplier applied to the spectrum.
    pub gain: f32,
    /// Lowest bin that survived the cutoff, in Hz.
    pub cutoff_hz: f32,
    pub auto_gain: bool,
}

impl FrameSummary {
    pub fn from_frame(seq: u64, frame: &SpectrumFrame, freq_axis: &[f32]) -> Self {
        let (peak_bin, peak_magnitude) = frame
            .magnitudes
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, m)| if m > best.1 { (i, m) } else { best });
        let hz = |bin: usize| freq_axis.get(bin).copied().unwrap_or(0.0);
        Self {
            seq,
            peak_hz: hz(peak_bin),
            peak_magnitude,
            gain: frame.gain,
            cutoff_hz: hz(frame.cutoff_bins),
            auto_gain: frame.auto_gain,
        }
    }
}
