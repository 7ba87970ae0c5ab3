//! Contract for whatever draws the two plots.
//!
//! The core never owns a window or a canvas; the host hands a sink to
//! [`Visualizer::on_tick`](crate::engine::Visualizer::on_tick) and the sink
//! decides how to render.

use crate::ipc::events::CaptureStatusEvent;

pub trait DisplaySink {
    /// Waveform: x is the time axis (ms), y the raw samples.
    fn set_time_series(&mut self, x: &[f32], y: &[f32]);

    /// Spectrum: x is the frequency axis (Hz), y the gained magnitudes.
    fn set_frequency_series(&mut self, x: &[f32], y: &[f32]);

    /// Called once after both series were updated for a tick.
    fn redraw(&mut self);

    /// Capture lifecycle changes, e.g. "capture stopped" after a failure.
    fn show_status(&mut self, _event: &CaptureStatusEvent) {}
}
