//! Per-tick spectrum computation.
//!
//! ## Stages (per tick)
//!
//! ```text
//! 1. Drain CaptureBuffer → keep only the newest chunk
//! 2. Time series  = chunk samples           (x: i / rate * 1000 ms)
//! 3. Spectrum     = rfft(window · chunk)    (x: i * rate / N Hz, N/2+1 bins)
//! 4. Zero bins [0, cutoff)
//! 5. gain = GainController::resolve(auto, max |bin|)
//! 6. Magnitudes   = |bin · gain|
//! ```
//!
//! The FFT plan, scratch space and axes are allocated once in `new()`.
//! No lock is held while any of this runs: the buffer is swapped out first.

pub mod window;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use rustfft::{num_complex::Complex32, Fft, FftPlanner};
use tracing::{debug, warn};

use crate::{
    buffering::{chunk::AudioChunk, CaptureBuffer},
    config::{Controls, PipelineConfig},
    display::DisplaySink,
    engine::diagnostics::PipelineDiagnostics,
    gain::GainController,
};

/// Result of one rendered tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    /// Time-domain samples, verbatim from the chunk.
    pub samples: Vec<f32>,
    /// Gained magnitudes of the non-negative frequency bins.
    pub magnitudes: Vec<f32>,
    /// Multiplier applied this tick.
    pub gain: f32,
    /// Largest bin magnitude after cutoff, before gain.
    pub peak: f32,
    pub cutoff_bins: usize,
    pub auto_gain: bool,
}

/// Time axis in milliseconds: `i / rate * 1000`.
pub fn time_axis(chunk_size: usize, sample_rate: u32) -> Vec<f32> {
    (0..chunk_size)
        .map(|i| i as f32 / sample_rate as f32 * 1000.0)
        .collect()
}

/// Non-negative frequency axis in Hz: `i * rate / N` for `i ∈ [0, N/2]`.
pub fn frequency_axis(chunk_size: usize, sample_rate: u32) -> Vec<f32> {
    (0..=chunk_size / 2)
        .map(|i| i as f32 * sample_rate as f32 / chunk_size as f32)
        .collect()
}

/// Turns captured chunks into plot-ready series.
pub struct SpectrumProcessor {
    chunk_size: usize,
    fft: Arc<dyn Fft<f32>>,
    /// Full-length complex work buffer; the first N/2+1 entries are the rfft.
    buffer: Vec<Complex32>,
    scratch: Vec<Complex32>,
    window: Option<Vec<f32>>,
    time_axis: Vec<f32>,
    freq_axis: Vec<f32>,
    last_frame: Option<SpectrumFrame>,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl SpectrumProcessor {
    /// `config` must already be validated (even, non-zero chunk size).
    pub fn new(config: &PipelineConfig, diagnostics: Arc<PipelineDiagnostics>) -> Self {
        let n = config.chunk_size;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let scratch = vec![Complex32::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            chunk_size: n,
            fft,
            buffer: vec![Complex32::new(0.0, 0.0); n],
            scratch,
            window: config.window.coefficients(n),
            time_axis: time_axis(n, config.sample_rate),
            freq_axis: frequency_axis(n, config.sample_rate),
            last_frame: None,
            diagnostics,
        }
    }

    pub fn time_axis(&self) -> &[f32] {
        &self.time_axis
    }

    pub fn frequency_axis(&self) -> &[f32] {
        &self.freq_axis
    }

    pub fn bin_count(&self) -> usize {
        self.freq_axis.len()
    }

    /// Frame shown by the most recent rendering tick.
    pub fn last_frame(&self) -> Option<&SpectrumFrame> {
        self.last_frame.as_ref()
    }

    /// Real-input FFT of `samples`: N/2+1 complex bins, DC at 0, Nyquist at
    /// N/2. Applies the configured window first.
    pub fn rfft(&mut self, samples: &[f32]) -> &mut [Complex32] {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let s = samples.get(i).copied().unwrap_or(0.0);
            let w = self.window.as_ref().map_or(1.0, |w| w[i]);
            *slot = Complex32::new(s * w, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        let bins = self.chunk_size / 2 + 1;
        &mut self.buffer[..bins]
    }

    /// Run the spectrum stages on one chunk.
    pub fn process_chunk(
        &mut self,
        chunk: &AudioChunk,
        controls: Controls,
        gain: &mut GainController,
    ) -> SpectrumFrame {
        let spectrum = self.rfft(&chunk.samples);
        // Nyquist (last bin) always survives.
        let cutoff = controls.cutoff_bins.min(spectrum.len() - 1);
        spectrum[..cutoff].fill(Complex32::new(0.0, 0.0));

        let peak = spectrum.iter().map(|c| c.norm()).fold(0.0f32, f32::max);
        let g = gain.resolve(controls.auto_gain, peak);
        let magnitudes = spectrum.iter().map(|c| (*c * g).norm()).collect();

        SpectrumFrame {
            samples: chunk.samples.clone(),
            magnitudes,
            gain: g,
            peak,
            cutoff_bins: cutoff,
            auto_gain: controls.auto_gain,
        }
    }

    /// Display tick entry point. Must not be called concurrently with itself.
    ///
    /// Returns the new frame, or `None` when nothing was captured since the
    /// previous tick (the sink keeps showing the previous frame).
    pub fn on_tick(
        &mut self,
        buffer: &CaptureBuffer,
        controls: Controls,
        gain: &mut GainController,
        sink: &mut dyn DisplaySink,
    ) -> Option<&SpectrumFrame> {
        self.diagnostics.ticks.fetch_add(1, Ordering::Relaxed);

        let Some((chunk, skipped)) = buffer.drain_latest() else {
            self.diagnostics.empty_ticks.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        if skipped > 0 {
            self.diagnostics
                .chunks_skipped
                .fetch_add(skipped as u64, Ordering::Relaxed);
            debug!(skipped, "display lagging; dropped older chunks");
        }

        if chunk.len() != self.chunk_size {
            self.diagnostics
                .malformed_chunks
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                got = chunk.len(),
                expected = self.chunk_size,
                "ignoring chunk with unexpected length"
            );
            return None;
        }

        let frame = self.process_chunk(&chunk, controls, gain);
        sink.set_time_series(&self.time_axis, &frame.samples);
        sink.set_frequency_series(&self.freq_axis, &frame.magnitudes);
        sink.redraw();
        self.diagnostics
            .frames_rendered
            .fetch_add(1, Ordering::Relaxed);

        self.last_frame = Some(frame);
        self.last_frame.as_ref()
    }
}
