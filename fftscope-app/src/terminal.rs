//! Text display: one spectrum line per rendered frame, status lines on
//! capture state changes. In JSON mode frames are written by the caller as
//! `FrameSummary` lines and this sink only emits status events.

use std::io::Write;

use fftscope_core::{CaptureStatusEvent, DecibelScale, DisplaySink};

const LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

pub struct TerminalSink<W: Write> {
    out: W,
    width: usize,
    ceiling: f32,
    json: bool,
    /// Line composed by `redraw`, written by `present`.
    line: Option<String>,
    waveform: (f32, f32, f32),
    spectrum: String,
    peak_hz: f32,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W, width: usize, ceiling: f32, json: bool) -> Self {
        Self {
            out,
            width: width.max(1),
            ceiling,
            json,
            line: None,
            waveform: (0.0, 0.0, 0.0),
            spectrum: String::new(),
            peak_hz: 0.0,
        }
    }

    /// Write the frame composed by the last `redraw`, followed by the gain
    /// readout.
    pub fn present(&mut self, readout: &str) -> std::io::Result<()> {
        if let Some(line) = self.line.take() {
            writeln!(self.out, "{line} │ gain {readout}")?;
            self.out.flush()?;
        }
        Ok(())
    }

    /// One JSON line, e.g. a `FrameSummary`.
    pub fn write_json<T: serde::Serialize>(&mut self, value: &T) -> std::io::Result<()> {
        let json = serde_json::to_string(value).map_err(std::io::Error::other)?;
        writeln!(self.out, "{json}")?;
        self.out.flush()
    }

    /// Print a free-form line (command feedback, rulers).
    pub fn note(&mut self, text: &str) -> std::io::Result<()> {
        if !self.json {
            writeln!(self.out, "{text}")?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DisplaySink for TerminalSink<W> {
    fn set_time_series(&mut self, _x: &[f32], y: &[f32]) {
        self.waveform = waveform_stats(y);
    }

    fn set_frequency_series(&mut self, x: &[f32], y: &[f32]) {
        self.spectrum = spectrum_bars(y, self.width, self.ceiling);
        let peak_bin = y
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &m)| if m > best.1 { (i, m) } else { best })
            .0;
        self.peak_hz = x.get(peak_bin).copied().unwrap_or(0.0);
    }

    fn redraw(&mut self) {
        if self.json {
            return;
        }
        let (min, max, rms) = self.waveform;
        self.line = Some(format!(
            "│{}│ peak {:>8.1} Hz │ wave {:+.3}..{:+.3} rms {:.3}",
            self.spectrum, self.peak_hz, min, max, rms
        ));
    }

    fn show_status(&mut self, event: &CaptureStatusEvent) {
        let written = if self.json {
            serde_json::to_string(event)
                .map_err(std::io::Error::other)
                .and_then(|json| writeln!(self.out, "{json}"))
        } else {
            match &event.detail {
                Some(detail) => writeln!(self.out, "capture {:?}: {detail}", event.status),
                None => writeln!(self.out, "capture {:?}", event.status),
            }
        };
        if let Err(e) = written {
            tracing::warn!("failed to write status line: {e}");
        }
    }
}

/// Min, max and RMS of the waveform.
pub fn waveform_stats(samples: &[f32]) -> (f32, f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let (min, max) = samples
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let rms = (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt();
    (min, max, rms)
}

/// Compress the magnitudes into `width` columns (max per column), each a
/// block glyph scaled against `ceiling`.
pub fn spectrum_bars(magnitudes: &[f32], width: usize, ceiling: f32) -> String {
    if magnitudes.is_empty() || width == 0 {
        return String::new();
    }
    (0..width)
        .map(|col| {
            let start = col * magnitudes.len() / width;
            let end = ((col + 1) * magnitudes.len() / width).max(start + 1);
            let peak = magnitudes[start..end.min(magnitudes.len())]
                .iter()
                .copied()
                .fold(0.0f32, f32::max);
            let level = (peak / ceiling).clamp(0.0, 1.0) * (LEVELS.len() - 1) as f32;
            LEVELS[level.round() as usize]
        })
        .collect()
}

/// The gain scale drawn as a one-line ruler `width` columns wide, labels
/// placed at the scale's tick positions.
pub fn gain_ruler(scale: &DecibelScale, width: usize) -> String {
    let mut row = vec![' '; width];
    for mark in scale.tick_marks(width as f64) {
        let label: Vec<char> = mark.label.trim().chars().collect();
        let anchor = mark.x.round().max(0.0) as usize;
        let start = if mark.right_aligned {
            anchor.saturating_sub(label.len())
        } else {
            anchor
        };
        for (i, c) in label.into_iter().enumerate() {
            if let Some(slot) = row.get_mut(start + i) {
                *slot = c;
            }
        }
    }
    row.into_iter().collect::<String>().trim_end().to_string()
}
