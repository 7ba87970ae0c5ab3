//! Session-wide pipeline configuration.
//!
//! `PipelineConfig` is built once at startup, validated, and handed by
//! reference to every component. Nothing reads format constants from
//! shared global state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScopeError};
use crate::spectrum::window::WindowKind;

/// Immutable configuration for one capture/visualization session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct PipelineConfig {
    /// Capture sample rate (Hz). Default: 48000.
    pub sample_rate: u32,
    /// Samples per captured chunk; also the FFT length. Must be even.
    /// Default: 8192.
    pub chunk_size: usize,
    /// Frames the recorder pulls per internal read. Unset means
    /// `chunk_size / 16`; read it through [`PipelineConfig::block_size`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_size: Option<usize>,
    /// Window applied before the FFT. Default: rectangular (no shaping).
    pub window: WindowKind,
    /// Lower bound of the manual gain scale (dB). Default: -24.
    pub low_db: f64,
    /// Upper bound of the manual gain scale (dB). Default: +24.
    pub high_db: f64,
    /// Magnitude the loudest bin is normalized to under auto-gain.
    /// Also the y-axis limit of both plots. Default: 1.0.
    pub ceiling: f32,
    /// Display tick period in milliseconds. Default: 100.
    pub tick_interval_ms: u64,
    /// Upper bound on waiting for the capture thread at teardown.
    /// Default: 2000 ms.
    pub join_timeout_ms: u64,
    /// Preferred input device name; `None` uses the system default.
    pub input_device: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            chunk_size: 8192,
            block_size: None,
            window: WindowKind::Rectangular,
            low_db: -24.0,
            high_db: 24.0,
            ceiling: 1.0,
            tick_interval_ms: 100,
            join_timeout_ms: 2_000,
            input_device: None,
        }
    }
}

impl PipelineConfig {
    /// Build a config for the given rate and chunk size, keeping every
    /// other field at its default.
    pub fn new(sample_rate: u32, chunk_size: usize) -> Self {
        Self {
            sample_rate,
            chunk_size,
            ..Self::default()
        }
    }

    /// Check the invariants every component relies on.
    ///
    /// # Errors
    /// `ScopeError::InvalidConfig` naming the first violated field.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ScopeError::InvalidConfig("sample rate must be > 0".into()));
        }
        if self.chunk_size == 0 || self.chunk_size % 2 != 0 {
            return Err(ScopeError::InvalidConfig(format!(
                "chunk size must be a positive even number, got {}",
                self.chunk_size
            )));
        }
        let block_size = self.block_size();
        if block_size == 0 || block_size > self.chunk_size {
            return Err(ScopeError::InvalidConfig(format!(
                "block size must be in 1..={}, got {}",
                self.chunk_size, block_size
            )));
        }
        if !(self.low_db.is_finite() && self.high_db.is_finite()) || self.low_db >= self.high_db {
            return Err(ScopeError::InvalidConfig(format!(
                "gain bounds must satisfy low_db < high_db, got {}..{}",
                self.low_db, self.high_db
            )));
        }
        if !(self.ceiling.is_finite() && self.ceiling > 0.0) {
            return Err(ScopeError::InvalidConfig(format!(
                "ceiling must be positive, got {}",
                self.ceiling
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(ScopeError::InvalidConfig("tick interval must be > 0".into()));
        }
        Ok(())
    }

    /// Recorder read size: the explicit `block_size`, else `chunk_size / 16`
    /// (at least 1).
    pub fn block_size(&self) -> usize {
        self.block_size
            .unwrap_or_else(|| (self.chunk_size / 16).max(1))
    }

    /// Number of non-negative frequency bins: `chunk_size / 2 + 1`.
    pub fn bin_count(&self) -> usize {
        self.chunk_size / 2 + 1
    }

    /// Largest usable cutoff: `chunk_size / 2`. The Nyquist bin is never
    /// zeroed by the cutoff.
    pub fn max_cutoff_bins(&self) -> usize {
        self.chunk_size / 2
    }

    /// Frequency of a bin index in Hz (`bin * rate / chunk_size`).
    /// Used to label the cutoff control.
    pub fn bin_to_hz(&self, bin: usize) -> f64 {
        bin as f64 * self.sample_rate as f64 / self.chunk_size as f64
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Wall-clock length of one chunk.
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_size as f64 / self.sample_rate as f64)
    }
}

/// User-mutable controls, read at the start of every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct Controls {
    /// Normalize the loudest bin to the ceiling each tick.
    pub auto_gain: bool,
    /// Number of lowest bins forced to zero (a bin count, not Hz).
    pub cutoff_bins: usize,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            auto_gain: true,
            cutoff_bins: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_live_fft_settings() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.sample_rate, 48_000);
        assert_eq!(cfg.chunk_size, 8192);
        assert_eq!(cfg.block_size(), 512);
        assert_eq!(cfg.bin_count(), 4097);
        assert_eq!(cfg.max_cutoff_bins(), 4096);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_odd_chunk_size() {
        let cfg = PipelineConfig::new(48_000, 1023);
        assert!(matches!(cfg.validate(), Err(ScopeError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_inverted_gain_bounds() {
        let cfg = PipelineConfig {
            low_db: 6.0,
            high_db: 6.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ScopeError::InvalidConfig(_))));
    }

    #[test]
    fn bin_to_hz_uses_rate_over_chunk() {
        let cfg = PipelineConfig::new(48_000, 8);
        assert_eq!(cfg.bin_to_hz(1), 6000.0);
        assert_eq!(cfg.bin_to_hz(4), 24000.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"sampleRate":4000,"chunkSize":1024}"#).expect("parse");
        assert_eq!(cfg.sample_rate, 4000);
        assert_eq!(cfg.chunk_size, 1024);
        assert_eq!(cfg.tick_interval_ms, 100);
        assert_eq!(cfg.window, WindowKind::Rectangular);
        assert_eq!(cfg.block_size(), 64);
    }

    #[test]
    fn block_size_follows_chunk_size_unless_set() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{"chunkSize":256}"#).expect("parse");
        assert_eq!(cfg.block_size(), 16);
        assert!(cfg.validate().is_ok());

        let explicit: PipelineConfig =
            serde_json::from_str(r#"{"chunkSize":256,"blockSize":32}"#).expect("parse");
        assert_eq!(explicit.block_size(), 32);

        let oversized = PipelineConfig {
            block_size: Some(512),
            ..PipelineConfig::new(48_000, 256)
        };
        assert!(matches!(oversized.validate(), Err(ScopeError::InvalidConfig(_))));
    }
}
