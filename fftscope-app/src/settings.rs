//! Persistent application settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};

use fftscope_core::{Controls, PipelineConfig, WindowKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub input_device: Option<String>,
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub window: WindowKind,
    pub low_db: f64,
    pub high_db: f64,
    pub ceiling: f32,
    pub tick_interval_ms: u64,
    pub auto_gain: bool,
    /// Manual gain applied while auto-gain is off.
    pub manual_gain_db: f64,
    pub cutoff_bins: usize,
    /// Columns used by the terminal spectrum.
    pub plot_width: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        let controls = Controls::default();
        Self {
            input_device: None,
            sample_rate: pipeline.sample_rate,
            chunk_size: pipeline.chunk_size,
            window: pipeline.window,
            low_db: pipeline.low_db,
            high_db: pipeline.high_db,
            ceiling: pipeline.ceiling,
            tick_interval_ms: pipeline.tick_interval_ms,
            auto_gain: controls.auto_gain,
            manual_gain_db: 0.0,
            cutoff_bins: controls.cutoff_bins,
            plot_width: 64,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let defaults = Self::default();
        self.sample_rate = self.sample_rate.clamp(4_000, 192_000);
        // FFT length must be even; keep it in a range a terminal can show.
        self.chunk_size = (self.chunk_size.clamp(64, 65_536) / 2) * 2;
        if !(self.low_db.is_finite() && self.high_db.is_finite()) || self.low_db >= self.high_db {
            self.low_db = defaults.low_db;
            self.high_db = defaults.high_db;
        }
        if !self.ceiling.is_finite() || self.ceiling <= 0.0 {
            self.ceiling = defaults.ceiling;
        }
        self.tick_interval_ms = self.tick_interval_ms.clamp(10, 5_000);
        self.manual_gain_db = if self.manual_gain_db.is_finite() {
            self.manual_gain_db.clamp(self.low_db, self.high_db)
        } else {
            0.0f64.clamp(self.low_db, self.high_db)
        };
        self.cutoff_bins = self.cutoff_bins.min(self.chunk_size / 2);
        self.plot_width = self.plot_width.clamp(8, 512);
        self.input_device = self
            .input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            window: self.window,
            low_db: self.low_db,
            high_db: self.high_db,
            ceiling: self.ceiling,
            tick_interval_ms: self.tick_interval_ms,
            input_device: self.input_device.clone(),
            ..PipelineConfig::new(self.sample_rate, self.chunk_size)
        }
    }

    pub fn controls(&self) -> Controls {
        Controls {
            auto_gain: self.auto_gain,
            cutoff_bins: self.cutoff_bins,
        }
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fftscope")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".config")
            })
            .join("fftscope")
            .join("settings.json")
    }
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
