//! Window functions applied to a chunk before the FFT.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// Window shape. `Rectangular` passes samples through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Rectangular,
    Hann,
    Hamming,
    Blackman,
}

impl WindowKind {
    /// Precompute `size` coefficients (periodic form). `None` for the
    /// rectangular window, which needs no multiply.
    pub fn coefficients(self, size: usize) -> Option<Vec<f32>> {
        let n = size as f32;
        let coeff = |i: usize| 2.0 * PI * i as f32 / n;
        let window = match self {
            Self::Rectangular => return None,
            Self::Hann => (0..size).map(|i| 0.5 - 0.5 * coeff(i).cos()).collect(),
            Self::Hamming => (0..size).map(|i| 0.54 - 0.46 * coeff(i).cos()).collect(),
            Self::Blackman => (0..size)
                .map(|i| 0.42 - 0.5 * coeff(i).cos() + 0.08 * (2.0 * coeff(i)).cos())
                .collect(),
        };
        Some(window)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rect" | "rectangular" | "none" => Some(Self::Rectangular),
            "hann" | "hanning" => Some(Self::Hann),
            "hamming" => Some(Self::Hamming),
            "blackman" => Some(Self::Blackman),
            _ => None,
        }
    }
}
