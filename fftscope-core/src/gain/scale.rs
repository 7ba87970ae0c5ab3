//! Logarithmic gain scale backed by a bounded integer position.
//!
//! ## Mapping
//!
//! ```text
//! position ∈ [0, INT_MAX]  ──affine──►  dB ∈ [low_db, high_db]
//!                                        ├─► power ratio     10^(dB/10)
//!                                        └─► amplitude ratio 10^(dB/20)
//! ```
//!
//! The integer position is the single source of truth; every setter goes
//! through [`DecibelScale::db_to_position`] and clamps.

use crossbeam_channel::{Receiver, Sender};
use tracing::warn;

use crate::error::{Result, ScopeError};

/// Published to subscribers whenever the scale position changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleChange {
    pub position: u32,
    pub decibel: f64,
}

/// One tick marker of the rendered scale.
#[derive(Debug, Clone, PartialEq)]
pub struct TickMark {
    /// Marker value in dB.
    pub db: i32,
    /// Horizontal pixel offset inside the scale's content rect.
    pub x: f64,
    /// Text drawn next to the marker.
    pub label: String,
    /// The top marker is right-aligned so it stays inside the widget.
    pub right_aligned: bool,
}

/// Bidirectional linear ↔ decibel ↔ ratio mapping with change notifications.
#[derive(Debug)]
pub struct DecibelScale {
    low_db: f64,
    high_db: f64,
    position: u32,
    /// Render the lowest tick label as `-oo`.
    pub lowest_as_inf: bool,
    subscribers: Vec<Sender<ScaleChange>>,
}

impl DecibelScale {
    pub const INT_MIN: u32 = 0;
    pub const INT_MAX: u32 = 1_000_000;
    /// Decibel spacing between tick markers.
    pub const TICK_STEP_DB: usize = 6;
    /// Padding (px) left and right of the tick range.
    pub const TICK_PADDING: f64 = 10.0;

    /// Create a scale positioned at `low_db`.
    ///
    /// # Errors
    /// `ScopeError::InvalidConfig` unless `low_db < high_db` and both are finite.
    pub fn new(low_db: f64, high_db: f64) -> Result<Self> {
        if !(low_db.is_finite() && high_db.is_finite()) || low_db >= high_db {
            return Err(ScopeError::InvalidConfig(format!(
                "decibel scale needs low_db < high_db, got {low_db}..{high_db}"
            )));
        }
        Ok(Self {
            low_db,
            high_db,
            position: Self::INT_MIN,
            lowest_as_inf: false,
            subscribers: Vec::new(),
        })
    }

    // ── Conversions ─────────────────────────────────────────────────────

    pub fn db_to_power_ratio(db: f64) -> f64 {
        10f64.powf(db / 10.0)
    }

    pub fn db_to_amplitude_ratio(db: f64) -> f64 {
        10f64.powf(db / 20.0)
    }

    pub fn power_ratio_to_db(pr: f64) -> f64 {
        10.0 * pr.log10()
    }

    pub fn amplitude_ratio_to_db(ar: f64) -> f64 {
        20.0 * ar.log10()
    }

    /// Unrounded, unclamped position for `db`.
    pub fn db_to_position(&self, db: f64) -> f64 {
        (db - self.low_db) * f64::from(Self::INT_MAX - Self::INT_MIN) / (self.high_db - self.low_db)
    }

    pub fn position_to_db(&self, position: u32) -> f64 {
        f64::from(position - Self::INT_MIN) * (self.high_db - self.low_db)
            / f64::from(Self::INT_MAX - Self::INT_MIN)
            + self.low_db
    }

    // ── Position ────────────────────────────────────────────────────────

    pub fn position(&self) -> u32 {
        self.position
    }

    /// Move to `position`, clamped to `[INT_MIN, INT_MAX]`.
    pub fn set_position(&mut self, position: u32) {
        let clamped = position.clamp(Self::INT_MIN, Self::INT_MAX);
        if clamped == self.position {
            return;
        }
        self.position = clamped;
        self.notify();
    }

    // ── Decibel / ratio accessors ───────────────────────────────────────

    pub fn decibel(&self) -> f64 {
        self.position_to_db(self.position)
    }

    /// Set the scale to `db`. Out-of-range values clamp to the ends;
    /// NaN is ignored.
    pub fn set_decibel(&mut self, db: f64) {
        if db.is_nan() {
            warn!("ignoring NaN decibel value");
            return;
        }
        let raw = self
            .db_to_position(db)
            .clamp(f64::from(Self::INT_MIN), f64::from(Self::INT_MAX));
        self.set_position(raw.round() as u32);
    }

    pub fn power_ratio(&self) -> f64 {
        Self::db_to_power_ratio(self.decibel())
    }

    /// Set from a power ratio. `pr` must be positive and finite; anything
    /// else is ignored.
    pub fn set_power_ratio(&mut self, pr: f64) {
        if !(pr.is_finite() && pr > 0.0) {
            warn!(pr, "ignoring non-positive power ratio");
            return;
        }
        self.set_decibel(Self::power_ratio_to_db(pr));
    }

    pub fn amplitude_ratio(&self) -> f64 {
        Self::db_to_amplitude_ratio(self.decibel())
    }

    /// Set from an amplitude ratio. Same domain rule as
    /// [`set_power_ratio`](Self::set_power_ratio).
    pub fn set_amplitude_ratio(&mut self, ar: f64) {
        if !(ar.is_finite() && ar > 0.0) {
            warn!(ar, "ignoring non-positive amplitude ratio");
            return;
        }
        self.set_decibel(Self::amplitude_ratio_to_db(ar));
    }

    /// Current value formatted for the gain readout label.
    pub fn readout(&self) -> String {
        format!("{:6.1} dB", self.decibel())
    }

    // ── Notifications ───────────────────────────────────────────────────

    /// Receive a [`ScaleChange`] for every subsequent position change.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<ScaleChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self) {
        let change = ScaleChange {
            position: self.position,
            decibel: self.decibel(),
        };
        self.subscribers.retain(|tx| tx.send(change).is_ok());
    }

    // ── Rendering ───────────────────────────────────────────────────────

    /// Tick markers every 6 dB from `low_db` through `high_db`, laid out
    /// across a content rect `width` pixels wide.
    pub fn tick_marks(&self, width: f64) -> Vec<TickMark> {
        let start = self.low_db.ceil() as i32;
        let end = (self.high_db + 0.001).ceil() as i32;
        let values: Vec<i32> = (start..end).step_by(Self::TICK_STEP_DB).collect();
        let Some(&top) = values.last() else {
            return Vec::new();
        };
        let span = width - 2.0 * Self::TICK_PADDING;

        values
            .iter()
            .enumerate()
            .map(|(idx, &db)| {
                let x = self.db_to_position(f64::from(db)) * span
                    / f64::from(Self::INT_MAX - Self::INT_MIN)
                    + Self::TICK_PADDING;
                let label = if idx == 0 && self.lowest_as_inf {
                    "-oo".to_string()
                } else {
                    format!("{db:2}")
                };
                TickMark {
                    db,
                    x,
                    label,
                    right_aligned: db == top,
                }
            })
            .collect()
    }
}
