//! Per-tick gain decision for the frequency plot.
//!
//! Two modes, switched by [`Controls::auto_gain`](crate::config::Controls):
//!
//! - **Auto**: scale the loudest bin of the cutoff-filtered spectrum to the
//!   configured ceiling, and write the result back into the manual scale so
//!   its readout follows the live value.
//! - **Manual**: use the scale's current power ratio.

pub mod scale;

use tracing::debug;

use crate::error::Result;
pub use scale::{DecibelScale, ScaleChange, TickMark};

/// Owns the manual gain scale and the last applied gain.
#[derive(Debug)]
pub struct GainController {
    scale: DecibelScale,
    ceiling: f32,
    last_gain: f32,
    degenerate_ticks: u64,
}

impl GainController {
    /// # Errors
    /// Propagates `ScopeError::InvalidConfig` from [`DecibelScale::new`].
    pub fn new(low_db: f64, high_db: f64, ceiling: f32) -> Result<Self> {
        let scale = DecibelScale::new(low_db, high_db)?;
        let last_gain = scale.power_ratio() as f32;
        Ok(Self {
            scale,
            ceiling,
            last_gain,
            degenerate_ticks: 0,
        })
    }

    pub fn scale(&self) -> &DecibelScale {
        &self.scale
    }

    /// Mutable access for the controls surface (manual slider moves,
    /// subscriptions).
    pub fn scale_mut(&mut self) -> &mut DecibelScale {
        &mut self.scale
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Gain applied on the most recent tick.
    pub fn last_gain(&self) -> f32 {
        self.last_gain
    }

    /// Ticks where auto-gain had nothing to normalize against.
    pub fn degenerate_ticks(&self) -> u64 {
        self.degenerate_ticks
    }

    /// Resolve the multiplier for this tick.
    ///
    /// `peak` is the largest bin magnitude after cutoff zeroing and before
    /// any scaling. When auto-gain cannot produce a finite value (silence,
    /// or everything zeroed by the cutoff) the previous gain is kept and the
    /// scale is left alone.
    pub fn resolve(&mut self, auto_gain: bool, peak: f32) -> f32 {
        if !auto_gain {
            self.last_gain = self.scale.power_ratio() as f32;
            return self.last_gain;
        }

        let gain = self.ceiling / peak;
        if peak > 0.0 && gain.is_finite() {
            self.scale.set_power_ratio(f64::from(gain));
            self.last_gain = gain;
        } else {
            self.degenerate_ticks += 1;
            debug!(
                peak,
                retained = self.last_gain,
                "degenerate spectrum; keeping previous gain"
            );
        }
        self.last_gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn controller() -> GainController {
        GainController::new(-24.0, 24.0, 1.0).expect("valid bounds")
    }

    #[test]
    fn manual_mode_uses_scale_power_ratio() {
        let mut gc = controller();
        gc.scale_mut().set_decibel(10.0);
        let gain = gc.resolve(false, 123.0);
        assert_relative_eq!(gain, 10.0, max_relative = 1e-4);
    }

    #[test]
    fn auto_mode_normalizes_peak_and_updates_scale() {
        let mut gc = controller();
        let gain = gc.resolve(true, 0.25);
        assert_relative_eq!(gain, 4.0);
        assert_relative_eq!(gc.scale().power_ratio(), 4.0, max_relative = 1e-4);
    }

    #[test]
    fn auto_mode_targets_configured_ceiling() {
        let mut gc = GainController::new(-24.0, 24.0, 0.5).expect("valid bounds");
        assert_eq!(gc.ceiling(), 0.5);
        assert_relative_eq!(gc.resolve(true, 0.25), 2.0);
    }

    #[test]
    fn auto_mode_applies_unclamped_gain_but_scale_clamps() {
        let mut gc = controller();
        let gain = gc.resolve(true, 1e-4);
        assert_relative_eq!(gain, 1e4, max_relative = 1e-6);
        assert_eq!(gc.scale().position(), DecibelScale::INT_MAX);
    }

    #[test]
    fn silence_keeps_previous_gain() {
        let mut gc = controller();
        let first = gc.resolve(true, 0.5);
        let position = gc.scale().position();
        let second = gc.resolve(true, 0.0);
        assert!(second.is_finite());
        assert_eq!(second, first);
        assert_eq!(gc.scale().position(), position);
        assert_eq!(gc.degenerate_ticks(), 1);
    }

    #[test]
    fn tiny_peak_with_infinite_gain_is_degenerate() {
        let mut gc = controller();
        let before = gc.last_gain();
        let gain = gc.resolve(true, f32::from_bits(1));
        assert_eq!(gain, before);
        assert_eq!(gc.degenerate_ticks(), 1);
    }
}
