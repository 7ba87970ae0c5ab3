//! Interactive control commands read from stdin while the scope runs.
//!
//! ```text
//! auto [on|off]     toggle or set auto-gain
//! gain <db>         manual gain (turns auto-gain off)
//! cutoff <bins>     zero the lowest <bins> frequency bins
//! status            capture state and pipeline counters
//! quit              stop and exit
//! ```

use fftscope_core::{Controls, Visualizer};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AutoGain(Option<bool>),
    ManualGain(f64),
    Cutoff(usize),
    Status,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return Err("empty command".into());
        };
        let arg = parts.next();
        if parts.next().is_some() {
            return Err(format!("too many arguments for '{verb}'"));
        }

        match (verb.to_ascii_lowercase().as_str(), arg) {
            ("auto", None) => Ok(Self::AutoGain(None)),
            ("auto", Some("on")) => Ok(Self::AutoGain(Some(true))),
            ("auto", Some("off")) => Ok(Self::AutoGain(Some(false))),
            ("gain", Some(v)) => v
                .trim_end_matches("db")
                .parse::<f64>()
                .ok()
                .filter(|db| !db.is_nan())
                .map(Self::ManualGain)
                .ok_or_else(|| format!("invalid gain: {v}")),
            ("cutoff", Some(v)) => v
                .parse::<usize>()
                .map(Self::Cutoff)
                .map_err(|_| format!("invalid cutoff: {v}")),
            ("status", None) => Ok(Self::Status),
            ("quit" | "exit" | "q", None) => Ok(Self::Quit),
            (other, _) => Err(format!("unknown command: {other}")),
        }
    }
}

/// Apply a control change to the running visualizer; returns the feedback
/// line for the user. `Quit` is handled by the caller.
pub fn apply(vis: &mut Visualizer, command: &Command) -> String {
    let controls = vis.controls();
    match command {
        Command::AutoGain(value) => {
            let auto_gain = value.unwrap_or(!controls.auto_gain);
            vis.set_controls(Controls {
                auto_gain,
                ..controls
            });
            info!(auto_gain, "auto-gain toggled");
            format!("auto-gain {}", if auto_gain { "on" } else { "off" })
        }
        Command::ManualGain(db) => {
            vis.set_controls(Controls {
                auto_gain: false,
                ..controls
            });
            vis.gain_mut().scale_mut().set_decibel(*db);
            format!("manual gain {}", vis.gain().scale().readout().trim())
        }
        Command::Cutoff(bins) => {
            vis.set_controls(Controls {
                cutoff_bins: *bins,
                ..controls
            });
            let applied = vis.controls().cutoff_bins;
            format!(
                "cutoff {applied} bins ({:.1} Hz)",
                vis.config().bin_to_hz(applied)
            )
        }
        Command::Status => {
            let status = vis.status();
            let diag = serde_json::to_string(&vis.diagnostics_snapshot())
                .unwrap_or_else(|e| format!("<unserializable: {e}>"));
            format!("capture {:?} {diag}", status.status)
        }
        Command::Quit => "stopping".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fftscope_core::{AudioSource, PipelineConfig, Recorder, ScopeError};
    use std::sync::{atomic::AtomicBool, Arc};

    struct NoSource;

    impl AudioSource for NoSource {
        fn open(
            &mut self,
            _config: &PipelineConfig,
            _stop: Arc<AtomicBool>,
        ) -> Result<Box<dyn Recorder>, ScopeError> {
            Err(ScopeError::NoDefaultInputDevice)
        }
    }

    fn visualizer() -> Visualizer {
        Visualizer::new(PipelineConfig::new(48_000, 8), Box::new(NoSource)).expect("visualizer")
    }

    #[test]
    fn parses_known_commands() {
        assert_eq!(Command::parse("auto"), Ok(Command::AutoGain(None)));
        assert_eq!(Command::parse("AUTO off"), Ok(Command::AutoGain(Some(false))));
        assert_eq!(Command::parse("gain -6.5"), Ok(Command::ManualGain(-6.5)));
        assert_eq!(Command::parse("gain 3db"), Ok(Command::ManualGain(3.0)));
        assert_eq!(Command::parse("cutoff 12"), Ok(Command::Cutoff(12)));
        assert_eq!(Command::parse("  q  "), Ok(Command::Quit));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("gain").is_err());
        assert!(Command::parse("gain loud").is_err());
        assert!(Command::parse("cutoff -1").is_err());
        assert!(Command::parse("status now").is_err());
        assert!(Command::parse("zoom 2").is_err());
    }

    #[test]
    fn manual_gain_disables_auto_and_moves_scale() {
        let mut vis = visualizer();
        let reply = apply(&mut vis, &Command::ManualGain(6.0));
        assert!(!vis.controls().auto_gain);
        assert!((vis.gain().scale().decibel() - 6.0).abs() < 1e-3);
        assert_eq!(reply, "manual gain 6.0 dB");
    }

    #[test]
    fn cutoff_reports_clamped_value_in_hz() {
        let mut vis = visualizer();
        assert_eq!(apply(&mut vis, &Command::Cutoff(2)), "cutoff 2 bins (12000.0 Hz)");
        assert_eq!(apply(&mut vis, &Command::Cutoff(99)), "cutoff 4 bins (24000.0 Hz)");
    }

    #[test]
    fn auto_toggles_without_argument() {
        let mut vis = visualizer();
        assert!(vis.controls().auto_gain);
        assert_eq!(apply(&mut vis, &Command::AutoGain(None)), "auto-gain off");
        assert_eq!(apply(&mut vis, &Command::AutoGain(None)), "auto-gain on");
    }
}
