//! fftscope: live waveform + spectrum in the terminal.
//!
//! ## Runtime note
//!
//! The display tick, Ctrl-C and control commands are multiplexed on a
//! current-thread Tokio runtime. Audio capture runs on the core's own capture
//! thread; stdin is read on a plain thread so a pending read never holds up
//! shutdown.

mod commands;
mod settings;
mod terminal;

use std::path::PathBuf;

use anyhow::Context;
use fftscope_core::{
    list_input_devices, AudioSource, MicrophoneSource, Visualizer, WavFileSource, WindowKind,
};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use commands::Command;
use settings::{default_settings_path, load_settings, save_settings, AppSettings};
use terminal::{gain_ruler, TerminalSink};

const USAGE: &str = "\
Usage: fftscope [options]

  --settings <path>     settings file (default: per-user config dir)
  --device <name>       input device name
  --wav <path>          replay a WAV file instead of the microphone
  --loop                loop the WAV file
  --manual-gain <db>    start with auto-gain off at this gain
  --cutoff <bins>       zero the lowest <bins> frequency bins
  --window <kind>       rectangular | hann | hamming | blackman
  --json                print one JSON frame summary per frame
  --ticks <n>           exit after <n> display ticks
  --list-devices        list input devices and exit
  --save-settings       write the effective settings back to the file
  -h, --help            show this help

While running, type `auto`, `gain <db>`, `cutoff <bins>`, `status` or `quit`.";

#[derive(Debug, Default, PartialEq)]
struct Args {
    settings: Option<PathBuf>,
    device: Option<String>,
    wav: Option<PathBuf>,
    looping: bool,
    manual_gain: Option<f64>,
    cutoff: Option<usize>,
    window: Option<WindowKind>,
    json: bool,
    ticks: Option<u64>,
    list_devices: bool,
    save_settings: bool,
    help: bool,
}

impl Args {
    /// CLI flags win over the settings file.
    fn apply_to(&self, settings: &mut AppSettings) {
        if let Some(device) = &self.device {
            settings.input_device = Some(device.clone());
        }
        if let Some(db) = self.manual_gain {
            settings.auto_gain = false;
            settings.manual_gain_db = db;
        }
        if let Some(bins) = self.cutoff {
            settings.cutoff_bins = bins;
        }
        if let Some(window) = self.window {
            settings.window = window;
        }
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut it = args.into_iter();

    fn value(it: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
        it.next().ok_or_else(|| format!("missing value for {flag}"))
    }

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--settings" => parsed.settings = Some(PathBuf::from(value(&mut it, &arg)?)),
            "--device" => parsed.device = Some(value(&mut it, &arg)?),
            "--wav" => parsed.wav = Some(PathBuf::from(value(&mut it, &arg)?)),
            "--loop" => parsed.looping = true,
            "--manual-gain" => {
                let v = value(&mut it, &arg)?;
                parsed.manual_gain = Some(
                    v.parse::<f64>()
                        .ok()
                        .filter(|db| db.is_finite())
                        .ok_or_else(|| format!("invalid value for --manual-gain: {v}"))?,
                );
            }
            "--cutoff" => {
                let v = value(&mut it, &arg)?;
                parsed.cutoff = Some(
                    v.parse::<usize>()
                        .map_err(|_| format!("invalid value for --cutoff: {v}"))?,
                );
            }
            "--window" => {
                let v = value(&mut it, &arg)?;
                parsed.window =
                    Some(WindowKind::parse(&v).ok_or_else(|| format!("unknown window: {v}"))?);
            }
            "--json" => parsed.json = true,
            "--ticks" => {
                let v = value(&mut it, &arg)?;
                parsed.ticks = Some(
                    v.parse::<u64>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| format!("invalid value for --ticks: {v}"))?,
                );
            }
            "--list-devices" => parsed.list_devices = true,
            "--save-settings" => parsed.save_settings = true,
            "--help" | "-h" => parsed.help = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(parsed)
}

fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    // stderr, so `--json` output on stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fftscope=info,fftscope_core=info")),
        )
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    args.apply_to(&mut settings);
    settings.normalize();
    info!(
        settings_path = ?settings_path,
        sample_rate = settings.sample_rate,
        chunk_size = settings.chunk_size,
        auto_gain = settings.auto_gain,
        cutoff_bins = settings.cutoff_bins,
        "settings loaded"
    );

    if args.list_devices {
        print_devices(settings.sample_rate, args.json)?;
        return Ok(());
    }

    if args.save_settings {
        save_settings(&settings_path, &settings)
            .with_context(|| format!("failed to write {}", settings_path.display()))?;
        info!(settings_path = ?settings_path, "settings saved");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(settings, args))
}

fn print_devices(sample_rate: u32, json: bool) -> anyhow::Result<()> {
    let devices = list_input_devices(sample_rate);
    if json {
        for device in &devices {
            println!("{}", serde_json::to_string(device)?);
        }
        return Ok(());
    }
    if devices.is_empty() {
        println!("no input devices found");
    }
    for device in devices {
        println!(
            "{} {} ({} ch{})",
            if device.is_default { "*" } else { " " },
            device.name,
            device.max_channels,
            if device.supports_rate {
                String::new()
            } else {
                format!(", no {sample_rate} Hz")
            }
        );
    }
    Ok(())
}

async fn run(settings: AppSettings, args: Args) -> anyhow::Result<()> {
    let config = settings.pipeline_config();
    let source: Box<dyn AudioSource> = match &args.wav {
        Some(path) => Box::new(WavFileSource::new(path).looping(args.looping)),
        None => Box::new(MicrophoneSource::new(settings.input_device.clone())),
    };
    let label = source.describe();

    let mut vis = Visualizer::new(config.clone(), source)?;
    vis.set_controls(settings.controls());
    if !settings.auto_gain {
        vis.gain_mut().scale_mut().set_decibel(settings.manual_gain_db);
    }

    let mut status_rx = vis.subscribe_status();
    tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(event) => info!(status = ?event.status, detail = ?event.detail, "capture status"),
                Err(RecvError::Lagged(n)) => warn!("status receiver lagged by {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut sink = TerminalSink::new(
        std::io::stdout().lock(),
        settings.plot_width,
        vis.gain().ceiling(),
        args.json,
    );
    sink.note(&format!(
        "gain scale (dB)\n{}",
        gain_ruler(vis.gain().scale(), settings.plot_width + 2)
    ))?;

    vis.start()
        .with_context(|| format!("failed to start capture from {label}"))?;

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(16);
    spawn_stdin_reader(cmd_tx);

    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("ctrl-c received");
                break;
            }
            Some(command) = cmd_rx.recv() => {
                if command == Command::Quit {
                    break;
                }
                let reply = commands::apply(&mut vis, &command);
                info!(%reply, "control command applied");
                sink.note(&reply)?;
            }
            _ = ticker.tick() => {
                let rendered = vis.on_tick(&mut sink).is_some();
                if rendered {
                    if args.json {
                        if let Some(summary) = vis.frame_summary() {
                            sink.write_json(&summary)?;
                        }
                    } else {
                        sink.present(&vis.gain().scale().readout())?;
                    }
                }
                ticks += 1;
                if args.ticks.is_some_and(|limit| ticks >= limit) {
                    break;
                }
                // Capture over and its last chunk already shown.
                if !rendered && vis.status().status.is_terminal() {
                    break;
                }
            }
        }
    }

    let diag = vis.diagnostics_snapshot();
    info!(
        ticks = diag.ticks,
        frames_rendered = diag.frames_rendered,
        chunks_captured = diag.chunks_captured,
        chunks_skipped = diag.chunks_skipped,
        "diagnostics snapshot on stop"
    );

    vis.stop().context("capture ended with an error")
}

fn spawn_stdin_reader(tx: mpsc::Sender<Command>) {
    let spawned = std::thread::Builder::new()
        .name("fftscope-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse(&line) {
                    Ok(command) => {
                        if tx.blocking_send(command).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("{e}"),
                }
            }
        });
    if let Err(e) = spawned {
        warn!("stdin controls disabled: {e}");
    }
}
