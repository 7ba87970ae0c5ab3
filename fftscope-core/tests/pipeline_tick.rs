use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use fftscope_core::{
    AudioSource, CaptureStatus, CaptureStatusEvent, Controls, DisplaySink, PipelineConfig,
    Recorder, ScopeError, Visualizer, WavFileSource,
};
use tokio::sync::broadcast::error::TryRecvError;

/// Replays scripted blocks, then idles until stopped like a live device.
struct ScriptedSource {
    blocks: VecDeque<Result<Vec<f32>, ScopeError>>,
}

struct ScriptedRecorder {
    blocks: VecDeque<Result<Vec<f32>, ScopeError>>,
    stop: Arc<AtomicBool>,
}

impl ScriptedSource {
    fn new(blocks: Vec<Result<Vec<f32>, ScopeError>>) -> Box<Self> {
        Box::new(Self {
            blocks: blocks.into(),
        })
    }
}

impl AudioSource for ScriptedSource {
    fn open(
        &mut self,
        _config: &PipelineConfig,
        stop: Arc<AtomicBool>,
    ) -> Result<Box<dyn Recorder>, ScopeError> {
        Ok(Box::new(ScriptedRecorder {
            blocks: std::mem::take(&mut self.blocks),
            stop,
        }))
    }
}

impl Recorder for ScriptedRecorder {
    fn read_block(&mut self, _frames: usize) -> Result<Vec<f32>, ScopeError> {
        if let Some(block) = self.blocks.pop_front() {
            return block;
        }
        while !self.stop.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }
        Err(ScopeError::Interrupted)
    }
}

#[derive(Default)]
struct CountingSink {
    redraws: usize,
    last_spectrum: Vec<f32>,
    statuses: Vec<CaptureStatusEvent>,
}

impl DisplaySink for CountingSink {
    fn set_time_series(&mut self, _x: &[f32], _y: &[f32]) {}

    fn set_frequency_series(&mut self, _x: &[f32], y: &[f32]) {
        self.last_spectrum = y.to_vec();
    }

    fn redraw(&mut self) {
        self.redraws += 1;
    }

    fn show_status(&mut self, event: &CaptureStatusEvent) {
        self.statuses.push(event.clone());
    }
}

/// Tick until `done` holds, the way the host's interval timer would.
fn tick_until(
    vis: &mut Visualizer,
    sink: &mut CountingSink,
    mut done: impl FnMut(&Visualizer, &CountingSink) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        vis.on_tick(sink);
        if done(vis, sink) {
            return;
        }
        assert!(Instant::now() < deadline, "pipeline did not reach the expected state");
        thread::sleep(Duration::from_millis(5));
    }
}

fn impulse(n: usize, amplitude: f32) -> Vec<f32> {
    let mut block = vec![0.0; n];
    block[0] = amplitude;
    block
}

#[test]
fn impulse_with_auto_gain_hits_ceiling_and_scale_tracks() {
    let config = PipelineConfig::new(48_000, 8);
    let mut vis = Visualizer::new(config, ScriptedSource::new(vec![Ok(impulse(8, 0.25))]))
        .expect("visualizer");
    let mut sink = CountingSink::default();

    vis.start().expect("start");
    tick_until(&mut vis, &mut sink, |_, s| s.redraws == 1);

    assert_eq!(vis.frequency_axis(), &[0.0, 6000.0, 12000.0, 18000.0, 24000.0]);
    assert_eq!(sink.last_spectrum.len(), 5);
    assert_eq!(sink.last_spectrum[0], 0.0, "cutoff zeroes DC");
    let max = sink.last_spectrum.iter().copied().fold(0.0f32, f32::max);
    assert_abs_diff_eq!(max, 1.0, epsilon = 1e-6);

    let gain = vis.gain();
    assert_abs_diff_eq!(gain.last_gain(), 4.0, epsilon = 1e-5);
    assert_abs_diff_eq!(gain.scale().decibel(), 10.0 * 4.0f64.log10(), epsilon = 1e-3);

    // Nothing new captured: the previous frame stays up.
    assert!(vis.on_tick(&mut sink).is_none());
    assert_eq!(sink.redraws, 1);

    vis.stop().expect("stop");
    let diag = vis.diagnostics_snapshot();
    assert_eq!(diag.chunks_captured, 1);
    assert_eq!(diag.frames_rendered, 1);
    assert!(diag.empty_ticks >= 1);
}

#[test]
fn silence_keeps_previous_gain() {
    let config = PipelineConfig::new(48_000, 8);
    let mut vis = Visualizer::new(
        config,
        ScriptedSource::new(vec![Ok(impulse(8, 0.5)), Ok(vec![0.0; 8])]),
    )
    .expect("visualizer");
    let mut sink = CountingSink::default();

    vis.start().expect("start");
    tick_until(&mut vis, &mut sink, |v, _| {
        v.last_frame().is_some_and(|frame| frame.peak == 0.0)
    });

    let frame = vis.last_frame().expect("frame");
    assert!(frame.gain.is_finite());
    assert!(frame.magnitudes.iter().all(|m| *m == 0.0));
    if vis.diagnostics_snapshot().chunks_skipped == 0 {
        // Impulse rendered on an earlier tick: its gain (2.0) was retained.
        assert_abs_diff_eq!(frame.gain, 2.0, epsilon = 1e-5);
    }
    assert!(vis.gain().degenerate_ticks() >= 1);
    vis.stop().expect("stop");
}

#[test]
fn manual_gain_uses_scale_power_ratio() {
    let config = PipelineConfig::new(48_000, 8);
    let mut vis = Visualizer::new(config, ScriptedSource::new(vec![Ok(impulse(8, 0.25))]))
        .expect("visualizer");
    vis.set_controls(Controls {
        auto_gain: false,
        cutoff_bins: 0,
    });
    vis.gain_mut().scale_mut().set_decibel(20.0);
    let mut sink = CountingSink::default();

    vis.start().expect("start");
    tick_until(&mut vis, &mut sink, |_, s| s.redraws == 1);

    // Power ratio of +20 dB is 100; every impulse bin has magnitude 0.25.
    for m in &sink.last_spectrum {
        assert_abs_diff_eq!(*m, 25.0, epsilon = 1e-2);
    }
    vis.stop().expect("stop");
}

#[test]
fn stop_without_start_returns_immediately() {
    let started = Instant::now();
    let mut vis = Visualizer::new(PipelineConfig::default(), ScriptedSource::new(vec![]))
        .expect("visualizer");
    assert!(vis.stop().is_ok());
    assert_eq!(vis.status().status, CaptureStatus::Idle);
    drop(vis);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn capture_failure_is_reported_once() {
    let config = PipelineConfig::new(8_000, 8);
    let mut vis = Visualizer::new(
        config,
        ScriptedSource::new(vec![
            Ok(impulse(8, 1.0)),
            Err(ScopeError::AudioStream("device unplugged".into())),
        ]),
    )
    .expect("visualizer");
    let mut rx = vis.subscribe_status();
    let mut sink = CountingSink::default();

    vis.start().expect("start");
    tick_until(&mut vis, &mut sink, |v, _| {
        v.status().status == CaptureStatus::Error
    });
    // Further ticks must not repeat the notification.
    vis.on_tick(&mut sink);
    vis.on_tick(&mut sink);

    let errors: Vec<_> = sink
        .statuses
        .iter()
        .filter(|e| e.status == CaptureStatus::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .detail
        .as_deref()
        .is_some_and(|d| d.contains("device unplugged")));

    assert_eq!(rx.try_recv().expect("running").status, CaptureStatus::Running);
    assert_eq!(rx.try_recv().expect("error").status, CaptureStatus::Error);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    match vis.stop() {
        Err(ScopeError::CaptureFailed(msg)) => assert!(msg.contains("device unplugged")),
        other => panic!("expected CaptureFailed, got {other:?}"),
    }
}

#[test]
fn wav_tone_peaks_at_its_frequency() {
    let path = std::env::temp_dir().join(format!("fftscope-tone-{}.wav", std::process::id()));
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
    for i in 0..640 {
        let t = i as f32 / 8_000.0;
        let s = (2.0 * std::f32::consts::PI * 1_000.0 * t).sin() * 0.5;
        writer
            .write_sample((s * i16::MAX as f32) as i16)
            .expect("write sample");
    }
    writer.finalize().expect("finalize");

    let config = PipelineConfig::new(8_000, 64);
    let mut vis =
        Visualizer::new(config, Box::new(WavFileSource::new(&path).unpaced())).expect("visualizer");
    let mut sink = CountingSink::default();
    vis.start().expect("start");
    tick_until(&mut vis, &mut sink, |v, _| {
        v.last_frame().is_some() && v.status().status == CaptureStatus::Stopped
    });

    let summary = vis.frame_summary().expect("summary");
    assert_eq!(summary.peak_hz, 1_000.0);
    assert_abs_diff_eq!(summary.peak_magnitude, 1.0, epsilon = 1e-4);
    assert!(vis.stop().is_ok());
    let _ = std::fs::remove_file(path);
}
