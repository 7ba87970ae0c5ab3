//! WAV replay source for headless runs and reproducible demos.
//!
//! The whole file is decoded to mono f32 at open time; the recorder then
//! hands out `chunk_size` slices, optionally paced at the file's real-time
//! rate. End of file ends the capture like a stop request unless looping.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavReader};
use tracing::{debug, info};

use super::{AudioSource, Recorder};
use crate::{
    config::PipelineConfig,
    error::{Result, ScopeError},
};

/// Longest single sleep while pacing, so a stop request is seen promptly.
const PACE_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct WavFileSource {
    path: PathBuf,
    looping: bool,
    realtime: bool,
}

impl WavFileSource {
    /// Replay `path` once, paced in real time.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            looping: false,
            realtime: true,
        }
    }

    /// Start over at the beginning instead of ending at EOF.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Deliver chunks as fast as they are requested.
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }
}

struct WavRecorder {
    samples: Vec<f32>,
    cursor: usize,
    looping: bool,
    /// `None` when unpaced.
    pace: Option<Pacer>,
    stop: Arc<AtomicBool>,
}

struct Pacer {
    sample_rate: u32,
    next_due: Instant,
}

impl AudioSource for WavFileSource {
    fn open(&mut self, config: &PipelineConfig, stop: Arc<AtomicBool>) -> Result<Box<dyn Recorder>> {
        let reader = WavReader::open(&self.path)?;
        let spec = reader.spec();
        if spec.sample_rate != config.sample_rate {
            return Err(ScopeError::AudioDevice(format!(
                "{} is {} Hz but the pipeline runs at {} Hz",
                self.path.display(),
                spec.sample_rate,
                config.sample_rate
            )));
        }

        let interleaved = decode_samples(reader)?;
        let samples = downmix(&interleaved, usize::from(spec.channels.max(1)));
        info!(
            path = %self.path.display(),
            channels = spec.channels,
            frames = samples.len(),
            "wav source opened"
        );
        if samples.is_empty() {
            return Err(ScopeError::AudioDevice(format!(
                "{} contains no audio",
                self.path.display()
            )));
        }

        Ok(Box::new(WavRecorder {
            samples,
            cursor: 0,
            looping: self.looping,
            pace: self.realtime.then(|| Pacer {
                sample_rate: config.sample_rate,
                next_due: Instant::now(),
            }),
            stop,
        }))
    }

    fn describe(&self) -> String {
        format!("wav file '{}'", self.path.display())
    }
}

impl Recorder for WavRecorder {
    fn read_block(&mut self, frames: usize) -> Result<Vec<f32>> {
        if let Some(pace) = &mut self.pace {
            while Instant::now() < pace.next_due {
                if self.stop.load(Ordering::Acquire) {
                    return Err(ScopeError::Interrupted);
                }
                let left = pace.next_due.saturating_duration_since(Instant::now());
                std::thread::sleep(left.min(PACE_SLICE));
            }
            pace.next_due += Duration::from_secs_f64(frames as f64 / pace.sample_rate as f64);
        }

        let mut out = Vec::with_capacity(frames);
        while out.len() < frames {
            if self.cursor >= self.samples.len() {
                if !self.looping {
                    debug!("wav source exhausted");
                    return Err(ScopeError::Interrupted);
                }
                self.cursor = 0;
            }
            let take = (frames - out.len()).min(self.samples.len() - self.cursor);
            out.extend_from_slice(&self.samples[self.cursor..self.cursor + take]);
            self.cursor += take;
        }
        Ok(out)
    }
}

fn decode_samples<R: std::io::Read>(reader: WavReader<R>) -> Result<Vec<f32>> {
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };
    Ok(samples)
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_wav(name: &str, channels: u16, rate: u32, samples: &[i16]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("fftscope-{}-{name}.wav", std::process::id()));
        let spec = WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).expect("create wav");
        for s in samples {
            writer.write_sample(*s).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
        path
    }

    fn open(source: &mut WavFileSource, rate: u32) -> Result<Box<dyn Recorder>> {
        source.open(
            &PipelineConfig::new(rate, 4),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn replays_chunks_then_ends() {
        let path = write_wav("once", 1, 8_000, &[16384, -16384, 0, 8192, 0, 0, 0, 0, 1]);
        let mut src = WavFileSource::new(&path).unpaced();
        let mut rec = open(&mut src, 8_000).expect("open");

        assert_eq!(rec.read_block(4).expect("first"), vec![0.5, -0.5, 0.0, 0.25]);
        assert_eq!(rec.read_block(4).expect("second"), vec![0.0; 4]);
        assert!(matches!(rec.read_block(4), Err(ScopeError::Interrupted)));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn looping_wraps_around() {
        let path = write_wav("loop", 1, 8_000, &[16384, 0, -16384]);
        let mut src = WavFileSource::new(&path).unpaced().looping(true);
        let mut rec = open(&mut src, 8_000).expect("open");
        assert_eq!(rec.read_block(4).expect("block"), vec![0.5, 0.0, -0.5, 0.5]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn stereo_is_downmixed() {
        let path = write_wav("stereo", 2, 8_000, &[16384, 0, 0, -16384, 8192, 8192, 0, 0]);
        let mut src = WavFileSource::new(&path).unpaced();
        let mut rec = open(&mut src, 8_000).expect("open");
        assert_eq!(rec.read_block(4).expect("block"), vec![0.25, -0.25, 0.25, 0.0]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn rate_mismatch_fails_to_open() {
        let path = write_wav("rate", 1, 16_000, &[0; 8]);
        let mut src = WavFileSource::new(&path);
        assert!(matches!(
            open(&mut src, 8_000),
            Err(ScopeError::AudioDevice(_))
        ));
        let _ = std::fs::remove_file(path);
    }
}
