//! Microphone recorder on top of cpal.
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not block on a mutex or perform I/O, so it only downmixes to mono
//! and pushes into an SPSC ring buffer producer (`push_slice` is lock-free).
//! The [`Recorder`] half pops from the ring on the capture thread and is the
//! only side that waits.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{AudioSource, Recorder};
use crate::{
    buffering::{create_audio_ring, AudioConsumer, Consumer},
    config::PipelineConfig,
    error::{Result, ScopeError},
};

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};

#[cfg(feature = "audio-cpal")]
use crate::buffering::{AudioProducer, Producer};

/// Sleep between polls of an empty ring.
const EMPTY_POLL: Duration = Duration::from_millis(2);

/// Ring capacity in chunks; a stalled capture thread can fall this far behind
/// before the callback starts dropping samples.
const RING_CHUNKS: usize = 8;

/// Opens a live input device. Prefers `config.input_device` when set.
#[derive(Debug, Clone, Default)]
pub struct MicrophoneSource {
    preferred_device: Option<String>,
}

impl MicrophoneSource {
    pub fn new(preferred_device: Option<String>) -> Self {
        Self { preferred_device }
    }
}

/// Pops fixed-size blocks out of the ring filled by the cpal callback.
///
/// A stop request never discards samples that are already buffered. A
/// block that has started is completed from the still-running stream, for
/// at most `stop_grace` after the flag is seen; only a read that has not
/// taken a single sample returns `Interrupted` straight away.
struct RingReader {
    consumer: AudioConsumer,
    block: Vec<f32>,
    stop: Arc<AtomicBool>,
    stop_grace: Duration,
    /// Last error reported by the cpal error callback.
    stream_error: Arc<Mutex<Option<String>>>,
}

impl RingReader {
    fn read_block(&mut self, frames: usize) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(frames);
        let mut stop_seen: Option<Instant> = None;
        while out.len() < frames {
            if let Some(err) = self.stream_error.lock().take() {
                return Err(ScopeError::AudioStream(err));
            }

            let want = (frames - out.len()).min(self.block.len());
            let n = self.consumer.pop_slice(&mut self.block[..want]);
            if n > 0 {
                out.extend_from_slice(&self.block[..n]);
                continue;
            }

            if self.stop.load(Ordering::Acquire) {
                if out.is_empty() {
                    return Err(ScopeError::Interrupted);
                }
                let seen = *stop_seen.get_or_insert_with(Instant::now);
                if seen.elapsed() >= self.stop_grace {
                    debug!(
                        buffered = out.len(),
                        frames, "input dried up after stop; dropping partial block"
                    );
                    return Err(ScopeError::Interrupted);
                }
            }
            std::thread::sleep(EMPTY_POLL);
        }
        Ok(out)
    }
}

#[cfg(feature = "audio-cpal")]
struct MicRecorder {
    /// Kept alive so the stream is not dropped prematurely.
    _stream: Stream,
    reader: RingReader,
}

#[cfg(feature = "audio-cpal")]
impl Recorder for MicRecorder {
    fn read_block(&mut self, frames: usize) -> Result<Vec<f32>> {
        self.reader.read_block(frames)
    }
}

#[cfg(feature = "audio-cpal")]
impl AudioSource for MicrophoneSource {
    fn open(&mut self, config: &PipelineConfig, stop: Arc<AtomicBool>) -> Result<Box<dyn Recorder>> {
        let host = cpal::default_host();
        let preferred = self
            .preferred_device
            .as_deref()
            .or(config.input_device.as_deref());
        let device = select_input_device(&host, preferred)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = choose_input_config(&device, config.sample_rate)?;
        let channels = supported.channels();
        info!(
            sample_rate = config.sample_rate,
            channels,
            format = ?supported.sample_format(),
            "audio config selected"
        );

        let stream_config = StreamConfig {
            channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (producer, consumer) = create_audio_ring(config.chunk_size * RING_CHUNKS);
        let stream_error = Arc::new(Mutex::new(None));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>,
            SampleFormat::I16 => build_stream::<i16>,
            SampleFormat::U16 => build_stream::<u16>,
            SampleFormat::U8 => build_stream::<u8>,
            fmt => {
                return Err(ScopeError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }(
            &device,
            &stream_config,
            channels as usize,
            producer,
            Arc::clone(&stream_error),
        )?;

        stream
            .play()
            .map_err(|e| ScopeError::AudioStream(e.to_string()))?;

        Ok(Box::new(MicRecorder {
            _stream: stream,
            reader: RingReader {
                consumer,
                block: vec![0.0; config.block_size()],
                stop,
                stop_grace: config.chunk_duration() * 2,
                stream_error,
            },
        }))
    }

    fn describe(&self) -> String {
        match &self.preferred_device {
            Some(name) => format!("microphone '{name}'"),
            None => "default microphone".into(),
        }
    }
}

/// Preferred device by name, otherwise the default input, otherwise the
/// first available input.
#[cfg(feature = "audio-cpal")]
fn select_input_device(host: &cpal::Host, preferred: Option<&str>) -> Result<cpal::Device> {
    if let Some(preferred_name) = preferred {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(found) = devices.find(|d| {
                    d.name()
                        .map(|name| name == preferred_name)
                        .unwrap_or(false)
                }) {
                    return Ok(found);
                }
                warn!(
                    "preferred input device '{}' not found, falling back",
                    preferred_name
                );
            }
            Err(e) => {
                warn!("failed to list input devices while resolving preference: {e}");
            }
        }
    }

    if let Some(default) = host.default_input_device() {
        return Ok(default);
    }

    let mut devices = host
        .input_devices()
        .map_err(|e| ScopeError::AudioDevice(e.to_string()))?;
    let fallback = devices.next().ok_or(ScopeError::NoDefaultInputDevice)?;
    warn!("no default input device, falling back to first available input");
    Ok(fallback)
}

/// Pick a config range that covers `target_rate`, preferring f32 samples
/// and fewer channels.
#[cfg(feature = "audio-cpal")]
fn choose_input_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges = device
        .supported_input_configs()
        .map_err(|e| ScopeError::AudioDevice(e.to_string()))?;

    let mut best: Option<cpal::SupportedStreamConfig> = None;
    let mut best_score = i32::MIN;
    for range in ranges {
        if target_rate < range.min_sample_rate().0 || target_rate > range.max_sample_rate().0 {
            continue;
        }
        let cfg = range.with_sample_rate(SampleRate(target_rate));
        let mut score = 0;
        if cfg.sample_format() == SampleFormat::F32 {
            score += 2;
        }
        if cfg.channels() == 1 {
            score += 1;
        }
        if score > best_score {
            best_score = score;
            best = Some(cfg);
        }
    }
    best.ok_or_else(|| {
        ScopeError::AudioDevice(format!("device does not support {target_rate} Hz input"))
    })
}

#[cfg(feature = "audio-cpal")]
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    mut producer: AudioProducer,
    stream_error: Arc<Mutex<Option<String>>>,
) -> Result<Stream>
where
    T: Sample + SizedSample,
    f32: FromSample<T>,
{
    let mut mix_buf: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                let frames = data.len() / channels;
                mix_buf.resize(frames, 0.0);
                for (f, frame) in data.chunks_exact(channels).enumerate() {
                    let sum: f32 = frame.iter().map(|s| s.to_sample::<f32>()).sum();
                    mix_buf[f] = sum / channels as f32;
                }
                let written = producer.push_slice(&mix_buf);
                if written < mix_buf.len() {
                    warn!("ring buffer full: dropped {} frames", mix_buf.len() - written);
                }
            },
            move |err| {
                tracing::error!("audio stream error: {err}");
                *stream_error.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| ScopeError::AudioStream(e.to_string()))
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioSource for MicrophoneSource {
    fn open(&mut self, _config: &PipelineConfig, _stop: Arc<AtomicBool>) -> Result<Box<dyn Recorder>> {
        Err(ScopeError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::{AudioProducer, Producer};

    fn reader(block: usize) -> (RingReader, AudioProducer) {
        let (producer, consumer) = create_audio_ring(64);
        let reader = RingReader {
            consumer,
            block: vec![0.0; block],
            stop: Arc::new(AtomicBool::new(false)),
            stop_grace: Duration::from_millis(20),
            stream_error: Arc::new(Mutex::new(None)),
        };
        (reader, producer)
    }

    #[test]
    fn accumulates_small_pops_into_one_block() {
        let (mut rd, mut producer) = reader(3);
        producer.push_slice(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        let block = rd.read_block(8).expect("block");
        assert_eq!(block, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]);
    }

    #[test]
    fn stop_flag_interrupts_idle_read() {
        let (mut rd, _producer) = reader(4);
        rd.stop.store(true, Ordering::SeqCst);
        assert!(matches!(rd.read_block(8), Err(ScopeError::Interrupted)));
    }

    #[test]
    fn buffered_block_is_delivered_after_stop() {
        let (mut rd, mut producer) = reader(4);
        producer.push_slice(&[0.25; 8]);
        rd.stop.store(true, Ordering::SeqCst);
        assert_eq!(rd.read_block(8).expect("buffered block"), vec![0.25; 8]);
        assert!(matches!(rd.read_block(8), Err(ScopeError::Interrupted)));
    }

    #[test]
    fn started_block_is_completed_after_stop() {
        let (mut rd, mut producer) = reader(4);
        rd.stop_grace = Duration::from_secs(2);
        producer.push_slice(&[0.5, 0.5]);
        rd.stop.store(true, Ordering::SeqCst);

        let late = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.push_slice(&[0.75; 6]);
            producer
        });
        let block = rd.read_block(8).expect("completed block");
        assert_eq!(&block[..2], &[0.5, 0.5]);
        assert_eq!(&block[2..], &[0.75; 6]);
        let _producer = late.join().expect("producer thread");
    }

    #[test]
    fn partial_block_is_dropped_once_input_dries_up() {
        let (mut rd, mut producer) = reader(4);
        producer.push_slice(&[0.5, 0.5]);
        rd.stop.store(true, Ordering::SeqCst);
        let started = std::time::Instant::now();
        assert!(matches!(rd.read_block(8), Err(ScopeError::Interrupted)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn stream_error_becomes_audio_stream_failure() {
        let (mut rd, _producer) = reader(4);
        *rd.stream_error.lock() = Some("device disconnected".into());
        match rd.read_block(8) {
            Err(ScopeError::AudioStream(msg)) => assert_eq!(msg, "device disconnected"),
            other => panic!("expected AudioStream, got {other:?}"),
        }
    }

    #[cfg(feature = "audio-cpal")]
    #[test]
    fn describe_names_preferred_device() {
        let src = MicrophoneSource::new(Some("USB Mic".into()));
        assert_eq!(src.describe(), "microphone 'USB Mic'");
        assert_eq!(MicrophoneSource::default().describe(), "default microphone");
    }
}
