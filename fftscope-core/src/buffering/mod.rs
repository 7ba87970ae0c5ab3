//! Hand-off buffers between the audio thread(s) and the display tick.
//!
//! - [`CaptureBuffer`]: mutex-guarded list of whole chunks. The capture
//!   thread appends, the tick drains everything in one swap.
//! - [`create_audio_ring`]: lock-free SPSC sample ring used between the cpal
//!   callback and the microphone recorder. `push_slice` is wait-free and
//!   safe to call from the real-time callback.

pub mod chunk;

use std::sync::Arc;

use parking_lot::Mutex;
use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

use chunk::AudioChunk;

/// Producer half, held by the audio callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the recorder on the capture thread.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Create a matched producer/consumer pair holding `capacity` samples.
pub fn create_audio_ring(capacity: usize) -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(capacity.max(1)).split()
}

/// Thread-safe accumulator of captured chunks.
///
/// Cloning yields another handle to the same buffer. Every lock is held
/// only for a `push` or a `mem::take`; the chunk list is never lent out
/// across the lock boundary.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    chunks: Arc<Mutex<Vec<AudioChunk>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk. Ownership moves into the buffer.
    pub fn push(&self, chunk: AudioChunk) {
        self.chunks.lock().push(chunk);
    }

    /// Take every pending chunk in append order and leave the buffer empty.
    pub fn drain(&self) -> Vec<AudioChunk> {
        std::mem::take(&mut *self.chunks.lock())
    }

    /// Take only the newest pending chunk, dropping the older ones.
    /// Returns the chunk and how many older chunks were discarded.
    pub fn drain_latest(&self) -> Option<(AudioChunk, usize)> {
        let mut chunks = self.drain();
        let latest = chunks.pop()?;
        Some((latest, chunks.len()))
    }

    /// Number of chunks waiting to be drained.
    pub fn pending(&self) -> usize {
        self.chunks.lock().len()
    }
}
