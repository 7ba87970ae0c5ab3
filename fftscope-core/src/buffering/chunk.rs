//! Typed audio chunk handed from the capture thread to the display tick.

/// One fixed-length block of mono PCM samples at a known sample rate.
///
/// Allocated once per capture iteration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Mono f32 samples, nominally in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 4000, 44100, 48000).
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
