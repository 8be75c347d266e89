//! Immutable audio units handed from the capture callback to the control thread.

/// Samples per emitted chunk.
pub const CHUNK_SIZE: usize = 4096;

/// A fixed-length block of mono f32 PCM at the capture device's native rate.
///
/// Created once by the framer and never mutated afterwards. Crossing the
/// thread boundary moves ownership; nothing else holds a reference.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmChunk {
    samples: Box<[f32]>,
    sample_rate: u32,
}

impl PcmChunk {
    pub fn new(samples: impl Into<Box<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Mono f32 samples, nominally in [-1.0, 1.0].
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Native capture rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Root-mean-square level of the chunk.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f32).sqrt()
    }
}
