//! Sample-rate conversion.
//!
//! Two converters live here:
//!
//! - [`downsample`] / [`downsample_to_16k`]: stateless linear interpolation
//!   applied to each captured chunk before it is encoded. Cheap and
//!   latency-free, good enough for speech, not an anti-aliasing filter.
//! - [`RateConverter`]: a streaming rubato `FastFixedIn` session used on the
//!   playback side to fit 24 kHz model audio to the output device's rate.
//!
//! ## Usage
//!
//! ```ignore
//! let out = downsample_to_16k(&chunk, 48_000); // Cow<[f32]>, len = ceil(n / 3)
//!
//! let mut rc = RateConverter::new(24_000, 48_000, 480)?;
//! let device_samples = rc.process(&decoded);
//! ```

use std::borrow::Cow;

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::codec::wire::OUTBOUND_SAMPLE_RATE;
use crate::error::{LumiError, Result};

/// Resample `input` from `input_rate` to the 16 kHz outbound rate.
pub fn downsample_to_16k(input: &[f32], input_rate: u32) -> Cow<'_, [f32]> {
    downsample(input, input_rate, OUTBOUND_SAMPLE_RATE)
}

/// Linear-interpolation resampler.
///
/// Returns `input` untouched when the rates match (or `input_rate` is zero).
/// Otherwise the output has `ceil(len * target_rate / input_rate)` samples;
/// output `i` reads source position `i * input_rate / target_rate` and
/// blends its two neighbours. The last position, which has no right
/// neighbour, repeats the final input sample.
pub fn downsample(input: &[f32], input_rate: u32, target_rate: u32) -> Cow<'_, [f32]> {
    if input_rate == target_rate || input_rate == 0 || target_rate == 0 {
        return Cow::Borrowed(input);
    }
    if input.is_empty() {
        return Cow::Owned(Vec::new());
    }

    let out_len = output_len(input.len(), input_rate, target_rate);
    let ratio = input_rate as f64 / target_rate as f64;
    let last = input.len() - 1;

    let out = (0..out_len)
        .map(|i| {
            let offset = i as f64 * ratio;
            let index = (offset.floor() as usize).min(last);
            let fraction = (offset - index as f64) as f32;
            if index < last {
                input[index] * (1.0 - fraction) + input[index + 1] * fraction
            } else {
                input[last]
            }
        })
        .collect();

    Cow::Owned(out)
}

/// `ceil(len * target_rate / input_rate)`, computed in integers.
pub fn output_len(len: usize, input_rate: u32, target_rate: u32) -> usize {
    if input_rate == 0 {
        return len;
    }
    (len as u64 * u64::from(target_rate)).div_ceil(u64::from(input_rate)) as usize
}

/// Streaming f32 mono converter between two fixed sample rates.
pub struct RateConverter {
    /// `None` when source rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input chunks between calls.
    input_buf: Vec<f32>,
    /// How many input samples rubato expects per process call.
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
    /// Set once input has entered the filter since the last flush/reset.
    primed: bool,
    source_rate: u32,
    target_rate: u32,
}

impl RateConverter {
    /// Create a new converter.
    ///
    /// # Parameters
    /// - `source_rate`: Sample rate of the incoming audio (Hz).
    /// - `target_rate`: Sample rate of the output device (Hz).
    /// - `chunk_size`: Input frame count per rubato call (e.g. `480`).
    ///
    /// # Errors
    /// `LumiError::InvalidSampleRate` for a zero rate, `LumiError::AudioDevice`
    /// if rubato fails to initialise.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == 0 {
            return Err(LumiError::InvalidSampleRate(source_rate));
        }
        if target_rate == 0 {
            return Err(LumiError::InvalidSampleRate(target_rate));
        }
        let chunk_size = chunk_size.max(1);

        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
                primed: false,
                source_rate,
                target_rate,
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| LumiError::AudioDevice(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        tracing::info!(
            source_rate,
            target_rate,
            chunk_size,
            max_out,
            "playback resampling enabled"
        );

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf,
            primed: false,
            source_rate,
            target_rate,
        })
    }

    /// Process incoming samples, returning resampled output (may be empty).
    ///
    /// Samples are accumulated internally until a full `chunk_size` block is
    /// available for rubato. Any remainder is kept for the next call.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);
        self.primed |= !samples.is_empty();

        let mut result = Vec::new();
        let mut consumed = 0;

        while self.input_buf.len() - consumed >= self.chunk_size {
            let input_slice = &self.input_buf[consumed..consumed + self.chunk_size];

            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }

            consumed += self.chunk_size;
        }

        self.input_buf.drain(..consumed);
        result
    }

    /// End the stream: push out the held-back input plus the filter's
    /// delayed tail, then return to a cold state.
    ///
    /// Call this only where the source audio really ends. Between
    /// consecutive buffers of one stream keep calling [`process`](Self::process)
    /// so the filter history carries across the join.
    pub fn flush(&mut self) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return Vec::new();
        };
        if !self.primed {
            return Vec::new();
        }

        let pending = self.input_buf.len();
        let expected = output_len(pending, self.source_rate, self.target_rate)
            + resampler.output_delay();
        self.input_buf.resize(self.chunk_size, 0.0);

        let mut result = Vec::new();
        match resampler.process_into_buffer(&[&self.input_buf[..]], &mut self.output_buf, None) {
            Ok((_consumed, produced)) => {
                result.extend_from_slice(&self.output_buf[0][..produced.min(expected)]);
            }
            Err(e) => {
                error!("resampler flush error: {e}");
            }
        }

        self.input_buf.clear();
        resampler.reset();
        self.primed = false;
        result
    }

    /// Drop buffered input and rubato's filter history (playback interrupted).
    pub fn reset(&mut self) {
        self.input_buf.clear();
        self.primed = false;
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }

    /// Returns `true` when source rate == target rate (no resampling occurs).
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }
}
