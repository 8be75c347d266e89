//! Float ↔ signed 16-bit PCM conversion.

use std::time::Duration;

use crate::error::{LumiError, Result};

/// Full-scale divisor for 16-bit PCM.
pub const PCM16_SCALE: f32 = 32768.0;

/// Bytes per 16-bit sample.
const SAMPLE_WIDTH: usize = 2;

/// Convert one sample to 16-bit PCM.
///
/// Out-of-range input is clamped before scaling and the scaled value is
/// clamped again into `[-32768, 32767]`, so nothing wraps. NaN encodes as
/// silence.
#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let scaled = (sample.clamp(-1.0, 1.0) * PCM16_SCALE).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convert one 16-bit PCM sample back to f32 in [-1.0, 1.0).
#[inline]
pub fn i16_to_sample(value: i16) -> f32 {
    value as f32 / PCM16_SCALE
}

/// Encode f32 samples to 16-bit PCM, same length as the input.
pub fn encode_int16(samples: &[f32]) -> Vec<i16> {
    samples.iter().copied().map(sample_to_i16).collect()
}

/// Encode f32 samples directly to little-endian 16-bit PCM bytes.
pub fn encode_pcm16_le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * SAMPLE_WIDTH);
    for &s in samples {
        out.extend_from_slice(&sample_to_i16(s).to_le_bytes());
    }
    out
}

/// A decoded, de-interleaved buffer ready for the output device.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl PlaybackBuffer {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Average all channels into one. Mono buffers are copied as-is.
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.as_slice() {
            [] => Vec::new(),
            [only] => only.clone(),
            many => {
                let n = many.len() as f32;
                (0..self.frames())
                    .map(|i| many.iter().map(|ch| ch[i]).sum::<f32>() / n)
                    .collect()
            }
        }
    }
}

/// Decode little-endian 16-bit PCM into a de-interleaved [`PlaybackBuffer`].
///
/// Frame `i`, channel `c` is read from sample index `i * channels + c`.
///
/// # Errors
/// - `LumiError::InvalidChannelCount` when `channels == 0`.
/// - `LumiError::InvalidSampleRate` when `sample_rate == 0`.
/// - `LumiError::MalformedPayload` when `bytes.len()` is not a multiple of
///   `2 * channels`. Nothing is truncated; the caller decides whether to
///   drop the payload.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<PlaybackBuffer> {
    if channels == 0 {
        return Err(LumiError::InvalidChannelCount(channels));
    }
    if sample_rate == 0 {
        return Err(LumiError::InvalidSampleRate(sample_rate));
    }

    let ch = usize::from(channels);
    let frame_width = SAMPLE_WIDTH * ch;
    if bytes.len() % frame_width != 0 {
        return Err(LumiError::MalformedPayload {
            len: bytes.len(),
            channels,
        });
    }

    let frames = bytes.len() / frame_width;
    let mut out: Vec<Vec<f32>> = (0..ch).map(|_| Vec::with_capacity(frames)).collect();
    for frame in bytes.chunks_exact(frame_width) {
        for (c, sample) in frame.chunks_exact(SAMPLE_WIDTH).enumerate() {
            out[c].push(i16_to_sample(i16::from_le_bytes([sample[0], sample[1]])));
        }
    }

    Ok(PlaybackBuffer {
        sample_rate,
        channels: out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn encode_full_scale_and_zero() {
        assert_eq!(encode_int16(&[0.0, 1.0, -1.0]), vec![0, 32767, -32768]);
    }

    #[test]
    fn encode_clamps_out_of_range() {
        assert_eq!(sample_to_i16(2.0), sample_to_i16(1.0));
        assert_eq!(sample_to_i16(-5.0), sample_to_i16(-1.0));
        assert_eq!(sample_to_i16(f32::INFINITY), i16::MAX);
        assert_eq!(sample_to_i16(f32::NEG_INFINITY), i16::MIN);
    }

    #[test]
    fn nan_encodes_as_silence() {
        assert_eq!(sample_to_i16(f32::NAN), 0);
    }

    #[test]
    fn encode_rounds_to_nearest() {
        // 0.5 LSB above zero rounds away from zero.
        assert_eq!(sample_to_i16(0.6 / PCM16_SCALE), 1);
        assert_eq!(sample_to_i16(0.4 / PCM16_SCALE), 0);
        assert_eq!(sample_to_i16(-0.6 / PCM16_SCALE), -1);
    }

    #[test]
    fn little_endian_byte_layout() {
        let bytes = encode_pcm16_le(&[1.0, -1.0, 0.0]);
        assert_eq!(bytes, vec![0xFF, 0x7F, 0x00, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn round_trip_within_one_lsb() {
        let samples: Vec<f32> = (0..=2000).map(|i| -1.0 + i as f32 / 1000.0).collect();
        let bytes = encode_pcm16_le(&samples);
        let decoded = decode_pcm16(&bytes, 16_000, 1).unwrap();
        let mono = decoded.channel(0).unwrap();
        assert_eq!(mono.len(), samples.len());
        for (orig, back) in samples.iter().zip(mono) {
            assert_abs_diff_eq!(*orig, *back, epsilon = 1.0 / PCM16_SCALE + 1e-7);
        }
    }

    #[test]
    fn decode_shape_mono_eight_samples() {
        let values: [i16; 8] = [0, 1000, -1000, 32767, -32768, 12, -12, 5];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();

        let buf = decode_pcm16(&bytes, 24_000, 1).unwrap();
        assert_eq!(buf.number_of_channels(), 1);
        assert_eq!(buf.frames(), 8);
        assert_eq!(buf.sample_rate(), 24_000);
        assert!(buf.channel(0).unwrap().iter().all(|s| (-1.0..=1.0).contains(s)));
        assert_eq!(buf.channel(0).unwrap()[4], -1.0);
    }

    #[test]
    fn decode_deinterleaves_stereo() {
        let values: [i16; 4] = [100, -100, 200, -200];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();

        let buf = decode_pcm16(&bytes, 24_000, 2).unwrap();
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.channel(0).unwrap(), &[100.0 / PCM16_SCALE, 200.0 / PCM16_SCALE]);
        assert_eq!(buf.channel(1).unwrap(), &[-100.0 / PCM16_SCALE, -200.0 / PCM16_SCALE]);
        assert_eq!(buf.to_mono(), vec![0.0, 0.0]);
    }

    #[test]
    fn decode_rejects_misaligned_payload() {
        let err = decode_pcm16(&[0u8; 7], 24_000, 1).unwrap_err();
        assert!(matches!(err, LumiError::MalformedPayload { len: 7, channels: 1 }));

        // Even length but not a whole stereo frame.
        let err = decode_pcm16(&[0u8; 6], 24_000, 2).unwrap_err();
        assert!(matches!(err, LumiError::MalformedPayload { len: 6, channels: 2 }));
    }

    #[test]
    fn decode_rejects_zero_channels_and_rate() {
        assert!(matches!(
            decode_pcm16(&[0u8; 4], 24_000, 0),
            Err(LumiError::InvalidChannelCount(0))
        ));
        assert!(matches!(
            decode_pcm16(&[0u8; 4], 0, 1),
            Err(LumiError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn empty_payload_decodes_to_empty_buffer() {
        let buf = decode_pcm16(&[], 24_000, 1).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.duration(), Duration::ZERO);
    }

    #[test]
    fn duration_matches_frames() {
        let bytes = vec![0u8; 24_000 * 2];
        let buf = decode_pcm16(&bytes, 24_000, 1).unwrap();
        assert_eq!(buf.duration(), Duration::from_secs(1));
    }
}
