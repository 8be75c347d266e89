//! Speaker output via cpal.
//!
//! The output callback pulls mono f32 samples from the playback ring and
//! writes each one to every channel of the device frame. When the ring runs
//! dry it writes silence.
//!
//! Interrupts are expressed as a [`FlushMark`]: a position in the stream of
//! samples ever written to the ring. The callback discards everything before
//! the mark and plays everything after it, so audio queued right after an
//! interrupt survives even if the callback has not run in between.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info};

#[cfg(feature = "audio-cpal")]
use crate::buffering::create_sample_ring;
use crate::{
    buffering::{Consumer, SampleConsumer, SampleProducer},
    error::{LumiError, Result},
};

/// Stream position (in samples written to the playback ring) before which
/// queued audio is stale.
#[derive(Debug, Default)]
pub struct FlushMark(AtomicU64);

impl FlushMark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every sample written before index `written` as stale.
    /// The mark never moves backwards.
    pub fn advance_to(&self, written: u64) {
        self.0.fetch_max(written, Ordering::AcqRel);
    }

    pub fn position(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Callback-side state for the output stream.
pub struct PlaybackFeed {
    consumer: SampleConsumer,
    flush: Arc<FlushMark>,
    /// Samples taken from the ring so far, played or skipped.
    read: u64,
}

impl PlaybackFeed {
    pub fn new(consumer: SampleConsumer, flush: Arc<FlushMark>) -> Self {
        Self {
            consumer,
            flush,
            read: 0,
        }
    }

    /// Fill one interleaved output block. Returns the number of queued
    /// samples consumed; the rest of the block is silence.
    pub fn fill<T: Copy>(
        &mut self,
        out: &mut [T],
        channels: usize,
        from_f32: impl Fn(f32) -> T,
    ) -> usize {
        let mark = self.flush.position();
        if self.read < mark {
            let stale = usize::try_from(mark - self.read).unwrap_or(usize::MAX);
            self.read += self.consumer.skip(stale) as u64;
        }

        let mut played = 0;
        for frame in out.chunks_mut(channels.max(1)) {
            let sample = match self.consumer.try_pop() {
                Some(s) => {
                    played += 1;
                    s
                }
                None => 0.0,
            };
            frame.fill(from_f32(sample));
        }
        self.read += played as u64;
        played
    }
}

/// Handle to an active output stream.
///
/// **Not `Send`**: create and drop on the same OS thread.
pub struct AudioPlayback {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Native output rate (Hz); playback audio is converted to this rate.
    pub sample_rate: u32,
    pub channels: u16,
}

#[cfg(feature = "audio-cpal")]
fn build_output_stream<T, F>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut feed: PlaybackFeed,
    from_f32: F,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample,
    F: Fn(f32) -> T + Send + 'static,
{
    let channels = usize::from(config.channels);
    device.build_output_stream(
        config,
        move |out: &mut [T], _info: &cpal::OutputCallbackInfo| {
            feed.fill(out, channels, &from_f32);
        },
        |err| error!("audio output stream error: {err}"),
        None,
    )
}

impl AudioPlayback {
    /// Open an output device and return it with the producer half of a
    /// playback ring holding `queue_secs` of audio at the device rate.
    ///
    /// # Errors
    /// `LumiError::NoDefaultOutputDevice` when no output exists,
    /// `LumiError::AudioStream` if cpal fails to build or start the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        flush: Arc<FlushMark>,
        queue_secs: f32,
        preferred_device_name: Option<&str>,
    ) -> Result<(Self, SampleProducer)> {
        use super::device::{select_device, DeviceDirection};
        use crate::codec::pcm::sample_to_i16;

        let host = cpal::default_host();
        let device = select_device(&host, DeviceDirection::Output, preferred_device_name)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening output device"
        );

        let supported = device
            .default_output_config()
            .map_err(|e| LumiError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();

        let capacity = (sample_rate as f32 * queue_secs.max(0.1)) as usize;
        let (producer, consumer) = create_sample_ring(capacity);
        let feed = PlaybackFeed::new(consumer, flush);

        info!(sample_rate, channels, capacity, "playback config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_output_stream::<f32, _>(&device, &config, feed, |s| s),
            SampleFormat::I16 => {
                build_output_stream::<i16, _>(&device, &config, feed, sample_to_i16)
            }
            SampleFormat::U16 => build_output_stream::<u16, _>(&device, &config, feed, |s| {
                (i32::from(sample_to_i16(s)) + 32768) as u16
            }),
            fmt => {
                return Err(LumiError::AudioStream(format!(
                    "unsupported output sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| LumiError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| LumiError::AudioStream(e.to_string()))?;

        Ok((
            Self {
                _stream: stream,
                sample_rate,
                channels,
            },
            producer,
        ))
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioPlayback {
    pub fn open_with_preference(
        _flush: Arc<FlushMark>,
        _queue_secs: f32,
        _preferred_device_name: Option<&str>,
    ) -> Result<(Self, SampleProducer)> {
        Err(LumiError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::{create_sample_ring, Producer};

    #[test]
    fn fill_duplicates_mono_across_channels_then_silence() {
        let (mut prod, cons) = create_sample_ring(16);
        prod.push_slice(&[0.25, -0.5]);
        let mut feed = PlaybackFeed::new(cons, Arc::new(FlushMark::new()));

        let mut out = [9.0f32; 6];
        let played = feed.fill(&mut out, 2, |s| s);

        assert_eq!(played, 2);
        assert_eq!(out, [0.25, 0.25, -0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn flush_mark_skips_only_stale_samples() {
        let (mut prod, cons) = create_sample_ring(16);
        prod.push_slice(&[1.0; 8]);
        let flush = Arc::new(FlushMark::new());
        let mut feed = PlaybackFeed::new(cons, Arc::clone(&flush));

        // Three samples play before the interrupt lands.
        let mut out = [0.5f32; 3];
        assert_eq!(feed.fill(&mut out, 1, |s| s), 3);

        flush.advance_to(8);
        prod.push_slice(&[0.25; 2]);

        let mut out = [0.5f32; 4];
        assert_eq!(feed.fill(&mut out, 1, |s| s), 2);
        assert_eq!(out, [0.25, 0.25, 0.0, 0.0]);

        // Marking the same position again changes nothing.
        flush.advance_to(8);
        prod.push_slice(&[0.75]);
        assert_eq!(feed.fill(&mut out, 1, |s| s), 1);
        assert_eq!(out[0], 0.75);
    }

    #[test]
    fn flush_mark_never_moves_backwards() {
        let mark = FlushMark::new();
        mark.advance_to(10);
        mark.advance_to(4);
        assert_eq!(mark.position(), 10);
    }

    #[test]
    fn fill_converts_to_integer_formats() {
        let (mut prod, cons) = create_sample_ring(4);
        prod.push_slice(&[1.0, -1.0]);
        let mut feed = PlaybackFeed::new(cons, Arc::new(FlushMark::new()));

        let mut out = [0i16; 2];
        feed.fill(&mut out, 1, crate::codec::pcm::sample_to_i16);
        assert_eq!(out, [i16::MAX, i16::MIN]);
    }
}
