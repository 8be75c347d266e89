//! Microphone capture via cpal.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** block on a mutex, wait on a channel or perform I/O.
//!
//! The callback therefore does three things only: downmix the device block
//! to mono f32 into a reused scratch buffer, feed it to the
//! [`CaptureFramer`], and `try_push` each finished chunk into the SPSC chunk
//! ring. A full ring drops the chunk and bumps a counter.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` and `AudioPlayback` must be created and dropped on
//! the same thread; the engine opens them inside `spawn_blocking`.

pub mod device;
pub mod playback;
pub mod resample;

pub use playback::{AudioPlayback, FlushMark, PlaybackFeed};

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::{
    buffering::{framer::CaptureFramer, ChunkProducer, Producer},
    engine::pipeline::PipelineDiagnostics,
    error::{LumiError, Result},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::warn;
#[cfg(feature = "audio-cpal")]
use tracing::{error, info};

/// Downmix an interleaved device block to mono f32, reusing `out`.
pub fn downmix_into<T: Copy>(
    data: &[T],
    channels: usize,
    to_f32: impl Fn(T) -> f32,
    out: &mut Vec<f32>,
) {
    out.clear();
    if channels <= 1 {
        out.extend(data.iter().map(|s| to_f32(*s)));
        return;
    }
    out.extend(
        data.chunks_exact(channels)
            .map(|frame| frame.iter().map(|s| to_f32(*s)).sum::<f32>() / channels as f32),
    );
}

/// Callback-side state: the framer plus the producer half of the chunk ring.
pub struct CaptureSink {
    framer: CaptureFramer,
    producer: ChunkProducer,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl CaptureSink {
    pub fn new(
        framer: CaptureFramer,
        producer: ChunkProducer,
        diagnostics: Arc<PipelineDiagnostics>,
    ) -> Self {
        Self {
            framer,
            producer,
            diagnostics,
        }
    }

    /// Frame one mono block and hand every finished chunk to the ring.
    pub fn push_block(&mut self, block: &[f32]) {
        let Self {
            framer,
            producer,
            diagnostics,
        } = self;

        framer.push(block, |chunk| match producer.try_push(chunk) {
            Ok(()) => {
                diagnostics.chunks_captured.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                let dropped = diagnostics.chunks_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "chunk queue full: dropped newest chunk");
            }
        });
    }

    /// Samples held back until the next chunk boundary.
    pub fn pending(&self) -> usize {
        self.framer.pending()
    }
}

/// Handle to an active microphone stream.
///
/// **Not `Send`**. `cpal::Stream` is bound to its creation thread on Windows/macOS.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag. Set to `false` to make the callback a no-op.
    running: Arc<AtomicBool>,
    /// Native capture rate reported by the device (Hz).
    pub sample_rate: u32,
}

#[cfg(feature = "audio-cpal")]
fn build_capture_stream<T, F>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut sink: CaptureSink,
    running: Arc<AtomicBool>,
    to_f32: F,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample,
    F: Fn(T) -> f32 + Send + 'static,
{
    let channels = usize::from(config.channels);
    let mut mono: Vec<f32> = Vec::with_capacity(8192);

    device.build_input_stream(
        config,
        move |data: &[T], _info: &cpal::InputCallbackInfo| {
            if !running.load(Ordering::Relaxed) || data.is_empty() {
                return;
            }
            downmix_into(data, channels, &to_f32, &mut mono);
            sink.push_block(&mono);
        },
        |err| error!("audio input stream error: {err}"),
        None,
    )
}

impl AudioCapture {
    /// Open an input device by preferred name (falling back to the default
    /// and then the first available device) and stream framed chunks into
    /// `producer`.
    ///
    /// Must be called from the thread that will also drop this value.
    ///
    /// # Errors
    /// `LumiError::NoDefaultInputDevice` when no microphone is available,
    /// `LumiError::AudioStream` if cpal fails to build or start the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        producer: ChunkProducer,
        running: Arc<AtomicBool>,
        diagnostics: Arc<PipelineDiagnostics>,
        chunk_size: usize,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device =
            device::select_device(&host, device::DeviceDirection::Input, preferred_device_name)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| LumiError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();

        info!(sample_rate, channels, chunk_size, "capture config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let sink = CaptureSink::new(
            CaptureFramer::new(chunk_size, sample_rate),
            producer,
            diagnostics,
        );
        let cb_running = Arc::clone(&running);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                build_capture_stream::<f32, _>(&device, &config, sink, cb_running, |s| s)
            }
            SampleFormat::I16 => build_capture_stream::<i16, _>(
                &device,
                &config,
                sink,
                cb_running,
                crate::codec::pcm::i16_to_sample,
            ),
            SampleFormat::U16 => {
                build_capture_stream::<u16, _>(&device, &config, sink, cb_running, |s| {
                    (s as f32 - 32768.0) / 32768.0
                })
            }
            SampleFormat::U8 => {
                build_capture_stream::<u8, _>(&device, &config, sink, cb_running, |s| {
                    (s as f32 - 128.0) / 128.0
                })
            }
            fmt => {
                return Err(LumiError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| LumiError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| LumiError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }
}

impl AudioCapture {
    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: ChunkProducer,
        _running: Arc<AtomicBool>,
        _diagnostics: Arc<PipelineDiagnostics>,
        _chunk_size: usize,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(LumiError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::{create_chunk_ring, Consumer};

    #[test]
    fn downmix_averages_stereo_frames() {
        let mut out = Vec::new();
        downmix_into(&[1.0f32, 0.0, 0.5, 0.5, -1.0, 1.0], 2, |s| s, &mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn downmix_converts_integer_samples() {
        let mut out = vec![9.0; 3];
        downmix_into(&[16384i16, -32768], 1, crate::codec::pcm::i16_to_sample, &mut out);
        assert_eq!(out, vec![0.5, -1.0]);
    }

    #[test]
    fn sink_emits_chunk_after_three_callbacks() {
        let (producer, mut consumer) = create_chunk_ring(4);
        let diagnostics = Arc::new(PipelineDiagnostics::default());
        let mut sink = CaptureSink::new(
            CaptureFramer::with_default_chunk(48_000),
            producer,
            Arc::clone(&diagnostics),
        );

        for _ in 0..3 {
            sink.push_block(&[0.1; 2048]);
        }

        let chunk = consumer.try_pop().expect("one chunk");
        assert_eq!(chunk.len(), 4096);
        assert!(consumer.try_pop().is_none());
        assert_eq!(sink.pending(), 2048);
        assert_eq!(diagnostics.snapshot().chunks_captured, 1);
    }

    #[cfg(not(feature = "audio-cpal"))]
    #[test]
    fn capture_without_backend_fails_to_open() {
        let (producer, _consumer) = create_chunk_ring(4);
        let running = Arc::new(AtomicBool::new(true));
        let result = AudioCapture::open_with_preference(
            producer,
            Arc::clone(&running),
            Arc::new(PipelineDiagnostics::default()),
            4096,
            None,
        );
        assert!(matches!(result, Err(LumiError::AudioStream(_))));
    }

    #[test]
    fn sink_counts_drops_when_ring_is_full() {
        let (producer, mut consumer) = create_chunk_ring(1);
        let diagnostics = Arc::new(PipelineDiagnostics::default());
        let mut sink = CaptureSink::new(
            CaptureFramer::new(4, 16_000),
            producer,
            Arc::clone(&diagnostics),
        );

        sink.push_block(&[1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 3.0]);

        let snap = diagnostics.snapshot();
        assert_eq!(snap.chunks_captured, 1);
        assert_eq!(snap.chunks_dropped, 1);
        // Oldest chunk survives; framer still bounded.
        assert_eq!(consumer.try_pop().map(|c| c.samples()[0]), Some(1.0));
        assert_eq!(sink.pending(), 1);
    }
}
