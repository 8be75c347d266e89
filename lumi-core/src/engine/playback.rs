//! Inbound audio scheduling.
//!
//! Each decoded buffer is queued directly behind the previous one, so
//! consecutive model responses play gaplessly. A buffer that arrives after
//! the queue has drained starts "now" rather than in the past.
//!
//! Buffers of one model turn are converted as a single continuous stream:
//! the rate converter keeps its filter state across buffers and only gives
//! up its held-back tail when the turn ends, the source rate changes or
//! playback is interrupted.
//!
//! The scheduler runs on the control side. Its only link to the output
//! callback is the sample ring plus the shared [`FlushMark`].

use std::sync::{atomic::Ordering, Arc};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::{
    audio::{playback::FlushMark, resample::RateConverter},
    buffering::{Producer, SampleProducer},
    codec::pcm::PlaybackBuffer,
    engine::pipeline::PipelineDiagnostics,
    error::Result,
};

/// Input block size for the playback rate converter (20 ms at 24 kHz).
const CONVERTER_CHUNK: usize = 480;

/// Virtual playback timeline, measured from the scheduler's epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleClock {
    next_start: Duration,
}

impl ScheduleClock {
    /// Reserve `duration` on the timeline; returns the start offset.
    pub fn schedule(&mut self, now: Duration, duration: Duration) -> Duration {
        let start = self.next_start.max(now);
        self.next_start = start + duration;
        start
    }

    /// Whether scheduled audio is still playing at `now`.
    pub fn is_active(&self, now: Duration) -> bool {
        self.next_start > now
    }

    /// Scheduled audio left after `now`.
    pub fn remaining(&self, now: Duration) -> Duration {
        self.next_start.saturating_sub(now)
    }

    /// Forget everything scheduled after `now`.
    pub fn reset(&mut self, now: Duration) {
        self.next_start = now;
    }
}

/// Where a buffer landed on the playback timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledPlayback {
    pub start: Duration,
    pub duration: Duration,
    /// Device-rate samples actually written to the ring.
    pub samples_queued: usize,
}

pub struct PlaybackScheduler {
    producer: SampleProducer,
    flush: Arc<FlushMark>,
    /// Samples ever pushed to the ring; the stream position for `flush`.
    written: u64,
    device_rate: u32,
    converter: Option<RateConverter>,
    clock: ScheduleClock,
    epoch: Instant,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl PlaybackScheduler {
    pub fn new(
        producer: SampleProducer,
        flush: Arc<FlushMark>,
        device_rate: u32,
        diagnostics: Arc<PipelineDiagnostics>,
    ) -> Self {
        Self {
            producer,
            flush,
            written: 0,
            device_rate,
            converter: None,
            clock: ScheduleClock::default(),
            epoch: Instant::now(),
            diagnostics,
        }
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    /// Queue a decoded buffer behind everything already scheduled.
    pub fn enqueue(&mut self, buffer: &PlaybackBuffer) -> Result<ScheduledPlayback> {
        let now = self.epoch.elapsed();
        self.enqueue_at(buffer, now)
    }

    /// [`enqueue`](Self::enqueue) with an explicit timeline position.
    pub fn enqueue_at(
        &mut self,
        buffer: &PlaybackBuffer,
        now: Duration,
    ) -> Result<ScheduledPlayback> {
        let mono = buffer.to_mono();
        let (converter, mut samples) = self.converter_for(buffer.sample_rate())?;
        samples.extend(converter.process(&mono));

        let pushed = self.push(&samples);
        let lost = samples.len() - pushed;
        let duration = buffer
            .duration()
            .saturating_sub(Duration::from_secs_f64(lost as f64 / self.device_rate as f64));
        let start = self.clock.schedule(now, duration);
        self.diagnostics
            .inbound_decoded
            .fetch_add(1, Ordering::Relaxed);

        debug!(
            frames = buffer.frames(),
            source_rate = buffer.sample_rate(),
            device_rate = self.device_rate,
            queued = pushed,
            start_ms = start.as_millis() as u64,
            "scheduled playback buffer"
        );

        Ok(ScheduledPlayback {
            start,
            duration,
            samples_queued: pushed,
        })
    }

    /// The current model turn is complete: release the converter's
    /// held-back tail. Returns the samples queued.
    pub fn finish_turn(&mut self) -> usize {
        let tail = match self.converter.as_mut() {
            Some(converter) => converter.flush(),
            None => return 0,
        };
        self.push(&tail)
    }

    /// Discard every queued but unplayed sample.
    pub fn interrupt(&mut self) {
        let now = self.epoch.elapsed();
        self.interrupt_at(now);
    }

    pub fn interrupt_at(&mut self, now: Duration) {
        self.flush.advance_to(self.written);
        if let Some(converter) = self.converter.as_mut() {
            converter.reset();
        }
        self.clock.reset(now);
        debug!(flushed_through = self.written, "playback interrupted");
    }

    /// Whether the peer is audible right now.
    pub fn is_speaking(&self) -> bool {
        self.clock.is_active(self.epoch.elapsed())
    }

    /// Scheduled audio not yet played.
    pub fn queued(&self) -> Duration {
        self.clock.remaining(self.epoch.elapsed())
    }

    fn push(&mut self, samples: &[f32]) -> usize {
        let pushed = self.producer.push_slice(samples);
        self.written += pushed as u64;
        if pushed < samples.len() {
            let lost = samples.len() - pushed;
            self.diagnostics
                .playback_overflow_samples
                .fetch_add(lost, Ordering::Relaxed);
            warn!(lost, "playback queue full: truncated buffer");
        }
        pushed
    }

    /// Converter for `source_rate`, plus the tail of a previous converter
    /// running at a different rate.
    fn converter_for(&mut self, source_rate: u32) -> Result<(&mut RateConverter, Vec<f32>)> {
        let (converter, tail) = match self.converter.take() {
            Some(c) if c.source_rate() == source_rate => (c, Vec::new()),
            previous => {
                let tail = previous.map(|mut c| c.flush()).unwrap_or_default();
                let c = RateConverter::new(source_rate, self.device_rate, CONVERTER_CHUNK)?;
                (c, tail)
            }
        };
        Ok((self.converter.insert(converter), tail))
    }
}
