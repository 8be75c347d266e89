//! Blocking outbound pipeline loop.
//!
//! ## Stages (per chunk)
//!
//! ```text
//! 1. Pop one PcmChunk from the chunk ring (FIFO)
//! 2. Broadcast an AudioActivityEvent (RMS level, mute flag)
//! 3. If muted: count and drop
//! 4. Downsample to 16 kHz (identity when the device already runs at 16 kHz)
//! 5. Encode to base64 LE int16 → WireAudioBlob
//! 6. blocking_send to the session's outbound channel
//! ```
//!
//! This loop runs in `spawn_blocking`, keeping the Tokio executor free for
//! the network session. It never touches the real-time thread; its only
//! link to the input callback is the chunk ring.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::{
    audio::resample::{downsample, output_len},
    buffering::{chunk::PcmChunk, ChunkConsumer, Consumer},
    codec::{pcm::encode_pcm16_le, wire::WireAudioBlob},
    engine::EngineConfig,
    error::LumiError,
    ipc::events::{AudioActivityEvent, EngineStatus, EngineStatusEvent},
};

/// Shared counters, updated from the input callback, the pipeline thread
/// and the playback scheduler.
#[derive(Default)]
pub struct PipelineDiagnostics {
    pub chunks_captured: AtomicUsize,
    pub chunks_dropped: AtomicUsize,
    pub chunks_sent: AtomicUsize,
    pub chunks_muted: AtomicUsize,
    pub samples_sent: AtomicUsize,
    pub inbound_decoded: AtomicUsize,
    pub inbound_malformed: AtomicUsize,
    pub playback_overflow_samples: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.chunks_captured.store(0, Ordering::Relaxed);
        self.chunks_dropped.store(0, Ordering::Relaxed);
        self.chunks_sent.store(0, Ordering::Relaxed);
        self.chunks_muted.store(0, Ordering::Relaxed);
        self.samples_sent.store(0, Ordering::Relaxed);
        self.inbound_decoded.store(0, Ordering::Relaxed);
        self.inbound_malformed.store(0, Ordering::Relaxed);
        self.playback_overflow_samples.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_captured: self.chunks_captured.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            chunks_muted: self.chunks_muted.load(Ordering::Relaxed),
            samples_sent: self.samples_sent.load(Ordering::Relaxed),
            inbound_decoded: self.inbound_decoded.load(Ordering::Relaxed),
            inbound_malformed: self.inbound_malformed.load(Ordering::Relaxed),
            playback_overflow_samples: self.playback_overflow_samples.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub chunks_captured: usize,
    pub chunks_dropped: usize,
    pub chunks_sent: usize,
    pub chunks_muted: usize,
    pub samples_sent: usize,
    pub inbound_decoded: usize,
    pub inbound_malformed: usize,
    pub playback_overflow_samples: usize,
}

/// All context the pipeline needs, passed as one struct so the closure stays tidy.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub consumer: ChunkConsumer,
    pub running: Arc<AtomicBool>,
    pub muted: Arc<AtomicBool>,
    pub outbound_tx: mpsc::Sender<WireAudioBlob>,
    pub status_tx: broadcast::Sender<EngineStatusEvent>,
    pub activity_tx: broadcast::Sender<AudioActivityEvent>,
    pub status: Arc<Mutex<EngineStatus>>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Sleep when the ring is empty. A chunk arrives every ~85 ms at 48 kHz.
const EMPTY_SLEEP: Duration = Duration::from_millis(5);

/// Downsample and encode one captured chunk for the wire.
pub fn encode_chunk(chunk: &PcmChunk, outbound_sample_rate: u32) -> WireAudioBlob {
    let resampled = downsample(chunk.samples(), chunk.sample_rate(), outbound_sample_rate);
    WireAudioBlob::from_pcm_bytes(&encode_pcm16_le(&resampled), outbound_sample_rate)
}

/// Run the blocking pipeline until `ctx.running` becomes false or the
/// session drops its receiver.
pub fn run(mut ctx: PipelineContext) {
    info!("outbound pipeline started");

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        let Some(chunk) = ctx.consumer.try_pop() else {
            std::thread::sleep(EMPTY_SLEEP);
            continue;
        };

        let muted = ctx.muted.load(Ordering::Relaxed);
        let rms = chunk.rms();
        let _ = ctx.activity_tx.send(AudioActivityEvent {
            seq: ctx.seq.fetch_add(1, Ordering::Relaxed),
            rms,
            muted,
        });

        if muted {
            ctx.diagnostics.chunks_muted.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let blob = encode_chunk(&chunk, ctx.config.outbound_sample_rate);
        let wire_samples = output_len(
            chunk.len(),
            chunk.sample_rate(),
            ctx.config.outbound_sample_rate,
        );

        debug!(
            captured = chunk.len(),
            capture_rate = chunk.sample_rate(),
            wire_samples,
            rms = format_args!("{:.4}", rms),
            "encoded chunk"
        );

        if ctx.outbound_tx.blocking_send(blob).is_err() {
            let reason = LumiError::SessionClosed;
            info!("{reason}, stopping capture");
            ctx.running.store(false, Ordering::SeqCst);
            *ctx.status.lock() = EngineStatus::Stopped;
            let _ = ctx.status_tx.send(EngineStatusEvent {
                status: EngineStatus::Stopped,
                detail: Some(reason.to_string()),
            });
            break;
        }

        ctx.diagnostics.chunks_sent.fetch_add(1, Ordering::Relaxed);
        ctx.diagnostics
            .samples_sent
            .fetch_add(wire_samples, Ordering::Relaxed);
    }

    // Chunks still queued at teardown are not delivered.
    let mut discarded = 0usize;
    while ctx.consumer.try_pop().is_some() {
        discarded += 1;
    }
    if discarded > 0 {
        debug!(discarded, "discarded queued chunks at teardown");
    }

    info!("outbound pipeline stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_chunk_downsamples_and_tags_rate() {
        let chunk = PcmChunk::new(vec![0.5f32; 4096], 48_000);
        let blob = encode_chunk(&chunk, 16_000);
        assert_eq!(blob.mime_type(), "audio/pcm;rate=16000");

        let pcm = blob.pcm_bytes().unwrap();
        assert_eq!(pcm.len(), 2 * 1366);
        assert!(pcm
            .chunks_exact(2)
            .all(|s| i16::from_le_bytes([s[0], s[1]]) == 16384));
    }

    #[test]
    fn encode_chunk_at_native_rate_keeps_length() {
        let chunk = PcmChunk::new(vec![0.0f32; 4096], 16_000);
        let pcm = encode_chunk(&chunk, 16_000).pcm_bytes().unwrap();
        assert_eq!(pcm.len(), 2 * 4096);
    }

    #[test]
    fn diagnostics_reset_and_snapshot() {
        let diagnostics = PipelineDiagnostics::default();
        diagnostics.chunks_sent.fetch_add(3, Ordering::Relaxed);
        diagnostics.chunks_dropped.fetch_add(1, Ordering::Relaxed);

        let snap = diagnostics.snapshot();
        assert_eq!(snap.chunks_sent, 3);
        assert_eq!(snap.chunks_dropped, 1);

        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["chunksSent"], 3);
        assert_eq!(json["playbackOverflowSamples"], 0);

        diagnostics.reset();
        assert_eq!(diagnostics.snapshot(), DiagnosticsSnapshot::default());
    }
}
