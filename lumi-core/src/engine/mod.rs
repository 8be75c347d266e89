//! `LumiEngine`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! LumiEngine::new()
//!     ├─► start_capture(outbound_tx) → mic open, pipeline spawned, status = Capturing
//!     │       └─► stop_capture()     → session flag cleared, stream dropped, status = Stopped
//!     └─► start_playback()           → speaker open, scheduler ready
//!             ├─► play_inbound(blob) → decoded, queued gaplessly
//!             ├─► finish_playback_turn() → converter tail released
//!             ├─► interrupt_playback()
//!             └─► stop_playback()
//! ```
//!
//! Start/stop calls in the wrong state return an error rather than panicking.
//!
//! Every start hands its worker a fresh running flag (see [`SessionSlot`]).
//! A stop clears only that flag, so a quick stop/start can never keep a
//! previous worker, and the device it holds, alive.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread affinity).
//! Both streams are therefore created *inside* `spawn_blocking` closures so
//! they never cross a thread boundary. A oneshot channel propagates any
//! open-device error back to the caller.

pub mod pipeline;
pub mod playback;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::{
    audio::{AudioCapture, AudioPlayback, FlushMark},
    buffering::{chunk::CHUNK_SIZE, create_chunk_ring, DEFAULT_CHUNK_CAPACITY},
    codec::wire::{WireAudioBlob, DEFAULT_INBOUND_SAMPLE_RATE, OUTBOUND_SAMPLE_RATE},
    error::{LumiError, Result},
    ipc::events::{AudioActivityEvent, EngineStatus, EngineStatusEvent},
};

use playback::{PlaybackScheduler, ScheduledPlayback};

/// Broadcast channel capacity for status/activity subscribers.
const BROADCAST_CAP: usize = 256;

/// How often the playback holder thread checks whether to release the device.
const PLAYBACK_PARK_INTERVAL: Duration = Duration::from_millis(50);

/// Running flag of the current capture or playback session.
///
/// The worker owns a clone of the flag and exits once it reads `false`.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl SessionSlot {
    /// Claim the slot with a new flag.
    ///
    /// # Errors
    /// `LumiError::AlreadyRunning` if the current session is still live.
    pub fn begin(&self) -> Result<Arc<AtomicBool>> {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|f| f.load(Ordering::SeqCst)) {
            return Err(LumiError::AlreadyRunning);
        }
        let flag = Arc::new(AtomicBool::new(true));
        *current = Some(Arc::clone(&flag));
        Ok(flag)
    }

    /// Clear the current session's flag.
    ///
    /// # Errors
    /// `LumiError::NotRunning` if no session is live.
    pub fn end(&self) -> Result<()> {
        match self.current.lock().take() {
            Some(flag) if flag.swap(false, Ordering::SeqCst) => Ok(()),
            _ => Err(LumiError::NotRunning),
        }
    }

    pub fn is_active(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Configuration for `LumiEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Samples per captured chunk. Default: 4096.
    pub chunk_size: usize,
    /// Rate the session expects for microphone audio. Default: 16000.
    pub outbound_sample_rate: u32,
    /// Rate assumed for inbound audio without a `rate=` tag. Default: 24000.
    pub inbound_sample_rate: u32,
    /// Channel count of inbound PCM. Default: 1.
    pub inbound_channels: u16,
    /// Chunks buffered between the input callback and the pipeline before
    /// new chunks are dropped. Default: 64.
    pub chunk_queue_capacity: usize,
    /// Seconds of device-rate audio the playback ring can hold. Default: 30.
    pub playback_queue_secs: f32,
    /// Whether capture begins muted. Default: false.
    pub start_muted: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            outbound_sample_rate: OUTBOUND_SAMPLE_RATE,
            inbound_sample_rate: DEFAULT_INBOUND_SAMPLE_RATE,
            inbound_channels: 1,
            chunk_queue_capacity: DEFAULT_CHUNK_CAPACITY,
            playback_queue_secs: 30.0,
            start_muted: false,
        }
    }
}

/// The top-level engine handle.
///
/// `LumiEngine` is `Send + Sync`; all fields use interior mutability.
/// Wrap in `Arc<LumiEngine>` to share between the host and its session tasks.
pub struct LumiEngine {
    config: EngineConfig,
    capture: SessionSlot,
    muted: Arc<AtomicBool>,
    status: Arc<Mutex<EngineStatus>>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    activity_tx: broadcast::Sender<AudioActivityEvent>,
    /// Activity event sequence counter.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
    playback: SessionSlot,
    scheduler: Mutex<Option<PlaybackScheduler>>,
}

impl LumiEngine {
    /// Create a new engine. Nothing is opened until `start_capture` /
    /// `start_playback`.
    pub fn new(config: EngineConfig) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);
        let muted = Arc::new(AtomicBool::new(config.start_muted));

        Self {
            config,
            capture: SessionSlot::default(),
            muted,
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            status_tx,
            activity_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
            playback: SessionSlot::default(),
            scheduler: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open the default microphone and stream encoded chunks into `outbound_tx`.
    ///
    /// Blocks until the device is confirmed open (or fails). The pipeline keeps
    /// running in a background blocking thread until `stop_capture()` or until
    /// the receiver of `outbound_tx` is dropped.
    ///
    /// # Errors
    /// - `LumiError::AlreadyRunning` if already capturing.
    /// - `LumiError::NoDefaultInputDevice` / `LumiError::AudioStream` on device error.
    pub fn start_capture(&self, outbound_tx: mpsc::Sender<WireAudioBlob>) -> Result<u32> {
        self.start_capture_with_device(outbound_tx, None)
    }

    /// Start capture on a preferred input device, falling back to the default.
    ///
    /// Returns the device's native sample rate.
    pub fn start_capture_with_device(
        &self,
        outbound_tx: mpsc::Sender<WireAudioBlob>,
        preferred_input_device: Option<String>,
    ) -> Result<u32> {
        let running = self.capture.begin()?;

        self.diagnostics.reset();

        let (producer, consumer) = create_chunk_ring(self.config.chunk_queue_capacity);

        // Clone all Arc-wrapped state before moving into the closure.
        let config = self.config.clone();
        let worker_running = Arc::clone(&running);
        let muted = Arc::clone(&self.muted);
        let status_tx = self.status_tx.clone();
        let activity_tx = self.activity_tx.clone();
        let status = Arc::clone(&self.status);
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);

        let (open_tx, open_rx) = crossbeam_channel::bounded::<Result<u32>>(1);

        tokio::task::spawn_blocking(move || {
            let running = worker_running;
            // Must open on THIS thread. cpal::Stream is !Send.
            let capture = match AudioCapture::open_with_preference(
                producer,
                Arc::clone(&running),
                Arc::clone(&diagnostics),
                config.chunk_size,
                preferred_input_device.as_deref(),
            ) {
                Ok(c) => {
                    let _ = open_tx.send(Ok(c.sample_rate));
                    c
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            pipeline::run(pipeline::PipelineContext {
                config,
                consumer,
                running,
                muted,
                outbound_tx,
                status_tx,
                activity_tx,
                status,
                seq,
                diagnostics,
            });

            capture.stop();
            // Stream drops here, releasing the device on this thread. The
            // framer's sub-chunk remainder goes with it.
            drop(capture);
        });

        match open_rx.recv() {
            Ok(Ok(rate)) => {
                self.set_status(EngineStatus::Capturing, None);
                info!(sample_rate = rate, "capture started");
                Ok(rate)
            }
            Ok(Err(e)) => {
                running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some("pipeline failed to start".into()));
                Err(LumiError::Other(anyhow::anyhow!(
                    "capture task died unexpectedly"
                )))
            }
        }
    }

    /// Stop capture. Queued chunks and the partial chunk are discarded.
    ///
    /// # Errors
    /// `LumiError::NotRunning` if not currently capturing.
    pub fn stop_capture(&self) -> Result<()> {
        self.capture.end()?;
        self.set_status(EngineStatus::Stopped, None);
        info!("capture stop requested");
        Ok(())
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_active()
    }

    /// Withhold captured audio from the session without closing the device.
    pub fn set_muted(&self, muted: bool) {
        let was = self.muted.swap(muted, Ordering::SeqCst);
        if was != muted {
            info!(muted, "microphone mute changed");
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Open the output device and prepare the playback scheduler.
    ///
    /// Returns the device's native sample rate.
    ///
    /// # Errors
    /// - `LumiError::AlreadyRunning` if playback is already open.
    /// - `LumiError::NoDefaultOutputDevice` / `LumiError::AudioStream` on device error.
    pub fn start_playback(&self, preferred_output_device: Option<String>) -> Result<u32> {
        let running = self.playback.begin()?;

        let flush = Arc::new(FlushMark::new());
        let worker_running = Arc::clone(&running);
        let queue_secs = self.config.playback_queue_secs;
        let cb_flush = Arc::clone(&flush);

        let (open_tx, open_rx) = crossbeam_channel::bounded(1);

        tokio::task::spawn_blocking(move || {
            let running = worker_running;
            let output = match AudioPlayback::open_with_preference(
                cb_flush,
                queue_secs,
                preferred_output_device.as_deref(),
            ) {
                Ok((output, producer)) => {
                    let _ = open_tx.send(Ok((output.sample_rate, producer)));
                    output
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            while running.load(Ordering::Relaxed) {
                std::thread::sleep(PLAYBACK_PARK_INTERVAL);
            }
            drop(output);
            info!("output device released");
        });

        match open_rx.recv() {
            Ok(Ok((rate, producer))) => {
                *self.scheduler.lock() = Some(PlaybackScheduler::new(
                    producer,
                    flush,
                    rate,
                    Arc::clone(&self.diagnostics),
                ));
                info!(sample_rate = rate, "playback started");
                Ok(rate)
            }
            Ok(Err(e)) => {
                running.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                Err(LumiError::Other(anyhow::anyhow!(
                    "playback task died unexpectedly"
                )))
            }
        }
    }

    /// Release the output device. Unplayed audio is dropped.
    pub fn stop_playback(&self) -> Result<()> {
        self.playback.end()?;
        *self.scheduler.lock() = None;
        info!("playback stop requested");
        Ok(())
    }

    /// Decode an inbound blob and queue it behind any audio still playing.
    ///
    /// # Errors
    /// - `LumiError::NotRunning` if playback was not started.
    /// - `LumiError::Base64` / `LumiError::MalformedPayload` for a bad
    ///   payload; nothing is queued and the caller decides whether to skip it.
    pub fn play_inbound(&self, blob: &WireAudioBlob) -> Result<ScheduledPlayback> {
        let buffer = match blob.decode(self.config.inbound_sample_rate, self.config.inbound_channels)
        {
            Ok(b) => b,
            Err(e) => {
                self.diagnostics
                    .inbound_malformed
                    .fetch_add(1, Ordering::Relaxed);
                warn!(mime_type = blob.mime_type(), "dropping inbound audio: {e}");
                return Err(e);
            }
        };

        let mut guard = self.scheduler.lock();
        let scheduler = guard.as_mut().ok_or(LumiError::NotRunning)?;
        scheduler.enqueue(&buffer)
    }

    /// The model finished its turn: play out the audio held back by the
    /// rate converter.
    pub fn finish_playback_turn(&self) {
        if let Some(scheduler) = self.scheduler.lock().as_mut() {
            let tail = scheduler.finish_turn();
            debug!(tail, "playback turn complete");
        }
    }

    /// Discard all queued model audio (the peer was interrupted).
    pub fn interrupt_playback(&self) {
        if let Some(scheduler) = self.scheduler.lock().as_mut() {
            scheduler.interrupt();
        }
    }

    /// Whether model audio is currently scheduled to be audible.
    pub fn is_speaking(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .is_some_and(PlaybackScheduler::is_speaking)
    }

    /// Model audio scheduled but not yet played.
    pub fn queued_playback(&self) -> Duration {
        self.scheduler
            .lock()
            .as_ref()
            .map_or(Duration::ZERO, PlaybackScheduler::queued)
    }

    /// Current capture status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Subscribe to capture status changes.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Subscribe to per-chunk input level events.
    pub fn subscribe_activity(&self) -> broadcast::Receiver<AudioActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_protocol_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.outbound_sample_rate, 16_000);
        assert_eq!(config.inbound_sample_rate, 24_000);
        assert_eq!(config.inbound_channels, 1);
    }

    #[test]
    fn stop_without_start_is_an_error() {
        let engine = LumiEngine::new(EngineConfig::default());
        assert!(matches!(engine.stop_capture(), Err(LumiError::NotRunning)));
        assert!(matches!(engine.stop_playback(), Err(LumiError::NotRunning)));
        assert_eq!(engine.status(), EngineStatus::Idle);
    }

    #[test]
    fn inbound_audio_requires_playback() {
        let engine = LumiEngine::new(EngineConfig::default());
        let blob = WireAudioBlob::from_pcm_bytes(&[0, 0, 0, 0], 24_000);
        assert!(matches!(engine.play_inbound(&blob), Err(LumiError::NotRunning)));
        assert!(!engine.is_speaking());
    }

    #[test]
    fn malformed_inbound_is_counted() {
        let engine = LumiEngine::new(EngineConfig::default());
        let blob = WireAudioBlob::from_pcm_bytes(&[0, 0, 0], 24_000);
        assert!(matches!(
            engine.play_inbound(&blob),
            Err(LumiError::MalformedPayload { len: 3, channels: 1 })
        ));
        assert_eq!(engine.diagnostics_snapshot().inbound_malformed, 1);
    }

    #[test]
    fn mute_starts_from_config() {
        let engine = LumiEngine::new(EngineConfig {
            start_muted: true,
            ..EngineConfig::default()
        });
        assert!(engine.is_muted());
        engine.set_muted(false);
        assert!(!engine.is_muted());
    }

    #[test]
    fn nothing_queued_without_playback() {
        let engine = LumiEngine::new(EngineConfig::default());
        assert_eq!(engine.queued_playback(), Duration::ZERO);
        engine.finish_playback_turn();
        engine.interrupt_playback();
    }

    #[test]
    fn restart_gives_a_fresh_flag() {
        let slot = SessionSlot::default();
        let first = slot.begin().unwrap();
        slot.end().unwrap();
        let second = slot.begin().unwrap();

        // The first worker must still see its own session as stopped.
        assert!(!first.load(Ordering::SeqCst));
        assert!(second.load(Ordering::SeqCst));
        assert!(slot.is_active());
    }

    #[test]
    fn slot_rejects_double_begin_and_double_end() {
        let slot = SessionSlot::default();
        assert!(!slot.is_active());
        assert!(matches!(slot.end(), Err(LumiError::NotRunning)));

        let _flag = slot.begin().unwrap();
        assert!(matches!(slot.begin(), Err(LumiError::AlreadyRunning)));
        slot.end().unwrap();
        assert!(matches!(slot.end(), Err(LumiError::NotRunning)));
        assert!(!slot.is_active());
    }

    #[test]
    fn worker_exit_frees_the_slot() {
        let slot = SessionSlot::default();
        let flag = slot.begin().unwrap();

        // A pipeline that stops on its own clears its flag.
        flag.store(false, Ordering::SeqCst);
        assert!(!slot.is_active());
        assert!(matches!(slot.end(), Err(LumiError::NotRunning)));
        assert!(slot.begin().is_ok());
    }
}
