//! # lumi-core
//!
//! Realtime audio plumbing for a bidirectional voice session.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → CaptureFramer → SPSC chunk ring → Pipeline(spawn_blocking)
//!                                                                    │
//!                                                       downsample to 16 kHz
//!                                                                    │
//!                                                  int16 LE → base64 → WireAudioBlob
//!                                                                    │
//!                                                        mpsc::Sender (session)
//!
//! Session → WireAudioBlob → decode_pcm16 → PlaybackScheduler → sample ring → Speaker
//! ```
//!
//! The audio callbacks never block. All encoding happens in the pipeline
//! thread; all decoding and rate conversion happens on the caller's thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod codec;
pub mod engine;
pub mod error;
pub mod ipc;

// Convenience re-exports for downstream crates
pub use buffering::{chunk::PcmChunk, framer::CaptureFramer};
pub use codec::{pcm::PlaybackBuffer, wire::WireAudioBlob};
pub use engine::{pipeline::DiagnosticsSnapshot, EngineConfig, LumiEngine};
pub use error::LumiError;
pub use ipc::events::{AudioActivityEvent, EngineStatus, EngineStatusEvent};
