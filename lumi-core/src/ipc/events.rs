//! Engine status and input-level events.
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `EngineStatusEvent` | `LumiEngine::subscribe_status` |
//! | `AudioActivityEvent` | `LumiEngine::subscribe_activity` |

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Audio activity events
// ---------------------------------------------------------------------------

/// Emitted for each captured chunk, muted or not. Drives level meters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Root-mean-square level of the chunk in [0.0, 1.0].
    pub rms: f32,
    /// Whether the chunk was withheld from the session.
    pub muted: bool,
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

/// Emitted when the capture side changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the capture side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created, capture never started.
    Idle,
    /// Microphone open, chunks flowing to the session.
    Capturing,
    /// Capture stopped; engine may be restarted.
    Stopped,
    /// Device or pipeline failure; see `detail`.
    Error,
}
