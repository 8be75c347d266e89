//! Newline-delimited JSON messages from the session collaborator (stdin).
//!
//! ```text
//! {"type":"audio","data":"<base64>","mimeType":"audio/pcm;rate=24000"}
//! {"type":"interrupted"}
//! {"type":"turnComplete"}
//! {"type":"mute","muted":true}
//! ```
//!
//! Outbound microphone blobs are written to stdout as bare
//! `{"data":..,"mimeType":..}` objects, one per line.

use lumi_core::WireAudioBlob;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionMessage {
    /// Model audio to play.
    Audio(WireAudioBlob),
    /// The peer was interrupted; drop queued playback.
    Interrupted,
    /// The model finished speaking; flush held-back playback audio.
    TurnComplete,
    Mute { muted: bool },
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<serde_json::Result<SessionMessage>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed))
}
