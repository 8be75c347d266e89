//! Conversions between the audio subsystem's f32 domain and the transport's
//! base64 16-bit PCM payloads.
//!
//! ```text
//! outbound: [f32] ─► encode_int16 ─► LE bytes ─► base64 ─► WireAudioBlob
//! inbound:  WireAudioBlob ─► base64 ─► LE bytes ─► decode_pcm16 ─► PlaybackBuffer
//! ```

pub mod base64;
pub mod pcm;
pub mod wire;

pub use self::base64::{decode_base64, encode_base64};
pub use pcm::{decode_pcm16, encode_int16, encode_pcm16_le, PlaybackBuffer};
pub use wire::WireAudioBlob;
