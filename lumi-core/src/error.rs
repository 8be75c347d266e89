use thiserror::Error;

/// All errors produced by lumi-core.
#[derive(Debug, Error)]
pub enum LumiError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    /// PCM payload length is not a whole number of 16-bit frames.
    #[error("malformed PCM payload: {len} bytes is not aligned to {channels}-channel 16-bit frames")]
    MalformedPayload { len: usize, channels: u16 },

    #[error("invalid channel count: {0}")]
    InvalidChannelCount(u16),

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("session channel closed")]
    SessionClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LumiError>;
