//! Transport-level audio value object.

use serde::{Deserialize, Serialize};

use super::{base64, pcm};
use crate::error::Result;

/// Rate required by the realtime session for microphone audio.
pub const OUTBOUND_SAMPLE_RATE: u32 = 16_000;

/// Rate assumed for model audio when the tag does not say otherwise.
pub const DEFAULT_INBOUND_SAMPLE_RATE: u32 = 24_000;

/// Tag attached to every outbound blob.
pub const OUTBOUND_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Base64 little-endian 16-bit PCM plus its `audio/pcm;rate=N` tag.
///
/// Serialises as `{ "data": "...", "mimeType": "audio/pcm;rate=16000" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAudioBlob {
    data: String,
    mime_type: String,
}

impl WireAudioBlob {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Encode samples that are already at 16 kHz into an outbound blob.
    pub fn from_samples(samples: &[f32]) -> Self {
        Self::from_pcm_bytes(&pcm::encode_pcm16_le(samples), OUTBOUND_SAMPLE_RATE)
    }

    /// Wrap raw little-endian 16-bit PCM at `sample_rate`.
    pub fn from_pcm_bytes(bytes: &[u8], sample_rate: u32) -> Self {
        Self {
            data: base64::encode_base64(bytes),
            mime_type: pcm_mime_type(sample_rate),
        }
    }

    /// Base64 payload.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Rate declared by the tag, if any.
    pub fn sample_rate(&self) -> Option<u32> {
        parse_pcm_rate(&self.mime_type)
    }

    /// Raw PCM bytes.
    pub fn pcm_bytes(&self) -> Result<Vec<u8>> {
        base64::decode_base64(&self.data)
    }

    /// Decode into a playback buffer. The tag's rate wins over
    /// `default_rate` when present.
    pub fn decode(&self, default_rate: u32, channels: u16) -> Result<pcm::PlaybackBuffer> {
        let rate = self.sample_rate().unwrap_or(default_rate);
        pcm::decode_pcm16(&self.pcm_bytes()?, rate, channels)
    }
}

/// `audio/pcm;rate=<sample_rate>`.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Extract `rate=N` from a MIME-style tag such as `audio/pcm;rate=24000`.
///
/// Parameter names are case-insensitive and whitespace around `;` is
/// ignored. Returns `None` when absent, unparsable or zero.
pub fn parse_pcm_rate(mime_type: &str) -> Option<u32> {
    mime_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("rate") {
            return None;
        }
        value.trim().parse::<u32>().ok().filter(|r| *r > 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::pcm::PCM16_SCALE;

    #[test]
    fn outbound_blob_serializes_with_camel_case_mime_type() {
        let blob = WireAudioBlob::from_samples(&[0.0, 1.0]);
        let json = serde_json::to_value(&blob).expect("serialize blob");
        assert_eq!(json["mimeType"], OUTBOUND_MIME_TYPE);
        // 0x0000, 0x7FFF little-endian
        assert_eq!(json["data"], "AAD/fw==");

        let back: WireAudioBlob = serde_json::from_value(json).expect("deserialize blob");
        assert_eq!(back, blob);
    }

    #[test]
    fn outbound_mime_matches_constant() {
        assert_eq!(pcm_mime_type(OUTBOUND_SAMPLE_RATE), OUTBOUND_MIME_TYPE);
        assert_eq!(WireAudioBlob::from_samples(&[]).sample_rate(), Some(16_000));
    }

    #[test]
    fn parses_rate_parameter() {
        assert_eq!(parse_pcm_rate("audio/pcm;rate=24000"), Some(24_000));
        assert_eq!(parse_pcm_rate("audio/pcm; Rate = 16000"), Some(16_000));
        assert_eq!(parse_pcm_rate("audio/pcm;channels=1;rate=8000"), Some(8_000));
        assert_eq!(parse_pcm_rate("audio/pcm"), None);
        assert_eq!(parse_pcm_rate("audio/pcm;rate=fast"), None);
        assert_eq!(parse_pcm_rate("audio/pcm;rate=0"), None);
    }

    #[test]
    fn decode_prefers_tagged_rate() {
        let bytes: Vec<u8> = [16384i16, -16384].iter().flat_map(|v| v.to_le_bytes()).collect();
        let tagged = WireAudioBlob::from_pcm_bytes(&bytes, 22_050);
        let buf = tagged.decode(DEFAULT_INBOUND_SAMPLE_RATE, 1).unwrap();
        assert_eq!(buf.sample_rate(), 22_050);
        assert_eq!(buf.channel(0).unwrap(), &[16384.0 / PCM16_SCALE, -16384.0 / PCM16_SCALE]);

        let untagged = WireAudioBlob::new(tagged.data(), "audio/pcm");
        let buf = untagged.decode(DEFAULT_INBOUND_SAMPLE_RATE, 1).unwrap();
        assert_eq!(buf.sample_rate(), DEFAULT_INBOUND_SAMPLE_RATE);
    }

    #[test]
    fn decode_surfaces_malformed_payload() {
        let blob = WireAudioBlob::from_pcm_bytes(&[1, 2, 3], DEFAULT_INBOUND_SAMPLE_RATE);
        assert!(matches!(
            blob.decode(DEFAULT_INBOUND_SAMPLE_RATE, 1),
            Err(crate::error::LumiError::MalformedPayload { len: 3, .. })
        ));
    }
}
