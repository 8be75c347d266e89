//! Base64 adapter for PCM payloads carried inside JSON messages.

use ::base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::Result;

/// Bytes encoded per window. A multiple of 3, so no padding is emitted
/// between windows and the concatenation equals a one-shot encoding.
pub const ENCODE_WINDOW: usize = 8190;

/// Encode bytes as standard padded base64, one bounded window at a time.
pub fn encode_base64(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for window in bytes.chunks(ENCODE_WINDOW) {
        BASE64.encode_string(window, &mut out);
    }
    out
}

/// Decode standard padded base64. Surrounding whitespace is ignored.
///
/// # Errors
/// Returns `LumiError::Base64` on invalid characters, length or padding.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    Ok(BASE64.decode(encoded.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LumiError;

    #[test]
    fn empty_round_trip() {
        assert_eq!(encode_base64(&[]), "");
        assert_eq!(decode_base64("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn lengths_not_multiple_of_three() {
        for len in [1usize, 2, 4, 5, 7, 8191, 8192, 8193, 20_000] {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
            let encoded = encode_base64(&bytes);
            assert_eq!(encoded, BASE64.encode(&bytes), "len={len}");
            assert_eq!(decode_base64(&encoded).unwrap(), bytes, "len={len}");
        }
    }

    #[test]
    fn known_vector() {
        assert_eq!(encode_base64(b"Lumi"), "THVtaQ==");
        assert_eq!(decode_base64("THVtaQ==\n").unwrap(), b"Lumi");
    }

    #[test]
    fn invalid_input_is_an_error() {
        assert!(matches!(decode_base64("not*base64"), Err(LumiError::Base64(_))));
    }
}
