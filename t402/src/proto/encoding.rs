//! Base64 encoding utilities for the t402 wire format.
//!
//! All binary blobs on the wire use the standard base64 alphabet; the
//! URL-safe variant is never produced or accepted.

use std::fmt::{self, Display, Formatter};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;

/// A wrapper for base64-encoded byte data.
///
/// This type holds bytes that represent base64-encoded data and provides
/// methods for encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes(pub Vec<u8>);

impl Base64Bytes {
    /// Decodes the base64 string bytes to raw binary data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    /// Encodes raw binary data into base64 string bytes.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Self {
        let encoded = b64.encode(input.as_ref());
        Self(encoded.into_bytes())
    }
}

impl AsRef<[u8]> for Base64Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Base64Bytes {
    fn from(slice: &[u8]) -> Self {
        Self(slice.to_vec())
    }
}

impl Display for Base64Bytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let input = br#"{"version":2,"accepts":[]}"#;
        let encoded = Base64Bytes::encode(input);
        assert_eq!(encoded.decode().unwrap(), input);
    }

    #[test]
    fn test_standard_alphabet() {
        // 0xfb 0xff encodes to "+/8=" in the standard alphabet ("-_8=" url-safe).
        let encoded = Base64Bytes::encode([0xfbu8, 0xff]);
        assert_eq!(encoded.to_string(), "+/8=");
    }

    #[test]
    fn test_decode_rejects_invalid() {
        let bad = Base64Bytes(b"not base64!!".to_vec());
        assert!(bad.decode().is_err());
    }
}
