//! Protocol version marker and version detection.
//!
//! Provides [`Version<N>`], a const-generic version marker that serializes
//! as a bare integer and rejects mismatched values on deserialization, and
//! [`detect_version`] for reading the version discriminant out of a raw
//! wire message.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtocolError;

/// A protocol version marker parameterized by its numeric value.
///
/// Serializes as a bare integer (e.g., `1` or `2`) and rejects any other
/// value on deserialization, providing compile-time version safety.
///
/// Use the type aliases [`super::v1::T402Version1`] and
/// [`super::v2::T402Version2`] instead of constructing this directly.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Version<const N: u8>;

impl<const N: u8> Version<N> {
    /// The numeric value of this protocol version.
    pub const VALUE: u8 = N;
}

impl<const N: u8> PartialEq<u8> for Version<N> {
    fn eq(&self, other: &u8) -> bool {
        *other == N
    }
}

impl<const N: u8> From<Version<N>> for u8 {
    fn from(_: Version<N>) -> Self {
        N
    }
}

impl<const N: u8> std::fmt::Display for Version<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{N}")
    }
}

impl<const N: u8> Serialize for Version<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(N)
    }
}

impl<'de, const N: u8> Deserialize<'de> for Version<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = u8::deserialize(deserializer)?;
        if v == N {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected version {N}, got {v}"
            )))
        }
    }
}

/// Reads the protocol version out of a raw JSON wire message.
///
/// Detection is by the `version` field alone, never by which header or
/// envelope carried the message.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidVersion`] if the message is not JSON, the
/// field is absent, not an integer, or not 1 or 2.
pub fn detect_version(bytes: &[u8]) -> Result<u8, ProtocolError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::InvalidVersion(format!("not a JSON message: {e}")))?;
    detect_version_value(&value)
}

/// Reads the protocol version out of an already-parsed JSON value.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidVersion`] if the field is absent, not an
/// integer, or not 1 or 2.
pub fn detect_version_value(value: &serde_json::Value) -> Result<u8, ProtocolError> {
    let field = value
        .get("version")
        .ok_or_else(|| ProtocolError::InvalidVersion("missing version field".into()))?;
    let version = field
        .as_u64()
        .ok_or_else(|| ProtocolError::InvalidVersion(format!("version is not an integer: {field}")))?;
    match version {
        1 => Ok(1),
        2 => Ok(2),
        other => Err(ProtocolError::InvalidVersion(format!(
            "unknown version {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_marker_serializes_as_integer() {
        let v: Version<2> = Version;
        assert_eq!(serde_json::to_string(&v).unwrap(), "2");
    }

    #[test]
    fn test_version_marker_rejects_mismatch() {
        let result: Result<Version<2>, _> = serde_json::from_str("1");
        assert!(result.is_err());
        let ok: Version<1> = serde_json::from_str("1").unwrap();
        assert_eq!(u8::from(ok), 1);
    }

    #[test]
    fn test_detect_version() {
        assert_eq!(detect_version(br#"{"version": 1}"#).unwrap(), 1);
        assert_eq!(detect_version(br#"{"version": 2, "payload": {}}"#).unwrap(), 2);
    }

    #[test]
    fn test_detect_version_missing_field() {
        let err = detect_version(br#"{"payload": {}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidVersion(_)));
    }

    #[test]
    fn test_detect_version_not_integer() {
        let err = detect_version(br#"{"version": "2"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidVersion(_)));
    }

    #[test]
    fn test_detect_version_unknown() {
        let err = detect_version(br#"{"version": 3}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidVersion(_)));
    }

    #[test]
    fn test_detect_version_not_json() {
        let err = detect_version(b"not json").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidVersion(_)));
    }
}
