//! Header encoding and decoding for t402 protocol messages.
//!
//! Every wire entity travels as `base64(JSON(entity))` using the standard
//! base64 alphabet: payment requirements in `PAYMENT-REQUIRED`, payloads in
//! `PAYMENT-SIGNATURE` (V2) or `X-PAYMENT` (V1), and settlement results in
//! `PAYMENT-RESPONSE` or `X-PAYMENT-RESPONSE`.
//!
//! Decoders return the decoded JSON bytes alongside the typed value so
//! hooks can receive the raw message untouched.

use t402::proto::{
    Base64Bytes, PaymentPayloadAny, PaymentRequiredAny, SettleResponse, parse_payment_payload,
    parse_payment_required, v1, v2,
};

use crate::constants::{PAYMENT_SIGNATURE_HEADER, X_PAYMENT_HEADER};
use crate::error::HttpError;

/// Encodes a V2 402 envelope for the `PAYMENT-REQUIRED` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_required(required: &v2::PaymentRequired) -> Result<String, HttpError> {
    let json = serde_json::to_vec(required)?;
    Ok(Base64Bytes::encode(&json).to_string())
}

/// Decodes a `PAYMENT-REQUIRED` header value (or a V1 response body already
/// in hand) into a version-tagged envelope plus the decoded bytes.
///
/// # Errors
///
/// Returns [`HttpError`] on base64, version, or JSON decode failure.
pub fn decode_payment_required(
    header_value: &str,
) -> Result<(PaymentRequiredAny, Vec<u8>), HttpError> {
    let bytes = Base64Bytes::from(header_value.trim().as_bytes()).decode()?;
    let required = parse_payment_required(&bytes)?;
    Ok((required, bytes))
}

/// Encodes a payment payload for its version's request header.
///
/// Returns the header name (`PAYMENT-SIGNATURE` for V2, `X-PAYMENT` for V1)
/// and the encoded value.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_payload(
    payload: &PaymentPayloadAny,
) -> Result<(&'static str, String), HttpError> {
    let name = match payload {
        PaymentPayloadAny::V1(_) => X_PAYMENT_HEADER,
        PaymentPayloadAny::V2(_) => PAYMENT_SIGNATURE_HEADER,
        _ => unreachable!("PaymentPayloadAny is non_exhaustive but only V1/V2 exist"),
    };
    let json = serde_json::to_vec(payload)?;
    Ok((name, Base64Bytes::encode(&json).to_string()))
}

/// Decodes a `PAYMENT-SIGNATURE` or `X-PAYMENT` header value into a
/// version-tagged payload plus the decoded bytes.
///
/// Version detection is by the message's `version` field, never by which
/// header carried it.
///
/// # Errors
///
/// Returns [`HttpError`] on base64, version, or JSON decode failure.
pub fn decode_payment_payload(
    header_value: &str,
) -> Result<(PaymentPayloadAny, Vec<u8>), HttpError> {
    let bytes = Base64Bytes::from(header_value.trim().as_bytes()).decode()?;
    let payload = parse_payment_payload(&bytes)?;
    Ok((payload, bytes))
}

/// Encodes a settlement result for the response header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_response(response: &SettleResponse) -> Result<String, HttpError> {
    let json = serde_json::to_vec(response)?;
    Ok(Base64Bytes::encode(&json).to_string())
}

/// Decodes a `PAYMENT-RESPONSE` or `X-PAYMENT-RESPONSE` header value.
///
/// # Errors
///
/// Returns [`HttpError`] on base64 or JSON decode failure.
pub fn decode_payment_response(header_value: &str) -> Result<SettleResponse, HttpError> {
    let bytes = Base64Bytes::from(header_value.trim().as_bytes()).decode()?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Serializes a V1 402 envelope for the response body.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_required_v1_body(required: &v1::PaymentRequired) -> Result<String, HttpError> {
    Ok(serde_json::to_string(required)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use t402::Network;

    fn required() -> v2::PaymentRequired {
        v2::PaymentRequired {
            version: v2::V2,
            resource: None,
            accepts: vec![v2::PaymentRequirements {
                scheme: "exact".into(),
                network: Network::new("eip155", "8453"),
                asset: "USDC".into(),
                amount: "1000".into(),
                pay_to: "0xABC".into(),
                max_timeout_seconds: 300,
                extra: None,
            }],
            extensions: None,
            error: None,
        }
    }

    #[test]
    fn test_payment_required_roundtrip() {
        let encoded = encode_payment_required(&required()).unwrap();
        let (decoded, bytes) = decode_payment_required(&encoded).unwrap();
        let PaymentRequiredAny::V2(decoded) = decoded else {
            panic!("expected v2");
        };
        assert_eq!(decoded.accepts, required().accepts);
        // The decoded bytes are the exact JSON that was encoded.
        assert_eq!(bytes, serde_json::to_vec(&required()).unwrap());
    }

    #[test]
    fn test_payload_header_name_follows_version() {
        let v2_payload = PaymentPayloadAny::V2(Box::new(v2::PaymentPayload {
            version: v2::V2,
            accepted: required().accepts[0].clone(),
            resource: None,
            extensions: None,
            payload: serde_json::json!({}),
        }));
        let (name, _) = encode_payment_payload(&v2_payload).unwrap();
        assert_eq!(name, "PAYMENT-SIGNATURE");

        let v1_payload = PaymentPayloadAny::V1(v1::PaymentPayload {
            version: v1::V1,
            scheme: "exact".into(),
            network: Network::new("eip155", "84532"),
            payload: serde_json::json!({}),
        });
        let (name, _) = encode_payment_payload(&v1_payload).unwrap();
        assert_eq!(name, "X-PAYMENT");
    }

    #[test]
    fn test_payload_roundtrip_preserves_version() {
        let payload = PaymentPayloadAny::V1(v1::PaymentPayload {
            version: v1::V1,
            scheme: "exact".into(),
            network: Network::new("eip155", "84532"),
            payload: serde_json::json!({"signature": "0xsig"}),
        });
        let (_, encoded) = encode_payment_payload(&payload).unwrap();
        let (decoded, _) = decode_payment_payload(&encoded).unwrap();
        assert_eq!(decoded.version(), 1);
    }

    #[test]
    fn test_settle_response_roundtrip() {
        let response = SettleResponse::Success {
            payer: Some("0xPAYER".into()),
            transaction: "0xBEEF".into(),
            network: Network::new("eip155", "8453"),
        };
        let encoded = encode_payment_response(&response).unwrap();
        let decoded = decode_payment_response(&encoded).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_payment_payload("!!!not-base64!!!").is_err());
        // Valid base64 of invalid JSON.
        let garbage = Base64Bytes::encode(b"not json").to_string();
        assert!(decode_payment_payload(&garbage).is_err());
    }
}
