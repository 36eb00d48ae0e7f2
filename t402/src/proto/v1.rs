//! Protocol version 1 (V1) wire types.
//!
//! V1 is the legacy protocol version. Payment requirements travel in the
//! 402 response body, the payload in the `X-PAYMENT` header, and settlement
//! results in `X-PAYMENT-RESPONSE`. The amount field is named
//! `maxAmountRequired`, and the payload carries no echoed requirements,
//! only its top-level scheme and network.
//!
//! # Key Types
//!
//! - [`T402Version1`] - Version marker that serializes as `1`
//! - [`PaymentRequirements`] - Payment terms set by the resource server
//! - [`PaymentPayload`] - Signed payment authorization
//! - [`PaymentRequired`] - HTTP 402 response body

use serde::{Deserialize, Serialize};

use crate::network::Network;

/// Version marker for t402 protocol version 1.
///
/// This is a type alias for [`Version<1>`](super::Version) that serializes
/// as the integer `1` and rejects other values on deserialization.
pub type T402Version1 = super::Version<1>;

/// Convenience constant for constructing V1 protocol messages.
pub const V1: T402Version1 = super::Version;

/// Payment requirements set by the resource server (V1 format).
///
/// Same terms as the V2 form, but the amount field is named
/// `maxAmountRequired` and optional resource metadata rides along inside
/// the requirements instead of a separate envelope field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// The payment scheme (e.g., "exact").
    pub scheme: String,
    /// The CAIP-2 network identifier.
    pub network: Network,
    /// The token asset address.
    pub asset: String,
    /// The payment amount as an atomic integer string.
    pub max_amount_required: String,
    /// The recipient address for payment.
    pub pay_to: String,
    /// Maximum time in seconds for payment validity.
    pub max_timeout_seconds: u64,
    /// The resource URL being paid for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Human-readable description of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Scheme-specific extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl PaymentRequirements {
    /// Converts V2 requirements into the V1 wire shape, folding the
    /// envelope-level resource metadata into the requirements.
    #[must_use]
    pub fn from_v2(
        requirements: &super::v2::PaymentRequirements,
        resource: Option<&super::v2::ResourceInfo>,
    ) -> Self {
        Self {
            scheme: requirements.scheme.clone(),
            network: requirements.network.clone(),
            asset: requirements.asset.clone(),
            max_amount_required: requirements.amount.clone(),
            pay_to: requirements.pay_to.clone(),
            max_timeout_seconds: requirements.max_timeout_seconds,
            resource: resource.map(|r| r.url.clone()),
            description: resource.map(|r| r.description.clone()),
            mime_type: resource.map(|r| r.mime_type.clone()),
            extra: requirements.extra.clone(),
        }
    }
}

/// A signed payment authorization from the payer (V1 format).
///
/// V1 payloads carry no echoed requirements; the top-level `scheme` and
/// `network` fields are the routing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version (always 1).
    pub version: T402Version1,
    /// The payment scheme (e.g., "exact").
    pub scheme: String,
    /// The CAIP-2 network identifier.
    pub network: Network,
    /// The scheme-specific signed payload.
    pub payload: serde_json::Value,
}

/// HTTP 402 Payment Required response body for V1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 1).
    pub version: T402Version1,
    /// List of acceptable payment requirements.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    /// Optional error message describing why a previous payment attempt
    /// was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirements_amount_field_name() {
        let requirements = PaymentRequirements {
            scheme: "exact".into(),
            network: Network::new("eip155", "84532"),
            asset: "USDC".into(),
            max_amount_required: "1000".into(),
            pay_to: "0xABC".into(),
            max_timeout_seconds: 300,
            resource: None,
            description: None,
            mime_type: None,
            extra: None,
        };
        let json = serde_json::to_value(&requirements).unwrap();
        assert_eq!(json["maxAmountRequired"], "1000");
        assert!(json.get("amount").is_none());
    }

    #[test]
    fn test_payload_roundtrip() {
        let payload = PaymentPayload {
            version: V1,
            scheme: "exact".into(),
            network: Network::new("eip155", "84532"),
            payload: serde_json::json!({"signature": "0xsig"}),
        };
        let json = serde_json::to_vec(&payload).unwrap();
        let back: PaymentPayload = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.scheme, "exact");
        assert_eq!(back.network.to_string(), "eip155:84532");
    }

    #[test]
    fn test_payment_required_body_shape() {
        let body = PaymentRequired {
            version: V1,
            accepts: vec![],
            error: Some("payment required".into()),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["error"], "payment required");
    }
}
