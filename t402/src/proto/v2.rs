//! Protocol version 2 (V2) wire types.
//!
//! V2 is the authoring default. Payment requirements travel in the
//! `PAYMENT-REQUIRED` response header, the signed payload echoes the
//! requirements the payer accepted, and settlement results travel in the
//! `PAYMENT-RESPONSE` header.
//!
//! # Key Types
//!
//! - [`T402Version2`] - Version marker that serializes as `2`
//! - [`PaymentRequirements`] - Payment terms set by the resource server
//! - [`PaymentPayload`] - Signed payment with echoed accepted requirements
//! - [`PaymentRequired`] - HTTP 402 envelope
//! - [`ResourceInfo`] - Metadata about the paid resource

use serde::{Deserialize, Serialize};

use crate::network::Network;
use crate::proto::Extensions;

/// Version marker for t402 protocol version 2.
///
/// This is a type alias for [`Version<2>`](super::Version) that serializes
/// as the integer `2` and rejects other values on deserialization.
pub type T402Version2 = super::Version<2>;

/// Convenience constant for constructing V2 protocol messages.
pub const V2: T402Version2 = super::Version;

/// Metadata about the resource being paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource content.
    pub mime_type: String,
    /// URL of the resource.
    pub url: String,
}

/// Payment requirements set by the resource server (V2 format).
///
/// One way a payer may pay for a resource. The server advertises a set of
/// these in a [`PaymentRequired`] envelope; the payer chooses one and echoes
/// it back inside the [`PaymentPayload`].
///
/// Equality is deep: two requirements are equal only if every field,
/// including `extra`, is equal. The server relies on this when matching an
/// echoed requirement against the offered set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// The payment scheme (e.g., "exact").
    pub scheme: String,
    /// The CAIP-2 network identifier (e.g., `eip155:8453`).
    pub network: Network,
    /// The token asset address.
    pub asset: String,
    /// The payment amount as an atomic integer string.
    pub amount: String,
    /// The recipient address for payment.
    pub pay_to: String,
    /// Maximum time in seconds for payment validity.
    pub max_timeout_seconds: u64,
    /// Scheme-specific extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// A signed payment authorization from the payer (V2 format).
///
/// The payload echoes the requirements the payer accepted, letting the
/// server re-validate the terms without trusting the echo, and letting the
/// facilitator route by `(scheme, network)` taken from `accepted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version (always 2).
    pub version: T402Version2,
    /// The payment requirements the payer accepted.
    pub accepted: PaymentRequirements,
    /// Information about the resource being paid for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,
    /// Optional protocol extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
    /// The scheme-specific signed payload.
    pub payload: serde_json::Value,
}

/// HTTP 402 Payment Required envelope for V2.
///
/// Returned when a resource requires payment, carrying the list of
/// acceptable payment requirements and optional resource metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 2).
    pub version: T402Version2,
    /// Information about the resource being paid for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,
    /// List of acceptable payment requirements.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    /// Optional protocol extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
    /// Optional error message describing why a previous payment attempt
    /// was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
