//! Wire types for t402 payment messages.
//!
//! Defines the two protocol versions ([`v1`], [`v2`]), the shared
//! verify/settle/supported types, and the version-agnostic sum types that
//! let hooks, policies, and selectors work over both versions uniformly.
//!
//! # Wire Format
//!
//! All types serialize to JSON using camelCase field names. The protocol
//! version is carried in the `version` field of every message and is the
//! sole version discriminant; see [`detect_version`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_with::{VecSkipError, serde_as};
use std::collections::HashMap;

use crate::error::ProtocolError;
use crate::network::{Network, NetworkPattern};

pub mod encoding;
pub mod v1;
pub mod v2;
mod version;

pub use encoding::Base64Bytes;
pub use version::{Version, detect_version, detect_version_value};

/// Protocol extension data attached to various t402 wire types.
///
/// Keys are extension names; values are arbitrary JSON data specific to each
/// extension.
pub type Extensions = HashMap<String, serde_json::Value>;

/// Describes a payment method supported by a facilitator.
///
/// Returned in the [`SupportedResponse`] to indicate which protocol
/// versions, schemes, and networks a facilitator can handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    /// The t402 protocol version (1 or 2).
    pub version: u8,
    /// The payment scheme identifier (e.g., "exact").
    pub scheme: String,
    /// The network identifier. Usually a concrete CAIP-2 identifier;
    /// remote facilitators may advertise wildcard patterns (`eip155:*`).
    pub network: String,
    /// Optional scheme-specific extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl SupportedKind {
    /// Returns `true` if this kind covers the given network, either exactly
    /// or through a wildcard pattern.
    #[must_use]
    pub fn covers(&self, network: &Network) -> bool {
        self.network
            .parse::<NetworkPattern>()
            .is_ok_and(|pattern| pattern.matches(network))
    }
}

/// Response from a facilitator's `/supported` endpoint.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// List of supported payment kinds.
    #[serde_as(as = "VecSkipError<_>")]
    pub kinds: Vec<SupportedKind>,
    /// List of supported protocol extensions.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Map of CAIP-2 family patterns to signer addresses.
    ///
    /// Keys can be exact network identifiers (e.g., `"eip155:8453"`) or
    /// wildcard patterns (e.g., `"eip155:*"`).
    #[serde(default)]
    pub signers: HashMap<String, Vec<String>>,
}

impl SupportedResponse {
    /// Returns `true` if any kind covers the given version, scheme, and network.
    #[must_use]
    pub fn advertises(&self, version: u8, scheme: &str, network: &Network) -> bool {
        self.kinds
            .iter()
            .any(|kind| kind.version == version && kind.scheme == scheme && kind.covers(network))
    }
}

/// Request body for a facilitator's `POST /verify` endpoint.
///
/// The payload and requirements ride as raw JSON so the facilitator engine
/// can re-detect the version from the bytes and hand the untouched bytes to
/// hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// The t402 protocol version of the enclosed messages.
    pub version: u8,
    /// The payment payload, raw.
    pub payment_payload: Box<RawValue>,
    /// The payment requirements, raw.
    pub payment_requirements: Box<RawValue>,
}

/// Request body for a facilitator's `POST /settle` endpoint.
///
/// Structurally identical to [`VerifyRequest`] on the wire, but a distinct
/// type so a verify request cannot be passed where a settle request is
/// expected. Use `From<VerifyRequest>` after a successful verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    /// The t402 protocol version of the enclosed messages.
    pub version: u8,
    /// The payment payload, raw.
    pub payment_payload: Box<RawValue>,
    /// The payment requirements, raw.
    pub payment_requirements: Box<RawValue>,
}

impl From<VerifyRequest> for SettleRequest {
    fn from(request: VerifyRequest) -> Self {
        Self {
            version: request.version,
            payment_payload: request.payment_payload,
            payment_requirements: request.payment_requirements,
        }
    }
}

/// Result returned by a facilitator after verifying a payment payload
/// against the provided payment requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerifyResponse {
    /// The payload matches the requirements and passes all checks.
    Valid {
        /// The address of the payer.
        payer: Option<String>,
    },
    /// The payload was well-formed but failed verification.
    Invalid {
        /// Machine-readable reason verification failed.
        reason: String,
        /// Optional human-readable description of the failure.
        message: Option<String>,
        /// The payer address, if identifiable.
        payer: Option<String>,
    },
}

impl VerifyResponse {
    /// Constructs a successful verification response with the given payer.
    #[must_use]
    pub fn valid(payer: impl Into<String>) -> Self {
        Self::Valid {
            payer: Some(payer.into()),
        }
    }

    /// Constructs a failed verification response.
    #[must_use]
    pub const fn invalid(payer: Option<String>, reason: String) -> Self {
        Self::Invalid {
            reason,
            message: None,
            payer,
        }
    }

    /// Returns `true` if the verification succeeded.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Returns the payer address, if identified.
    #[must_use]
    pub fn payer(&self) -> Option<&str> {
        match self {
            Self::Valid { payer } | Self::Invalid { payer, .. } => payer.as_deref(),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_message: Option<String>,
}

impl Serialize for VerifyResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            Self::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                payer: payer.clone(),
                invalid_reason: None,
                invalid_message: None,
            },
            Self::Invalid {
                reason,
                message,
                payer,
            } => VerifyResponseWire {
                is_valid: false,
                payer: payer.clone(),
                invalid_reason: Some(reason.clone()),
                invalid_message: message.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        if wire.is_valid {
            Ok(Self::Valid { payer: wire.payer })
        } else {
            let reason = wire
                .invalid_reason
                .ok_or_else(|| serde::de::Error::missing_field("invalidReason"))?;
            Ok(Self::Invalid {
                reason,
                message: wire.invalid_message,
                payer: wire.payer,
            })
        }
    }
}

/// Result of a payment settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettleResponse {
    /// Settlement succeeded.
    Success {
        /// The address that paid.
        payer: Option<String>,
        /// The on-chain transaction hash.
        transaction: String,
        /// The network where settlement occurred.
        network: Network,
    },
    /// Settlement failed.
    Error {
        /// Machine-readable reason for failure.
        reason: String,
        /// Optional human-readable description of the failure.
        message: Option<String>,
        /// Transaction hash, if submission occurred before the failure.
        transaction: Option<String>,
        /// The network where settlement was attempted.
        network: Network,
    },
}

impl SettleResponse {
    /// Returns `true` if the settlement succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the network the settlement targeted.
    #[must_use]
    pub const fn network(&self) -> &Network {
        match self {
            Self::Success { network, .. } | Self::Error { network, .. } => network,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    /// Always present on the wire; empty when no submission occurred.
    #[serde(default)]
    transaction: String,
    network: Network,
}

impl Serialize for SettleResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            Self::Success {
                payer,
                transaction,
                network,
            } => SettleResponseWire {
                success: true,
                error_reason: None,
                error_message: None,
                payer: payer.clone(),
                transaction: transaction.clone(),
                network: network.clone(),
            },
            Self::Error {
                reason,
                message,
                transaction,
                network,
            } => SettleResponseWire {
                success: false,
                error_reason: Some(reason.clone()),
                error_message: message.clone(),
                payer: None,
                transaction: transaction.clone().unwrap_or_default(),
                network: network.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        if wire.success {
            Ok(Self::Success {
                payer: wire.payer,
                transaction: wire.transaction,
                network: wire.network,
            })
        } else {
            let reason = wire
                .error_reason
                .ok_or_else(|| serde::de::Error::missing_field("errorReason"))?;
            Ok(Self::Error {
                reason,
                message: wire.error_message,
                transaction: (!wire.transaction.is_empty()).then_some(wire.transaction),
                network: wire.network,
            })
        }
    }
}

/// Read-only accessor over the fields common to both versions of payment
/// requirements.
///
/// V1 names the amount field `maxAmountRequired`; the view normalizes it to
/// [`amount`](RequirementView::amount). Hooks, policies, and selectors
/// receive this trait instead of concrete versioned types.
pub trait RequirementView {
    /// Returns the scheme identifier.
    fn scheme(&self) -> &str;
    /// Returns the network identifier.
    fn network(&self) -> &Network;
    /// Returns the token asset address.
    fn asset(&self) -> &str;
    /// Returns the payment amount as an atomic integer string.
    fn amount(&self) -> &str;
    /// Returns the recipient address.
    fn pay_to(&self) -> &str;
    /// Returns the maximum payment validity in seconds.
    fn max_timeout_seconds(&self) -> u64;
    /// Returns the scheme-specific extra data, if any.
    fn extra(&self) -> Option<&serde_json::Value>;
}

impl RequirementView for v2::PaymentRequirements {
    fn scheme(&self) -> &str {
        &self.scheme
    }
    fn network(&self) -> &Network {
        &self.network
    }
    fn asset(&self) -> &str {
        &self.asset
    }
    fn amount(&self) -> &str {
        &self.amount
    }
    fn pay_to(&self) -> &str {
        &self.pay_to
    }
    fn max_timeout_seconds(&self) -> u64 {
        self.max_timeout_seconds
    }
    fn extra(&self) -> Option<&serde_json::Value> {
        self.extra.as_ref()
    }
}

impl RequirementView for v1::PaymentRequirements {
    fn scheme(&self) -> &str {
        &self.scheme
    }
    fn network(&self) -> &Network {
        &self.network
    }
    fn asset(&self) -> &str {
        &self.asset
    }
    fn amount(&self) -> &str {
        &self.max_amount_required
    }
    fn pay_to(&self) -> &str {
        &self.pay_to
    }
    fn max_timeout_seconds(&self) -> u64 {
        self.max_timeout_seconds
    }
    fn extra(&self) -> Option<&serde_json::Value> {
        self.extra.as_ref()
    }
}

/// Version-tagged payment requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PaymentRequirementsAny {
    /// Protocol version 1 variant.
    V1(v1::PaymentRequirements),
    /// Protocol version 2 variant.
    V2(v2::PaymentRequirements),
}

impl PaymentRequirementsAny {
    /// Returns the protocol version of this variant.
    #[must_use]
    pub const fn version(&self) -> u8 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }

    /// Returns the view over the common requirement fields.
    #[must_use]
    pub fn view(&self) -> &dyn RequirementView {
        match self {
            Self::V1(r) => r,
            Self::V2(r) => r,
        }
    }
}

impl RequirementView for PaymentRequirementsAny {
    fn scheme(&self) -> &str {
        self.view().scheme()
    }
    fn network(&self) -> &Network {
        self.view().network()
    }
    fn asset(&self) -> &str {
        self.view().asset()
    }
    fn amount(&self) -> &str {
        self.view().amount()
    }
    fn pay_to(&self) -> &str {
        self.view().pay_to()
    }
    fn max_timeout_seconds(&self) -> u64 {
        self.view().max_timeout_seconds()
    }
    fn extra(&self) -> Option<&serde_json::Value> {
        self.view().extra()
    }
}

/// Version-tagged payment payload.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum PaymentPayloadAny {
    /// Protocol version 1 variant.
    V1(v1::PaymentPayload),
    /// Protocol version 2 variant.
    V2(Box<v2::PaymentPayload>),
}

impl PaymentPayloadAny {
    /// Returns the protocol version of this variant.
    #[must_use]
    pub const fn version(&self) -> u8 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }

    /// Returns the routing scheme: the top-level `scheme` for V1, the
    /// echoed `accepted.scheme` for V2.
    #[must_use]
    pub fn scheme(&self) -> &str {
        match self {
            Self::V1(p) => &p.scheme,
            Self::V2(p) => &p.accepted.scheme,
        }
    }

    /// Returns the routing network: the top-level `network` for V1, the
    /// echoed `accepted.network` for V2.
    #[must_use]
    pub fn network(&self) -> &Network {
        match self {
            Self::V1(p) => &p.network,
            Self::V2(p) => &p.accepted.network,
        }
    }

    /// Returns the scheme-specific inner payload.
    #[must_use]
    pub fn inner_payload(&self) -> &serde_json::Value {
        match self {
            Self::V1(p) => &p.payload,
            Self::V2(p) => &p.payload,
        }
    }
}

/// Version-tagged 402 Payment Required envelope.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum PaymentRequiredAny {
    /// Protocol version 1 variant.
    V1(v1::PaymentRequired),
    /// Protocol version 2 variant.
    V2(v2::PaymentRequired),
}

impl PaymentRequiredAny {
    /// Returns the protocol version of this variant.
    #[must_use]
    pub const fn version(&self) -> u8 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }

    /// Returns the offered requirements as version-tagged values.
    #[must_use]
    pub fn accepts(&self) -> Vec<PaymentRequirementsAny> {
        match self {
            Self::V1(r) => r
                .accepts
                .iter()
                .cloned()
                .map(PaymentRequirementsAny::V1)
                .collect(),
            Self::V2(r) => r
                .accepts
                .iter()
                .cloned()
                .map(PaymentRequirementsAny::V2)
                .collect(),
        }
    }
}

impl Serialize for PaymentRequirementsAny {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::V1(r) => r.serialize(serializer),
            Self::V2(r) => r.serialize(serializer),
        }
    }
}

impl Serialize for PaymentPayloadAny {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::V1(p) => p.serialize(serializer),
            Self::V2(p) => p.serialize(serializer),
        }
    }
}

impl Serialize for PaymentRequiredAny {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::V1(r) => r.serialize(serializer),
            Self::V2(r) => r.serialize(serializer),
        }
    }
}

/// Parses a raw payment payload, dispatching on the detected version.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidVersion`] if version detection fails, or
/// [`ProtocolError::MalformedMessage`] if the typed parse at the detected
/// version fails.
pub fn parse_payment_payload(bytes: &[u8]) -> Result<PaymentPayloadAny, ProtocolError> {
    match detect_version(bytes)? {
        1 => serde_json::from_slice::<v1::PaymentPayload>(bytes)
            .map(PaymentPayloadAny::V1)
            .map_err(|e| malformed(1, &e)),
        _ => serde_json::from_slice::<v2::PaymentPayload>(bytes)
            .map(|p| PaymentPayloadAny::V2(Box::new(p)))
            .map_err(|e| malformed(2, &e)),
    }
}

/// Parses a raw 402 envelope, dispatching on the detected version.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidVersion`] if version detection fails, or
/// [`ProtocolError::MalformedMessage`] if the typed parse at the detected
/// version fails.
pub fn parse_payment_required(bytes: &[u8]) -> Result<PaymentRequiredAny, ProtocolError> {
    match detect_version(bytes)? {
        1 => serde_json::from_slice::<v1::PaymentRequired>(bytes)
            .map(PaymentRequiredAny::V1)
            .map_err(|e| malformed(1, &e)),
        _ => serde_json::from_slice::<v2::PaymentRequired>(bytes)
            .map(PaymentRequiredAny::V2)
            .map_err(|e| malformed(2, &e)),
    }
}

/// Parses raw payment requirements at a known protocol version.
///
/// Requirements carry no version discriminant of their own; the version
/// comes from the payload they travel with.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedMessage`] if the typed parse fails.
pub fn parse_payment_requirements(
    version: u8,
    bytes: &[u8],
) -> Result<PaymentRequirementsAny, ProtocolError> {
    match version {
        1 => serde_json::from_slice::<v1::PaymentRequirements>(bytes)
            .map(PaymentRequirementsAny::V1)
            .map_err(|e| malformed(1, &e)),
        _ => serde_json::from_slice::<v2::PaymentRequirements>(bytes)
            .map(PaymentRequirementsAny::V2)
            .map_err(|e| malformed(2, &e)),
    }
}

fn malformed(version: u8, cause: &serde_json::Error) -> ProtocolError {
    ProtocolError::MalformedMessage {
        version,
        cause: cause.to_string(),
    }
}
