//! Error types for the t402 payment protocol.
//!
//! The taxonomy mirrors the protocol surface: [`ProtocolError`] for wire and
//! routing faults, [`VerifyError`] / [`SettleError`] for payment lifecycle
//! failures, and [`ClientError`] for the payer-side engine. Hook aborts
//! surface as verify or settle errors carrying the aborting hook's reason.

use std::fmt;

use crate::network::Network;

/// Convenience alias for boxed error values crossing trait boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Protocol-level errors: version detection, message parsing, and routing.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The `version` field is absent, not an integer, or not 1 or 2.
    #[error("Invalid protocol version: {0}")]
    InvalidVersion(String),

    /// A version was detected but the typed parse of the message failed.
    #[error("Malformed v{version} message: {cause}")]
    MalformedMessage {
        /// The detected protocol version.
        version: u8,
        /// Description of the parse failure.
        cause: String,
    },

    /// No mechanism is registered for the scheme/network combination.
    #[error("No scheme '{scheme}' registered for network '{network}'")]
    UnsupportedScheme {
        /// The requested scheme.
        scheme: String,
        /// The requested network.
        network: String,
    },

    /// No facilitator mechanism matches the requirement's scheme/network.
    #[error("No facilitator for scheme '{scheme}' on network '{network}'")]
    NoFacilitatorForNetwork {
        /// The requested scheme.
        scheme: String,
        /// The requested network.
        network: String,
    },

    /// The payload's echoed requirements match none of the offered set.
    #[error("no_matching_requirement: payload does not match any offered payment requirements")]
    NoMatchingRequirement,
}

/// Error during payment verification.
#[derive(Debug)]
pub struct VerifyError {
    /// Machine-readable reason (e.g. `insufficient_balance`, `invalid_signature`).
    pub reason: String,
    /// Human-readable message for the error.
    pub message: Option<String>,
    /// The payer's address, if identifiable.
    pub payer: Option<String>,
    /// The network the verification targeted, if known.
    pub network: Option<Network>,
    /// The underlying error, if any.
    pub cause: Option<BoxError>,
}

impl VerifyError {
    /// Creates a new verification error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: None,
            payer: None,
            network: None,
            cause: None,
        }
    }

    /// Sets the human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the payer address.
    #[must_use]
    pub fn with_payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }

    /// Sets the network the verification targeted.
    #[must_use]
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = Some(network);
        self
    }

    /// Sets the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {}", self.reason, msg),
            None => write!(f, "{}", self.reason),
        }
    }
}

impl std::error::Error for VerifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|e| e as _)
    }
}

/// Error during payment settlement.
#[derive(Debug)]
pub struct SettleError {
    /// Machine-readable reason for the error.
    pub reason: String,
    /// Human-readable message for the error.
    pub message: Option<String>,
    /// The payer's address, if known.
    pub payer: Option<String>,
    /// Transaction hash, if submission occurred before the failure.
    pub transaction: Option<String>,
    /// The network the settlement targeted, if known.
    pub network: Option<Network>,
    /// The underlying error, if any.
    pub cause: Option<BoxError>,
}

impl SettleError {
    /// Creates a new settlement error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: None,
            payer: None,
            transaction: None,
            network: None,
            cause: None,
        }
    }

    /// Sets the human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the payer address.
    #[must_use]
    pub fn with_payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }

    /// Sets the transaction hash.
    #[must_use]
    pub fn with_transaction(mut self, tx: impl Into<String>) -> Self {
        self.transaction = Some(tx.into());
        self
    }

    /// Sets the network the settlement targeted.
    #[must_use]
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = Some(network);
        self
    }

    /// Sets the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for SettleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {}", self.reason, msg),
            None => write!(f, "{}", self.reason),
        }
    }
}

impl std::error::Error for SettleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|e| e as _)
    }
}

/// Errors from the payer-side engine while producing a payment payload.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    /// No registered mechanism matches any offered requirement.
    #[error("No registered scheme supports the offered payment requirements")]
    UnsupportedScheme,

    /// Payment policies filtered every candidate requirement out.
    #[error("All payment requirements were filtered out by policies")]
    AllFilteredOut,

    /// The selected mechanism rejected the request or panicked.
    #[error("Payment mechanism failed: {0}")]
    MechanismFailure(BoxError),

    /// A before-create hook aborted payload creation.
    #[error("Payment aborted: {0}")]
    Aborted(String),

    /// The selector returned an index outside the filtered list.
    #[error("Selector returned invalid index {0}")]
    InvalidSelection(usize),
}

impl ClientError {
    /// Wraps a message into a mechanism failure.
    #[must_use]
    pub fn mechanism(message: impl Into<String>) -> Self {
        Self::MechanismFailure(message.into().into())
    }
}

/// Errors from the resource server engine outside the verify/settle paths.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Protocol-level fault (routing, matching, parsing).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The engine was used before [`initialize`](crate::server::T402ResourceServer::initialize).
    #[error("Resource server not initialized")]
    NotInitialized,

    /// A dynamic pricing or recipient callback failed.
    #[error("Resource configuration error: {0}")]
    Config(String),
}
