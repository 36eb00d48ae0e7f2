//! Payment scheme system.
//!
//! A scheme mechanism is a polymorphic unit selected by `(scheme, network)`.
//! Three disjoint capabilities exist, one per protocol role:
//!
//! - [`SchemeClient`] — payer side: produce the scheme-specific signed payload
//! - [`SchemeServer`] — resource server side: resolve prices and enrich
//!   payment requirements
//! - [`SchemeFacilitator`] — facilitator side: verify and settle payments
//!
//! No instance needs to implement more than one capability. Mechanisms are
//! registered in a [`SchemeRegistry`] per engine; registration is permitted
//! after startup and is internally synchronized.

mod registry;

pub use registry::{RegistryEntry, SchemeRegistry};

use crate::error::{BoxError, SettleError, VerifyError};
use crate::hooks::BoxFuture;
use crate::network::Network;
use crate::proto::{
    Extensions, PaymentPayloadAny, PaymentRequirementsAny, SettleResponse, SupportedKind,
    VerifyResponse, v2,
};

/// Trait for identifying a payment scheme mechanism.
///
/// Each mechanism declares the protocol version it speaks, the scheme it
/// implements, and the blockchain family it belongs to.
pub trait SchemeId {
    /// Returns the t402 protocol version (1 or 2).
    fn version(&self) -> u8 {
        2
    }

    /// Returns the scheme name (e.g., "exact").
    fn scheme(&self) -> &str;

    /// Returns the CAIP-2 namespace this mechanism operates in
    /// (e.g., "eip155", "solana").
    fn namespace(&self) -> &str;

    /// Returns the CAIP-2 family pattern this mechanism supports.
    ///
    /// Used to group signer addresses by blockchain family in the supported
    /// report. The default derives the pattern from [`Self::namespace`].
    fn caip_family(&self) -> String {
        format!("{}:*", self.namespace())
    }
}

/// A resolved token amount ready for use in payment requirements.
#[derive(Debug, Clone)]
pub struct AssetAmount {
    /// The token asset address.
    pub asset: String,
    /// The amount in the token's smallest unit (e.g., "10000" for 0.01 USDC).
    pub amount: String,
    /// Scheme-specific extra data resolved alongside the price.
    pub extra: Option<serde_json::Value>,
}

/// Payer-side mechanism: produces the scheme-specific signed payload.
///
/// Implementations may perform I/O (e.g., signing with a remote key) and
/// must be drop-cancellable.
pub trait SchemeClient: SchemeId + Send + Sync {
    /// Creates the scheme-specific inner payload for the selected
    /// requirements. The engine wraps the result into a full
    /// [`PaymentPayloadAny`](crate::proto::PaymentPayloadAny).
    fn create_payment_payload<'a>(
        &'a self,
        requirements: &'a PaymentRequirementsAny,
    ) -> BoxFuture<'a, Result<serde_json::Value, BoxError>>;
}

/// Resource-server-side mechanism: resolves prices and enriches payment
/// requirements with scheme-specific data.
pub trait SchemeServer: SchemeId + Send + Sync {
    /// Converts a configured price into a token amount for the given network.
    ///
    /// The price is either a human-readable money string (`"1.50"`) or a
    /// scheme-specific object.
    ///
    /// # Errors
    ///
    /// Returns an error if the price cannot be parsed or the network is not
    /// supported.
    fn parse_price(
        &self,
        price: &serde_json::Value,
        network: &Network,
    ) -> Result<AssetAmount, BoxError>;

    /// Enriches base payment requirements with scheme-specific data
    /// (token name, signature domain parameters, fee payer, ...).
    ///
    /// Called after [`parse_price`](Self::parse_price) with the facilitator's
    /// advertised kind for this scheme/network and the route's extension
    /// declarations. The default implementation returns the requirements
    /// unchanged.
    fn enhance_requirements(
        &self,
        requirements: v2::PaymentRequirements,
        _supported: &SupportedKind,
        _extensions: &Extensions,
    ) -> v2::PaymentRequirements {
        requirements
    }
}

/// Facilitator-side mechanism: verifies payment authorizations and settles
/// them on-chain.
///
/// Verify must be free of side effects. Settle must be safe to retry
/// (nonce-bearing schemes prevent double-spend); the engine never retries
/// on its own — retries are a hook concern.
pub trait SchemeFacilitator: SchemeId + Send + Sync {
    /// Returns scheme-specific extra data to advertise for a network in the
    /// supported report (e.g., fee payer address).
    fn extra(&self, _network: &Network) -> Option<serde_json::Value> {
        None
    }

    /// Returns the addresses of this mechanism's configured signers.
    fn signer_addresses(&self) -> Vec<String> {
        Vec::new()
    }

    /// Verifies a payment payload against the declared requirements.
    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayloadAny,
        requirements: &'a PaymentRequirementsAny,
    ) -> BoxFuture<'a, Result<VerifyResponse, VerifyError>>;

    /// Settles a verified payment on-chain.
    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayloadAny,
        requirements: &'a PaymentRequirementsAny,
    ) -> BoxFuture<'a, Result<SettleResponse, SettleError>>;
}
