//! Facilitator engine.
//!
//! [`T402Facilitator`] receives raw payload and requirements bytes over the
//! wire, detects the protocol version, typed-parses both sides, and
//! dispatches to the registered facilitator mechanism for the payload's
//! `(scheme, network)` routing key. Verification is free of side effects;
//! settlement submits on-chain and is never retried by the engine itself.
//!
//! `supported()` is pure data assembly over the registered mechanisms.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures_util::FutureExt;

use crate::error::{ProtocolError, SettleError, VerifyError};
use crate::hooks::{
    PaymentHooks, SettleContext, SettleFailureContext, SettleResultContext, VerifyContext,
    VerifyFailureContext, VerifyResultContext,
};
use crate::network::Network;
use crate::proto::{
    PaymentPayloadAny, PaymentRequirementsAny, SettleResponse, SupportedKind, SupportedResponse,
    VerifyResponse, parse_payment_payload, parse_payment_requirements,
};
use crate::scheme::{SchemeFacilitator, SchemeRegistry};

/// Errors from the facilitator engine.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FacilitatorError {
    /// Wire-level fault: version detection, parsing, or routing.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Verification failed or was aborted by a hook.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// Settlement failed or was aborted by a hook.
    #[error(transparent)]
    Settle(#[from] SettleError),
}

/// Facilitator engine dispatching verify/settle to per-`(scheme, network)`
/// mechanisms.
pub struct T402Facilitator {
    schemes: SchemeRegistry<dyn SchemeFacilitator>,
    hooks: RwLock<PaymentHooks>,
}

impl std::fmt::Debug for T402Facilitator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("T402Facilitator")
            .field("schemes", &self.schemes)
            .finish_non_exhaustive()
    }
}

impl Default for T402Facilitator {
    fn default() -> Self {
        Self::new()
    }
}

impl T402Facilitator {
    /// Creates a new facilitator engine with no mechanisms.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schemes: SchemeRegistry::new(),
            hooks: RwLock::new(PaymentHooks::new()),
        }
    }

    /// Registers a facilitator mechanism for a set of networks.
    ///
    /// A network with reference `*` (e.g. `eip155:*`) registers the
    /// mechanism for the entire namespace.
    pub fn register(
        &self,
        networks: Vec<Network>,
        mechanism: Arc<dyn SchemeFacilitator>,
    ) -> &Self {
        let scheme = mechanism.scheme().to_owned();
        self.schemes.register(scheme, networks, mechanism);
        self
    }

    /// Replaces the verify/settle hooks.
    pub fn set_hooks(&self, hooks: PaymentHooks) -> &Self {
        *self.hooks.write().expect("facilitator hooks lock poisoned") = hooks;
        self
    }

    /// Verifies a payment from raw wire bytes.
    ///
    /// Detects the version from the payload bytes, typed-parses both sides,
    /// fires the before-verify hooks (which may abort), and dispatches to
    /// the matching mechanism.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorError::Protocol`] for version or parse faults and
    /// unrouteable requests, or [`FacilitatorError::Verify`] when the
    /// mechanism or a hook rejects the payment.
    pub async fn verify(
        &self,
        payload_bytes: &[u8],
        requirements_bytes: &[u8],
    ) -> Result<VerifyResponse, FacilitatorError> {
        let payload = parse_payment_payload(payload_bytes)?;
        let requirements = parse_payment_requirements(payload.version(), requirements_bytes)?;
        let mechanism = self.dispatch(&payload).map_err(verify_dispatch_error)?;

        let hooks = self.hooks.read().expect("facilitator hooks lock poisoned").clone();
        let ctx = VerifyContext {
            payload: payload.clone(),
            requirements: requirements.clone(),
            payload_bytes: Some(payload_bytes.to_vec()),
            requirements_bytes: Some(requirements_bytes.to_vec()),
        };

        if let Some(abort) = hooks.run_before_verify(&ctx).await {
            return Err(VerifyError::new(abort.reason)
                .with_network(payload.network().clone())
                .into());
        }

        let result = AssertUnwindSafe(mechanism.verify(&payload, &requirements))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(VerifyError::new("mechanism_failure")
                    .with_message(crate::panic_message(&panic)))
            });

        match result {
            Ok(response) if response.is_valid() => {
                let result_ctx = VerifyResultContext {
                    ctx,
                    result: response.clone(),
                };
                hooks.run_after_verify(&result_ctx).await;
                Ok(response)
            }
            Ok(response) => {
                // A well-formed but invalid payment travels back on the wire
                // as-is unless a failure hook recovers it.
                let reason = match &response {
                    VerifyResponse::Invalid { reason, .. } => reason.clone(),
                    VerifyResponse::Valid { .. } => String::new(),
                };
                let failure_ctx = VerifyFailureContext { ctx, error: reason };
                if let Some(recovered) = hooks.run_verify_failure(&failure_ctx).await {
                    return Ok(recovered.result);
                }
                Ok(response)
            }
            Err(err) => {
                let failure_ctx = VerifyFailureContext {
                    ctx,
                    error: err.to_string(),
                };
                if let Some(recovered) = hooks.run_verify_failure(&failure_ctx).await {
                    return Ok(recovered.result);
                }
                Err(err.into())
            }
        }
    }

    /// Settles a payment from raw wire bytes.
    ///
    /// Same routing and hook lifecycle as [`verify`](Self::verify). The
    /// engine never retries a failed settlement; mechanisms are required to
    /// make settlement safe to retry, and retries are a hook concern.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorError::Protocol`] for version or parse faults and
    /// unrouteable requests, or [`FacilitatorError::Settle`] when the
    /// mechanism or a hook rejects the settlement.
    pub async fn settle(
        &self,
        payload_bytes: &[u8],
        requirements_bytes: &[u8],
    ) -> Result<SettleResponse, FacilitatorError> {
        let payload = parse_payment_payload(payload_bytes)?;
        let requirements = parse_payment_requirements(payload.version(), requirements_bytes)?;
        let mechanism = self.dispatch(&payload).map_err(settle_dispatch_error)?;

        let hooks = self.hooks.read().expect("facilitator hooks lock poisoned").clone();
        let ctx = SettleContext {
            payload: payload.clone(),
            requirements: requirements.clone(),
            payload_bytes: Some(payload_bytes.to_vec()),
            requirements_bytes: Some(requirements_bytes.to_vec()),
        };

        if let Some(abort) = hooks.run_before_settle(&ctx).await {
            return Err(SettleError::new(abort.reason)
                .with_network(payload.network().clone())
                .into());
        }

        let result = AssertUnwindSafe(mechanism.settle(&payload, &requirements))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(SettleError::new("mechanism_failure")
                    .with_message(crate::panic_message(&panic)))
            });

        match result {
            Ok(response) if response.is_success() => {
                let result_ctx = SettleResultContext {
                    ctx,
                    result: response.clone(),
                };
                hooks.run_after_settle(&result_ctx).await;
                Ok(response)
            }
            Ok(response) => {
                let reason = match &response {
                    SettleResponse::Error { reason, .. } => reason.clone(),
                    SettleResponse::Success { .. } => String::new(),
                };
                let failure_ctx = SettleFailureContext { ctx, error: reason };
                if let Some(recovered) = hooks.run_settle_failure(&failure_ctx).await {
                    return Ok(recovered.result);
                }
                Ok(response)
            }
            Err(err) => {
                let failure_ctx = SettleFailureContext {
                    ctx,
                    error: err.to_string(),
                };
                if let Some(recovered) = hooks.run_settle_failure(&failure_ctx).await {
                    return Ok(recovered.result);
                }
                Err(err.into())
            }
        }
    }

    /// Assembles the supported report from the registered mechanisms.
    ///
    /// Emits one kind per (mechanism version, scheme, registered network),
    /// deduplicated by that triple with the first registration winning, and
    /// aggregates signer addresses grouped by each mechanism's declared
    /// CAIP family.
    #[must_use]
    pub fn supported(&self) -> SupportedResponse {
        let mut kinds = Vec::new();
        let mut seen: HashSet<(u8, String, String)> = HashSet::new();
        let mut signers: HashMap<String, Vec<String>> = HashMap::new();

        for entry in self.schemes.entries() {
            let mechanism = &entry.mechanism;
            for network in &entry.networks {
                let key = (
                    mechanism.version(),
                    entry.scheme.clone(),
                    network.to_string(),
                );
                if !seen.insert(key) {
                    continue;
                }
                kinds.push(SupportedKind {
                    version: mechanism.version(),
                    scheme: entry.scheme.clone(),
                    network: network.to_string(),
                    extra: mechanism.extra(network),
                });
            }

            let addresses = mechanism.signer_addresses();
            if !addresses.is_empty() {
                let family = signers.entry(mechanism.caip_family()).or_default();
                for address in addresses {
                    if !family.contains(&address) {
                        family.push(address);
                    }
                }
            }
        }

        SupportedResponse {
            kinds,
            extensions: Vec::new(),
            signers,
        }
    }

    /// Resolves the mechanism for a payload's routing key, requiring the
    /// mechanism's declared version to match the payload's.
    ///
    /// A payload whose `(scheme, network)` is served only at a different
    /// protocol version is rejected as a version mismatch rather than an
    /// unknown route.
    fn dispatch(
        &self,
        payload: &PaymentPayloadAny,
    ) -> Result<Arc<dyn SchemeFacilitator>, DispatchError> {
        let scheme = payload.scheme();
        let network = payload.network();
        let version = payload.version();

        if let Some(mechanism) =
            self.schemes
                .lookup_where(scheme, network, |m| m.version() == version)
        {
            return Ok(mechanism);
        }

        if self.schemes.supports(scheme, network) {
            Err(DispatchError::VersionMismatch {
                version,
                network: network.clone(),
            })
        } else {
            Err(DispatchError::NotFound {
                scheme: scheme.to_owned(),
                network: network.clone(),
            })
        }
    }
}

/// Internal dispatch failure, mapped per-operation into the public error.
enum DispatchError {
    NotFound { scheme: String, network: Network },
    VersionMismatch { version: u8, network: Network },
}

fn verify_dispatch_error(err: DispatchError) -> FacilitatorError {
    match err {
        DispatchError::NotFound { scheme, network } => {
            ProtocolError::NoFacilitatorForNetwork {
                scheme,
                network: network.to_string(),
            }
            .into()
        }
        DispatchError::VersionMismatch { version, network } => VerifyError::new("version_mismatch")
            .with_message(format!("no mechanism speaks version {version} for this route"))
            .with_network(network)
            .into(),
    }
}

fn settle_dispatch_error(err: DispatchError) -> FacilitatorError {
    match err {
        DispatchError::NotFound { scheme, network } => {
            ProtocolError::NoFacilitatorForNetwork {
                scheme,
                network: network.to_string(),
            }
            .into()
        }
        DispatchError::VersionMismatch { version, network } => SettleError::new("version_mismatch")
            .with_message(format!("no mechanism speaks version {version} for this route"))
            .with_network(network)
            .into(),
    }
}
