//! Resource server engine.
//!
//! [`T402ResourceServer`] owns the server side of the payment lifecycle:
//!
//! - **Build**: resolve a route's [`ResourceConfig`] into concrete payment
//!   requirements, dropping any that no facilitator advertises support for.
//! - **Match and verify**: find the single offered requirement equal to the
//!   payload's echo, then delegate verification to a facilitator client,
//!   with the full before/after/failure hook lifecycle.
//! - **Settle**: after the handler has produced its response, delegate
//!   settlement, again with the full hook lifecycle.
//!
//! The engine never settles before a successful verify within one request;
//! the HTTP shim drives that ordering.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;

use crate::config::{RequestContext, ResourceConfig};
use crate::error::{BoxError, ProtocolError, ServerError, SettleError, VerifyError};
use crate::hooks::{
    BoxFuture, PaymentHooks, SettleContext, SettleFailureContext, SettleResultContext,
    VerifyContext, VerifyFailureContext, VerifyResultContext,
};
use crate::proto::{
    PaymentPayloadAny, PaymentRequirementsAny, SettleResponse, SupportedKind, SupportedResponse,
    VerifyResponse, v2,
};
use crate::scheme::{SchemeRegistry, SchemeServer};

/// Async facilitator client interface used by resource servers.
///
/// Resource servers delegate verify and settle to a facilitator via this
/// trait; the primary implementation speaks HTTP to a remote facilitator
/// service. Implementations must be drop-cancellable.
pub trait FacilitatorClient: Send + Sync {
    /// Verifies a payment payload against the declared requirements.
    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayloadAny,
        requirements: &'a PaymentRequirementsAny,
    ) -> BoxFuture<'a, Result<VerifyResponse, VerifyError>>;

    /// Settles a verified payment.
    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayloadAny,
        requirements: &'a PaymentRequirementsAny,
    ) -> BoxFuture<'a, Result<SettleResponse, SettleError>>;

    /// Returns the payment kinds this facilitator supports.
    ///
    /// Called during [`T402ResourceServer::initialize`] to learn which
    /// `(scheme, network)` pairs the facilitator can handle.
    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, BoxError>>;
}

/// Raw message bytes accompanying a verify or settle call, passed through
/// to hooks untouched.
#[derive(Debug, Clone, Default)]
pub struct RawParts {
    /// Raw payload bytes, if the transport preserved them.
    pub payload: Option<Vec<u8>>,
    /// Raw requirements bytes, if the transport preserved them.
    pub requirements: Option<Vec<u8>>,
}

/// Resource server engine with mechanism registration, facilitator client
/// initialization, requirement building, and verify/settle delegation.
pub struct T402ResourceServer {
    facilitators: RwLock<Vec<Arc<dyn FacilitatorClient>>>,
    reports: RwLock<Vec<SupportedResponse>>,
    schemes: SchemeRegistry<dyn SchemeServer>,
    hooks: RwLock<PaymentHooks>,
    initialized: AtomicBool,
}

impl std::fmt::Debug for T402ResourceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("T402ResourceServer")
            .field(
                "facilitators",
                &self.facilitators.read().map(|v| v.len()).unwrap_or(0),
            )
            .field("schemes", &self.schemes)
            .field("initialized", &self.initialized.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Default for T402ResourceServer {
    fn default() -> Self {
        Self::new()
    }
}

impl T402ResourceServer {
    /// Creates a new resource server with no facilitator clients.
    #[must_use]
    pub fn new() -> Self {
        Self {
            facilitators: RwLock::new(Vec::new()),
            reports: RwLock::new(Vec::new()),
            schemes: SchemeRegistry::new(),
            hooks: RwLock::new(PaymentHooks::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Creates a new resource server with one facilitator client.
    #[must_use]
    pub fn with_facilitator(client: Arc<dyn FacilitatorClient>) -> Self {
        let server = Self::new();
        server.add_facilitator(client);
        server
    }

    /// Adds a facilitator client.
    ///
    /// Preference order among facilitators advertising the same
    /// `(scheme, network)` is registration order: the first one wins.
    /// Call [`initialize`](Self::initialize) again after adding clients to
    /// an initialized server.
    pub fn add_facilitator(&self, client: Arc<dyn FacilitatorClient>) -> &Self {
        self.facilitators
            .write()
            .expect("facilitators lock poisoned")
            .push(client);
        self
    }

    /// Registers a server-side scheme mechanism for a set of networks.
    pub fn register(
        &self,
        networks: Vec<crate::network::Network>,
        mechanism: Arc<dyn SchemeServer>,
    ) -> &Self {
        let scheme = mechanism.scheme().to_owned();
        self.schemes.register(scheme, networks, mechanism);
        self
    }

    /// Replaces the verify/settle hooks.
    pub fn set_hooks(&self, hooks: PaymentHooks) -> &Self {
        *self.hooks.write().expect("server hooks lock poisoned") = hooks;
        self
    }

    /// Initializes the engine by fetching the supported report from every
    /// registered facilitator client.
    ///
    /// Must be called before building requirements or verifying payments.
    ///
    /// # Errors
    ///
    /// Returns the first facilitator client error encountered.
    pub async fn initialize(&self) -> Result<(), BoxError> {
        let clients = self
            .facilitators
            .read()
            .expect("facilitators lock poisoned")
            .clone();

        let mut reports = Vec::with_capacity(clients.len());
        for client in &clients {
            reports.push(client.supported().await?);
        }

        *self.reports.write().expect("reports lock poisoned") = reports;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Returns whether the engine has been initialized.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Builds payment requirements for a protected resource.
    ///
    /// Resolves dynamic price and recipient callbacks against the request
    /// context, parses the price through the registered server mechanism,
    /// and lets the mechanism enrich the result. Options that no registered
    /// mechanism or no facilitator supports are dropped; an empty result
    /// means the route has no viable payment options and the caller answers
    /// with a bare 402.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotInitialized`] before initialization, or
    /// [`ServerError::Config`] if a dynamic callback or price parse fails —
    /// a configuration fault, not a payer fault.
    pub fn build_payment_requirements(
        &self,
        config: &ResourceConfig,
        ctx: &RequestContext,
    ) -> Result<Vec<v2::PaymentRequirements>, ServerError> {
        if !self.is_initialized() {
            return Err(ServerError::NotInitialized);
        }

        let mut requirements = Vec::with_capacity(config.accepts.len());
        for option in &config.accepts {
            let Some(mechanism) = self.schemes.lookup(&option.scheme, &option.network) else {
                tracing::warn!(
                    scheme = %option.scheme,
                    network = %option.network,
                    "dropping payment option: no server mechanism registered"
                );
                continue;
            };

            let Some(kind) = self.supported_kind(2, &option.scheme, &option.network) else {
                tracing::warn!(
                    scheme = %option.scheme,
                    network = %option.network,
                    "dropping payment option: no facilitator advertises support"
                );
                continue;
            };

            let price = option
                .price
                .resolve(ctx)
                .map_err(|e| ServerError::Config(format!("price resolution failed: {e}")))?;
            let pay_to = option
                .pay_to
                .resolve(ctx)
                .map_err(|e| ServerError::Config(format!("recipient resolution failed: {e}")))?;

            let asset_amount = mechanism
                .parse_price(&price, &option.network)
                .map_err(|e| ServerError::Config(format!("price parse failed: {e}")))?;

            let base = v2::PaymentRequirements {
                scheme: option.scheme.clone(),
                network: option.network.clone(),
                asset: asset_amount.asset,
                amount: asset_amount.amount,
                pay_to,
                max_timeout_seconds: option
                    .max_timeout_seconds
                    .unwrap_or(crate::config::PaymentOption::DEFAULT_MAX_TIMEOUT_SECONDS),
                extra: asset_amount.extra,
            };

            requirements.push(mechanism.enhance_requirements(base, &kind, &config.extensions));
        }

        Ok(requirements)
    }

    /// Finds the single offered requirement matching an inbound payload.
    ///
    /// V2 payloads match by deep equality of the echoed `accepted` against
    /// the offered set — the echo is re-validated, never trusted. V1
    /// payloads carry no echo and match by scheme and network.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NoMatchingRequirement`] if nothing matches.
    pub fn find_matching_requirement<'a>(
        &self,
        available: &'a [v2::PaymentRequirements],
        payload: &PaymentPayloadAny,
    ) -> Result<&'a v2::PaymentRequirements, ProtocolError> {
        let found = match payload {
            PaymentPayloadAny::V2(payload) => {
                available.iter().find(|req| **req == payload.accepted)
            }
            PaymentPayloadAny::V1(payload) => available
                .iter()
                .find(|req| req.scheme == payload.scheme && req.network == payload.network),
        };
        found.ok_or(ProtocolError::NoMatchingRequirement)
    }

    /// Verifies a payment via the facilitator client advertising support for
    /// its `(scheme, network)`, with the full hook lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError`] if no facilitator advertises the pair, a
    /// before-verify hook aborts, or verification fails without recovery.
    pub async fn verify_payment(
        &self,
        payload: &PaymentPayloadAny,
        requirements: &PaymentRequirementsAny,
        raw: RawParts,
    ) -> Result<VerifyResponse, VerifyError> {
        if !self.is_initialized() {
            return Err(VerifyError::new("not_initialized"));
        }

        let network = payload.network().clone();
        let hooks = self.hooks.read().expect("server hooks lock poisoned").clone();
        let ctx = VerifyContext {
            payload: payload.clone(),
            requirements: requirements.clone(),
            payload_bytes: raw.payload,
            requirements_bytes: raw.requirements,
        };

        if let Some(abort) = hooks.run_before_verify(&ctx).await {
            return Err(VerifyError::new(abort.reason).with_network(network));
        }

        let client = match self.find_facilitator(payload.version(), payload.scheme(), &network) {
            Some(client) => client,
            None => {
                return Err(VerifyError::new("no_facilitator_for_network")
                    .with_message(format!(
                        "no facilitator advertises scheme '{}' on network '{network}'",
                        payload.scheme()
                    ))
                    .with_network(network));
            }
        };

        let result = AssertUnwindSafe(client.verify(payload, requirements))
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
            Ok(VerifyResponse::Invalid {
                reason,
                message,
                payer,
            }) => {
                let failure_ctx = VerifyFailureContext {
                    ctx,
                    error: reason.clone(),
                };
                if let Some(recovered) = hooks.run_verify_failure(&failure_ctx).await {
                    return Ok(recovered.result);
                }
                let mut err = VerifyError::new(reason).with_network(network);
                if let Some(message) = message {
                    err = err.with_message(message);
                }
                if let Some(payer) = payer {
                    err = err.with_payer(payer);
                }
                Err(err)
            }
            Ok(_) => Err(VerifyError::new("unexpected_response").with_network(network)),
            Err(err) => {
                let failure_ctx = VerifyFailureContext {
                    ctx,
                    error: err.to_string(),
                };
                if let Some(recovered) = hooks.run_verify_failure(&failure_ctx).await {
                    return Ok(recovered.result);
                }
                Err(err)
            }
        }
    }

    /// Settles a payment via the facilitator client advertising support for
    /// its `(scheme, network)`, with the full hook lifecycle.
    ///
    /// Must only be called after a successful verification within the same
    /// request.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError`] if no facilitator advertises the pair, a
    /// before-settle hook aborts, or settlement fails without recovery.
    pub async fn settle_payment(
        &self,
        payload: &PaymentPayloadAny,
        requirements: &PaymentRequirementsAny,
        raw: RawParts,
    ) -> Result<SettleResponse, SettleError> {
        if !self.is_initialized() {
            return Err(SettleError::new("not_initialized"));
        }

        let network = payload.network().clone();
        let hooks = self.hooks.read().expect("server hooks lock poisoned").clone();
        let ctx = SettleContext {
            payload: payload.clone(),
            requirements: requirements.clone(),
            payload_bytes: raw.payload,
            requirements_bytes: raw.requirements,
        };

        if let Some(abort) = hooks.run_before_settle(&ctx).await {
            return Err(SettleError::new(abort.reason).with_network(network));
        }

        let client = match self.find_facilitator(payload.version(), payload.scheme(), &network) {
            Some(client) => client,
            None => {
                return Err(SettleError::new("no_facilitator_for_network").with_network(network));
            }
        };

        let result = AssertUnwindSafe(client.settle(payload, requirements))
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
            Ok(SettleResponse::Error {
                reason,
                message,
                transaction,
                network,
            }) => {
                let failure_ctx = SettleFailureContext {
                    ctx,
                    error: reason.clone(),
                };
                if let Some(recovered) = hooks.run_settle_failure(&failure_ctx).await {
                    return Ok(recovered.result);
                }
                let mut err = SettleError::new(reason).with_network(network);
                if let Some(message) = message {
                    err = err.with_message(message);
                }
                if let Some(transaction) = transaction {
                    err = err.with_transaction(transaction);
                }
                Err(err)
            }
            Ok(_) => Err(SettleError::new("unexpected_response").with_network(network)),
            Err(err) => {
                let failure_ctx = SettleFailureContext {
                    ctx,
                    error: err.to_string(),
                };
                if let Some(recovered) = hooks.run_settle_failure(&failure_ctx).await {
                    return Ok(recovered.result);
                }
                Err(err)
            }
        }
    }

    /// Finds the advertised kind for `(version, scheme, network)` across all
    /// facilitator reports, in registration order.
    #[must_use]
    pub fn supported_kind(
        &self,
        version: u8,
        scheme: &str,
        network: &crate::network::Network,
    ) -> Option<SupportedKind> {
        let reports = self.reports.read().expect("reports lock poisoned");
        reports.iter().find_map(|report| {
            report
                .kinds
                .iter()
                .find(|kind| {
                    kind.version == version && kind.scheme == scheme && kind.covers(network)
                })
                .cloned()
        })
    }

    /// Finds the first-registered facilitator client whose report advertises
    /// the `(version, scheme, network)` triple.
    fn find_facilitator(
        &self,
        version: u8,
        scheme: &str,
        network: &crate::network::Network,
    ) -> Option<Arc<dyn FacilitatorClient>> {
        let reports = self.reports.read().expect("reports lock poisoned");
        let idx = reports
            .iter()
            .position(|report| report.advertises(version, scheme, network))?;
        drop(reports);
        self.facilitators
            .read()
            .expect("facilitators lock poisoned")
            .get(idx)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PaymentOption, Price};
    use crate::hooks::{AbortResult, RecoveredVerify};
    use crate::network::Network;
    use crate::proto::Extensions;
    use crate::scheme::{AssetAmount, SchemeId};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Facilitator client that records call order and serves scripted results.
    struct ScriptedFacilitator {
        name: &'static str,
        kinds: Vec<SupportedKind>,
        verify_result: Mutex<Option<Result<VerifyResponse, VerifyError>>>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedFacilitator {
        fn new(name: &'static str, networks: &[&str], log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                kinds: networks
                    .iter()
                    .map(|n| SupportedKind {
                        version: 2,
                        scheme: "exact".into(),
                        network: (*n).to_owned(),
                        extra: None,
                    })
                    .collect(),
                verify_result: Mutex::new(None),
                log,
            }
        }

        fn script_verify(&self, result: Result<VerifyResponse, VerifyError>) {
            *self.verify_result.lock().unwrap() = Some(result);
        }
    }

    impl FacilitatorClient for ScriptedFacilitator {
        fn verify<'a>(
            &'a self,
            _payload: &'a PaymentPayloadAny,
            _requirements: &'a PaymentRequirementsAny,
        ) -> BoxFuture<'a, Result<VerifyResponse, VerifyError>> {
            self.log.lock().unwrap().push(format!("{}:verify", self.name));
            Box::pin(async move {
                self.verify_result
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or_else(|| Ok(VerifyResponse::valid("0xPAYER")))
            })
        }

        fn settle<'a>(
            &'a self,
            payload: &'a PaymentPayloadAny,
            _requirements: &'a PaymentRequirementsAny,
        ) -> BoxFuture<'a, Result<SettleResponse, SettleError>> {
            self.log.lock().unwrap().push(format!("{}:settle", self.name));
            let network = payload.network().clone();
            Box::pin(async move {
                Ok(SettleResponse::Success {
                    payer: Some("0xPAYER".into()),
                    transaction: "0xBEEF".into(),
                    network,
                })
            })
        }

        fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, BoxError>> {
            Box::pin(async move {
                Ok(SupportedResponse {
                    kinds: self.kinds.clone(),
                    extensions: Vec::new(),
                    signers: std::collections::HashMap::new(),
                })
            })
        }
    }

    struct ExactServer;

    impl SchemeId for ExactServer {
        fn scheme(&self) -> &str {
            "exact"
        }
        fn namespace(&self) -> &str {
            "eip155"
        }
    }

    impl SchemeServer for ExactServer {
        fn parse_price(
            &self,
            price: &serde_json::Value,
            _network: &Network,
        ) -> Result<AssetAmount, BoxError> {
            let text = price.as_str().ok_or("price must be a string")?;
            let amount = crate::amount::MoneyAmount::parse(text)?.to_atomic(6)?;
            Ok(AssetAmount {
                asset: "USDC".into(),
                amount,
                extra: None,
            })
        }

        fn enhance_requirements(
            &self,
            mut requirements: v2::PaymentRequirements,
            _supported: &SupportedKind,
            _extensions: &Extensions,
        ) -> v2::PaymentRequirements {
            requirements.extra = Some(serde_json::json!({"name": "USD Coin"}));
            requirements
        }
    }

    fn requirements() -> v2::PaymentRequirements {
        v2::PaymentRequirements {
            scheme: "exact".into(),
            network: Network::new("eip155", "8453"),
            asset: "USDC".into(),
            amount: "1000".into(),
            pay_to: "0xABC".into(),
            max_timeout_seconds: 300,
            extra: None,
        }
    }

    fn payload_for(accepted: v2::PaymentRequirements) -> PaymentPayloadAny {
        PaymentPayloadAny::V2(Box::new(v2::PaymentPayload {
            version: v2::V2,
            accepted,
            resource: None,
            extensions: None,
            payload: serde_json::json!({"signature": "0xdead", "from": "0xPAYER"}),
        }))
    }

    async fn initialized_server(
        facilitator: Arc<ScriptedFacilitator>,
    ) -> T402ResourceServer {
        let server = T402ResourceServer::with_facilitator(facilitator);
        server.register(vec![Network::new("eip155", "*")], Arc::new(ExactServer));
        server.initialize().await.unwrap();
        server
    }

    #[tokio::test]
    async fn test_build_requirements_enriched() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let facilitator = Arc::new(ScriptedFacilitator::new("a", &["eip155:8453"], log));
        let server = initialized_server(facilitator).await;

        let config = ResourceConfig::new(vec![PaymentOption::new(
            "exact",
            Network::new("eip155", "8453"),
            "0.01",
            "0xABC",
        )]);
        let built = server
            .build_payment_requirements(&config, &RequestContext::default())
            .unwrap();

        assert_eq!(built.len(), 1);
        assert_eq!(built[0].amount, "10000");
        assert_eq!(built[0].extra, Some(serde_json::json!({"name": "USD Coin"})));
    }

    #[tokio::test]
    async fn test_build_requirements_drops_unadvertised() {
        let log = Arc::new(Mutex::new(Vec::new()));
        // Facilitator only advertises base mainnet.
        let facilitator = Arc::new(ScriptedFacilitator::new("a", &["eip155:8453"], log));
        let server = initialized_server(facilitator).await;

        let config = ResourceConfig::new(vec![PaymentOption::new(
            "exact",
            Network::new("solana", "mainnet"),
            "0.01",
            "solRecipient",
        )]);
        let built = server
            .build_payment_requirements(&config, &RequestContext::default())
            .unwrap();
        assert!(built.is_empty());
    }

    #[tokio::test]
    async fn test_build_requirements_dynamic_price_failure_is_config_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let facilitator = Arc::new(ScriptedFacilitator::new("a", &["eip155:8453"], log));
        let server = initialized_server(facilitator).await;

        let mut option = PaymentOption::new(
            "exact",
            Network::new("eip155", "8453"),
            "0.01",
            "0xABC",
        );
        option.price = Price::Dynamic(Arc::new(|_| Err("database down".into())));
        let config = ResourceConfig::new(vec![option]);

        let err = server
            .build_payment_requirements(&config, &RequestContext::default())
            .unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[tokio::test]
    async fn test_find_matching_requirement_rejects_mismatched_amount() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let facilitator = Arc::new(ScriptedFacilitator::new("a", &["eip155:8453"], log));
        let server = initialized_server(facilitator).await;

        let offered = vec![requirements()];
        let mut tampered = requirements();
        tampered.amount = "999".into();
        let payload = payload_for(tampered);

        let err = server
            .find_matching_requirement(&offered, &payload)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NoMatchingRequirement));
    }

    #[tokio::test]
    async fn test_verify_fires_hooks_in_order_and_abort_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let facilitator = Arc::new(ScriptedFacilitator::new("a", &["eip155:8453"], Arc::clone(&log)));
        let server = initialized_server(Arc::clone(&facilitator)).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = Arc::clone(&order);
        let o2 = Arc::clone(&order);
        let o3 = Arc::clone(&order);
        server.set_hooks(
            PaymentHooks::new()
                .on_before_verify(move |_ctx| {
                    o1.lock().unwrap().push("first");
                    async move { None }
                })
                .on_before_verify(move |_ctx| {
                    o2.lock().unwrap().push("second");
                    async move { Some(AbortResult::new("denylisted_payer")) }
                })
                .on_before_verify(move |_ctx| {
                    o3.lock().unwrap().push("third");
                    async move { None }
                }),
        );

        let req = PaymentRequirementsAny::V2(requirements());
        let payload = payload_for(requirements());
        let err = server
            .verify_payment(&payload, &req, RawParts::default())
            .await
            .unwrap_err();

        assert_eq!(err.reason, "denylisted_payer");
        // First abort wins; the third hook never runs, nor does the mechanism.
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_verify_failure_recovery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let facilitator = Arc::new(ScriptedFacilitator::new("a", &["eip155:8453"], log));
        facilitator.script_verify(Err(VerifyError::new("rpc_timeout")));
        let server = initialized_server(Arc::clone(&facilitator)).await;

        server.set_hooks(PaymentHooks::new().on_verify_failure(|_ctx| async move {
            Some(RecoveredVerify {
                result: VerifyResponse::valid("0xFALLBACK"),
            })
        }));

        let req = PaymentRequirementsAny::V2(requirements());
        let payload = payload_for(requirements());
        let result = server
            .verify_payment(&payload, &req, RawParts::default())
            .await
            .unwrap();
        assert_eq!(result.payer(), Some("0xFALLBACK"));
    }

    #[tokio::test]
    async fn test_verify_invalid_surfaces_as_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let facilitator = Arc::new(ScriptedFacilitator::new("a", &["eip155:8453"], log));
        facilitator.script_verify(Ok(VerifyResponse::invalid(
            Some("0xPAYER".into()),
            "insufficient_balance".into(),
        )));
        let server = initialized_server(Arc::clone(&facilitator)).await;

        let req = PaymentRequirementsAny::V2(requirements());
        let payload = payload_for(requirements());
        let err = server
            .verify_payment(&payload, &req, RawParts::default())
            .await
            .unwrap_err();
        assert_eq!(err.reason, "insufficient_balance");
        assert_eq!(err.payer.as_deref(), Some("0xPAYER"));
    }

    #[tokio::test]
    async fn test_after_verify_error_is_swallowed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let facilitator = Arc::new(ScriptedFacilitator::new("a", &["eip155:8453"], log));
        let server = initialized_server(facilitator).await;

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        server.set_hooks(PaymentHooks::new().on_after_verify(move |_ctx| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
            async move { Err("observer blew up".to_owned()) }
        }));

        let req = PaymentRequirementsAny::V2(requirements());
        let payload = payload_for(requirements());
        let result = server
            .verify_payment(&payload, &req, RawParts::default())
            .await
            .unwrap();
        assert!(result.is_valid());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_registered_facilitator_wins() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::new(ScriptedFacilitator::new("first", &["eip155:8453"], Arc::clone(&log)));
        let second = Arc::new(ScriptedFacilitator::new("second", &["eip155:8453"], Arc::clone(&log)));

        let server = T402ResourceServer::new();
        server.add_facilitator(first);
        server.add_facilitator(second);
        server.register(vec![Network::new("eip155", "*")], Arc::new(ExactServer));
        server.initialize().await.unwrap();

        let req = PaymentRequirementsAny::V2(requirements());
        let payload = payload_for(requirements());
        server
            .verify_payment(&payload, &req, RawParts::default())
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first:verify"]);
    }

    #[tokio::test]
    async fn test_wildcard_kind_covers_other_networks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let facilitator = Arc::new(ScriptedFacilitator::new("a", &["eip155:*"], log));
        let server = initialized_server(facilitator).await;

        // A payload on a network the facilitator covers only via wildcard.
        let mut req = requirements();
        req.network = Network::new("eip155", "42161");
        let payload = payload_for(req.clone());
        let result = server
            .verify_payment(
                &payload,
                &PaymentRequirementsAny::V2(req),
                RawParts::default(),
            )
            .await
            .unwrap();
        assert!(result.is_valid());

        // The report still lists the registered pattern, not the query.
        let kind = server
            .supported_kind(2, "exact", &Network::new("eip155", "42161"))
            .unwrap();
        assert_eq!(kind.network, "eip155:*");
    }
}
