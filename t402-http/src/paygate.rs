//! Payment gate: drives one request through the payment lifecycle.
//!
//! For each inbound request the gate walks a fixed state machine:
//!
//! ```text
//! INCOMING
//!   ├─ no payment header ─► REQUIRE (402) ─► END
//!   ├─ bad payload       ─► REJECT (402)  ─► END
//!   ├─ no match          ─► REJECT (402)  ─► END
//!   └─ matched ─► VERIFYING
//!                 ├─ abort/fail ─► REJECT ─► END
//!                 └─ valid ─► HANDLER ─► SETTLING
//!                                        ├─ abort/fail ─► REJECT_POST_WORK ─► END
//!                                        └─ success ─► DELIVER (200 + settle header) ─► END
//! ```
//!
//! Verification precedes handler execution; settlement follows handler
//! execution and precedes response transmission. The response wire format
//! follows the payload's protocol version.

use std::future::Future;
use std::sync::Arc;

use http::{Response, StatusCode};

use t402::config::ResourceConfig;
use t402::proto::{
    PaymentPayloadAny, PaymentRequirementsAny, SettleResponse, v1, v2,
};
use t402::server::{RawParts, T402ResourceServer};

use crate::adapter::{HttpAdapter, payment_header, request_context, wants_paywall};
use crate::headers::decode_payment_payload;
use crate::response::{
    attach_settle_header, error_response, payment_required_response,
    payment_required_response_v1,
};

/// Payment gate for one protected route.
///
/// Holds the shared resource server engine and the route's configuration;
/// [`handle`](Paygate::handle) drives a single request through the payment
/// lifecycle around a caller-supplied handler.
pub struct Paygate {
    server: Arc<T402ResourceServer>,
    config: ResourceConfig,
}

impl std::fmt::Debug for Paygate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paygate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Paygate {
    /// Creates a payment gate over an initialized resource server engine.
    #[must_use]
    pub fn new(server: Arc<T402ResourceServer>, config: ResourceConfig) -> Self {
        Self { server, config }
    }

    /// Processes one request, invoking `handler` only after a valid payment
    /// and settling only after the handler has produced its response.
    pub async fn handle<H, Fut>(&self, adapter: &dyn HttpAdapter, handler: H) -> Response<String>
    where
        H: FnOnce() -> Fut,
        Fut: Future<Output = Response<String>>,
    {
        let ctx = request_context(adapter);
        let resource = self.config.resource_info(&ctx);
        let wants_html = wants_paywall(adapter);

        // A failure here is an internal fault (unresolved config, a dynamic
        // pricing callback failing), never a payer fault: 500, not 402.
        let requirements = match self.server.build_payment_requirements(&self.config, &ctx) {
            Ok(requirements) => requirements,
            Err(err) => {
                tracing::error!(error = %err, "failed to build payment requirements");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string());
            }
        };

        let header = match payment_header(adapter) {
            Ok(header) => header,
            Err(err) => {
                return self.reject(2, &requirements, &resource, err.to_string(), wants_html);
            }
        };

        let Some(header) = header else {
            return self.reject(
                2,
                &requirements,
                &resource,
                "payment_required".to_owned(),
                wants_html,
            );
        };

        let (payload, payload_bytes) = match decode_payment_payload(&header) {
            Ok(decoded) => decoded,
            Err(err) => {
                return self.reject(2, &requirements, &resource, err.to_string(), wants_html);
            }
        };
        let version = payload.version();

        let matched = match self.server.find_matching_requirement(&requirements, &payload) {
            Ok(matched) => matched.clone(),
            Err(err) => {
                return self.reject(version, &requirements, &resource, err.to_string(), wants_html);
            }
        };

        let matched_any = match &payload {
            PaymentPayloadAny::V2(_) => PaymentRequirementsAny::V2(matched),
            PaymentPayloadAny::V1(_) => PaymentRequirementsAny::V1(
                v1::PaymentRequirements::from_v2(&matched, Some(&resource)),
            ),
            _ => unreachable!("PaymentPayloadAny is non_exhaustive but only V1/V2 exist"),
        };

        // Hooks receive the raw wire bytes next to the typed views.
        let requirements_bytes = serde_json::to_vec(&matched_any).ok();
        let raw = RawParts {
            payload: Some(payload_bytes.clone()),
            requirements: requirements_bytes.clone(),
        };
        match self.server.verify_payment(&payload, &matched_any, raw).await {
            Ok(result) if result.is_valid() => {}
            Ok(_) => {
                return self.reject(
                    version,
                    &requirements,
                    &resource,
                    "verification_failed".to_owned(),
                    wants_html,
                );
            }
            Err(err) => {
                return self.reject(version, &requirements, &resource, err.to_string(), wants_html);
            }
        }

        let mut response = handler().await;
        if response.status().is_client_error() || response.status().is_server_error() {
            // The handler refused the request; nothing to charge for.
            return response;
        }

        let raw = RawParts {
            payload: Some(payload_bytes),
            requirements: requirements_bytes,
        };
        let settlement = match self.server.settle_payment(&payload, &matched_any, raw).await {
            Ok(settlement) if settlement.is_success() => settlement,
            Ok(SettleResponse::Error { reason, .. }) => {
                tracing::error!(reason = %reason, "settlement failed after handler execution");
                return settlement_failure_response(&reason);
            }
            Ok(_) => return settlement_failure_response("unexpected_response"),
            Err(err) => {
                tracing::error!(error = %err, "settlement failed after handler execution");
                return settlement_failure_response(&err.to_string());
            }
        };

        if let Err(err) = attach_settle_header(&mut response, &payload, &settlement) {
            tracing::error!(error = %err, "failed to encode settlement header");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string());
        }
        response
    }

    /// Emits a 402 in the wire format of the given protocol version.
    fn reject(
        &self,
        version: u8,
        requirements: &[v2::PaymentRequirements],
        resource: &v2::ResourceInfo,
        error: String,
        wants_html: bool,
    ) -> Response<String> {
        let result = if version == 1 {
            let required = v1::PaymentRequired {
                version: v1::V1,
                accepts: requirements
                    .iter()
                    .map(|r| v1::PaymentRequirements::from_v2(r, Some(resource)))
                    .collect(),
                error: Some(error),
            };
            payment_required_response_v1(&required)
        } else {
            let required = v2::PaymentRequired {
                version: v2::V2,
                resource: Some(resource.clone()),
                accepts: requirements.to_vec(),
                extensions: (!self.config.extensions.is_empty())
                    .then(|| self.config.extensions.clone()),
                error: Some(error),
            };
            payment_required_response(&required, &self.config, wants_html)
        };
        result.unwrap_or_else(|err| {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        })
    }
}

/// 402 response for settlement failures after the handler already ran.
///
/// The business decision to re-run or refund belongs to the caller's
/// settle-failure hooks; the wire answer is payment-required with details.
fn settlement_failure_response(details: &str) -> Response<String> {
    let body = serde_json::json!({
        "error": "Settlement failed",
        "details": details,
    })
    .to_string();
    Response::builder()
        .status(StatusCode::PAYMENT_REQUIRED)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER, PAYMENT_SIGNATURE_HEADER,
        X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER,
    };
    use crate::headers::{decode_payment_response, encode_payment_payload};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use t402::Network;
    use t402::config::PaymentOption;
    use t402::error::{BoxError, SettleError, VerifyError};
    use t402::hooks::{AbortResult, BoxFuture, PaymentHooks, RecoveredVerify};
    use t402::proto::{SupportedKind, SupportedResponse, VerifyResponse};
    use t402::scheme::{AssetAmount, SchemeId, SchemeServer};
    use t402::server::FacilitatorClient;

    struct FakeRequest {
        headers: HashMap<String, String>,
        method: String,
        path: String,
        url: String,
    }

    impl FakeRequest {
        fn new() -> Self {
            Self {
                headers: HashMap::new(),
                method: "GET".into(),
                path: "/api/data".into(),
                url: "https://example.com/api/data".into(),
            }
        }

        fn with_header(mut self, name: &str, value: String) -> Self {
            self.headers.insert(name.to_ascii_lowercase(), value);
            self
        }
    }

    impl HttpAdapter for FakeRequest {
        fn header(&self, name: &str) -> Option<String> {
            self.headers.get(&name.to_ascii_lowercase()).cloned()
        }
        fn method(&self) -> String {
            self.method.clone()
        }
        fn path(&self) -> String {
            self.path.clone()
        }
        fn url(&self) -> String {
            self.url.clone()
        }
    }

    /// Records every facilitator call; scripts the verify outcome.
    struct MockFacilitator {
        log: Arc<Mutex<Vec<&'static str>>>,
        verify_error: Option<&'static str>,
        settle_error: Option<&'static str>,
    }

    impl MockFacilitator {
        fn new(log: Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                log,
                verify_error: None,
                settle_error: None,
            }
        }
    }

    impl FacilitatorClient for MockFacilitator {
        fn verify<'a>(
            &'a self,
            _payload: &'a PaymentPayloadAny,
            _requirements: &'a PaymentRequirementsAny,
        ) -> BoxFuture<'a, Result<VerifyResponse, VerifyError>> {
            self.log.lock().unwrap().push("verify");
            Box::pin(async move {
                match self.verify_error {
                    Some(reason) => Err(VerifyError::new(reason)),
                    None => Ok(VerifyResponse::valid("0xPAYER")),
                }
            })
        }

        fn settle<'a>(
            &'a self,
            payload: &'a PaymentPayloadAny,
            _requirements: &'a PaymentRequirementsAny,
        ) -> BoxFuture<'a, Result<SettleResponse, SettleError>> {
            self.log.lock().unwrap().push("settle");
            let network = payload.network().clone();
            Box::pin(async move {
                match self.settle_error {
                    Some(reason) => Err(SettleError::new(reason)),
                    None => Ok(SettleResponse::Success {
                        payer: Some("0xPAYER".into()),
                        transaction: "0xBEEF".into(),
                        network,
                    }),
                }
            })
        }

        fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, BoxError>> {
            Box::pin(async move {
                Ok(SupportedResponse {
                    kinds: vec![
                        SupportedKind {
                            version: 2,
                            scheme: "exact".into(),
                            network: "eip155:*".into(),
                            extra: None,
                        },
                        SupportedKind {
                            version: 1,
                            scheme: "exact".into(),
                            network: "eip155:*".into(),
                            extra: None,
                        },
                    ],
                    extensions: Vec::new(),
                    signers: HashMap::new(),
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
            Ok(AssetAmount {
                asset: "USDC".into(),
                amount: t402::amount::MoneyAmount::parse(text)?.to_atomic(6)?,
                extra: None,
            })
        }
    }

    async fn gate_with(
        facilitator: MockFacilitator,
        network: &str,
    ) -> (Paygate, Arc<T402ResourceServer>) {
        let server = Arc::new(T402ResourceServer::with_facilitator(Arc::new(facilitator)));
        server.register(
            vec![Network::new("eip155", "*")],
            Arc::new(ExactServer),
        );
        server.initialize().await.unwrap();

        let config = ResourceConfig::new(vec![PaymentOption::new(
            "exact",
            network.parse().unwrap(),
            "0.001",
            "0xABC",
        )]);
        (Paygate::new(Arc::clone(&server), config), server)
    }

    fn signed_header(server: &T402ResourceServer, config: &ResourceConfig) -> (String, String) {
        let built = server
            .build_payment_requirements(config, &t402::config::RequestContext::default())
            .unwrap();
        let payload = PaymentPayloadAny::V2(Box::new(v2::PaymentPayload {
            version: v2::V2,
            accepted: built[0].clone(),
            resource: None,
            extensions: None,
            payload: serde_json::json!({"signature": "0xdead", "from": "0xPAYER"}),
        }));
        let (name, value) = encode_payment_payload(&payload).unwrap();
        (name.to_owned(), value)
    }

    fn ok_handler(
        counter: Arc<AtomicUsize>,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Response<String>> + Send>> {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Response::new("{\"ok\":true}".to_owned()) })
        }
    }

    #[tokio::test]
    async fn test_scenario_happy_path_v2() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (gate, server) = gate_with(MockFacilitator::new(Arc::clone(&log)), "eip155:8453").await;

        let observed = Arc::new(Mutex::new(Vec::new()));
        let o1 = Arc::clone(&observed);
        let o2 = Arc::clone(&observed);
        server.set_hooks(
            PaymentHooks::new()
                .on_after_verify(move |_ctx| {
                    o1.lock().unwrap().push("after_verify");
                    async move { Ok(()) }
                })
                .on_after_settle(move |_ctx| {
                    o2.lock().unwrap().push("after_settle");
                    async move { Ok(()) }
                }),
        );

        let (name, value) = signed_header(&server, &gate.config);
        let request = FakeRequest::new().with_header(&name, value);
        let ran = Arc::new(AtomicUsize::new(0));

        let response = gate.handle(&request, ok_handler(Arc::clone(&ran))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "{\"ok\":true}");
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        let settle_header = response
            .headers()
            .get(PAYMENT_RESPONSE_HEADER)
            .unwrap()
            .to_str()
            .unwrap();
        let settlement = decode_payment_response(settle_header).unwrap();
        let SettleResponse::Success { transaction, payer, network } = settlement else {
            panic!("expected success");
        };
        assert_eq!(transaction, "0xBEEF");
        assert_eq!(payer.as_deref(), Some("0xPAYER"));
        assert_eq!(network.to_string(), "eip155:8453");

        assert_eq!(*log.lock().unwrap(), vec!["verify", "settle"]);
        assert_eq!(*observed.lock().unwrap(), vec!["after_verify", "after_settle"]);
    }

    #[tokio::test]
    async fn test_scenario_no_payment_header_requires() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (gate, _server) =
            gate_with(MockFacilitator::new(Arc::clone(&log)), "eip155:8453").await;

        let ran = Arc::new(AtomicUsize::new(0));
        let response = gate
            .handle(&FakeRequest::new(), ok_handler(Arc::clone(&ran)))
            .await;

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(response.headers().contains_key(PAYMENT_REQUIRED_HEADER));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_no_matching_requirement() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (gate, server) = gate_with(MockFacilitator::new(Arc::clone(&log)), "eip155:8453").await;

        // Tamper with the echoed amount.
        let built = server
            .build_payment_requirements(&gate.config, &t402::config::RequestContext::default())
            .unwrap();
        let mut tampered = built[0].clone();
        tampered.amount = "999".into();
        let payload = PaymentPayloadAny::V2(Box::new(v2::PaymentPayload {
            version: v2::V2,
            accepted: tampered,
            resource: None,
            extensions: None,
            payload: serde_json::json!({}),
        }));
        let (name, value) = encode_payment_payload(&payload).unwrap();
        let request = FakeRequest::new().with_header(&name, value);

        let ran = Arc::new(AtomicUsize::new(0));
        let response = gate.handle(&request, ok_handler(Arc::clone(&ran))).await;

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let required_header = response
            .headers()
            .get(PAYMENT_REQUIRED_HEADER)
            .unwrap()
            .to_str()
            .unwrap();
        let (decoded, _) = crate::headers::decode_payment_required(required_header).unwrap();
        let t402::proto::PaymentRequiredAny::V2(decoded) = decoded else {
            panic!("expected v2");
        };
        assert!(decoded.error.unwrap().contains("no_matching_requirement"));
        // Verify is never invoked.
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scenario_hook_abort_before_verify() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (gate, server) = gate_with(MockFacilitator::new(Arc::clone(&log)), "eip155:8453").await;
        server.set_hooks(PaymentHooks::new().on_before_verify(|_ctx| async move {
            Some(AbortResult::new("denylisted_payer"))
        }));

        let (name, value) = signed_header(&server, &gate.config);
        let request = FakeRequest::new().with_header(&name, value);
        let ran = Arc::new(AtomicUsize::new(0));

        let response = gate.handle(&request, ok_handler(Arc::clone(&ran))).await;

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        // Mechanism, handler, and settle all untouched.
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scenario_verify_failure_recovery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut facilitator = MockFacilitator::new(Arc::clone(&log));
        facilitator.verify_error = Some("rpc_timeout");
        let (gate, server) = gate_with(facilitator, "eip155:8453").await;
        server.set_hooks(PaymentHooks::new().on_verify_failure(|_ctx| async move {
            Some(RecoveredVerify {
                result: VerifyResponse::valid("0xFALLBACK"),
            })
        }));

        let (name, value) = signed_header(&server, &gate.config);
        let request = FakeRequest::new().with_header(&name, value);
        let ran = Arc::new(AtomicUsize::new(0));

        let response = gate.handle(&request, ok_handler(Arc::clone(&ran))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        // Settle still happens after the recovered verification.
        assert_eq!(*log.lock().unwrap(), vec!["verify", "settle"]);
    }

    #[tokio::test]
    async fn test_scenario_wildcard_network_routing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (gate, server) =
            gate_with(MockFacilitator::new(Arc::clone(&log)), "eip155:42161").await;

        let (name, value) = signed_header(&server, &gate.config);
        let request = FakeRequest::new().with_header(&name, value);
        let ran = Arc::new(AtomicUsize::new(0));

        let response = gate.handle(&request, ok_handler(Arc::clone(&ran))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*log.lock().unwrap(), vec!["verify", "settle"]);
    }

    #[tokio::test]
    async fn test_scenario_v1_interop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (gate, server) = gate_with(MockFacilitator::new(Arc::clone(&log)), "eip155:8453").await;

        let built = server
            .build_payment_requirements(&gate.config, &t402::config::RequestContext::default())
            .unwrap();
        let payload = PaymentPayloadAny::V1(v1::PaymentPayload {
            version: v1::V1,
            scheme: built[0].scheme.clone(),
            network: built[0].network.clone(),
            payload: serde_json::json!({"signature": "0xsig"}),
        });
        let (name, value) = encode_payment_payload(&payload).unwrap();
        assert_eq!(name, X_PAYMENT_HEADER);
        let request = FakeRequest::new().with_header(&name, value);

        let ran = Arc::new(AtomicUsize::new(0));
        let response = gate.handle(&request, ok_handler(Arc::clone(&ran))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_PAYMENT_RESPONSE_HEADER));
        assert!(!response.headers().contains_key(PAYMENT_RESPONSE_HEADER));
    }

    #[tokio::test]
    async fn test_settle_never_precedes_successful_verify() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut facilitator = MockFacilitator::new(Arc::clone(&log));
        facilitator.verify_error = Some("invalid_signature");
        let (gate, server) = gate_with(facilitator, "eip155:8453").await;

        let (name, value) = signed_header(&server, &gate.config);
        let request = FakeRequest::new().with_header(&name, value);
        let ran = Arc::new(AtomicUsize::new(0));

        let response = gate.handle(&request, ok_handler(Arc::clone(&ran))).await;

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(*log.lock().unwrap(), vec!["verify"]);
    }

    #[tokio::test]
    async fn test_settlement_failure_after_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut facilitator = MockFacilitator::new(Arc::clone(&log));
        facilitator.settle_error = Some("tx_reverted");
        let (gate, server) = gate_with(facilitator, "eip155:8453").await;

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        server.set_hooks(PaymentHooks::new().on_settle_failure(move |_ctx| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
            async move { None }
        }));

        let (name, value) = signed_header(&server, &gate.config);
        let request = FakeRequest::new().with_header(&name, value);
        let ran = Arc::new(AtomicUsize::new(0));

        let response = gate.handle(&request, ok_handler(Arc::clone(&ran))).await;

        // The handler already ran; the failure surfaces as 402 and through
        // the settle-failure hook.
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(response.body().contains("Settlement failed"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_error_skips_settlement() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (gate, server) = gate_with(MockFacilitator::new(Arc::clone(&log)), "eip155:8453").await;

        let (name, value) = signed_header(&server, &gate.config);
        let request = FakeRequest::new().with_header(&name, value);

        let response = gate
            .handle(&request, || async {
                Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(String::new())
                    .unwrap()
            })
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(*log.lock().unwrap(), vec!["verify"]);
    }
}
