//! Payer-side engine.
//!
//! [`T402Client`] answers a 402 response: it filters the offered payment
//! requirements down to those a registered mechanism can satisfy, applies
//! payment policies, lets a selector pick one, and asks the mechanism to
//! produce the signed payload. V2 payloads echo the accepted requirements;
//! V1 payloads carry only their top-level scheme and network.
//!
//! Selection is deterministic given the same inputs and selector; selectors
//! must be pure functions of the candidate list.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures_util::FutureExt;

use crate::error::ClientError;
use crate::hooks::{CreateContext, CreateFailureContext, CreateHooks, CreatedContext};
use crate::proto::{
    PaymentPayloadAny, PaymentRequiredAny, PaymentRequirementsAny, v1, v2,
};
use crate::scheme::{SchemeClient, SchemeRegistry};

/// Policy function that filters and reorders candidate requirements.
///
/// Policies run in registration order; each receives the previous policy's
/// output. A policy that returns an empty list fails payload creation with
/// [`ClientError::AllFilteredOut`].
pub type PaymentPolicy =
    Arc<dyn Fn(Vec<PaymentRequirementsAny>) -> Vec<PaymentRequirementsAny> + Send + Sync>;

/// Selector function that picks the final requirement from the filtered list.
///
/// Returns an index into the list. Must be pure: the same list always
/// selects the same index.
pub type PaymentSelector = Arc<dyn Fn(&[PaymentRequirementsAny]) -> usize + Send + Sync>;

/// Creates a policy that prefers a specific network.
///
/// Requirements matching the given network are placed first; others keep
/// their relative order.
#[must_use]
pub fn prefer_network(network: crate::network::Network) -> PaymentPolicy {
    Arc::new(move |requirements| {
        let (mut preferred, others): (Vec<_>, Vec<_>) = requirements
            .into_iter()
            .partition(|r| r.view().network() == &network);
        preferred.extend(others);
        preferred
    })
}

/// Creates a policy that prefers a specific scheme.
#[must_use]
pub fn prefer_scheme(scheme: impl Into<String>) -> PaymentPolicy {
    let scheme = scheme.into();
    Arc::new(move |requirements| {
        let (mut preferred, others): (Vec<_>, Vec<_>) = requirements
            .into_iter()
            .partition(|r| r.view().scheme() == scheme);
        preferred.extend(others);
        preferred
    })
}

/// Creates a policy that filters by maximum atomic amount.
///
/// Requirements whose amount does not parse, or exceeds `max_value`, are
/// dropped.
#[must_use]
pub fn max_amount(max_value: u128) -> PaymentPolicy {
    Arc::new(move |requirements| {
        requirements
            .into_iter()
            .filter(|r| {
                r.view()
                    .amount()
                    .parse::<u128>()
                    .is_ok_and(|a| a <= max_value)
            })
            .collect()
    })
}

/// Default selector: picks the first candidate.
fn first_match(_requirements: &[PaymentRequirementsAny]) -> usize {
    0
}

/// Payer-side engine with mechanism registration, policy filtering, and
/// selection.
pub struct T402Client {
    schemes: SchemeRegistry<dyn SchemeClient>,
    policies: RwLock<Vec<PaymentPolicy>>,
    selector: RwLock<PaymentSelector>,
    hooks: RwLock<CreateHooks>,
}

impl std::fmt::Debug for T402Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("T402Client")
            .field("schemes", &self.schemes)
            .field(
                "policies",
                &self.policies.read().map(|p| p.len()).unwrap_or(0),
            )
            .finish_non_exhaustive()
    }
}

impl Default for T402Client {
    fn default() -> Self {
        Self::new()
    }
}

impl T402Client {
    /// Creates a new client with the first-match selector and no policies.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schemes: SchemeRegistry::new(),
            policies: RwLock::new(Vec::new()),
            selector: RwLock::new(Arc::new(first_match)),
            hooks: RwLock::new(CreateHooks::new()),
        }
    }

    /// Registers a scheme mechanism for a set of networks.
    ///
    /// A network with reference `*` (e.g. `eip155:*`) registers the
    /// mechanism for the entire namespace.
    pub fn register(
        &self,
        networks: Vec<crate::network::Network>,
        mechanism: Arc<dyn SchemeClient>,
    ) -> &Self {
        let scheme = mechanism.scheme().to_owned();
        self.schemes.register(scheme, networks, mechanism);
        self
    }

    /// Adds a requirement filter policy.
    pub fn register_policy(&self, policy: PaymentPolicy) -> &Self {
        self.policies
            .write()
            .expect("client policies lock poisoned")
            .push(policy);
        self
    }

    /// Replaces the payment selector.
    pub fn set_selector(&self, selector: PaymentSelector) -> &Self {
        *self.selector.write().expect("client selector lock poisoned") = selector;
        self
    }

    /// Replaces the payload creation hooks.
    pub fn set_hooks(&self, hooks: CreateHooks) -> &Self {
        *self.hooks.write().expect("client hooks lock poisoned") = hooks;
        self
    }

    /// Returns `true` if a registered mechanism can satisfy the requirement.
    #[must_use]
    pub fn supports(&self, requirements: &PaymentRequirementsAny) -> bool {
        let view = requirements.view();
        self.schemes.supports(view.scheme(), view.network())
    }

    /// Selects one requirement from the offered set.
    ///
    /// Filters to supported requirements, applies policies in registration
    /// order, then invokes the selector.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnsupportedScheme`] if no offered requirement
    /// is supported, [`ClientError::AllFilteredOut`] if policies empty the
    /// set, or [`ClientError::InvalidSelection`] if the selector returns an
    /// out-of-range index.
    pub fn select_requirements(
        &self,
        payment_required: &PaymentRequiredAny,
    ) -> Result<PaymentRequirementsAny, ClientError> {
        let supported: Vec<PaymentRequirementsAny> = payment_required
            .accepts()
            .into_iter()
            .filter(|r| self.supports(r))
            .collect();

        if supported.is_empty() {
            return Err(ClientError::UnsupportedScheme);
        }

        let policies = self
            .policies
            .read()
            .expect("client policies lock poisoned")
            .clone();
        let mut filtered = supported;
        for policy in &policies {
            filtered = policy(filtered);
            if filtered.is_empty() {
                return Err(ClientError::AllFilteredOut);
            }
        }

        let selector = Arc::clone(&*self.selector.read().expect("client selector lock poisoned"));
        let idx = selector(&filtered);
        filtered
            .into_iter()
            .nth(idx)
            .ok_or(ClientError::InvalidSelection(idx))
    }

    /// Produces a signed payment payload answering a 402 response.
    ///
    /// Hooks fire in order: before-create (may abort), mechanism call,
    /// after-create; on mechanism failure the create-failure hooks may
    /// supply a recovered payload.
    ///
    /// `raw` optionally carries the raw bytes of the 402 message for the
    /// hook escape hatch.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if selection fails, a hook aborts, or the
    /// mechanism fails without recovery.
    pub async fn create_payment(
        &self,
        payment_required: &PaymentRequiredAny,
        raw: Option<&[u8]>,
    ) -> Result<PaymentPayloadAny, ClientError> {
        let selected = self.select_requirements(payment_required)?;
        let view = selected.view();

        let mechanism = self
            .schemes
            .lookup(view.scheme(), view.network())
            .ok_or(ClientError::UnsupportedScheme)?;

        let hooks = self.hooks.read().expect("client hooks lock poisoned").clone();
        let ctx = CreateContext {
            payment_required: payment_required.clone(),
            selected: selected.clone(),
            raw: raw.map(<[u8]>::to_vec),
        };

        if let Some(abort) = hooks.run_before_create(&ctx).await {
            return Err(ClientError::Aborted(abort.reason));
        }

        let created = AssertUnwindSafe(mechanism.create_payment_payload(&selected))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(crate::panic_message(&panic).into()));

        match created {
            Ok(inner) => {
                let payload = wrap_payload(payment_required, selected, inner);
                let created_ctx = CreatedContext {
                    ctx,
                    payload: payload.clone(),
                };
                hooks.run_after_create(&created_ctx).await;
                Ok(payload)
            }
            Err(err) => {
                let failure_ctx = CreateFailureContext {
                    ctx,
                    error: err.to_string(),
                };
                if let Some(recovered) = hooks.run_create_failure(&failure_ctx).await {
                    return Ok(recovered.payload);
                }
                Err(ClientError::MechanismFailure(err))
            }
        }
    }
}

/// Wraps a scheme-specific inner payload into the versioned envelope.
///
/// V2 echoes the accepted requirements and carries the resource info and
/// extensions from the 402 envelope; V1 carries only scheme and network.
fn wrap_payload(
    payment_required: &PaymentRequiredAny,
    selected: PaymentRequirementsAny,
    inner: serde_json::Value,
) -> PaymentPayloadAny {
    match selected {
        PaymentRequirementsAny::V2(accepted) => {
            let (resource, extensions) = match payment_required {
                PaymentRequiredAny::V2(r) => (r.resource.clone(), r.extensions.clone()),
                PaymentRequiredAny::V1(_) => (None, None),
            };
            PaymentPayloadAny::V2(Box::new(v2::PaymentPayload {
                version: v2::V2,
                accepted,
                resource,
                extensions,
                payload: inner,
            }))
        }
        PaymentRequirementsAny::V1(requirements) => PaymentPayloadAny::V1(v1::PaymentPayload {
            version: v1::V1,
            scheme: requirements.scheme,
            network: requirements.network,
            payload: inner,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::hooks::{AbortResult, BoxFuture, RecoveredPayload};
    use crate::network::Network;
    use crate::proto::RequirementView;
    use crate::scheme::SchemeId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSigner {
        scheme: &'static str,
        fail: bool,
        panic: bool,
        calls: Arc<AtomicUsize>,
    }

    impl FakeSigner {
        fn new(scheme: &'static str) -> Self {
            Self {
                scheme,
                fail: false,
                panic: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl SchemeId for FakeSigner {
        fn scheme(&self) -> &str {
            self.scheme
        }
        fn namespace(&self) -> &str {
            "eip155"
        }
    }

    impl SchemeClient for FakeSigner {
        fn create_payment_payload<'a>(
            &'a self,
            _requirements: &'a PaymentRequirementsAny,
        ) -> BoxFuture<'a, Result<serde_json::Value, BoxError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                assert!(!self.panic, "signer exploded");
                if self.fail {
                    return Err("signer unavailable".into());
                }
                Ok(serde_json::json!({"signature": "0xdead", "from": "0xPAYER"}))
            })
        }
    }

    fn requirements(amount: &str) -> v2::PaymentRequirements {
        v2::PaymentRequirements {
            scheme: "exact".into(),
            network: Network::new("eip155", "8453"),
            asset: "USDC".into(),
            amount: amount.into(),
            pay_to: "0xABC".into(),
            max_timeout_seconds: 300,
            extra: None,
        }
    }

    fn payment_required(accepts: Vec<v2::PaymentRequirements>) -> PaymentRequiredAny {
        PaymentRequiredAny::V2(v2::PaymentRequired {
            version: v2::V2,
            resource: None,
            accepts,
            extensions: None,
            error: None,
        })
    }

    fn client_with_signer(signer: FakeSigner) -> T402Client {
        let client = T402Client::new();
        client.register(vec![Network::new("eip155", "*")], Arc::new(signer));
        client
    }

    #[tokio::test]
    async fn test_create_payment_v2_echoes_accepted() {
        let client = client_with_signer(FakeSigner::new("exact"));
        let offered = payment_required(vec![requirements("1000")]);

        let payload = client.create_payment(&offered, None).await.unwrap();
        let PaymentPayloadAny::V2(payload) = payload else {
            panic!("expected v2 payload");
        };
        assert_eq!(payload.accepted, requirements("1000"));
        assert_eq!(payload.payload["signature"], "0xdead");
    }

    #[tokio::test]
    async fn test_no_mechanism_is_unsupported() {
        let client = T402Client::new();
        let offered = payment_required(vec![requirements("1000")]);
        let err = client.create_payment(&offered, None).await.unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedScheme));
    }

    #[tokio::test]
    async fn test_policy_filtering_all_out() {
        let client = client_with_signer(FakeSigner::new("exact"));
        client.register_policy(max_amount(10));
        let offered = payment_required(vec![requirements("1000")]);
        let err = client.create_payment(&offered, None).await.unwrap_err();
        assert!(matches!(err, ClientError::AllFilteredOut));
    }

    #[tokio::test]
    async fn test_selector_is_deterministic() {
        let client = client_with_signer(FakeSigner::new("exact"));
        client.set_selector(Arc::new(|list| list.len() - 1));
        let offered = payment_required(vec![requirements("1000"), requirements("2000")]);

        for _ in 0..3 {
            let selected = client.select_requirements(&offered).unwrap();
            assert_eq!(selected.view().amount(), "2000");
        }
    }

    #[tokio::test]
    async fn test_before_create_abort() {
        let signer = FakeSigner::new("exact");
        let calls = Arc::clone(&signer.calls);
        let client = client_with_signer(signer);
        client.set_hooks(CreateHooks::new().on_before_create(|_ctx| async move {
            Some(AbortResult::new("payment disabled"))
        }));

        let offered = payment_required(vec![requirements("1000")]);
        let err = client.create_payment(&offered, None).await.unwrap_err();
        assert!(matches!(err, ClientError::Aborted(reason) if reason == "payment disabled"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_failure_recovery() {
        let mut signer = FakeSigner::new("exact");
        signer.fail = true;
        let client = client_with_signer(signer);

        let recovered = PaymentPayloadAny::V1(v1::PaymentPayload {
            version: v1::V1,
            scheme: "exact".into(),
            network: Network::new("eip155", "8453"),
            payload: serde_json::json!({"recovered": true}),
        });
        let recovered_clone = recovered.clone();
        client.set_hooks(CreateHooks::new().on_create_failure(move |_ctx| {
            let payload = recovered_clone.clone();
            async move {
                Some(RecoveredPayload { payload })
            }
        }));

        let offered = payment_required(vec![requirements("1000")]);
        let payload = client.create_payment(&offered, None).await.unwrap();
        assert_eq!(payload.inner_payload()["recovered"], true);
    }

    #[tokio::test]
    async fn test_mechanism_panic_maps_to_failure() {
        let mut signer = FakeSigner::new("exact");
        signer.panic = true;
        let client = client_with_signer(signer);

        let offered = payment_required(vec![requirements("1000")]);
        let err = client.create_payment(&offered, None).await.unwrap_err();
        let ClientError::MechanismFailure(inner) = err else {
            panic!("expected mechanism failure");
        };
        assert!(inner.to_string().contains("panicked"));
    }

    #[tokio::test]
    async fn test_after_create_error_is_swallowed() {
        let client = client_with_signer(FakeSigner::new("exact"));
        client.set_hooks(
            CreateHooks::new()
                .on_after_create(|_ctx| async move { Err("observer blew up".to_owned()) }),
        );

        let offered = payment_required(vec![requirements("1000")]);
        // Same outcome as the no-throw case.
        let payload = client.create_payment(&offered, None).await.unwrap();
        assert_eq!(payload.inner_payload()["signature"], "0xdead");
    }
}
