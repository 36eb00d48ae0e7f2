//! Lifecycle hooks for payment operations.
//!
//! Three hook points wrap every operation:
//!
//! - **Before hooks** — run first; the first one that aborts terminates the
//!   operation with its reason before the mechanism is called.
//! - **After hooks** — purely observational; errors they return are logged
//!   and swallowed, never changing the operation's outcome.
//! - **Failure hooks** — run on error; the first one that returns a
//!   recovered result short-circuits the rest and its result becomes the
//!   operation's return value.
//!
//! Hooks fire in registration order and receive immutable context values
//! carrying both the typed view and, where available, the raw JSON bytes of
//! the message, so extensions can read fields the core types do not model.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::proto::{
    PaymentPayloadAny, PaymentRequiredAny, PaymentRequirementsAny, SettleResponse, VerifyResponse,
};

/// Boxed future type alias for dyn-compatible async hooks and mechanisms.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Return from a before-hook to abort the operation.
#[derive(Debug, Clone)]
pub struct AbortResult {
    /// Machine-readable reason for aborting.
    pub reason: String,
}

impl AbortResult {
    /// Creates a new abort result.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Return from a create-failure hook to recover with a payload.
#[derive(Debug, Clone)]
pub struct RecoveredPayload {
    /// The recovered payment payload.
    pub payload: PaymentPayloadAny,
}

/// Return from a verify-failure hook to recover with a result.
#[derive(Debug, Clone)]
pub struct RecoveredVerify {
    /// The recovered verify response.
    pub result: VerifyResponse,
}

/// Return from a settle-failure hook to recover with a result.
#[derive(Debug, Clone)]
pub struct RecoveredSettle {
    /// The recovered settle response.
    pub result: SettleResponse,
}

/// Context for payment creation hooks (payer side).
#[derive(Debug, Clone)]
pub struct CreateContext {
    /// The 402 envelope the payment answers.
    pub payment_required: PaymentRequiredAny,
    /// The selected payment requirements.
    pub selected: PaymentRequirementsAny,
    /// Raw bytes of the 402 message, if the transport preserved them.
    pub raw: Option<Vec<u8>>,
}

/// Context passed to after-create hooks.
#[derive(Debug, Clone)]
pub struct CreatedContext {
    /// The creation context.
    pub ctx: CreateContext,
    /// The created payment payload.
    pub payload: PaymentPayloadAny,
}

/// Context passed to create-failure hooks.
#[derive(Debug, Clone)]
pub struct CreateFailureContext {
    /// The creation context.
    pub ctx: CreateContext,
    /// Description of the error that caused the failure.
    pub error: String,
}

/// Context for verify hooks.
#[derive(Debug, Clone)]
pub struct VerifyContext {
    /// The payment payload being verified.
    pub payload: PaymentPayloadAny,
    /// The requirements being verified against.
    pub requirements: PaymentRequirementsAny,
    /// Raw payload bytes (escape hatch for extensions).
    pub payload_bytes: Option<Vec<u8>>,
    /// Raw requirements bytes (escape hatch for extensions).
    pub requirements_bytes: Option<Vec<u8>>,
}

/// Context passed to after-verify hooks.
#[derive(Debug, Clone)]
pub struct VerifyResultContext {
    /// The verify context.
    pub ctx: VerifyContext,
    /// The verification result.
    pub result: VerifyResponse,
}

/// Context passed to verify-failure hooks.
#[derive(Debug, Clone)]
pub struct VerifyFailureContext {
    /// The verify context.
    pub ctx: VerifyContext,
    /// Description of the error.
    pub error: String,
}

/// Context for settle hooks.
#[derive(Debug, Clone)]
pub struct SettleContext {
    /// The payment payload being settled.
    pub payload: PaymentPayloadAny,
    /// The requirements for settlement.
    pub requirements: PaymentRequirementsAny,
    /// Raw payload bytes (escape hatch for extensions).
    pub payload_bytes: Option<Vec<u8>>,
    /// Raw requirements bytes (escape hatch for extensions).
    pub requirements_bytes: Option<Vec<u8>>,
}

/// Context passed to after-settle hooks.
#[derive(Debug, Clone)]
pub struct SettleResultContext {
    /// The settle context.
    pub ctx: SettleContext,
    /// The settlement result.
    pub result: SettleResponse,
}

/// Context passed to settle-failure hooks.
#[derive(Debug, Clone)]
pub struct SettleFailureContext {
    /// The settle context.
    pub ctx: SettleContext,
    /// Description of the error.
    pub error: String,
}

/// Hook called before payload creation. Return `Some` to abort.
pub type BeforeCreateHookFn =
    dyn Fn(CreateContext) -> BoxFuture<'static, Option<AbortResult>> + Send + Sync;

/// Hook called after successful payload creation. Errors are logged and swallowed.
pub type AfterCreateHookFn =
    dyn Fn(CreatedContext) -> BoxFuture<'static, Result<(), String>> + Send + Sync;

/// Hook called when payload creation fails. Return `Some` to recover.
pub type OnCreateFailureHookFn =
    dyn Fn(CreateFailureContext) -> BoxFuture<'static, Option<RecoveredPayload>> + Send + Sync;

/// Hook called before payment verification. Return `Some` to abort.
pub type BeforeVerifyHookFn =
    dyn Fn(VerifyContext) -> BoxFuture<'static, Option<AbortResult>> + Send + Sync;

/// Hook called after successful verification. Errors are logged and swallowed.
pub type AfterVerifyHookFn =
    dyn Fn(VerifyResultContext) -> BoxFuture<'static, Result<(), String>> + Send + Sync;

/// Hook called when verification fails. Return `Some` to recover.
pub type OnVerifyFailureHookFn =
    dyn Fn(VerifyFailureContext) -> BoxFuture<'static, Option<RecoveredVerify>> + Send + Sync;

/// Hook called before payment settlement. Return `Some` to abort.
pub type BeforeSettleHookFn =
    dyn Fn(SettleContext) -> BoxFuture<'static, Option<AbortResult>> + Send + Sync;

/// Hook called after successful settlement. Errors are logged and swallowed.
pub type AfterSettleHookFn =
    dyn Fn(SettleResultContext) -> BoxFuture<'static, Result<(), String>> + Send + Sync;

/// Hook called when settlement fails. Return `Some` to recover.
pub type OnSettleFailureHookFn =
    dyn Fn(SettleFailureContext) -> BoxFuture<'static, Option<RecoveredSettle>> + Send + Sync;

/// Collection of verify and settle lifecycle hooks.
///
/// Shared by the resource server and facilitator engines. All hooks are
/// optional; multiple hooks of the same type execute in registration order.
#[derive(Clone, Default)]
pub struct PaymentHooks {
    before_verify: Vec<Arc<BeforeVerifyHookFn>>,
    after_verify: Vec<Arc<AfterVerifyHookFn>>,
    on_verify_failure: Vec<Arc<OnVerifyFailureHookFn>>,
    before_settle: Vec<Arc<BeforeSettleHookFn>>,
    after_settle: Vec<Arc<AfterSettleHookFn>>,
    on_settle_failure: Vec<Arc<OnSettleFailureHookFn>>,
}

impl std::fmt::Debug for PaymentHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentHooks")
            .field("before_verify", &self.before_verify.len())
            .field("after_verify", &self.after_verify.len())
            .field("on_verify_failure", &self.on_verify_failure.len())
            .field("before_settle", &self.before_settle.len())
            .field("after_settle", &self.after_settle.len())
            .field("on_settle_failure", &self.on_settle_failure.len())
            .finish()
    }
}

impl PaymentHooks {
    /// Creates an empty hook collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before_verify.is_empty()
            && self.after_verify.is_empty()
            && self.on_verify_failure.is_empty()
            && self.before_settle.is_empty()
            && self.after_settle.is_empty()
            && self.on_settle_failure.is_empty()
    }

    /// Registers a hook to execute before payment verification.
    #[must_use]
    pub fn on_before_verify<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(VerifyContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<AbortResult>> + Send + 'static,
    {
        self.before_verify
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to execute after successful payment verification.
    #[must_use]
    pub fn on_after_verify<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(VerifyResultContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.after_verify
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to execute when payment verification fails.
    #[must_use]
    pub fn on_verify_failure<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(VerifyFailureContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<RecoveredVerify>> + Send + 'static,
    {
        self.on_verify_failure
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to execute before payment settlement.
    #[must_use]
    pub fn on_before_settle<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(SettleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<AbortResult>> + Send + 'static,
    {
        self.before_settle
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to execute after successful payment settlement.
    #[must_use]
    pub fn on_after_settle<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(SettleResultContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.after_settle
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to execute when payment settlement fails.
    #[must_use]
    pub fn on_settle_failure<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(SettleFailureContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<RecoveredSettle>> + Send + 'static,
    {
        self.on_settle_failure
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Runs the before-verify hooks in order; the first abort wins.
    pub(crate) async fn run_before_verify(&self, ctx: &VerifyContext) -> Option<AbortResult> {
        for hook in &self.before_verify {
            if let Some(abort) = hook(ctx.clone()).await {
                return Some(abort);
            }
        }
        None
    }

    /// Runs the after-verify hooks; errors are logged and swallowed.
    pub(crate) async fn run_after_verify(&self, ctx: &VerifyResultContext) {
        for hook in &self.after_verify {
            if let Err(error) = hook(ctx.clone()).await {
                tracing::warn!(error = %error, "after-verify hook failed");
            }
        }
    }

    /// Runs the verify-failure hooks; the first recovery short-circuits.
    pub(crate) async fn run_verify_failure(
        &self,
        ctx: &VerifyFailureContext,
    ) -> Option<RecoveredVerify> {
        for hook in &self.on_verify_failure {
            if let Some(recovered) = hook(ctx.clone()).await {
                return Some(recovered);
            }
        }
        None
    }

    /// Runs the before-settle hooks in order; the first abort wins.
    pub(crate) async fn run_before_settle(&self, ctx: &SettleContext) -> Option<AbortResult> {
        for hook in &self.before_settle {
            if let Some(abort) = hook(ctx.clone()).await {
                return Some(abort);
            }
        }
        None
    }

    /// Runs the after-settle hooks; errors are logged and swallowed.
    pub(crate) async fn run_after_settle(&self, ctx: &SettleResultContext) {
        for hook in &self.after_settle {
            if let Err(error) = hook(ctx.clone()).await {
                tracing::warn!(error = %error, "after-settle hook failed");
            }
        }
    }

    /// Runs the settle-failure hooks; the first recovery short-circuits.
    pub(crate) async fn run_settle_failure(
        &self,
        ctx: &SettleFailureContext,
    ) -> Option<RecoveredSettle> {
        for hook in &self.on_settle_failure {
            if let Some(recovered) = hook(ctx.clone()).await {
                return Some(recovered);
            }
        }
        None
    }
}

/// Collection of payload creation lifecycle hooks (payer side).
#[derive(Clone, Default)]
pub struct CreateHooks {
    before_create: Vec<Arc<BeforeCreateHookFn>>,
    after_create: Vec<Arc<AfterCreateHookFn>>,
    on_create_failure: Vec<Arc<OnCreateFailureHookFn>>,
}

impl std::fmt::Debug for CreateHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateHooks")
            .field("before_create", &self.before_create.len())
            .field("after_create", &self.after_create.len())
            .field("on_create_failure", &self.on_create_failure.len())
            .finish()
    }
}

impl CreateHooks {
    /// Creates an empty hook collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook to execute before payload creation.
    #[must_use]
    pub fn on_before_create<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(CreateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<AbortResult>> + Send + 'static,
    {
        self.before_create
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to execute after successful payload creation.
    #[must_use]
    pub fn on_after_create<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(CreatedContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.after_create
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to execute when payload creation fails.
    #[must_use]
    pub fn on_create_failure<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(CreateFailureContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<RecoveredPayload>> + Send + 'static,
    {
        self.on_create_failure
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    pub(crate) async fn run_before_create(&self, ctx: &CreateContext) -> Option<AbortResult> {
        for hook in &self.before_create {
            if let Some(abort) = hook(ctx.clone()).await {
                return Some(abort);
            }
        }
        None
    }

    pub(crate) async fn run_after_create(&self, ctx: &CreatedContext) {
        for hook in &self.after_create {
            if let Err(error) = hook(ctx.clone()).await {
                tracing::warn!(error = %error, "after-create hook failed");
            }
        }
    }

    pub(crate) async fn run_create_failure(
        &self,
        ctx: &CreateFailureContext,
    ) -> Option<RecoveredPayload> {
        for hook in &self.on_create_failure {
            if let Some(recovered) = hook(ctx.clone()).await {
                return Some(recovered);
            }
        }
        None
    }
}
