//! Axum route handlers for the facilitator service.
//!
//! REST surface consumed by resource servers:
//!
//! - `GET /supported` — supported payment kinds, extensions, and signers
//! - `POST /verify` — verify a payment payload against requirements
//! - `POST /settle` — settle a verified payment on-chain
//! - `GET /health` — liveness probe
//!
//! Request bodies keep their payload and requirements as raw JSON so the
//! engine re-detects the version from the bytes and hooks receive the
//! untouched messages.

use std::sync::Arc;

use axum::extract::State;
use axum::{Json, Router, routing};

use t402::T402Facilitator;
use t402::facilitator::FacilitatorError;
use t402::proto::{
    SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse,
    parse_payment_payload,
};

use crate::error::ServiceError;

/// Shared application state for the facilitator service.
pub type FacilitatorState = Arc<T402Facilitator>;

/// `GET /supported` — returns the supported payment kinds.
pub async fn get_supported(State(facilitator): State<FacilitatorState>) -> Json<SupportedResponse> {
    Json(facilitator.supported())
}

/// `POST /verify` — verifies a payment payload.
///
/// Invalid payments are not HTTP failures: they come back as
/// `{"isValid": false, ...}`. Only malformed requests earn a 400.
///
/// # Errors
///
/// Returns [`ServiceError`] for protocol-level faults.
pub async fn post_verify(
    State(facilitator): State<FacilitatorState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ServiceError> {
    let payload = body.payment_payload.get().as_bytes();
    let requirements = body.payment_requirements.get().as_bytes();

    match facilitator.verify(payload, requirements).await {
        Ok(response) => Ok(Json(response)),
        Err(FacilitatorError::Verify(err)) => Ok(Json(VerifyResponse::Invalid {
            reason: err.reason,
            message: err.message,
            payer: err.payer,
        })),
        Err(FacilitatorError::Protocol(err)) => Err(err.into()),
        Err(FacilitatorError::Settle(err)) => {
            // Settle errors cannot come out of verify; treat as invalid.
            Ok(Json(VerifyResponse::invalid(err.payer, err.reason)))
        }
        Err(err) => {
            tracing::error!(error = %err, "unexpected verify failure");
            Ok(Json(VerifyResponse::invalid(None, "unexpected_error".into())))
        }
    }
}

/// `POST /settle` — settles a verified payment on-chain.
///
/// Settlement failures come back as `{"success": false, ...}`; only
/// malformed requests earn a 400.
///
/// # Errors
///
/// Returns [`ServiceError`] for protocol-level faults.
pub async fn post_settle(
    State(facilitator): State<FacilitatorState>,
    Json(body): Json<SettleRequest>,
) -> Result<Json<SettleResponse>, ServiceError> {
    let payload_bytes = body.payment_payload.get().as_bytes();
    let requirements = body.payment_requirements.get().as_bytes();

    match facilitator.settle(payload_bytes, requirements).await {
        Ok(response) => Ok(Json(response)),
        Err(FacilitatorError::Settle(err)) => {
            let network = match err.network {
                Some(network) => network,
                // The payload parsed before dispatch, so this succeeds.
                None => parse_payment_payload(payload_bytes)
                    .map(|p| p.network().clone())
                    .map_err(ServiceError::from)?,
            };
            Ok(Json(SettleResponse::Error {
                reason: err.reason,
                message: err.message,
                transaction: err.transaction,
                network,
            }))
        }
        Err(FacilitatorError::Protocol(err)) => Err(err.into()),
        Err(FacilitatorError::Verify(err)) => {
            let network = match err.network {
                Some(network) => network,
                None => parse_payment_payload(payload_bytes)
                    .map(|p| p.network().clone())
                    .map_err(ServiceError::from)?,
            };
            Ok(Json(SettleResponse::Error {
                reason: err.reason,
                message: err.message,
                transaction: None,
                network,
            }))
        }
        Err(err) => {
            tracing::error!(error = %err, "unexpected settle failure");
            let network = parse_payment_payload(payload_bytes)
                .map(|p| p.network().clone())
                .map_err(ServiceError::from)?;
            Ok(Json(SettleResponse::Error {
                reason: "unexpected_error".into(),
                message: Some(err.to_string()),
                transaction: None,
                network,
            }))
        }
    }
}

/// `GET /health` — liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Creates the facilitator [`Router`] with all endpoints.
pub fn facilitator_router(state: FacilitatorState) -> Router {
    Router::new()
        .route("/supported", routing::get(get_supported))
        .route("/verify", routing::post(post_verify))
        .route("/settle", routing::post(post_settle))
        .route("/health", routing::get(health))
        .with_state(state)
}
