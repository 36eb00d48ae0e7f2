//! Framework-neutral response building.
//!
//! Builds 402 Payment Required responses in both wire formats and attaches
//! settlement results to successful responses. V2 carries the envelope in
//! the `PAYMENT-REQUIRED` header with a negotiable body; V1 carries it as
//! the JSON response body.

use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response, StatusCode};

use t402::config::ResourceConfig;
use t402::proto::{PaymentPayloadAny, SettleResponse, v1, v2};

use crate::constants::{
    PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER, X_PAYMENT_RESPONSE_HEADER,
};
use crate::error::HttpError;
use crate::headers::{
    encode_payment_required, encode_payment_required_v1_body, encode_payment_response,
};

/// Builds a V2 402 response.
///
/// The envelope travels in the `PAYMENT-REQUIRED` header. The body is the
/// route's paywall HTML when the requester is a browser, otherwise the
/// configured unpaid JSON preview, otherwise empty.
///
/// # Errors
///
/// Returns [`HttpError`] if encoding fails.
pub fn payment_required_response(
    required: &v2::PaymentRequired,
    config: &ResourceConfig,
    wants_paywall: bool,
) -> Result<Response<String>, HttpError> {
    let header = encode_payment_required(required)?;
    let header_value =
        HeaderValue::from_str(&header).map_err(|_| HttpError::InvalidHeaderValue)?;

    let mut builder = Response::builder()
        .status(StatusCode::PAYMENT_REQUIRED)
        .header(PAYMENT_REQUIRED_HEADER, header_value);

    let body = if wants_paywall && config.paywall_html.is_some() {
        builder = builder.header(CONTENT_TYPE, "text/html; charset=utf-8");
        config.paywall_html.clone().unwrap_or_default()
    } else if let Some(preview) = &config.unpaid_body {
        builder = builder.header(CONTENT_TYPE, "application/json");
        serde_json::to_string(preview)?
    } else {
        String::new()
    };

    builder.body(body).map_err(|_| HttpError::InvalidHeaderValue)
}

/// Builds a V1 402 response with the envelope as the JSON body.
///
/// # Errors
///
/// Returns [`HttpError`] if encoding fails.
pub fn payment_required_response_v1(
    required: &v1::PaymentRequired,
) -> Result<Response<String>, HttpError> {
    let body = encode_payment_required_v1_body(required)?;
    Response::builder()
        .status(StatusCode::PAYMENT_REQUIRED)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .map_err(|_| HttpError::InvalidHeaderValue)
}

/// Builds a plain JSON error response.
///
/// Used for internal faults (500) where no payment envelope applies.
#[must_use]
pub fn error_response(status: StatusCode, message: &str) -> Response<String> {
    let body = serde_json::json!({ "error": message }).to_string();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap_or_default()
}

/// Attaches a settlement result to a response in the header matching the
/// payload's protocol version: `PAYMENT-RESPONSE` for V2, the legacy
/// `X-PAYMENT-RESPONSE` for V1.
///
/// # Errors
///
/// Returns [`HttpError`] if encoding fails.
pub fn attach_settle_header(
    response: &mut Response<String>,
    payload: &PaymentPayloadAny,
    settlement: &SettleResponse,
) -> Result<(), HttpError> {
    let name = match payload {
        PaymentPayloadAny::V1(_) => X_PAYMENT_RESPONSE_HEADER,
        PaymentPayloadAny::V2(_) => PAYMENT_RESPONSE_HEADER,
        _ => unreachable!("PaymentPayloadAny is non_exhaustive but only V1/V2 exist"),
    };
    let encoded = encode_payment_response(settlement)?;
    let value = HeaderValue::from_str(&encoded).map_err(|_| HttpError::InvalidHeaderValue)?;
    response.headers_mut().insert(name, value);
    Ok(())
}
