//! Client-side 402 handling for `reqwest`.
//!
//! [`PaymentMiddleware`] watches responses for 402 Payment Required,
//! produces a payment through the payer engine, and retries the request
//! with the appropriate payment header. Retry counts are tracked per
//! request in a sharded ledger so concurrent requests never contend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use http::{Extensions, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;

use t402::T402Client;
use t402::error::ClientError;
use t402::proto::PaymentRequiredAny;

use crate::constants::PAYMENT_REQUIRED_HEADER;
use crate::error::HttpError;
use crate::headers::{decode_payment_required, encode_payment_payload};

/// Errors from the client-side payment retry shim.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RetryError {
    /// The 402 response carried no parseable payment requirements.
    #[error("could not parse payment requirements from 402 response")]
    UnparseableResponse,

    /// The payer engine could not produce a payment.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Header encoding failed.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The request body is not cloneable, so it cannot be retried.
    #[error("request cannot be cloned for payment retry")]
    RequestNotCloneable,
}

/// Per-request retry counters, sharded by request identifier.
///
/// Identifiers are allocated per middleware invocation; the map shards by
/// identifier so concurrent requests never contend on one counter.
#[derive(Debug, Default)]
pub struct RetryLedger {
    attempts: DashMap<u64, u32>,
    next_id: AtomicU64,
}

impl RetryLedger {
    /// Allocates a fresh request identifier with a zeroed counter.
    pub fn begin(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.attempts.insert(id, 0);
        id
    }

    /// Records one payment attempt for the request; returns the new count.
    pub fn note_attempt(&self, id: u64) -> u32 {
        let mut entry = self.attempts.entry(id).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Drops the request's counter.
    pub fn finish(&self, id: u64) {
        self.attempts.remove(&id);
    }
}

/// Parses a 402 response into a version-tagged envelope plus the envelope's
/// JSON bytes.
///
/// Tries the V2 `PAYMENT-REQUIRED` header first, then falls back to the V1
/// JSON body. Consumes the response.
pub async fn parse_payment_required_response(
    response: Response,
) -> Option<(PaymentRequiredAny, Vec<u8>)> {
    if let Some(header) = response.headers().get(PAYMENT_REQUIRED_HEADER)
        && let Ok(value) = header.to_str()
        && let Ok(decoded) = decode_payment_required(value)
    {
        return Some(decoded);
    }

    let bytes = response.bytes().await.ok()?;
    let required = t402::proto::parse_payment_required(&bytes).ok()?;
    Some((required, bytes.to_vec()))
}

/// `reqwest` middleware that answers 402 responses with a payment.
///
/// On a 402 the middleware parses the payment requirements, asks the payer
/// engine for a signed payload, and retries the request with exactly one
/// payment header. At most `max_attempts` payments are made per request
/// (default 1).
pub struct PaymentMiddleware {
    client: Arc<T402Client>,
    ledger: RetryLedger,
    max_attempts: u32,
}

impl std::fmt::Debug for PaymentMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentMiddleware")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl PaymentMiddleware {
    /// Creates a middleware around a payer engine.
    #[must_use]
    pub fn new(client: Arc<T402Client>) -> Self {
        Self {
            client,
            ledger: RetryLedger::default(),
            max_attempts: 1,
        }
    }

    /// Sets the maximum number of payment attempts per request.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Builds the payment header for a parsed 402 envelope.
    async fn payment_header(
        &self,
        required: &PaymentRequiredAny,
        raw: &[u8],
    ) -> Result<(&'static str, String), RetryError> {
        let payload = self.client.create_payment(required, Some(raw)).await?;
        Ok(encode_payment_payload(&payload)?)
    }
}

#[async_trait::async_trait]
impl rqm::Middleware for PaymentMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let mut retry_req = req.try_clone();
        let mut response = next.clone().run(req, extensions).await?;

        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(response);
        }

        let id = self.ledger.begin();
        loop {
            if self.ledger.note_attempt(id) > self.max_attempts {
                self.ledger.finish(id);
                return Ok(response);
            }

            let Some((required, raw)) = parse_payment_required_response(response).await else {
                self.ledger.finish(id);
                return Err(rqm::Error::Middleware(RetryError::UnparseableResponse.into()));
            };

            tracing::debug!(version = required.version(), "answering 402 with payment");

            let (name, value) = match self.payment_header(&required, &raw).await {
                Ok(header) => header,
                Err(err) => {
                    self.ledger.finish(id);
                    return Err(rqm::Error::Middleware(err.into()));
                }
            };

            let Some(request) = retry_req.take() else {
                self.ledger.finish(id);
                return Err(rqm::Error::Middleware(RetryError::RequestNotCloneable.into()));
            };
            retry_req = request.try_clone();

            let mut request = request;
            let header_value = value
                .parse()
                .map_err(|_| rqm::Error::Middleware(RetryError::Http(HttpError::InvalidHeaderValue).into()))?;
            request.headers_mut().insert(name, header_value);

            response = next.clone().run(request, extensions).await?;
            if response.status() != StatusCode::PAYMENT_REQUIRED {
                self.ledger.finish(id);
                return Ok(response);
            }
        }
    }
}
