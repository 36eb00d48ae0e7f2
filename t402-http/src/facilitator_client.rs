//! HTTP client for a remote t402 facilitator service.
//!
//! [`HttpFacilitatorClient`] speaks the facilitator REST surface — `POST
//! /verify`, `POST /settle`, `GET /supported` — and implements the core
//! [`FacilitatorClient`] trait so a resource server can delegate to a remote
//! facilitator transparently.
//!
//! The `/supported` response is cached with a TTL (default 5 minutes). An
//! expired entry is refetched synchronously; stale data is never served.
//! Authentication headers come from an optional [`AuthProvider`]; the
//! client treats them as opaque.

use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, StatusCode};
use reqwest::Client;
use serde_json::value::RawValue;
use tokio::sync::RwLock;
use url::Url;

use t402::error::{BoxError, SettleError, VerifyError};
use t402::hooks::BoxFuture;
use t402::proto::{
    PaymentPayloadAny, PaymentRequirementsAny, SettleRequest, SettleResponse, SupportedResponse,
    VerifyRequest, VerifyResponse,
};
use t402::server::FacilitatorClient;

/// The facilitator endpoint a request targets, for per-endpoint auth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilitatorEndpoint {
    /// `POST /verify`
    Verify,
    /// `POST /settle`
    Settle,
    /// `GET /supported`
    Supported,
}

/// Supplies authentication headers per facilitator endpoint.
///
/// Headers are opaque to the client; implementations may mint tokens,
/// sign requests, or return nothing.
pub trait AuthProvider: Send + Sync {
    /// Returns `(name, value)` header pairs for the given endpoint.
    fn headers(&self, endpoint: FacilitatorEndpoint) -> Vec<(String, String)>;
}

/// TTL cache state for the `/supported` response.
#[derive(Clone, Debug)]
struct SupportedCacheState {
    response: SupportedResponse,
    expires_at: std::time::Instant,
}

/// An encapsulated TTL cache for the `/supported` endpoint response.
///
/// Each clone starts with an independent, empty cache state.
#[derive(Debug)]
pub struct SupportedCache {
    ttl: Duration,
    state: RwLock<Option<SupportedCacheState>>,
}

impl SupportedCache {
    /// Creates a new cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    /// Returns the cached response if still fresh.
    pub async fn get(&self) -> Option<SupportedResponse> {
        let guard = self.state.read().await;
        let cache = guard.as_ref()?;
        if std::time::Instant::now() < cache.expires_at {
            Some(cache.response.clone())
        } else {
            None
        }
    }

    /// Stores a response with the configured TTL.
    pub async fn set(&self, response: SupportedResponse) {
        let mut guard = self.state.write().await;
        *guard = Some(SupportedCacheState {
            response,
            expires_at: std::time::Instant::now() + self.ttl,
        });
    }

    /// Clears the cache.
    pub async fn clear(&self) {
        let mut guard = self.state.write().await;
        *guard = None;
    }
}

impl Clone for SupportedCache {
    fn clone(&self) -> Self {
        Self::new(self.ttl)
    }
}

/// Errors from the remote facilitator transport.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FacilitatorClientError {
    /// URL construction failed.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// Message serialization failed.
    #[error("Failed to serialize request: {context}: {source}")]
    Serialize {
        /// Human-readable context.
        context: &'static str,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// HTTP transport failure.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The response body was not the expected JSON.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The facilitator answered with an unexpected status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
}

/// A client for a remote t402 facilitator service.
#[derive(Clone, Debug)]
pub struct HttpFacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    supported_url: Url,
    client: Client,
    headers: HeaderMap,
    auth: Option<Arc<dyn AuthProvider>>,
    timeout: Option<Duration>,
    supported_cache: Arc<SupportedCache>,
}

impl std::fmt::Debug for dyn AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthProvider")
    }
}

impl HttpFacilitatorClient {
    /// Default TTL for caching the `/supported` response (5 minutes).
    pub const DEFAULT_SUPPORTED_CACHE_TTL: Duration = Duration::from_secs(300);

    /// Constructs a client from a base URL, deriving the `./verify`,
    /// `./settle`, and `./supported` endpoint URLs.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError::UrlParse`] if URL construction fails.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let verify_url = base_url
            .join("./verify")
            .map_err(|e| FacilitatorClientError::UrlParse {
                context: "Failed to construct ./verify URL",
                source: e,
            })?;
        let settle_url = base_url
            .join("./settle")
            .map_err(|e| FacilitatorClientError::UrlParse {
                context: "Failed to construct ./settle URL",
                source: e,
            })?;
        let supported_url =
            base_url
                .join("./supported")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./supported URL",
                    source: e,
                })?;
        Ok(Self {
            base_url,
            verify_url,
            settle_url,
            supported_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            auth: None,
            timeout: None,
            supported_cache: Arc::new(SupportedCache::new(Self::DEFAULT_SUPPORTED_CACHE_TTL)),
        })
    }

    /// Returns the base URL used by this client.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Attaches static headers to every request.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the authentication provider.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets a per-request timeout. The client imposes none by default.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the TTL for the `/supported` cache.
    #[must_use]
    pub fn with_supported_cache_ttl(mut self, ttl: Duration) -> Self {
        self.supported_cache = Arc::new(SupportedCache::new(ttl));
        self
    }

    /// Disables `/supported` caching.
    #[must_use]
    pub fn without_supported_cache(self) -> Self {
        self.with_supported_cache_ttl(Duration::ZERO)
    }

    /// Sends a typed `POST /verify` request.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] on transport or decode failure.
    pub async fn verify_raw(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        self.post_json(
            &self.verify_url,
            "POST /verify",
            FacilitatorEndpoint::Verify,
            request,
        )
        .await
    }

    /// Sends a typed `POST /settle` request.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] on transport or decode failure.
    pub async fn settle_raw(
        &self,
        request: &SettleRequest,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        self.post_json(
            &self.settle_url,
            "POST /settle",
            FacilitatorEndpoint::Settle,
            request,
        )
        .await
    }

    /// Sends a `GET /supported` request, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] on transport or decode failure.
    pub async fn supported_inner(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        self.get_json(
            &self.supported_url,
            "GET /supported",
            FacilitatorEndpoint::Supported,
        )
        .await
    }

    /// Returns the supported report, serving from the TTL cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] on transport or decode failure.
    pub async fn supported(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        if let Some(response) = self.supported_cache.get().await {
            return Ok(response);
        }

        tracing::debug!(url = %self.supported_url, "supported cache miss");
        let response = self.supported_inner().await?;
        self.supported_cache.set(response.clone()).await;
        Ok(response)
    }

    /// Builds the wire envelope `{version, paymentPayload, paymentRequirements}`.
    fn wire_request(
        payload: &PaymentPayloadAny,
        requirements: &PaymentRequirementsAny,
    ) -> Result<VerifyRequest, FacilitatorClientError> {
        let payment_payload = serde_json::to_string(payload)
            .and_then(RawValue::from_string)
            .map_err(|e| FacilitatorClientError::Serialize {
                context: "payment payload",
                source: e,
            })?;
        let payment_requirements = serde_json::to_string(requirements)
            .and_then(RawValue::from_string)
            .map_err(|e| FacilitatorClientError::Serialize {
                context: "payment requirements",
                source: e,
            })?;
        Ok(VerifyRequest {
            version: payload.version(),
            payment_payload,
            payment_requirements,
        })
    }

    fn apply_headers(
        &self,
        mut request: reqwest::RequestBuilder,
        endpoint: FacilitatorEndpoint,
    ) -> reqwest::RequestBuilder {
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if let Some(auth) = &self.auth {
            for (name, value) in auth.headers(endpoint) {
                request = request.header(name, value);
            }
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        request
    }

    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        endpoint: FacilitatorEndpoint,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let request = self.apply_headers(self.client.post(url.clone()).json(payload), endpoint);
        let response = request
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;
        Self::read_json(response, context).await
    }

    async fn get_json<R>(
        &self,
        url: &Url,
        context: &'static str,
        endpoint: FacilitatorEndpoint,
    ) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        let request = self.apply_headers(self.client.get(url.clone()), endpoint);
        let response = request
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;
        Self::read_json(response, context).await
    }

    async fn read_json<R>(
        response: reqwest::Response,
        context: &'static str,
    ) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        if response.status() == StatusCode::OK {
            response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

/// Parses a base URL string, normalizing trailing slashes.
impl TryFrom<&str> for HttpFacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

impl FacilitatorClient for HttpFacilitatorClient {
    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayloadAny,
        requirements: &'a PaymentRequirementsAny,
    ) -> BoxFuture<'a, Result<VerifyResponse, VerifyError>> {
        Box::pin(async move {
            let request = Self::wire_request(payload, requirements).map_err(|e| {
                VerifyError::new("facilitator_error")
                    .with_message(e.to_string())
                    .with_network(payload.network().clone())
            })?;
            self.verify_raw(&request).await.map_err(|e| {
                VerifyError::new("facilitator_error")
                    .with_message(e.to_string())
                    .with_network(payload.network().clone())
                    .with_cause(e)
            })
        })
    }

    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayloadAny,
        requirements: &'a PaymentRequirementsAny,
    ) -> BoxFuture<'a, Result<SettleResponse, SettleError>> {
        Box::pin(async move {
            let request = Self::wire_request(payload, requirements).map_err(|e| {
                SettleError::new("facilitator_error")
                    .with_message(e.to_string())
                    .with_network(payload.network().clone())
            })?;
            self.settle_raw(&request.into()).await.map_err(|e| {
                SettleError::new("facilitator_error")
                    .with_message(e.to_string())
                    .with_network(payload.network().clone())
                    .with_cause(e)
            })
        })
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, BoxError>> {
        Box::pin(async move { Ok(Self::supported(self).await?) })
    }
}
