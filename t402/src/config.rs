//! Configuration types for protected resources.
//!
//! A [`ResourceConfig`] describes what a resource server charges for one
//! route: the accepted payment options (price and recipient may be static or
//! resolved per-request), the unpaid response content, and any extension
//! declarations.

use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;
use crate::network::Network;
use crate::proto::{Extensions, v2};

/// Per-request context handed to dynamic pricing and recipient callbacks.
///
/// Assembled by the HTTP shim from its adapter; the core never sees a
/// framework request type.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// The HTTP method of the request.
    pub method: String,
    /// The decoded request path.
    pub path: String,
    /// The full request URL.
    pub url: String,
    /// The `Accept` header, if present.
    pub accept: Option<String>,
    /// The `User-Agent` header, if present.
    pub user_agent: Option<String>,
}

/// A price that is either fixed or resolved per-request.
#[derive(Clone)]
pub enum Price {
    /// A fixed price value: a money string (`"1.50"`) or a scheme-specific
    /// object.
    Static(serde_json::Value),
    /// A callback resolving the price against the current request context.
    Dynamic(Arc<dyn Fn(&RequestContext) -> Result<serde_json::Value, BoxError> + Send + Sync>),
}

impl fmt::Debug for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Dynamic(_) => f.debug_tuple("Dynamic").field(&"<fn>").finish(),
        }
    }
}

impl Price {
    /// Resolves the price against the current request context.
    ///
    /// # Errors
    ///
    /// Returns the dynamic callback's error, if any.
    pub fn resolve(&self, ctx: &RequestContext) -> Result<serde_json::Value, BoxError> {
        match self {
            Self::Static(value) => Ok(value.clone()),
            Self::Dynamic(resolve) => resolve(ctx),
        }
    }
}

impl From<&str> for Price {
    fn from(value: &str) -> Self {
        Self::Static(serde_json::Value::String(value.to_owned()))
    }
}

impl From<String> for Price {
    fn from(value: String) -> Self {
        Self::Static(serde_json::Value::String(value))
    }
}

impl From<serde_json::Value> for Price {
    fn from(value: serde_json::Value) -> Self {
        Self::Static(value)
    }
}

/// A payment recipient that is either fixed or resolved per-request.
#[derive(Clone)]
pub enum PayTo {
    /// A fixed recipient address.
    Static(String),
    /// A callback resolving the recipient against the current request context.
    Dynamic(Arc<dyn Fn(&RequestContext) -> Result<String, BoxError> + Send + Sync>),
}

impl fmt::Debug for PayTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Dynamic(_) => f.debug_tuple("Dynamic").field(&"<fn>").finish(),
        }
    }
}

impl PayTo {
    /// Resolves the recipient against the current request context.
    ///
    /// # Errors
    ///
    /// Returns the dynamic callback's error, if any.
    pub fn resolve(&self, ctx: &RequestContext) -> Result<String, BoxError> {
        match self {
            Self::Static(value) => Ok(value.clone()),
            Self::Dynamic(resolve) => resolve(ctx),
        }
    }
}

impl From<&str> for PayTo {
    fn from(value: &str) -> Self {
        Self::Static(value.to_owned())
    }
}

impl From<String> for PayTo {
    fn from(value: String) -> Self {
        Self::Static(value)
    }
}

/// One way a payer may pay for a route.
#[derive(Debug, Clone)]
pub struct PaymentOption {
    /// Payment scheme identifier (e.g., `"exact"`).
    pub scheme: String,
    /// CAIP-2 network identifier.
    pub network: Network,
    /// Price for the resource.
    pub price: Price,
    /// Recipient address.
    pub pay_to: PayTo,
    /// Maximum time in seconds for payment validity. Defaults to
    /// [`PaymentOption::DEFAULT_MAX_TIMEOUT_SECONDS`] if not set.
    pub max_timeout_seconds: Option<u64>,
}

impl PaymentOption {
    /// Default payment validity window in seconds.
    pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

    /// Creates a payment option with the default timeout.
    pub fn new(
        scheme: impl Into<String>,
        network: Network,
        price: impl Into<Price>,
        pay_to: impl Into<PayTo>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            network,
            price: price.into(),
            pay_to: pay_to.into(),
            max_timeout_seconds: None,
        }
    }

    /// Sets the maximum payment validity window.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = Some(seconds);
        self
    }
}

/// Configuration for one protected resource.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    /// Accepted payment options, in preference order.
    pub accepts: Vec<PaymentOption>,
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource content.
    pub mime_type: String,
    /// Extension declarations for this route.
    pub extensions: Extensions,
    /// JSON body preview to serve with an unpaid 402 response.
    pub unpaid_body: Option<serde_json::Value>,
    /// Pre-rendered paywall HTML to serve to browsers.
    pub paywall_html: Option<String>,
}

impl ResourceConfig {
    /// Creates a resource configuration from a list of payment options.
    #[must_use]
    pub fn new(accepts: Vec<PaymentOption>) -> Self {
        Self {
            accepts,
            description: String::new(),
            mime_type: "application/json".to_owned(),
            extensions: Extensions::default(),
            unpaid_body: None,
            paywall_html: None,
        }
    }

    /// Sets the resource description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the resource MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Sets the unpaid JSON body preview.
    #[must_use]
    pub fn with_unpaid_body(mut self, body: serde_json::Value) -> Self {
        self.unpaid_body = Some(body);
        self
    }

    /// Sets the paywall HTML served to browsers.
    #[must_use]
    pub fn with_paywall_html(mut self, html: impl Into<String>) -> Self {
        self.paywall_html = Some(html.into());
        self
    }

    /// Sets the extension declarations for this route.
    #[must_use]
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    /// Builds the resource metadata for the current request.
    #[must_use]
    pub fn resource_info(&self, ctx: &RequestContext) -> v2::ResourceInfo {
        v2::ResourceInfo {
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            url: ctx.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_price_resolution() {
        let price = Price::from("1.50");
        let resolved = price.resolve(&RequestContext::default()).unwrap();
        assert_eq!(resolved, serde_json::json!("1.50"));
    }

    #[test]
    fn test_dynamic_price_sees_request_context() {
        let price = Price::Dynamic(Arc::new(|ctx: &RequestContext| {
            Ok(serde_json::json!(if ctx.path.ends_with("/premium") {
                "5.00"
            } else {
                "0.10"
            }))
        }));
        let ctx = RequestContext {
            path: "/api/premium".into(),
            ..RequestContext::default()
        };
        assert_eq!(price.resolve(&ctx).unwrap(), serde_json::json!("5.00"));
    }

    #[test]
    fn test_resource_info_uses_request_url() {
        let config = ResourceConfig::new(vec![]).with_description("weather data");
        let ctx = RequestContext {
            url: "https://api.example.com/weather?city=berlin".into(),
            ..RequestContext::default()
        };
        let info = config.resource_info(&ctx);
        assert_eq!(info.url, "https://api.example.com/weather?city=berlin");
        assert_eq!(info.description, "weather data");
        assert_eq!(info.mime_type, "application/json");
    }
}
