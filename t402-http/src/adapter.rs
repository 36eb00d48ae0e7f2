//! Framework-neutral request adapter.
//!
//! [`HttpAdapter`] is the only contract between the payment gate and an HTTP
//! framework: enough surface to harvest the payment header, build the
//! request context for dynamic pricing, and decide between a paywall and a
//! JSON 402. Frameworks implement this trait; the engines never import a
//! framework type.

use t402::config::RequestContext;

use crate::constants::{PAYMENT_SIGNATURE_HEADER, X_PAYMENT_HEADER};
use crate::error::HttpError;

/// Abstract view over an inbound HTTP request.
pub trait HttpAdapter {
    /// Returns the value of a request header, if present.
    fn header(&self, name: &str) -> Option<String>;

    /// Returns the HTTP method.
    fn method(&self) -> String;

    /// Returns the request path.
    fn path(&self) -> String;

    /// Returns the full request URL.
    fn url(&self) -> String;

    /// Returns the `Accept` header, if present.
    fn accept(&self) -> Option<String> {
        self.header("accept")
    }

    /// Returns the `User-Agent` header, if present.
    fn user_agent(&self) -> Option<String> {
        self.header("user-agent")
    }
}

/// Assembles the core's request context from an adapter.
pub fn request_context(adapter: &dyn HttpAdapter) -> RequestContext {
    RequestContext {
        method: adapter.method(),
        path: adapter.path(),
        url: adapter.url(),
        accept: adapter.accept(),
        user_agent: adapter.user_agent(),
    }
}

/// Extracts the payment header from a request.
///
/// Returns `None` when the request carries no payment. A request carrying
/// both the V2 and the V1 header is rejected.
///
/// # Errors
///
/// Returns [`HttpError::AmbiguousPaymentHeader`] if both headers are present.
pub fn payment_header(adapter: &dyn HttpAdapter) -> Result<Option<String>, HttpError> {
    let signature = adapter.header(PAYMENT_SIGNATURE_HEADER);
    let x_payment = adapter.header(X_PAYMENT_HEADER);
    match (signature, x_payment) {
        (Some(_), Some(_)) => Err(HttpError::AmbiguousPaymentHeader),
        (Some(value), None) | (None, Some(value)) => Ok(Some(value)),
        (None, None) => Ok(None),
    }
}

/// Decides whether an unpaid response should render as a paywall page.
///
/// A browser is assumed when the request accepts `text/html` and identifies
/// with a `Mozilla`-prefixed user agent.
#[must_use]
pub fn wants_paywall(adapter: &dyn HttpAdapter) -> bool {
    let accepts_html = adapter
        .accept()
        .is_some_and(|accept| accept.contains("text/html"));
    let is_browser = adapter
        .user_agent()
        .is_some_and(|ua| ua.starts_with("Mozilla"));
    accepts_html && is_browser
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub(crate) struct FakeRequest {
        pub headers: HashMap<String, String>,
        pub method: String,
        pub path: String,
        pub url: String,
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

    fn browser_request() -> FakeRequest {
        let mut request = FakeRequest::default();
        request
            .headers
            .insert("accept".into(), "text/html,application/xhtml+xml".into());
        request.headers.insert(
            "user-agent".into(),
            "Mozilla/5.0 (X11; Linux x86_64)".into(),
        );
        request
    }

    #[test]
    fn test_payment_header_missing() {
        let request = FakeRequest::default();
        assert!(payment_header(&request).unwrap().is_none());
    }

    #[test]
    fn test_payment_header_both_rejected() {
        let mut request = FakeRequest::default();
        request
            .headers
            .insert("payment-signature".into(), "abc".into());
        request.headers.insert("x-payment".into(), "def".into());
        assert!(matches!(
            payment_header(&request),
            Err(HttpError::AmbiguousPaymentHeader)
        ));
    }

    #[test]
    fn test_wants_paywall_for_browsers_only() {
        assert!(wants_paywall(&browser_request()));

        let mut api_client = FakeRequest::default();
        api_client
            .headers
            .insert("accept".into(), "application/json".into());
        api_client.headers.insert("user-agent".into(), "curl/8.0".into());
        assert!(!wants_paywall(&api_client));

        // Accept alone is not enough.
        let mut scraper = FakeRequest::default();
        scraper.headers.insert("accept".into(), "text/html".into());
        assert!(!wants_paywall(&scraper));
    }

    #[test]
    fn test_request_context_assembly() {
        let mut request = browser_request();
        request.method = "GET".into();
        request.path = "/api/data".into();
        request.url = "https://example.com/api/data".into();

        let ctx = request_context(&request);
        assert_eq!(ctx.method, "GET");
        assert_eq!(ctx.path, "/api/data");
        assert_eq!(ctx.url, "https://example.com/api/data");
        assert!(ctx.accept.unwrap().contains("text/html"));
    }
}
