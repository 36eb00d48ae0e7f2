#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport layer for the t402 payment protocol.
//!
//! Pure translation between the protocol engines and HTTP:
//!
//! - [`constants`] / [`headers`] - Payment header names and
//!   base64(JSON) encoding/decoding
//! - [`routes`] - Route pattern matching for payment-gated endpoints
//! - [`adapter`] - The framework-neutral [`HttpAdapter`](adapter::HttpAdapter)
//!   request contract
//! - [`response`] - 402 and settlement response building
//! - [`paygate`] - The per-request payment lifecycle driver
//! - [`facilitator_client`] - HTTP client for a remote facilitator service
//! - [`client`] - Payer-side 402 retry middleware for `reqwest`

pub mod adapter;
pub mod client;
pub mod constants;
pub mod error;
pub mod facilitator_client;
pub mod headers;
pub mod paygate;
pub mod response;
pub mod routes;

pub use adapter::HttpAdapter;
pub use error::HttpError;
pub use facilitator_client::HttpFacilitatorClient;
pub use paygate::Paygate;
pub use routes::{PaymentRoutes, RoutePattern};
