//! Error types for the t402 HTTP transport layer.

use t402::error::ProtocolError;

/// Errors from header encoding/decoding and request extraction.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HttpError {
    /// A payment header was not valid base64.
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// JSON serialization of a wire message failed.
    #[error("JSON serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Protocol-level fault in the decoded message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The request carried both the V2 and the V1 payment header.
    #[error("request carries both PAYMENT-SIGNATURE and X-PAYMENT headers")]
    AmbiguousPaymentHeader,

    /// A wire value could not be used as an HTTP header value.
    #[error("invalid header value")]
    InvalidHeaderValue,
}
