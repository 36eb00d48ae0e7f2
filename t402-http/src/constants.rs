//! HTTP header names for the t402 protocol.

/// HTTP header for V2 payment requirements (server → client, 402 response).
pub const PAYMENT_REQUIRED_HEADER: &str = "PAYMENT-REQUIRED";

/// HTTP header for V2 payment signatures (client → server).
pub const PAYMENT_SIGNATURE_HEADER: &str = "PAYMENT-SIGNATURE";

/// HTTP header for V2 settlement results (server → client).
pub const PAYMENT_RESPONSE_HEADER: &str = "PAYMENT-RESPONSE";

/// V1 legacy header for the payment payload (client → server).
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// V1 legacy header for settlement results (server → client).
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";
