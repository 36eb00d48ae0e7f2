#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core engines and wire types for the t402 payment protocol.
//!
//! t402 implements HTTP-native micropayments over the 402 Payment Required
//! status code: a resource server demands payment, the client answers with a
//! signed payment artifact, and a facilitator verifies and settles that
//! payment on-chain before the resource is delivered.
//!
//! This crate is the protocol runtime. It is blockchain-agnostic: concrete
//! payment mechanisms plug into the engines through the capability traits in
//! [`scheme`], and HTTP transports live in the `t402-http` crate.
//!
//! # Modules
//!
//! - [`amount`] - Human-readable currency amount parsing
//! - [`client`] - Payer-side engine selecting and producing payments
//! - [`config`] - Protected-resource configuration
//! - [`error`] - Protocol, verify, and settle error taxonomy
//! - [`facilitator`] - Facilitator engine dispatching verify/settle
//! - [`hooks`] - Before/after/failure lifecycle hooks
//! - [`network`] - CAIP-2 network identifiers and patterns
//! - [`proto`] - Wire format types for both protocol versions
//! - [`scheme`] - Mechanism capability traits and the scheme registry
//! - [`server`] - Resource server engine

pub mod amount;
pub mod client;
pub mod config;
pub mod error;
pub mod facilitator;
pub mod hooks;
pub mod network;
pub mod proto;
pub mod scheme;
pub mod server;

pub use client::T402Client;
pub use facilitator::T402Facilitator;
pub use network::{Network, NetworkPattern};
pub use server::T402ResourceServer;

/// Extracts a printable message from a caught panic payload.
///
/// Mechanism panics are caught at the engine boundary and mapped to
/// mechanism-failure errors carrying this message.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("mechanism panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("mechanism panicked: {s}")
    } else {
        "mechanism panicked".to_owned()
    }
}
