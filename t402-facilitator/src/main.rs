//! t402 facilitator HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in the current directory)
//! cargo run -p t402-facilitator --release
//!
//! # Run with a custom config path
//! CONFIG=/path/to/config.toml cargo run -p t402-facilitator
//!
//! # Configure logging level
//! RUST_LOG=info cargo run -p t402-facilitator
//! ```
//!
//! Payment mechanisms are chain-specific and registered by the embedding
//! application; this binary serves whatever the engine holds and reports an
//! empty supported list otherwise.

use std::sync::Arc;

use t402::T402Facilitator;
use tracing_subscriber::EnvFilter;

use t402_facilitator::config::FacilitatorConfig;
use t402_facilitator::serve;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Facilitator failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = FacilitatorConfig::load()?;
    tracing::info!(host = %config.host, port = config.port, "Loaded configuration");

    let facilitator = T402Facilitator::new();
    if facilitator.supported().kinds.is_empty() {
        tracing::warn!(
            "No payment mechanisms registered — facilitator will report no supported kinds"
        );
    }

    serve(Arc::new(facilitator), &config).await
}
