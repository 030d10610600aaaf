//! CLI entry point for the lock storage reader and transfer watcher.
//!
//! # Architecture Flow
//!
//! ```text
//! main.rs (Runtime Initialization)
//!     ↓
//! CLI Layer (src/cli.rs)
//!     ↓
//! 1. Config Layer (src/config.rs)        → Load environment variables
//! 2. RPC Layer (src/rpc/)                → HTTP/WebSocket node access
//! 3. Storage Layer (src/storage/)        → Slot arithmetic, decoding, pagination
//! 4. Aggregator Layer (src/aggregator/)  → Live transfer aggregation
//! 5. API Layer (src/api/)                → REST and WebSocket surface
//! ```
//!
//! All errors bubble up via `WatchResult<T>`.

use eth_lock_watch::{cli, observability};
use tracing::error;

/// Entry point.
///
/// Initializes the Tokio runtime and structured logging, then delegates to
/// the CLI module.
#[tokio::main]
async fn main() {
    // RUST_LOG:  filter directive (e.g. "eth_lock_watch=debug")
    // LOG_JSON:  JSON console output ("true" or "false")
    // LOG_FILE:  daily-rotated JSON log file
    let log_level = std::env::var("RUST_LOG").ok();
    let log_file = std::env::var("LOG_FILE").ok().map(std::path::PathBuf::from);
    let json_output = std::env::var("LOG_JSON")
        .ok()
        .and_then(|value| value.parse::<bool>().ok())
        .unwrap_or(false);

    let _guard = match observability::init_tracing(log_level, log_file, json_output) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = cli::run().await {
        error!(error = %e, "Application error");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
