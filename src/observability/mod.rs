//! Observability and structured logging infrastructure.
//!
//! # Features
//!
//! - **Structured Logging**: key-value fields (`index`, `slot`, `from_block`,
//!   `to_block`, `duration_ms`) on every storage read and log query
//! - **Span Tracking**: `#[instrument]` spans across async boundaries
//! - **Multiple Formats**: console (pretty or JSON) and rotating JSON files
//! - **Environment Filtering**: `RUST_LOG` support
//!
//! # Usage
//!
//! ```no_run
//! use eth_lock_watch::observability;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     // keep the guard alive so buffered file logs are flushed on exit
//!     let _guard = observability::init_tracing(None, None, false)?;
//!     Ok(())
//! }
//! ```
//!
//! # Environment Configuration
//!
//! ```bash
//! RUST_LOG=eth_lock_watch=debug cargo run -- locks
//! LOG_JSON=true cargo run -- serve
//! LOG_FILE=./logs/watch.log cargo run -- watch
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when neither `RUST_LOG` nor an explicit level is given.
pub const DEFAULT_FILTER: &str = "eth_lock_watch=info,warn";

/// Pick the filter directive: `RUST_LOG`, then `log_level`, then
/// [`DEFAULT_FILTER`].
#[must_use]
pub fn filter_directive(rust_log: Option<String>, log_level: Option<String>) -> String {
    rust_log
        .or(log_level)
        .filter(|directive| !directive.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Initialize the global tracing subscriber.
///
/// * `log_level` - filter directive used when `RUST_LOG` is unset
/// * `log_file` - optional path; enables a daily-rotated JSON log file
/// * `json_output` - JSON console output instead of pretty output
///
/// Returns the file writer's guard when file logging is enabled. Dropping
/// it stops the background writer, so hold it until the process exits.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init_tracing(
    log_level: Option<String>,
    log_file: Option<PathBuf>,
    json_output: bool,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_new(filter_directive(
        std::env::var("RUST_LOG").ok(),
        log_level,
    ))?;

    let console_layer = if json_output {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let (file_layer, guard) = match &log_file {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(directory)?;

            let appender = tracing_appender::rolling::daily(
                directory,
                path.file_name().unwrap_or_else(|| OsStr::new("eth-lock-watch.log")),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    info!(
        json_output,
        file_logging = log_file.is_some(),
        "Tracing initialized"
    );

    Ok(guard)
}

/// Install a test-friendly subscriber, ignoring repeated calls.
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        assert_eq!(
            filter_directive(Some("trace".into()), Some("debug".into())),
            "trace"
        );
        assert_eq!(filter_directive(None, Some("debug".into())), "debug");
        assert_eq!(filter_directive(None, None), DEFAULT_FILTER);
        assert_eq!(filter_directive(Some("  ".into()), None), DEFAULT_FILTER);
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_init_with_log_file_creates_directory() {
        init_test_tracing();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("watch.log");

        // a subscriber is already installed, so init fails after the
        // directory has been prepared
        let result = init_tracing(Some("info".to_string()), Some(path.clone()), true);
        assert!(result.is_err());
        assert!(path.parent().is_some_and(Path::exists));
    }
}
