//! Error types for the storage resolver and the transfer aggregator.
//!
//! This module provides a unified error type [`WatchError`] covering every
//! failure the crate can surface, from configuration loading through raw
//! storage reads to WebSocket subscriptions.
//!
//! # Design
//!
//! The error taxonomy is organized by how callers should react:
//! - [`WatchError::NodeUnavailable`]: transport failure of a read; retriable,
//!   never invalidates previously accumulated state
//! - [`WatchError::InvalidSlot`] / [`WatchError::InvalidIndex`]: programmer
//!   errors, fatal to the call that produced them
//! - [`WatchError::DecodingError`]: a word or log that does not have the
//!   expected shape
//! - [`WatchError::ConfigError`]: environment and startup problems
//!
//! An unwritten array element is *not* an error. Resolvers return `Ok(None)`
//! for it and pagination treats it as the end of the populated range.
//!
//! # Example
//!
//! ```
//! use eth_lock_watch::error::{WatchError, WatchResult};
//!
//! fn checked(index: i64) -> WatchResult<u64> {
//!     u64::try_from(index).map_err(|_| WatchError::invalid_index(format!("{index} is negative")))
//! }
//!
//! assert!(checked(-1).is_err());
//! ```

use std::fmt;

/// Result type alias using [`WatchError`].
pub type WatchResult<T> = Result<T, WatchError>;

/// Boxed source error carried by most variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for storage resolution and log aggregation.
#[derive(Debug)]
pub enum WatchError {
    /// Configuration or environment variable errors.
    ///
    /// Variants include:
    /// - Missing or invalid environment variables
    /// - Invalid addresses or URLs
    /// - Malformed numeric values
    ConfigError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxError>,
    },

    /// Transport-level failure talking to the node.
    ///
    /// Raised by `getStorageAt`, `getLogs` and block queries. The caller of
    /// the current operation decides whether to retry.
    NodeUnavailable {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxError>,
    },

    /// A storage slot that cannot be addressed or was rejected by the node.
    InvalidSlot {
        /// Human-readable error message
        message: String,
    },

    /// An array index that cannot be resolved (negative, or overflowing the
    /// 256-bit slot space).
    InvalidIndex {
        /// Human-readable error message
        message: String,
    },

    /// Word or log decoding errors.
    ///
    /// Variants include:
    /// - Log signature mismatch
    /// - Missing block number or transaction hash
    /// - Length word that does not fit in 64 bits
    DecodingError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxError>,
    },

    /// Loader or aggregator state errors.
    StateError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxError>,
    },

    /// WebSocket connection errors.
    ///
    /// Variants include:
    /// - Failed to establish WebSocket connection
    /// - Invalid WebSocket URL
    WebSocketConnectionError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxError>,
    },

    /// WebSocket subscription errors.
    WebSocketSubscriptionError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxError>,
    },

    /// Max reconnection attempts exceeded.
    ///
    /// Occurs when the WebSocket fails to reconnect after
    /// multiple attempts with exponential backoff.
    MaxReconnectAttemptsExceeded {
        /// Number of attempts made
        attempts: u32,
        /// Last error encountered
        last_error: String,
    },
}

impl WatchError {
    /// Create a new configuration error.
    ///
    /// # Example
    ///
    /// ```
    /// use eth_lock_watch::error::WatchError;
    ///
    /// let err = WatchError::config("RPC_URL not set", None);
    /// assert!(matches!(err, WatchError::ConfigError { .. }));
    /// ```
    #[must_use]
    pub fn config(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::ConfigError {
            message: message.into(),
            source,
        }
    }

    /// Create a new node-unavailable error.
    ///
    /// # Example
    ///
    /// ```
    /// use eth_lock_watch::error::WatchError;
    ///
    /// let err = WatchError::node_unavailable("connection refused", None);
    /// assert!(err.is_retriable());
    /// ```
    #[must_use]
    pub fn node_unavailable(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::NodeUnavailable {
            message: message.into(),
            source,
        }
    }

    /// Create a new invalid-slot error.
    #[must_use]
    pub fn invalid_slot(message: impl Into<String>) -> Self {
        Self::InvalidSlot {
            message: message.into(),
        }
    }

    /// Create a new invalid-index error.
    ///
    /// # Example
    ///
    /// ```
    /// use eth_lock_watch::error::WatchError;
    ///
    /// let err = WatchError::invalid_index("index -1 is negative");
    /// assert!(!err.is_retriable());
    /// ```
    #[must_use]
    pub fn invalid_index(message: impl Into<String>) -> Self {
        Self::InvalidIndex {
            message: message.into(),
        }
    }

    /// Create a new decoding error.
    #[must_use]
    pub fn decoding(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::DecodingError {
            message: message.into(),
            source,
        }
    }

    /// Create a new state error.
    #[must_use]
    pub fn state(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::StateError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket connection error.
    #[must_use]
    pub fn websocket_connection(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::WebSocketConnectionError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket subscription error.
    #[must_use]
    pub fn websocket_subscription(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::WebSocketSubscriptionError {
            message: message.into(),
            source,
        }
    }

    /// Create a max reconnect attempts exceeded error.
    #[must_use]
    pub fn max_reconnect_exceeded(attempts: u32, last_error: impl Into<String>) -> Self {
        Self::MaxReconnectAttemptsExceeded {
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Whether retrying the same call later may succeed.
    ///
    /// Only transport failures are retriable; slot, index and decoding
    /// errors will fail the same way every time.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::NodeUnavailable { .. } | Self::WebSocketConnectionError { .. }
        )
    }
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError { message, .. } => write!(f, "Configuration error: {message}"),
            Self::NodeUnavailable { message, .. } => write!(f, "Node unavailable: {message}"),
            Self::InvalidSlot { message } => write!(f, "Invalid slot: {message}"),
            Self::InvalidIndex { message } => write!(f, "Invalid index: {message}"),
            Self::DecodingError { message, .. } => write!(f, "Decoding error: {message}"),
            Self::StateError { message, .. } => write!(f, "State error: {message}"),
            Self::WebSocketConnectionError { message, .. } => {
                write!(f, "WebSocket connection error: {message}")
            }
            Self::WebSocketSubscriptionError { message, .. } => {
                write!(f, "WebSocket subscription error: {message}")
            }
            Self::MaxReconnectAttemptsExceeded {
                attempts,
                last_error,
            } => {
                write!(
                    f,
                    "Max reconnection attempts ({attempts}) exceeded. Last error: {last_error}"
                )
            }
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigError { source, .. }
            | Self::NodeUnavailable { source, .. }
            | Self::DecodingError { source, .. }
            | Self::StateError { source, .. }
            | Self::WebSocketConnectionError { source, .. }
            | Self::WebSocketSubscriptionError { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &dyn std::error::Error),
            Self::InvalidSlot { .. }
            | Self::InvalidIndex { .. }
            | Self::MaxReconnectAttemptsExceeded { .. } => None,
        }
    }
}

/// Convert from `eyre::Report` to `WatchError`.
///
/// The WebSocket layer reports through `eyre`; anything arriving this way is
/// a transport problem and is categorized as [`WatchError::NodeUnavailable`].
impl From<eyre::Report> for WatchError {
    fn from(err: eyre::Report) -> Self {
        Self::NodeUnavailable {
            message: err.to_string(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_config_error() {
        let err = WatchError::config("test error", None);
        assert!(matches!(err, WatchError::ConfigError { .. }));
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_node_unavailable_is_retriable() {
        let err = WatchError::node_unavailable("connection refused", None);
        assert!(err.is_retriable());
        assert_eq!(err.to_string(), "Node unavailable: connection refused");
    }

    #[test]
    fn test_programmer_errors_are_not_retriable() {
        assert!(!WatchError::invalid_index("negative").is_retriable());
        assert!(!WatchError::invalid_slot("bad hex").is_retriable());
        assert!(!WatchError::decoding("short word", None).is_retriable());
    }

    #[test]
    fn test_invalid_index_display() {
        let err = WatchError::invalid_index("index -3 is negative");
        assert_eq!(err.to_string(), "Invalid index: index -3 is negative");
    }

    #[test]
    fn test_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = WatchError::node_unavailable("getStorageAt failed", Some(Box::new(source)));

        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "Node unavailable: getStorageAt failed");
    }

    #[test]
    fn test_max_reconnect_display() {
        let err = WatchError::max_reconnect_exceeded(10, "timeout");
        assert_eq!(
            err.to_string(),
            "Max reconnection attempts (10) exceeded. Last error: timeout"
        );
        assert!(err.source().is_none());
    }

    #[test]
    fn test_from_eyre_is_node_unavailable() {
        let err: WatchError = eyre::eyre!("socket closed").into();
        assert!(matches!(err, WatchError::NodeUnavailable { .. }));
    }
}
