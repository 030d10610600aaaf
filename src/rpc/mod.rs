//! Chain access: HTTP and WebSocket providers and the [`ChainClient`].
//!
//! # Provider Types
//!
//! - **HTTP Provider** ([`http`]): storage reads, log queries, head polling
//! - **WebSocket Provider** ([`websocket`]): push-based head notifications
//!   with reconnection
//! - **Chain client** ([`client`]): both of the above behind the
//!   [`StorageReader`](crate::storage::StorageReader) and
//!   [`TransferFeed`](crate::aggregator::TransferFeed) traits
//!
//! ```text
//!   SlotResolver      LogAggregator
//!         │                 │
//!         └──> ChainClient <┘
//!               │       │
//!          ┌────▼──┐ ┌──▼──┐
//!          │ HTTP  │ │ WS  │  (heads only, optional)
//!          └───────┘ └─────┘
//! ```

pub mod client;
pub mod http;
pub mod websocket;

pub use client::ChainClient;
pub use http::{check_connection, create_provider, get_latest_block, Provider};
pub use websocket::{Backoff, ReconnectingWebSocket, WebSocketProvider};
