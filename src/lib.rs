//! # Ethereum Lock Storage Reader and Transfer Aggregator
//!
//! Reads a contract's `LockInfo[]` array straight from raw storage and
//! aggregates live ERC-20 `Transfer` events, using [Alloy](https://github.com/alloy-rs/alloy).
//!
//! ## Features
//!
//! - **Slot arithmetic** for dynamic arrays of packed structs
//!   (`keccak256(p) + i * 2`), checked against 256-bit overflow
//! - **Word decoding** of packed `address`/`uint64` fields and `uint256`
//!   amounts, with the all-zero word as the "not written" sentinel
//! - **Sequential pagination** with an explicit state machine, progress
//!   snapshots and cancellation
//! - **Live aggregation** of `Transfer` events: block notifications over
//!   WebSocket or polling, chunked catch-up queries, structural deduplication
//! - **HTTP API** with Swagger UI and a WebSocket stream
//!
//! ## Architecture
//!
//! 1. **Config Layer** ([`config`]) - Environment variable loading
//! 2. **RPC Layer** ([`rpc`]) - HTTP and WebSocket node access
//! 3. **Storage Layer** ([`storage`]) - Slots, decoding, resolver, loader
//! 4. **Events Layer** ([`events`]) - `Transfer` binding and normalization
//! 5. **Aggregator Layer** ([`aggregator`]) - Live deduplicated transfer set
//! 6. **API Layer** ([`api`]) - REST and WebSocket surface
//!
//! ## Quick Start
//!
//! ```bash
//! # Decode one element
//! cargo run --release -- slot 0
//!
//! # Real-time transfers
//! cargo run --release -- watch
//! ```
//!
//! ### Using as a Library
//!
//! ```rust,no_run
//! use eth_lock_watch::{config::Config, rpc::ChainClient, storage::SlotResolver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let client = ChainClient::connect(config.locks_rpc_url(), None).await?;
//!     let resolver = SlotResolver::new(client, config.locks_contract());
//!
//!     let length = resolver.length().await?;
//!     if let Some(lock) = resolver.resolve(0).await? {
//!         println!("{length} locks, first held by {}", lock.holder_hex());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`error::WatchResult<T>`](error::WatchResult). An
//! unwritten element is not an error: [`storage::SlotResolver::resolve`]
//! returns `Ok(None)`.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod aggregator;
pub mod api;
pub mod app_state;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod observability;
pub mod rpc;
pub mod storage;
