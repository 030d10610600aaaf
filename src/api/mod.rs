//! HTTP API exposing decoded storage and aggregated transfers via REST and
//! WebSocket.

pub mod docs;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod server;
