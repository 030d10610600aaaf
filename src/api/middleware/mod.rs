//! Axum middleware and API error mapping.

pub mod error;
pub mod logging;
pub mod rate_limit;
