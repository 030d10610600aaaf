//! HTTP handlers for API endpoints.

pub mod blocks;
pub mod health;
pub mod locks;
pub mod stream;
pub mod transfers;
