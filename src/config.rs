//! Configuration loaded from environment variables.
//!
//! This module reads every runtime setting through `dotenvy` and the process
//! environment. All operations return [`WatchResult`]; malformed values are
//! reported as [`WatchError::ConfigError`] naming the offending variable.
//!
//! ## Environment Variables
//!
//! Required:
//! - `RPC_URL`: HTTP(S) endpoint of the Ethereum node
//!
//! Optional (with defaults):
//! - `RPC_WS_URL`: WebSocket endpoint for push head notifications (none)
//! - `LOCKS_RPC_URL`: endpoint used for storage reads (`RPC_URL`)
//! - `LOCKS_CONTRACT`: contract holding the `LockInfo[]` array
//!   (`0xB2B77A3c7600Aac203Bc1Bf7Cae12317efB3D508`)
//! - `LOCKS_ARRAY_SLOT`: declared slot of the array (0)
//! - `TOKEN_CONTRACT`: token whose transfers are aggregated (USDT)
//! - `TOKEN_DECIMALS`: decimal exponent of the token (6)
//! - `POLL_INTERVAL_MS`: polling interval (1000)
//! - `MAX_BLOCK_SPAN`: maximum blocks per log query (10)
//! - `API_PORT`: HTTP server port (3000)
//! - `RATE_LIMIT_RPM`: API requests per minute (600)
//! - `CORS_ORIGINS`: comma-separated allowed origins (`*`)
//!
//! ## Example
//!
//! ```no_run
//! use eth_lock_watch::config::Config;
//! use eth_lock_watch::error::WatchResult;
//!
//! # fn main() -> WatchResult<()> {
//! let config = Config::from_env()?;
//! println!("Lock contract: {}", config.locks_contract());
//! # Ok(())
//! # }
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{address, Address, U256};

use crate::aggregator::AggregatorSettings;
use crate::error::{WatchError, WatchResult};
use crate::events::USDT_ADDRESS;
use crate::storage::slots::LOCK_STRUCT_WORDS;
use crate::storage::ArrayLayout;

/// Default lock contract (Sepolia).
pub const DEFAULT_LOCKS_CONTRACT: Address = address!("B2B77A3c7600Aac203Bc1Bf7Cae12317efB3D508");

/// Largest decimal exponent whose power of ten fits in 256 bits.
const MAX_TOKEN_DECIMALS: u8 = 77;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    rpc_url: String,
    ws_url: Option<String>,
    locks_rpc_url: String,
    locks_contract: Address,
    locks_array_slot: U256,
    token_contract: Address,
    token_decimals: u8,
    poll_interval: Duration,
    max_block_span: u64,
    api_port: u16,
    rate_limit_rpm: u32,
    cors_origins: Vec<String>,
}

impl Config {
    /// Load configuration from `.env` (if present) and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ConfigError`] if `RPC_URL` is missing or any
    /// variable is malformed.
    pub fn from_env() -> WatchResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> WatchResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_url = lookup("RPC_URL")
            .filter(|url| !url.is_empty())
            .ok_or_else(|| WatchError::config("RPC_URL environment variable is required", None))?;
        if !rpc_url.starts_with("http") {
            return Err(WatchError::config(
                "RPC_URL must be an http(s) endpoint",
                None,
            ));
        }

        let ws_url = lookup("RPC_WS_URL").filter(|url| !url.is_empty());
        if let Some(url) = &ws_url {
            if !url.starts_with("ws") {
                return Err(WatchError::config(
                    "RPC_WS_URL must be a ws(s) endpoint",
                    None,
                ));
            }
        }

        let locks_rpc_url = lookup("LOCKS_RPC_URL")
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| rpc_url.clone());

        let locks_contract = parse_var(&lookup, "LOCKS_CONTRACT", DEFAULT_LOCKS_CONTRACT)?;
        let locks_array_slot = parse_var(&lookup, "LOCKS_ARRAY_SLOT", U256::ZERO)?;
        let token_contract = parse_var(&lookup, "TOKEN_CONTRACT", USDT_ADDRESS)?;

        let token_decimals: u8 = parse_var(&lookup, "TOKEN_DECIMALS", 6)?;
        if token_decimals > MAX_TOKEN_DECIMALS {
            return Err(WatchError::config(
                format!("TOKEN_DECIMALS must be at most {MAX_TOKEN_DECIMALS}"),
                None,
            ));
        }

        let poll_interval_ms: u64 = parse_var(&lookup, "POLL_INTERVAL_MS", 1000)?;
        if poll_interval_ms == 0 {
            return Err(WatchError::config("POLL_INTERVAL_MS must be positive", None));
        }

        let max_block_span: u64 = parse_var(&lookup, "MAX_BLOCK_SPAN", 10)?;
        if max_block_span == 0 {
            return Err(WatchError::config("MAX_BLOCK_SPAN must be positive", None));
        }

        let api_port = parse_var(&lookup, "API_PORT", 3000)?;

        let rate_limit_rpm: u32 = parse_var(&lookup, "RATE_LIMIT_RPM", 600)?;
        if rate_limit_rpm == 0 {
            return Err(WatchError::config("RATE_LIMIT_RPM must be positive", None));
        }

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(ToString::to_string)
            .collect();

        Ok(Self {
            rpc_url,
            ws_url,
            locks_rpc_url,
            locks_contract,
            locks_array_slot,
            token_contract,
            token_decimals,
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_block_span,
            api_port,
            rate_limit_rpm,
            cors_origins,
        })
    }

    /// HTTP endpoint for transfers and heads.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Optional WebSocket endpoint.
    #[must_use]
    pub fn ws_url(&self) -> Option<&str> {
        self.ws_url.as_deref()
    }

    /// HTTP endpoint for storage reads.
    #[must_use]
    pub fn locks_rpc_url(&self) -> &str {
        &self.locks_rpc_url
    }

    /// Contract holding the lock array.
    #[must_use]
    pub const fn locks_contract(&self) -> Address {
        self.locks_contract
    }

    /// Storage layout of the lock array.
    #[must_use]
    pub fn locks_layout(&self) -> ArrayLayout {
        ArrayLayout::new(self.locks_array_slot, LOCK_STRUCT_WORDS)
    }

    /// Token whose transfers are aggregated.
    #[must_use]
    pub const fn token_contract(&self) -> Address {
        self.token_contract
    }

    /// Token decimal exponent.
    #[must_use]
    pub const fn token_decimals(&self) -> u8 {
        self.token_decimals
    }

    /// Polling interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Maximum blocks per log query.
    #[must_use]
    pub const fn max_block_span(&self) -> u64 {
        self.max_block_span
    }

    /// HTTP server port.
    #[must_use]
    pub const fn api_port(&self) -> u16 {
        self.api_port
    }

    /// API requests per minute.
    #[must_use]
    pub const fn rate_limit_rpm(&self) -> u32 {
        self.rate_limit_rpm
    }

    /// Allowed CORS origins.
    #[must_use]
    pub fn cors_origins(&self) -> &[String] {
        &self.cors_origins
    }

    /// Aggregator parameters, optionally overriding the polling interval.
    #[must_use]
    pub fn aggregator_settings(&self, poll_interval: Option<Duration>) -> AggregatorSettings {
        AggregatorSettings {
            token: self.token_contract,
            decimals: self.token_decimals,
            poll_interval: poll_interval.unwrap_or(self.poll_interval),
            max_block_span: self.max_block_span,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> WatchResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).filter(|raw| !raw.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            WatchError::config(format!("{key} has an invalid value: '{raw}'"), Some(Box::new(e)))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> WatchResult<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("RPC_URL", "https://rpc.example")]).unwrap();

        assert_eq!(config.rpc_url(), "https://rpc.example");
        assert_eq!(config.locks_rpc_url(), "https://rpc.example");
        assert_eq!(config.ws_url(), None);
        assert_eq!(config.locks_contract(), DEFAULT_LOCKS_CONTRACT);
        assert_eq!(config.locks_layout(), ArrayLayout::locks());
        assert_eq!(config.token_contract(), USDT_ADDRESS);
        assert_eq!(config.token_decimals(), 6);
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.max_block_span(), 10);
        assert_eq!(config.api_port(), 3000);
        assert_eq!(config.rate_limit_rpm(), 600);
        assert_eq!(config.cors_origins(), ["*".to_string()]);
    }

    #[test]
    fn test_missing_rpc_url() {
        assert!(matches!(load(&[]), Err(WatchError::ConfigError { .. })));
        assert!(load(&[("RPC_URL", "")]).is_err());
    }

    #[test]
    fn test_rpc_url_must_be_http() {
        let result = load(&[("RPC_URL", "your_key")]);
        assert!(matches!(result, Err(WatchError::ConfigError { .. })));
    }

    #[test]
    fn test_ws_url_must_be_ws() {
        let result = load(&[("RPC_URL", "http://a"), ("RPC_WS_URL", "http://b")]);
        assert!(result.is_err());

        let config = load(&[("RPC_URL", "http://a"), ("RPC_WS_URL", "wss://b")]).unwrap();
        assert_eq!(config.ws_url(), Some("wss://b"));
    }

    #[test]
    fn test_invalid_address_names_variable() {
        let err = load(&[("RPC_URL", "http://a"), ("LOCKS_CONTRACT", "0x1234")]).unwrap_err();
        assert!(err.to_string().contains("LOCKS_CONTRACT"), "{err}");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("RPC_URL", "http://a"),
            ("LOCKS_RPC_URL", "http://sepolia"),
            ("LOCKS_ARRAY_SLOT", "3"),
            ("TOKEN_CONTRACT", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            ("TOKEN_DECIMALS", "18"),
            ("POLL_INTERVAL_MS", "250"),
            ("MAX_BLOCK_SPAN", "50"),
            ("CORS_ORIGINS", "http://localhost:5173, https://app.example"),
        ])
        .unwrap();

        assert_eq!(config.locks_rpc_url(), "http://sepolia");
        assert_eq!(config.locks_layout().length_slot(), U256::from(3));
        assert_eq!(config.token_decimals(), 18);
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.max_block_span(), 50);
        assert_eq!(
            config.cors_origins(),
            ["http://localhost:5173".to_string(), "https://app.example".to_string()]
        );
    }

    #[test]
    fn test_zero_values_rejected() {
        for key in ["POLL_INTERVAL_MS", "MAX_BLOCK_SPAN", "RATE_LIMIT_RPM"] {
            let result = load(&[("RPC_URL", "http://a"), (key, "0")]);
            assert!(result.is_err(), "{key} = 0 should be rejected");
        }
    }

    #[test]
    fn test_decimals_bound() {
        assert!(load(&[("RPC_URL", "http://a"), ("TOKEN_DECIMALS", "77")]).is_ok());
        assert!(load(&[("RPC_URL", "http://a"), ("TOKEN_DECIMALS", "78")]).is_err());
    }

    #[test]
    fn test_aggregator_settings_override() {
        let config = load(&[("RPC_URL", "http://a")]).unwrap();
        let settings = config.aggregator_settings(Some(Duration::from_millis(5)));
        assert_eq!(settings.poll_interval, Duration::from_millis(5));
        assert_eq!(settings.token, USDT_ADDRESS);
        assert_eq!(settings.max_block_span, 10);
    }
}
