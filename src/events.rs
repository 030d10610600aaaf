//! ERC-20 `Transfer` events: binding, filters, decoding and normalization.
//!
//! The event type is generated with Alloy's `sol!` macro, so the signature
//! hash and the topic/data layout come straight from the Solidity
//! declaration:
//!
//! ```solidity
//! event Transfer(address indexed from, address indexed to, uint256 value);
//! ```
//!
//! Raw logs go through two steps before they reach the aggregator:
//!
//! 1. [`decode_transfer_log`] turns an RPC [`Log`] into a [`RawTransfer`]
//!    (still in the token's smallest unit).
//! 2. [`TransferRecord::normalize`] scales the value by the token's decimals
//!    and produces the display record used for deduplication.
//!
//! ## Example
//!
//! ```no_run
//! use eth_lock_watch::events::{create_transfer_filter, USDT_ADDRESS};
//! use eth_lock_watch::rpc::create_provider;
//! use alloy::providers::Provider;
//!
//! # async fn example() -> eyre::Result<()> {
//! let provider = create_provider("https://eth.llamarpc.com").await?;
//! let filter = create_transfer_filter(USDT_ADDRESS, 19_000_000, 19_000_010);
//! let logs = provider.get_logs(&filter).await?;
//! println!("Found {} Transfer events", logs.len());
//! # Ok(())
//! # }
//! ```

use alloy::primitives::{address, Address, B256, U256};
use alloy::rpc::types::{Filter, Log};
use alloy::sol;
use alloy::sol_types::SolEvent;
use serde::Serialize;

use crate::error::{WatchError, WatchResult};

sol! {
    /// ERC-20 transfer of `value` tokens from `from` to `to`.
    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// USDT (Tether USD) token address on Ethereum mainnet.
pub const USDT_ADDRESS: Address = address!("dAC17F958D2ee523a2206206994597C13D831ec7");

/// USDC token address on Ethereum mainnet.
pub const USDC_ADDRESS: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

/// Decimals of USDT and USDC.
pub const STABLECOIN_DECIMALS: u8 = 6;

/// Create a filter for `Transfer` events of `token` in `[from_block, to_block]`.
#[must_use]
pub fn create_transfer_filter(token: Address, from_block: u64, to_block: u64) -> Filter {
    Filter::new()
        .address(token)
        .event_signature(Transfer::SIGNATURE_HASH)
        .from_block(from_block)
        .to_block(to_block)
}

/// A decoded `Transfer` log, value still in the token's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransfer {
    /// Block that included the transfer.
    pub block_number: u64,
    /// Position of the log in its block, when the node reports it.
    pub log_index: Option<u64>,
    /// Sender.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Transferred amount in the smallest unit.
    pub value: U256,
    /// Transaction that emitted the log.
    pub transaction_hash: B256,
}

/// Sort transfers by block, then by position in the block.
///
/// The sort is stable, so transfers without a log index keep their relative
/// order and come first within their block.
pub fn sort_chain_order(transfers: &mut [RawTransfer]) {
    transfers.sort_by_key(|transfer| (transfer.block_number, transfer.log_index));
}

/// Decode an RPC log as a `Transfer` event.
///
/// # Errors
///
/// Returns [`WatchError::DecodingError`] if the log does not carry the
/// `Transfer` signature, has malformed topics or data, or lacks the block
/// number or transaction hash (pending logs).
pub fn decode_transfer_log(log: &Log) -> WatchResult<RawTransfer> {
    let decoded = Transfer::decode_log_data(log.data(), true).map_err(|e| {
        WatchError::decoding("log is not an ERC-20 Transfer", Some(Box::new(e)))
    })?;

    let block_number = log
        .block_number
        .ok_or_else(|| WatchError::decoding("Transfer log has no block number", None))?;
    let transaction_hash = log
        .transaction_hash
        .ok_or_else(|| WatchError::decoding("Transfer log has no transaction hash", None))?;

    Ok(RawTransfer {
        block_number,
        log_index: log.log_index,
        from: decoded.from,
        to: decoded.to,
        value: decoded.value,
        transaction_hash,
    })
}

/// Render `amount` scaled down by `10^decimals` as an exact decimal string.
///
/// Trailing fractional zeros are dropped, and so is the point when the
/// fraction is zero.
///
/// # Example
///
/// ```
/// use alloy::primitives::U256;
/// use eth_lock_watch::events::format_token_amount;
///
/// assert_eq!(format_token_amount(U256::from(1_500_000), 6), "1.5");
/// assert_eq!(format_token_amount(U256::from(2_000_000), 6), "2");
/// ```
#[must_use]
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let (whole, fraction) = amount.div_rem(divisor);
    if fraction.is_zero() {
        return whole.to_string();
    }

    let fraction = format!("{:0>width$}", fraction.to_string(), width = usize::from(decimals));
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}

/// A normalized transfer as shown to users.
///
/// Two records are the same transfer when every field is equal; one
/// transaction may emit several transfers, so the hash alone is not an
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    /// Block number, serialized as a decimal string.
    #[serde(serialize_with = "serialize_display")]
    pub block_number: u64,
    /// Sender.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Value scaled by the token's decimals.
    pub value: String,
    /// Transaction hash.
    pub transaction_hash: B256,
}

impl TransferRecord {
    /// Normalize a raw transfer for a token with `decimals` decimals.
    #[must_use]
    pub fn normalize(raw: &RawTransfer, decimals: u8) -> Self {
        Self {
            block_number: raw.block_number,
            from: raw.from,
            to: raw.to,
            value: format_token_amount(raw.value, decimals),
            transaction_hash: raw.transaction_hash,
        }
    }
}

fn serialize_display<S: serde::Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{b256, Log as PrimitiveLog};

    fn transfer_log(block_number: Option<u64>) -> Log {
        let event = Transfer {
            from: address!("1111111111111111111111111111111111111111"),
            to: address!("2222222222222222222222222222222222222222"),
            value: U256::from(2_500_000),
        };
        Log {
            inner: PrimitiveLog {
                address: USDT_ADDRESS,
                data: event.encode_log_data(),
            },
            block_number,
            transaction_hash: Some(b256!(
                "00000000000000000000000000000000000000000000000000000000000000aa"
            )),
            log_index: Some(3),
            ..Log::default()
        }
    }

    #[test]
    fn test_transfer_signature() {
        assert_eq!(
            Transfer::SIGNATURE_HASH,
            b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
        );
    }

    #[test]
    fn test_filter_creation() {
        let filter = create_transfer_filter(USDT_ADDRESS, 100, 110);
        assert_eq!(filter.get_from_block(), Some(100));
        assert_eq!(filter.get_to_block(), Some(110));
    }

    #[test]
    fn test_decode_transfer_log() {
        let raw = decode_transfer_log(&transfer_log(Some(42))).unwrap();
        assert_eq!(raw.block_number, 42);
        assert_eq!(raw.log_index, Some(3));
        assert_eq!(raw.from, address!("1111111111111111111111111111111111111111"));
        assert_eq!(raw.to, address!("2222222222222222222222222222222222222222"));
        assert_eq!(raw.value, U256::from(2_500_000));
    }

    #[test]
    fn test_pending_log_is_rejected() {
        let result = decode_transfer_log(&transfer_log(None));
        assert!(matches!(result, Err(WatchError::DecodingError { .. })));
    }

    #[test]
    fn test_foreign_event_is_rejected() {
        let mut log = transfer_log(Some(1));
        log.inner.data =
            alloy::primitives::LogData::new_unchecked(vec![B256::ZERO], alloy::primitives::Bytes::new());
        assert!(decode_transfer_log(&log).is_err());
    }

    #[test]
    fn test_sort_chain_order() {
        let raw = decode_transfer_log(&transfer_log(Some(42))).unwrap();
        let at = |block_number, log_index| RawTransfer {
            block_number,
            log_index,
            ..raw.clone()
        };
        let mut transfers = vec![at(43, Some(0)), at(42, Some(5)), at(42, None), at(42, Some(1))];
        sort_chain_order(&mut transfers);

        let keys: Vec<_> = transfers.iter().map(|t| (t.block_number, t.log_index)).collect();
        assert_eq!(keys, [(42, None), (42, Some(1)), (42, Some(5)), (43, Some(0))]);
    }

    #[test]
    fn test_format_token_amount() {
        assert_eq!(format_token_amount(U256::from(1_500_000), 6), "1.5");
        assert_eq!(format_token_amount(U256::from(2_000_000), 6), "2");
        assert_eq!(format_token_amount(U256::from(1), 6), "0.000001");
        assert_eq!(format_token_amount(U256::ZERO, 6), "0");
        assert_eq!(format_token_amount(U256::from(123), 0), "123");
        assert_eq!(
            format_token_amount(U256::from(1_000_000_000_000_000_000_u128), 18),
            "1"
        );
    }

    #[test]
    fn test_format_huge_amount_is_exact() {
        let formatted = format_token_amount(U256::MAX, 6);
        let (whole, fraction) = formatted.split_once('.').unwrap();
        assert_eq!(format!("{whole}{fraction}"), U256::MAX.to_string());
    }

    #[test]
    fn test_normalize_and_serialize() {
        let raw = decode_transfer_log(&transfer_log(Some(42))).unwrap();
        let record = TransferRecord::normalize(&raw, STABLECOIN_DECIMALS);
        assert_eq!(record.value, "2.5");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["blockNumber"], "42");
        assert_eq!(json["value"], "2.5");
        assert!(json.get("transactionHash").is_some());
    }

    #[test]
    fn test_same_hash_different_transfer_is_distinct() {
        let raw = decode_transfer_log(&transfer_log(Some(42))).unwrap();
        let a = TransferRecord::normalize(&raw, 6);
        let mut b = a.clone();
        b.to = address!("3333333333333333333333333333333333333333");
        assert_ne!(a, b);
        assert_eq!(a.transaction_hash, b.transaction_hash);
    }
}
