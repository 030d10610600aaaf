//! Command-line interface for the lock storage reader and transfer watcher.
//!
//! # Commands
//!
//! - `length`: Read the lock array length
//! - `slot <INDEX>`: Decode one lock element
//! - `locks`: Page through the whole array, printing records as they arrive
//! - `transfers`: Fetch recent `Transfer` events once
//! - `watch`: Aggregate `Transfer` events live
//! - `serve`: Run the HTTP API with a background loader and aggregator
//!
//! # Example
//!
//! ```bash
//! eth-lock-watch slot 0
//! eth-lock-watch transfers --blocks 50
//! eth-lock-watch watch --interval 2000
//! ```

use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregator::{fetch_history, BlockHead, LogAggregator};
use crate::api::server::run_server;
use crate::app_state::AppState;
use crate::config::Config;
use crate::error::{WatchError, WatchResult};
use crate::events::TransferRecord;
use crate::rpc::{check_connection, ChainClient};
use crate::storage::{checked_index, LoaderSnapshot, LockRecord, PaginatedLoader, SlotResolver};

/// Lock storage decoder and live transfer aggregator
#[derive(Parser, Debug)]
#[command(name = "eth-lock-watch")]
#[command(about = "Decode contract lock storage and aggregate ERC-20 transfers", long_about = None)]
#[command(version)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Read the lock array length
    Length,

    /// Decode the lock at INDEX
    Slot {
        /// Array index
        #[arg(allow_negative_numbers = true)]
        index: i64,
    },

    /// Read every populated lock, printing each as it is decoded
    Locks,

    /// Fetch transfers of recent blocks (one-time)
    Transfers {
        /// Number of recent blocks to scan (default: 100)
        #[arg(short, long, default_value = "100")]
        blocks: u64,
    },

    /// Aggregate transfers in real-time
    Watch {
        /// Polling interval in milliseconds (default: POLL_INTERVAL_MS)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Start the HTTP API
    Serve {
        /// Port to listen on (default: API_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Parse CLI arguments and execute the appropriate command.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration loading fails
/// - The node cannot be reached
/// - Command execution fails
pub async fn run() -> WatchResult<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Length => run_length_command(&config).await,
        Commands::Slot { index } => run_slot_command(&config, index).await,
        Commands::Locks => run_locks_command(&config).await,
        Commands::Transfers { blocks } => run_transfers_command(&config, blocks).await,
        Commands::Watch { interval } => {
            run_watch_command(&config, interval.map(Duration::from_millis)).await
        }
        Commands::Serve { port } => run_serve_command(&config, port).await,
    }
}

async fn locks_resolver(config: &Config) -> WatchResult<SlotResolver<ChainClient>> {
    let client = ChainClient::connect(config.locks_rpc_url(), None).await?;
    Ok(SlotResolver::with_layout(
        client,
        config.locks_contract(),
        config.locks_layout(),
    ))
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                println!();
                println!("{}", "🛑 Shutting down gracefully...".yellow().bold());
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        token.cancel();
    });
}

/// Execute the length command.
async fn run_length_command(config: &Config) -> WatchResult<()> {
    let resolver = locks_resolver(config).await?;
    let length = resolver.length().await?;

    println!(
        "{} {} has {} locks",
        "📦".cyan(),
        resolver.contract().to_string().dimmed(),
        length.to_string().yellow().bold()
    );
    Ok(())
}

/// Execute the slot command.
async fn run_slot_command(config: &Config, index: i64) -> WatchResult<()> {
    let index = checked_index(index)?;
    let resolver = locks_resolver(config).await?;

    match resolver.resolve(index).await? {
        Some(record) => print_lock(&record),
        None => println!(
            "{} Lock {} is absent (slot not written)",
            "∅".yellow(),
            index.to_string().yellow()
        ),
    }
    Ok(())
}

/// Execute the locks command (sequential pagination).
async fn run_locks_command(config: &Config) -> WatchResult<()> {
    let resolver = locks_resolver(config).await?;
    println!(
        "{} {}",
        "🔍 Reading locks of".cyan().bold(),
        resolver.contract().to_string().cyan()
    );

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut loader = PaginatedLoader::new(resolver);
    let mut progress = loader.subscribe();
    let mut printed = 0;

    let outcome = {
        let session = loader.run(&cancel);
        tokio::pin!(session);
        loop {
            tokio::select! {
                result = &mut session => break result,
                Ok(()) = progress.changed() => {
                    printed = print_new_locks(&progress.borrow_and_update(), printed);
                }
            }
        }
    };
    print_new_locks(&progress.borrow(), printed);

    let outcome = outcome.inspect_err(|e| {
        println!(
            "{} {} ({} locks read before the failure)",
            "⚠️  Error:".red().bold(),
            e,
            loader.snapshot().records.len()
        );
    })?;

    println!(
        "{} {} locks read, reported length {}, stopped: {}",
        "✅".green(),
        outcome.records.len().to_string().green().bold(),
        outcome
            .length
            .map_or_else(|| "unknown".to_string(), |length| length.to_string())
            .yellow(),
        outcome.completion
    );
    Ok(())
}

/// Execute the transfers command (one-time historical fetch).
async fn run_transfers_command(config: &Config, blocks: u64) -> WatchResult<()> {
    info!(blocks, "Fetching recent transfers");
    let client = ChainClient::connect(config.rpc_url(), None).await?;

    let transfers = fetch_history(
        &client,
        config.token_contract(),
        config.token_decimals(),
        blocks,
        config.max_block_span(),
    )
    .await?;

    if transfers.is_empty() {
        warn!(blocks, "No transfers found");
        println!(
            "{}",
            "No transfers found. Try increasing --blocks.".yellow().bold()
        );
        return Ok(());
    }

    for transfer in &transfers {
        print_transfer(transfer);
    }
    println!(
        "{} {} transfers in the last {} blocks",
        "✅".green(),
        transfers.len().to_string().green().bold(),
        blocks
    );
    Ok(())
}

/// Execute the watch command (live aggregation).
async fn run_watch_command(config: &Config, interval: Option<Duration>) -> WatchResult<()> {
    let settings = config.aggregator_settings(interval);
    if settings.poll_interval.is_zero() {
        return Err(WatchError::config("--interval must be positive", None));
    }

    info!("Starting transfer watch mode");
    println!("{}", "🔍 Watching for token transfers...".cyan().bold());
    println!();

    let client = ChainClient::connect(config.rpc_url(), config.ws_url().map(String::from)).await?;
    let (aggregator, handle) = LogAggregator::new(client, settings);

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());
    let task = tokio::spawn(aggregator.run(shutdown.clone()));

    let mut heads = handle.heads.clone();
    let mut transfers = handle.transfers.clone();
    let mut shown = 0;

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            Ok(()) = heads.changed() => {
                if let Some(head) = *heads.borrow_and_update() {
                    print_head(head);
                }
            }
            Ok(()) = transfers.changed() => {
                let snapshot = transfers.borrow_and_update().clone();
                let added = snapshot.len().saturating_sub(shown);
                for transfer in snapshot.iter().take(added).rev() {
                    print_transfer(transfer);
                }
                shown = snapshot.len();
            }
            else => break,
        }
    }

    shutdown.cancel();
    let stats = task
        .await
        .map_err(|e| WatchError::state("aggregator task failed", Some(Box::new(e))))?;

    println!(
        "{} {} cycles ({} failed), {} distinct transfers",
        "📍".cyan(),
        stats.cycles,
        stats.failed_cycles.to_string().red(),
        stats.records.to_string().green()
    );
    println!("{}", "👋 Shutdown complete".green().bold());
    Ok(())
}

/// Execute the serve command.
async fn run_serve_command(config: &Config, port: Option<u16>) -> WatchResult<()> {
    let port = port.unwrap_or_else(|| config.api_port());
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let resolver = locks_resolver(config).await?;
    let chain = ChainClient::connect(config.rpc_url(), config.ws_url().map(String::from)).await?;
    if let Err(e) = check_connection(chain.provider()).await {
        warn!(error = %e, "Node not reachable yet, serving degraded until it answers");
    }

    let mut loader = PaginatedLoader::new(resolver.clone());
    let locks = loader.subscribe();
    let loader_cancel = shutdown.child_token();
    let loader_task = tokio::spawn(async move {
        match loader.run(&loader_cancel).await {
            Ok(outcome) => info!(
                records = outcome.records.len(),
                completion = %outcome.completion,
                "Lock pagination finished"
            ),
            Err(e) => warn!(error = %e, "Lock pagination failed, serving partial results"),
        }
    });

    let (aggregator, handle) = LogAggregator::new(chain.clone(), config.aggregator_settings(None));
    let aggregator_task = tokio::spawn(aggregator.run(shutdown.child_token()));

    let state = AppState::new(resolver, locks, handle, chain);
    println!(
        "{} API listening on port {} (docs at /swagger-ui)",
        "🚀".cyan(),
        port.to_string().yellow().bold()
    );

    let served = run_server(
        state,
        port,
        config.rate_limit_rpm(),
        config.cors_origins(),
        shutdown.clone(),
    )
    .await;

    shutdown.cancel();
    if let Err(e) = loader_task.await {
        warn!(error = %e, "Loader task failed");
    }
    match aggregator_task.await {
        Ok(stats) => info!(cycles = stats.cycles, records = stats.records, "Aggregator stopped"),
        Err(e) => warn!(error = %e, "Aggregator task failed"),
    }

    served.map_err(|e| WatchError::state("API server failed", Some(e)))
}

/// Print records of `snapshot` beyond the first `printed`; returns the new
/// count.
fn print_new_locks(snapshot: &LoaderSnapshot, printed: usize) -> usize {
    for record in snapshot.records.iter().skip(printed) {
        print_lock(record);
    }
    snapshot.records.len().max(printed)
}

/// Display one lock.
fn print_lock(record: &LockRecord) {
    println!(
        "{} #{} | Holder: {} | Start: {} | Amount: {}",
        "🔒".cyan(),
        record.index.to_string().yellow(),
        record.holder_hex().blue(),
        record.start_time_local().dimmed(),
        record.amount_decimal().green().bold()
    );
}

/// Display one transfer.
fn print_transfer(transfer: &TransferRecord) {
    println!(
        "{} Block: {} | {} → {} | Value: {} | Tx: {}",
        "💸".cyan(),
        transfer.block_number.to_string().yellow(),
        transfer.from.to_string().blue(),
        transfer.to.to_string().blue(),
        transfer.value.green().bold(),
        transfer.transaction_hash.to_string().dimmed()
    );
}

/// Display a new head.
fn print_head(head: BlockHead) {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    println!(
        "{} {} Block: {} | Hash: {}",
        "📊".cyan(),
        timestamp.to_string().dimmed(),
        head.number.to_string().yellow(),
        head.hash.to_string().dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        for command in ["length", "locks", "transfers", "watch", "serve"] {
            let cli = Cli::try_parse_from(["eth-lock-watch", command]);
            assert!(cli.is_ok(), "{command}");
        }
        assert!(Cli::try_parse_from(["eth-lock-watch"]).is_err());
    }

    #[test]
    fn test_slot_accepts_negative_index() {
        let cli = Cli::try_parse_from(["eth-lock-watch", "slot", "-1"]);
        assert!(matches!(
            cli,
            Ok(Cli {
                command: Commands::Slot { index: -1 }
            })
        ));
        assert!(checked_index(-1).is_err());
    }

    #[test]
    fn test_transfers_command_with_blocks() {
        let cli = Cli::try_parse_from(["eth-lock-watch", "transfers", "--blocks", "200"]);
        assert!(matches!(
            cli,
            Ok(Cli {
                command: Commands::Transfers { blocks: 200 }
            })
        ));

        let cli = Cli::try_parse_from(["eth-lock-watch", "transfers"]);
        assert!(matches!(
            cli,
            Ok(Cli {
                command: Commands::Transfers { blocks: 100 }
            })
        ));
    }

    #[test]
    fn test_watch_and_serve_options() {
        let cli = Cli::try_parse_from(["eth-lock-watch", "watch", "--interval", "250"]);
        assert!(matches!(
            cli,
            Ok(Cli {
                command: Commands::Watch {
                    interval: Some(250)
                }
            })
        ));

        let cli = Cli::try_parse_from(["eth-lock-watch", "serve", "-p", "8080"]);
        assert!(matches!(
            cli,
            Ok(Cli {
                command: Commands::Serve { port: Some(8080) }
            })
        ));
    }

    #[test]
    fn test_print_new_locks_counts_only_new_records() {
        let record = LockRecord {
            index: 0,
            holder: alloy::primitives::Address::ZERO,
            start_time: 1_700_000_000,
            amount: alloy::primitives::U256::from(1),
        };
        let snapshot = LoaderSnapshot {
            records: vec![record.clone(), LockRecord { index: 1, ..record }],
            ..LoaderSnapshot::default()
        };
        assert_eq!(print_new_locks(&snapshot, 0), 2);
        assert_eq!(print_new_locks(&snapshot, 2), 2);
    }
}
