//! CLI argument definitions for coinsync.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sync` | Run the fetch/diff/reconcile loop (or one cycle with `--once`) |
//! | `coins` | CRUD over the local replica |
//! | `tools` | List the tool surface |
//! | `serve` | NDJSON tool server on stdin/stdout (`--sync` also runs the loop in-process) |
//! | `history` | Recent sync cycle audit rows |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--log-level` | `info` | Log filter when `RUST_LOG` is unset |
//! | `--log-dir` | none | Also write daily-rotated log files here |
//! | `--db-path` | `$COINSYNC_DB_PATH` | Store file override |
//!
//! # Examples
//!
//! ```bash
//! coinsync sync --once --pretty
//! coinsync coins add cardano ADA Cardano 0.45
//! coinsync coins update-price ada 0.48
//! echo '{"id":1,"tool":"get_by_symbol","args":{"symbol":"btc"}}' | coinsync serve
//! coinsync serve --sync --interval-secs 30
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "coinsync",
    author,
    version,
    about = "Keep a local replica of top-ranked cryptocurrency market data",
    long_about = "coinsync polls a market-data provider for the top-N coins by market cap, \
reports coins entering or leaving the ranking, and upserts each snapshot into a local \
DuckDB file. The same file is exposed through CRUD tools.\n\
\n\
Configuration comes from COINSYNC_* environment variables (a .env file is honoured)."
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Directory for daily-rotated log files.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// DuckDB file to use instead of COINSYNC_DB_PATH.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the synchronization loop.
    Sync(SyncArgs),
    /// Read and modify stored coins.
    Coins {
        #[command(subcommand)]
        command: CoinsCommand,
    },
    /// List available tools.
    Tools,
    /// Serve tool calls as newline-delimited JSON on stdin/stdout.
    Serve(ServeArgs),
    /// Show recent sync cycles.
    History(HistoryArgs),
}

#[derive(Debug, Clone, Args)]
pub struct SyncArgs {
    /// Run a single cycle, print its report and exit.
    #[arg(long, default_value_t = false)]
    pub once: bool,

    /// Seconds to sleep between cycles.
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Number of top-ranked coins to fetch.
    #[arg(long)]
    pub size: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Also run the sync loop against the same store until stdin closes.
    ///
    /// DuckDB admits one writing process per file, so this is the way to
    /// keep the replica fresh while tools are being served.
    #[arg(long, default_value_t = false)]
    pub sync: bool,

    /// Seconds to sleep between cycles (with `--sync`).
    #[arg(long, requires = "sync")]
    pub interval_secs: Option<u64>,

    /// Number of top-ranked coins to fetch (with `--sync`).
    #[arg(long, requires = "sync")]
    pub size: Option<usize>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CoinsCommand {
    /// List every stored coin.
    List,
    /// Look up one coin by symbol.
    Get { symbol: String },
    /// Insert a new coin; fails if the id exists.
    Add {
        id: String,
        symbol: String,
        name: String,
        price: f64,
    },
    /// Set the USD price for a symbol.
    UpdatePrice { symbol: String, price: f64 },
    /// Delete a coin by symbol.
    Delete { symbol: String },
}

#[derive(Debug, Clone, Args)]
pub struct HistoryArgs {
    /// Maximum rows to show.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}
