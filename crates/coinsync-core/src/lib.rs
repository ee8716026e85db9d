//! # Coinsync Core
//!
//! Keeps a local replica of ranked cryptocurrency market data in sync with an
//! external provider, and exposes CRUD tools over that replica.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters (CoinGecko) |
//! | [`config`] | Environment-driven runtime configuration |
//! | [`data_source`] | Snapshot provider trait and fetch errors |
//! | [`domain`] | Domain models (MarketRecord, CoinSymbol, UtcDateTime) |
//! | [`error`] | Validation and top-level errors |
//! | [`http_client`] | HTTP client abstraction |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`membership`] | Ranked-membership diffing |
//! | [`runtime`] | Config-to-component wiring |
//! | [`schema`] | Untyped provider item validation |
//! | [`store`] | Store contract and DuckDB implementation |
//! | [`sync`] | The synchronization loop |
//! | [`tools`] | CRUD tool surface |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   fetch_top_n   ┌──────────────────┐
//! │   SyncLoop   │────────────────▶│ MarketDataSource │──▶ HttpClient
//! │  (tracker)   │                 └──────────────────┘
//! └──────┬───────┘
//!        │ upsert_batch / record_cycle
//!        ▼
//! ┌──────────────┐                 ┌──────────────────┐
//! │ MarketStore  │◀────────────────│   ToolSurface    │◀── CLI / NDJSON
//! │  (DuckDB)    │  CRUD           └──────────────────┘
//! └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use coinsync_core::{runtime, AppConfig, MarketStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let store: Arc<dyn MarketStore> = Arc::new(runtime::open_warehouse(&config)?);
//!     let mut sync = runtime::build_sync_loop(&config, store)?;
//!     let report = sync.run_cycle().await;
//!     println!("upserted {}", report.upserted());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod logging;
pub mod membership;
pub mod runtime;
pub mod schema;
pub mod store;
pub mod sync;
pub mod tools;

pub use adapters::CoinGeckoAdapter;
pub use config::{AppConfig, ConfigError};
pub use data_source::{FetchError, FetchErrorKind, MarketDataSource};
pub use domain::{validate_price, CoinSymbol, MarketRecord, NewCoin, UtcDateTime};
pub use error::{CoreError, ValidationError};
pub use membership::{MembershipDiff, MembershipTracker};
pub use store::{CycleAudit, CycleStatus, InsertOutcome, MarketStore, StoreError};
pub use sync::{CycleOutcome, CycleReport, SyncLoop, SyncPhase, SyncSettings};
pub use tools::ToolSurface;
