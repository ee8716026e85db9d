//! # Coinsync Warehouse
//!
//! DuckDB-backed replica of ranked cryptocurrency market data.
//!
//! ## Overview
//!
//! The warehouse is the system of record for `coinsync`. It owns no long-lived
//! in-memory state beyond its connection pool; every operation is a short
//! parameterized statement (or a small transaction) against the database file.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use coinsync_warehouse::{CoinRecord, Warehouse};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!
//!     warehouse.upsert_coins(&[CoinRecord {
//!         id: "bitcoin".to_string(),
//!         symbol: "BTC".to_string(),
//!         name: "Bitcoin".to_string(),
//!         price_in_usd: 65_000.0,
//!     }])?;
//!
//!     if let Some(row) = warehouse.coin_by_symbol("BTC")? {
//!         println!("{} = ${:.2}", row.symbol, row.price_in_usd);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `cryptocurrencies` | One row per coin, keyed by provider `id` |
//! | `sync_log` | One audit row per completed sync cycle |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
pub mod migrations;

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::Connection;
use ::duckdb::ToSql;
use serde::Serialize;
use thiserror::Error;
use time::macros::format_description;
use time::OffsetDateTime;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};

const SELECT_COIN_COLUMNS: &str = "SELECT id, symbol, name, price_in_usd, \
     strftime(last_updated, '%Y-%m-%dT%H:%M:%S.%fZ') AS last_updated \
     FROM cryptocurrencies";

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A plain insert hit an existing primary key.
    #[error("coin '{id}' already exists")]
    Conflict { id: String },

    /// The row was rejected before reaching the database.
    #[error("row rejected: {0}")]
    Rejected(String),

    /// Write timestamp could not be rendered.
    #[error("timestamp formatting failed: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for coinsync data.
    pub coinsync_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let coinsync_home = resolve_coinsync_home();
        let db_path = coinsync_home.join("coinsync.duckdb");
        Self {
            coinsync_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl WarehouseConfig {
    /// Config rooted at an explicit database file.
    pub fn at_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }
}

/// A coin row submitted for writing. `last_updated` is always set by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CoinRecord {
    /// Provider identifier, e.g. "bitcoin". Conflict target for upserts.
    pub id: String,
    /// Ticker, already normalized to uppercase by the caller.
    pub symbol: String,
    /// Display name.
    pub name: String,
    /// Price in USD.
    pub price_in_usd: f64,
}

/// A coin row as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoinRow {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub price_in_usd: f64,
    /// RFC3339 UTC timestamp of the last write.
    pub last_updated: String,
}

/// One audit entry describing a finished sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncLogRecord {
    pub cycle_id: String,
    pub started_at: OffsetDateTime,
    pub status: String,
    pub fetched: u64,
    pub upserted: u64,
    pub added: u64,
    pub removed: u64,
    pub detail: Option<String>,
}

/// A `sync_log` row as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncLogEntry {
    pub cycle_id: String,
    pub started_at: String,
    pub status: String,
    pub fetched: u64,
    pub upserted: u64,
    pub added: u64,
    pub removed: u64,
    pub detail: Option<String>,
}

/// The replica store.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse with the specified configuration and apply migrations.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let warehouse = Self { config, manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Initialize the database schema.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Get the configuration the warehouse was opened with.
    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// Insert or overwrite coins keyed by `id`, in one transaction.
    ///
    /// Rows repeating an `id` within the batch collapse to the last occurrence.
    /// Returns the number of distinct rows written.
    pub fn upsert_coins(&self, rows: &[CoinRecord]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }
        for row in rows {
            check_row(row)?;
        }

        let rows = last_occurrence_per_id(rows);
        let written_at = write_timestamp()?;
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let mut statement = connection.prepare(
                "INSERT INTO cryptocurrencies (id, symbol, name, price_in_usd, last_updated) \
                 VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP)) \
                 ON CONFLICT (id) DO UPDATE SET \
                 symbol = excluded.symbol, \
                 name = excluded.name, \
                 price_in_usd = excluded.price_in_usd, \
                 last_updated = excluded.last_updated",
            )?;
            for row in &rows {
                let params: [&dyn ToSql; 5] = [
                    &row.id,
                    &row.symbol,
                    &row.name,
                    &row.price_in_usd,
                    &written_at,
                ];
                statement.execute(params.as_slice())?;
            }
            Ok(rows.len())
        })();

        finalize_transaction(&connection, result)
    }

    /// Every stored coin, ordered by symbol then id.
    pub fn list_coins(&self) -> Result<Vec<CoinRow>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let sql = format!("{SELECT_COIN_COLUMNS} ORDER BY symbol, id");
        let mut statement = connection.prepare(sql.as_str())?;
        let rows = statement
            .query_map([], read_coin)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Number of stored coins.
    pub fn coin_count(&self) -> Result<usize, WarehouseError> {
        let connection = self.manager.acquire()?;
        let count: i64 =
            connection.query_row("SELECT COUNT(*) FROM cryptocurrencies", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Exact-match lookup on the stored symbol. Callers normalize case.
    pub fn coin_by_symbol(&self, symbol: &str) -> Result<Option<CoinRow>, WarehouseError> {
        let connection = self.manager.acquire()?;
        first_coin_by_symbol(&connection, symbol)
    }

    /// Insert a new coin; never overwrites an existing `id`.
    pub fn insert_coin(&self, row: &CoinRecord) -> Result<CoinRow, WarehouseError> {
        check_row(row)?;
        let written_at = write_timestamp()?;
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<CoinRow, WarehouseError> {
            let existing: i64 = connection.query_row(
                "SELECT COUNT(*) FROM cryptocurrencies WHERE id = ?",
                [&row.id],
                |r| r.get(0),
            )?;
            if existing > 0 {
                return Err(WarehouseError::Conflict { id: row.id.clone() });
            }

            let params: [&dyn ToSql; 5] = [
                &row.id,
                &row.symbol,
                &row.name,
                &row.price_in_usd,
                &written_at,
            ];
            connection
                .execute(
                    "INSERT INTO cryptocurrencies (id, symbol, name, price_in_usd, last_updated) \
                     VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP))",
                    params.as_slice(),
                )
                .map_err(|error| {
                    if is_duplicate_key(&error) {
                        WarehouseError::Conflict { id: row.id.clone() }
                    } else {
                        WarehouseError::DuckDb(error)
                    }
                })?;

            coin_by_id(&connection, &row.id)?.ok_or_else(|| {
                WarehouseError::Rejected(format!("inserted coin '{}' is not readable", row.id))
            })
        })();

        finalize_transaction(&connection, result)
    }

    /// Set the price of every row carrying `symbol`. `None` when no row matched.
    pub fn update_coin_price(
        &self,
        symbol: &str,
        price_in_usd: f64,
    ) -> Result<Option<CoinRow>, WarehouseError> {
        check_price(price_in_usd)?;
        let written_at = write_timestamp()?;
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<Option<CoinRow>, WarehouseError> {
            let params: [&dyn ToSql; 3] = [&price_in_usd, &written_at, &symbol];
            let changed = connection.execute(
                "UPDATE cryptocurrencies \
                 SET price_in_usd = ?, last_updated = CAST(? AS TIMESTAMP) \
                 WHERE symbol = ?",
                params.as_slice(),
            )?;
            if changed == 0 {
                return Ok(None);
            }
            first_coin_by_symbol(&connection, symbol)
        })();

        finalize_transaction(&connection, result)
    }

    /// Read the row for `symbol`, then delete every row carrying it.
    ///
    /// Returns the state read before the delete, or `None` when nothing matched.
    pub fn delete_coins_by_symbol(&self, symbol: &str) -> Result<Option<CoinRow>, WarehouseError> {
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<Option<CoinRow>, WarehouseError> {
            let Some(prior) = first_coin_by_symbol(&connection, symbol)? else {
                return Ok(None);
            };
            connection.execute("DELETE FROM cryptocurrencies WHERE symbol = ?", [symbol])?;
            Ok(Some(prior))
        })();

        finalize_transaction(&connection, result)
    }

    /// Append one audit row to `sync_log`.
    pub fn record_sync(&self, record: &SyncLogRecord) -> Result<(), WarehouseError> {
        let started_at = sql_timestamp(record.started_at)?;
        let logged_at = write_timestamp()?;
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 9] = [
            &record.cycle_id,
            &started_at,
            &record.status,
            &record.fetched,
            &record.upserted,
            &record.added,
            &record.removed,
            &record.detail,
            &logged_at,
        ];
        connection.execute(
            "INSERT INTO sync_log \
             (cycle_id, started_at, status, fetched, upserted, added, removed, detail, logged_at) \
             VALUES (?, CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Most recent audit rows, newest first.
    pub fn recent_syncs(&self, limit: usize) -> Result<Vec<SyncLogEntry>, WarehouseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT cycle_id, strftime(started_at, '%Y-%m-%dT%H:%M:%S.%fZ'), status, \
             fetched, upserted, added, removed, detail \
             FROM sync_log ORDER BY logged_at DESC, started_at DESC LIMIT ?",
        )?;
        let rows = statement
            .query_map([limit], |row| {
                Ok(SyncLogEntry {
                    cycle_id: row.get(0)?,
                    started_at: row.get(1)?,
                    status: row.get(2)?,
                    fetched: row.get(3)?,
                    upserted: row.get(4)?,
                    added: row.get(5)?,
                    removed: row.get(6)?,
                    detail: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn first_coin_by_symbol(
    connection: &Connection,
    symbol: &str,
) -> Result<Option<CoinRow>, WarehouseError> {
    let sql = format!("{SELECT_COIN_COLUMNS} WHERE symbol = ? ORDER BY id LIMIT 1");
    let mut statement = connection.prepare(sql.as_str())?;
    let mut rows = statement.query([symbol])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_coin(row)?)),
        None => Ok(None),
    }
}

fn coin_by_id(connection: &Connection, id: &str) -> Result<Option<CoinRow>, WarehouseError> {
    let sql = format!("{SELECT_COIN_COLUMNS} WHERE id = ?");
    let mut statement = connection.prepare(sql.as_str())?;
    let mut rows = statement.query([id])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_coin(row)?)),
        None => Ok(None),
    }
}

fn read_coin(row: &::duckdb::Row<'_>) -> Result<CoinRow, ::duckdb::Error> {
    Ok(CoinRow {
        id: row.get(0)?,
        symbol: row.get(1)?,
        name: row.get(2)?,
        price_in_usd: row.get(3)?,
        last_updated: row.get(4)?,
    })
}

fn last_occurrence_per_id(rows: &[CoinRecord]) -> Vec<&CoinRecord> {
    let mut seen = HashSet::with_capacity(rows.len());
    let mut unique = rows
        .iter()
        .rev()
        .filter(|row| seen.insert(row.id.as_str()))
        .collect::<Vec<_>>();
    unique.reverse();
    unique
}

fn check_row(row: &CoinRecord) -> Result<(), WarehouseError> {
    if row.id.trim().is_empty() {
        return Err(WarehouseError::Rejected(String::from("id must not be empty")));
    }
    if row.symbol.trim().is_empty() {
        return Err(WarehouseError::Rejected(format!(
            "symbol for '{}' must not be empty",
            row.id
        )));
    }
    check_price(row.price_in_usd)
}

fn check_price(price: f64) -> Result<(), WarehouseError> {
    if !price.is_finite() || price < 0.0 {
        return Err(WarehouseError::Rejected(format!(
            "price_in_usd must be finite and non-negative, got {price}"
        )));
    }
    Ok(())
}

fn is_duplicate_key(error: &::duckdb::Error) -> bool {
    let message = error.to_string();
    message.contains("Duplicate key") || message.contains("PRIMARY KEY or UNIQUE constraint")
}

/// Current UTC time in the form DuckDB casts to `TIMESTAMP`.
fn write_timestamp() -> Result<String, WarehouseError> {
    sql_timestamp(OffsetDateTime::now_utc())
}

fn sql_timestamp(value: OffsetDateTime) -> Result<String, WarehouseError> {
    let utc = value.to_offset(time::UtcOffset::UTC);
    Ok(utc.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]"
    ))?)
}

/// Resolve the coinsync home directory from environment or default.
fn resolve_coinsync_home() -> PathBuf {
    if let Some(path) = env::var_os("COINSYNC_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".coinsync");
    }

    PathBuf::from(".coinsync")
}
