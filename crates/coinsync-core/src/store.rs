//! Store reconciler contract and its DuckDB implementation.
//!
//! `NotFound` and `Conflict` are ordinary values here (`Option::None` and
//! [`InsertOutcome::Conflict`]); [`StoreError`] is reserved for the store
//! being unreachable, slow, or refusing input.

use std::sync::Arc;
use std::time::Duration;

use coinsync_warehouse::{CoinRecord, CoinRow, SyncLogRecord, Warehouse, WarehouseError};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{CoinSymbol, MarketRecord, NewCoin, UtcDateTime};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    #[error("store call '{operation}' timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u128,
    },

    #[error("store rejected input: {message}")]
    InvalidInput { message: String },

    #[error("stored row is unreadable: {message}")]
    Corrupt { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

impl From<WarehouseError> for StoreError {
    fn from(error: WarehouseError) -> Self {
        match error {
            WarehouseError::Rejected(message) => Self::InvalidInput { message },
            WarehouseError::Conflict { id } => Self::InvalidInput {
                message: format!("coin '{id}' already exists"),
            },
            other => Self::unavailable(other.to_string()),
        }
    }
}

/// Result of the non-overwriting insert path.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(MarketRecord),
    Conflict { id: String },
}

/// How a sync cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Reconciled,
    FetchFailed,
    ReconcileFailed,
}

impl CycleStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reconciled => "reconciled",
            Self::FetchFailed => "fetch_failed",
            Self::ReconcileFailed => "reconcile_failed",
        }
    }
}

/// Audit row written once per cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleAudit {
    pub cycle_id: Uuid,
    pub started_at: UtcDateTime,
    pub status: CycleStatus,
    pub fetched: usize,
    pub upserted: usize,
    pub added: usize,
    pub removed: usize,
    pub detail: Option<String>,
}

/// Durable store operations used by the sync loop and the tool surface.
///
/// Implementations are blocking; async callers go through [`run_blocking`].
pub trait MarketStore: Send + Sync {
    /// Insert or overwrite by `id`; always refreshes `last_updated`.
    fn upsert_batch(&self, records: &[MarketRecord]) -> Result<usize, StoreError>;

    fn fetch_all(&self) -> Result<Vec<MarketRecord>, StoreError>;

    fn fetch_by_symbol(&self, symbol: &CoinSymbol) -> Result<Option<MarketRecord>, StoreError>;

    /// Insert without overwriting. An existing `id` yields [`InsertOutcome::Conflict`].
    fn insert_one(&self, coin: &NewCoin) -> Result<InsertOutcome, StoreError>;

    fn update_price(
        &self,
        symbol: &CoinSymbol,
        price_usd: f64,
    ) -> Result<Option<MarketRecord>, StoreError>;

    /// Read, then delete. Returns the state read before the delete.
    fn delete_by_symbol(&self, symbol: &CoinSymbol) -> Result<Option<MarketRecord>, StoreError>;

    fn record_cycle(&self, audit: &CycleAudit) -> Result<(), StoreError>;
}

impl MarketStore for Warehouse {
    fn upsert_batch(&self, records: &[MarketRecord]) -> Result<usize, StoreError> {
        let rows = records
            .iter()
            .map(|record| CoinRecord {
                id: record.id.clone(),
                symbol: record.symbol.to_string(),
                name: record.name.clone(),
                price_in_usd: record.price_usd,
            })
            .collect::<Vec<_>>();
        Ok(self.upsert_coins(&rows)?)
    }

    fn fetch_all(&self) -> Result<Vec<MarketRecord>, StoreError> {
        self.list_coins()?.into_iter().map(record_from_row).collect()
    }

    fn fetch_by_symbol(&self, symbol: &CoinSymbol) -> Result<Option<MarketRecord>, StoreError> {
        self.coin_by_symbol(symbol.as_str())?
            .map(record_from_row)
            .transpose()
    }

    fn insert_one(&self, coin: &NewCoin) -> Result<InsertOutcome, StoreError> {
        let row = CoinRecord {
            id: coin.id.clone(),
            symbol: coin.symbol.to_string(),
            name: coin.name.clone(),
            price_in_usd: coin.price_usd,
        };
        match self.insert_coin(&row) {
            Ok(stored) => Ok(InsertOutcome::Inserted(record_from_row(stored)?)),
            Err(WarehouseError::Conflict { id }) => Ok(InsertOutcome::Conflict { id }),
            Err(error) => Err(error.into()),
        }
    }

    fn update_price(
        &self,
        symbol: &CoinSymbol,
        price_usd: f64,
    ) -> Result<Option<MarketRecord>, StoreError> {
        self.update_coin_price(symbol.as_str(), price_usd)?
            .map(record_from_row)
            .transpose()
    }

    fn delete_by_symbol(&self, symbol: &CoinSymbol) -> Result<Option<MarketRecord>, StoreError> {
        self.delete_coins_by_symbol(symbol.as_str())?
            .map(record_from_row)
            .transpose()
    }

    fn record_cycle(&self, audit: &CycleAudit) -> Result<(), StoreError> {
        self.record_sync(&SyncLogRecord {
            cycle_id: audit.cycle_id.to_string(),
            started_at: audit.started_at.into_inner(),
            status: audit.status.as_str().to_owned(),
            fetched: audit.fetched as u64,
            upserted: audit.upserted as u64,
            added: audit.added as u64,
            removed: audit.removed as u64,
            detail: audit.detail.clone(),
        })?;
        Ok(())
    }
}

fn record_from_row(row: CoinRow) -> Result<MarketRecord, StoreError> {
    let corrupt = |error: crate::ValidationError| StoreError::Corrupt {
        message: format!("row '{}': {error}", row.id),
    };
    let symbol = CoinSymbol::parse(&row.symbol).map_err(corrupt)?;
    let last_updated = UtcDateTime::parse(&row.last_updated).map_err(corrupt)?;
    MarketRecord::new(
        row.id.clone(),
        symbol,
        row.name.clone(),
        row.price_in_usd,
        last_updated,
    )
    .map_err(corrupt)
}

/// Run a blocking store call on the blocking pool, bounded by `timeout`.
///
/// A timed-out call keeps running in the background; its result is dropped.
/// [`crate::SyncLoop`] does not use this for upserts: it keeps the handle so
/// two upserts never overlap.
/// A panic inside the call is resumed on the caller.
pub async fn run_blocking<T, F>(
    store: &Arc<dyn MarketStore>,
    timeout: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn MarketStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    let task = tokio::task::spawn_blocking(move || call(store.as_ref()));

    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(StoreError::Timeout {
            operation,
            after_ms: timeout.as_millis(),
        }),
        Ok(joined) => join_store_call(joined, operation),
    }
}

/// Unwrap a finished blocking store call, resuming its panic if it had one.
pub(crate) fn join_store_call<T>(
    joined: Result<Result<T, StoreError>, tokio::task::JoinError>,
    operation: &'static str,
) -> Result<T, StoreError> {
    match joined {
        Ok(result) => result,
        Err(join_error) if join_error.is_panic() => {
            std::panic::resume_unwind(join_error.into_panic())
        }
        Err(join_error) => Err(StoreError::unavailable(format!(
            "store call '{operation}' was cancelled: {join_error}"
        ))),
    }
}
