//! Wiring from [`AppConfig`] to live components.

use std::sync::Arc;

use coinsync_warehouse::{Warehouse, WarehouseConfig};
use tracing::info;

use crate::adapters::CoinGeckoAdapter;
use crate::config::AppConfig;
use crate::store::{MarketStore, StoreError};
use crate::sync::SyncLoop;
use crate::CoreError;

/// Open (and migrate) the DuckDB store named by `config`.
pub fn open_warehouse(config: &AppConfig) -> Result<Warehouse, CoreError> {
    let warehouse = Warehouse::open(WarehouseConfig {
        coinsync_home: config.home.clone(),
        db_path: config.db_path.clone(),
        ..WarehouseConfig::default()
    })
    .map_err(StoreError::from)?;
    info!(db_path = %warehouse.db_path().display(), "store opened");
    Ok(warehouse)
}

/// CoinGecko adapter using the configured key, base URL and timeout.
pub fn coingecko_source(config: &AppConfig) -> Result<CoinGeckoAdapter, CoreError> {
    let api_key = config.require_api_key()?;
    let timeout_ms = u64::try_from(config.fetch_timeout.as_millis()).unwrap_or(u64::MAX);
    Ok(CoinGeckoAdapter::new(api_key)
        .with_base_url(config.provider_url.as_str())
        .with_timeout_ms(timeout_ms))
}

/// A sync loop reading from CoinGecko and writing to `store`.
pub fn build_sync_loop(
    config: &AppConfig,
    store: Arc<dyn MarketStore>,
) -> Result<SyncLoop, CoreError> {
    let source = coingecko_source(config)?;
    Ok(SyncLoop::new(
        Arc::new(source),
        store,
        config.sync_settings(),
    ))
}
