use std::sync::Arc;

use coinsync_core::StoreError;
use coinsync_warehouse::Warehouse;
use serde_json::Value;

use crate::cli::HistoryArgs;
use crate::error::CliError;

pub async fn run(args: &HistoryArgs, warehouse: Arc<Warehouse>) -> Result<Value, CliError> {
    let limit = args.limit;
    let rows = tokio::task::spawn_blocking(move || warehouse.recent_syncs(limit))
        .await
        .map_err(|join_error| StoreError::unavailable(join_error.to_string()))?
        .map_err(StoreError::from)?;

    Ok(serde_json::to_value(rows)?)
}
