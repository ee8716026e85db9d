use std::sync::Arc;
use std::time::Duration;

use coinsync_core::{runtime, AppConfig, CycleOutcome, CycleReport, MarketStore};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cli::SyncArgs;
use crate::error::CliError;

pub async fn run(
    args: &SyncArgs,
    mut config: AppConfig,
    store: Arc<dyn MarketStore>,
) -> Result<Option<Value>, CliError> {
    apply_overrides(&mut config, args.interval_secs, args.size);
    let mut sync = runtime::build_sync_loop(&config, store)?;

    if args.once {
        let report = sync.run_cycle().await;
        return Ok(Some(report_json(&report)));
    }

    info!(
        interval_secs = config.poll_interval.as_secs(),
        snapshot_size = config.snapshot_size,
        "sync loop starting; press Ctrl+C to stop"
    );
    sync.run_until(async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "Ctrl+C handler unavailable; running until killed");
            std::future::pending::<()>().await;
        }
    })
    .await;

    Ok(None)
}

/// Apply `--interval-secs` / `--size`; zero leaves the configured value.
pub(super) fn apply_overrides(
    config: &mut AppConfig,
    interval_secs: Option<u64>,
    size: Option<usize>,
) {
    if let Some(secs) = interval_secs.filter(|secs| *secs > 0) {
        config.poll_interval = Duration::from_secs(secs);
    }
    if let Some(size) = size.filter(|size| *size > 0) {
        config.snapshot_size = size;
    }
}

fn report_json(report: &CycleReport) -> Value {
    let mut value = json!({
        "cycle_id": report.cycle_id.to_string(),
        "started_at": report.started_at,
        "status": report.outcome.status(),
        "fetched": report.fetched,
        "upserted": report.upserted(),
        "change": report.change,
    });

    let error = match &report.outcome {
        CycleOutcome::Reconciled { .. } => None,
        CycleOutcome::FetchFailed(error) => Some(json!({
            "code": error.code(),
            "message": error.message(),
            "retryable": error.retryable(),
        })),
        CycleOutcome::ReconcileFailed(error) => Some(Value::String(error.to_string())),
    };
    if let (Some(error), Some(object)) = (error, value.as_object_mut()) {
        object.insert(String::from("error"), error);
    }
    value
}

#[cfg(test)]
mod tests {
    use coinsync_core::{FetchError, UtcDateTime};

    use super::*;

    fn report(outcome: CycleOutcome) -> CycleReport {
        CycleReport {
            cycle_id: Default::default(),
            started_at: UtcDateTime::now(),
            fetched: 0,
            change: None,
            outcome,
        }
    }

    #[test]
    fn reconciled_report_has_no_error_key() {
        let value = report_json(&report(CycleOutcome::Reconciled { upserted: 3 }));
        assert_eq!(value["status"], "reconciled");
        assert_eq!(value["upserted"], 3);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn failed_fetch_carries_code() {
        let value = report_json(&report(CycleOutcome::FetchFailed(FetchError::network(
            "coingecko returned status 503",
        ))));
        assert_eq!(value["status"], "fetch_failed");
        assert_eq!(value["error"]["code"], "fetch.network");
    }
}
