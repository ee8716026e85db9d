//! The synchronization loop.
//!
//! ```text
//! Fetching -> Validating -> Diffing -> Reconciling -> Sleeping -> Fetching ...
//! ```
//!
//! A fetch or validation failure ends the cycle early: membership is left as it
//! was and nothing is written, not even the audit row. Once a snapshot is
//! valid, membership is updated before the store write, so a failed write still
//! moves the baseline forward.
//!
//! At most one upsert is in flight. An upsert that outlives the store timeout
//! is kept and awaited before the next reconcile starts.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::data_source::{FetchError, MarketDataSource};
use crate::membership::{MembershipDiff, MembershipTracker};
use crate::store::{join_store_call, run_blocking, CycleAudit, CycleStatus, MarketStore, StoreError};
use crate::{MarketRecord, UtcDateTime};

/// Where the loop currently is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Fetching,
    Validating,
    Diffing,
    Reconciling,
    Sleeping,
}

/// Loop timing and sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Top-N coins requested per cycle.
    pub snapshot_size: usize,
    /// Sleep between cycles.
    pub poll_interval: Duration,
    /// Upper bound on one provider fetch.
    pub fetch_timeout: Duration,
    /// Upper bound on one store call.
    pub store_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            snapshot_size: 50,
            poll_interval: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// How one cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The snapshot was written; `upserted` rows were inserted or overwritten.
    Reconciled { upserted: usize },
    /// Fetch or validation failed; nothing was diffed or written.
    FetchFailed(FetchError),
    /// The snapshot was valid and diffed, but the store write failed.
    ReconcileFailed(StoreError),
}

impl CycleOutcome {
    /// Audit status for this outcome.
    pub const fn status(&self) -> CycleStatus {
        match self {
            Self::Reconciled { .. } => CycleStatus::Reconciled,
            Self::FetchFailed(_) => CycleStatus::FetchFailed,
            Self::ReconcileFailed(_) => CycleStatus::ReconcileFailed,
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            Self::Reconciled { .. } => None,
            Self::FetchFailed(error) => Some(error.to_string()),
            Self::ReconcileFailed(error) => Some(error.to_string()),
        }
    }
}

/// Summary of one finished cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Fresh per cycle; also keys the audit row.
    pub cycle_id: Uuid,
    pub started_at: UtcDateTime,
    /// Records in the validated snapshot (zero when the fetch failed).
    pub fetched: usize,
    /// Entries and exits versus the previous snapshot, if any.
    pub change: Option<MembershipDiff>,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    /// Rows written, or zero when the cycle did not reconcile.
    pub fn upserted(&self) -> usize {
        match self.outcome {
            CycleOutcome::Reconciled { upserted } => upserted,
            _ => 0,
        }
    }
}

/// Sequential fetch/diff/reconcile worker. Owns the only in-process membership state.
pub struct SyncLoop {
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn MarketStore>,
    tracker: MembershipTracker,
    settings: SyncSettings,
    phase: SyncPhase,
    inflight_upsert: Option<JoinHandle<Result<usize, StoreError>>>,
}

impl SyncLoop {
    /// Create a loop with no membership baseline.
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        store: Arc<dyn MarketStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            store,
            tracker: MembershipTracker::new(),
            settings,
            phase: SyncPhase::Sleeping,
            inflight_upsert: None,
        }
    }

    /// Phase the loop is in, or last finished.
    pub const fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Current membership state.
    pub const fn tracker(&self) -> &MembershipTracker {
        &self.tracker
    }

    /// Timing and sizing in effect.
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run exactly one cycle, without the trailing sleep.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let started_at = UtcDateTime::now();
        info!(%cycle_id, source = self.source.name(), "sync cycle started");

        match self.fetch_snapshot().await {
            Err(fetch_error) => {
                warn!(
                    %cycle_id,
                    code = fetch_error.code(),
                    retryable = fetch_error.retryable(),
                    error = %fetch_error,
                    "snapshot fetch failed; membership and store left untouched"
                );
                CycleReport {
                    cycle_id,
                    started_at,
                    fetched: 0,
                    change: None,
                    outcome: CycleOutcome::FetchFailed(fetch_error),
                }
            }
            Ok(records) => {
                let report = self.diff_and_reconcile(cycle_id, started_at, records).await;
                self.audit(&report).await;
                report
            }
        }
    }

    /// Run cycles until `shutdown` resolves. Shutdown is only observed while sleeping.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let report = self.run_cycle().await;
            self.phase = SyncPhase::Sleeping;
            debug!(
                cycle_id = %report.cycle_id,
                sleep_secs = self.settings.poll_interval.as_secs_f64(),
                "sync cycle finished"
            );

            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested; sync loop stopping");
                    return;
                }
                () = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    /// Run cycles forever.
    pub async fn run_forever(&mut self) {
        self.run_until(std::future::pending::<()>()).await;
    }

    async fn fetch_snapshot(&mut self) -> Result<Vec<MarketRecord>, FetchError> {
        self.phase = SyncPhase::Fetching;
        let fetched = tokio::time::timeout(
            self.settings.fetch_timeout,
            self.source.fetch_top_n(self.settings.snapshot_size),
        )
        .await
        .map_err(|_| {
            FetchError::network(format!(
                "{} fetch timed out after {}ms",
                self.source.name(),
                self.settings.fetch_timeout.as_millis()
            ))
        })??;

        self.phase = SyncPhase::Validating;
        if fetched.len() > self.settings.snapshot_size {
            warn!(
                requested = self.settings.snapshot_size,
                received = fetched.len(),
                "provider returned more items than requested"
            );
        }
        Ok(fetched)
    }

    async fn diff_and_reconcile(
        &mut self,
        cycle_id: Uuid,
        started_at: UtcDateTime,
        records: Vec<MarketRecord>,
    ) -> CycleReport {
        self.phase = SyncPhase::Diffing;
        let fetched = records.len();
        let current = records
            .iter()
            .map(|record| record.id.clone())
            .collect::<BTreeSet<_>>();
        if current.len() != fetched {
            warn!(%cycle_id, fetched, distinct = current.len(), "snapshot repeats ids");
        }

        let change = self.tracker.observe(current);
        if let Some(change) = &change {
            info!(
                %cycle_id,
                added = ?change.added,
                removed = ?change.removed,
                "ranked membership changed"
            );
        }

        self.phase = SyncPhase::Reconciling;
        let outcome = match self.reconcile(records).await {
            Ok(upserted) => {
                info!(%cycle_id, fetched, upserted, "snapshot reconciled");
                CycleOutcome::Reconciled { upserted }
            }
            Err(store_error) => {
                error!(%cycle_id, error = %store_error, "reconcile failed; membership already advanced");
                CycleOutcome::ReconcileFailed(store_error)
            }
        };

        CycleReport {
            cycle_id,
            started_at,
            fetched,
            change,
            outcome,
        }
    }

    /// Upsert `records`, first waiting out any upsert left over from a timed-out cycle.
    async fn reconcile(&mut self, records: Vec<MarketRecord>) -> Result<usize, StoreError> {
        let timeout = self.settings.store_timeout;

        if let Some(mut previous) = self.inflight_upsert.take() {
            match tokio::time::timeout(timeout, &mut previous).await {
                Ok(joined) => {
                    if let Err(late_error) = join_store_call(joined, "upsert_batch") {
                        warn!(error = %late_error, "timed-out upsert finished with an error");
                    }
                }
                Err(_) => {
                    self.inflight_upsert = Some(previous);
                    return Err(StoreError::Timeout {
                        operation: "upsert_batch (previous upsert still running)",
                        after_ms: timeout.as_millis(),
                    });
                }
            }
        }

        let store = Arc::clone(&self.store);
        let mut task = tokio::task::spawn_blocking(move || store.upsert_batch(&records));
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => join_store_call(joined, "upsert_batch"),
            Err(_) => {
                self.inflight_upsert = Some(task);
                Err(StoreError::Timeout {
                    operation: "upsert_batch",
                    after_ms: timeout.as_millis(),
                })
            }
        }
    }

    async fn audit(&self, report: &CycleReport) {
        let audit = CycleAudit {
            cycle_id: report.cycle_id,
            started_at: report.started_at,
            status: report.outcome.status(),
            fetched: report.fetched,
            upserted: report.upserted(),
            added: report.change.as_ref().map_or(0, |c| c.added.len()),
            removed: report.change.as_ref().map_or(0, |c| c.removed.len()),
            detail: report.outcome.detail(),
        };

        let written = run_blocking(
            &self.store,
            self.settings.store_timeout,
            "record_cycle",
            move |store| store.record_cycle(&audit),
        )
        .await;
        if let Err(audit_error) = written {
            warn!(cycle_id = %report.cycle_id, error = %audit_error, "cycle audit not recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::data_source::FetchFuture;
    use crate::store::InsertOutcome;
    use crate::{CoinSymbol, NewCoin};

    struct OneShot(Mutex<Option<Result<Vec<MarketRecord>, FetchError>>>);

    impl MarketDataSource for OneShot {
        fn name(&self) -> &'static str {
            "one-shot"
        }

        fn fetch_top_n(&self, _n: usize) -> FetchFuture<'_> {
            let next = self
                .0
                .lock()
                .expect("lock")
                .take()
                .unwrap_or_else(|| Err(FetchError::network("exhausted")));
            Box::pin(async move { next })
        }
    }

    #[derive(Default)]
    struct CountingStore {
        upserts: Mutex<usize>,
        audits: Mutex<Vec<CycleStatus>>,
    }

    impl MarketStore for CountingStore {
        fn upsert_batch(&self, records: &[MarketRecord]) -> Result<usize, StoreError> {
            *self.upserts.lock().expect("lock") += 1;
            Ok(records.len())
        }
        fn fetch_all(&self) -> Result<Vec<MarketRecord>, StoreError> {
            Ok(Vec::new())
        }
        fn fetch_by_symbol(&self, _: &CoinSymbol) -> Result<Option<MarketRecord>, StoreError> {
            Ok(None)
        }
        fn insert_one(&self, coin: &NewCoin) -> Result<InsertOutcome, StoreError> {
            Ok(InsertOutcome::Conflict {
                id: coin.id.clone(),
            })
        }
        fn update_price(
            &self,
            _: &CoinSymbol,
            _: f64,
        ) -> Result<Option<MarketRecord>, StoreError> {
            Ok(None)
        }
        fn delete_by_symbol(&self, _: &CoinSymbol) -> Result<Option<MarketRecord>, StoreError> {
            Ok(None)
        }
        fn record_cycle(&self, audit: &CycleAudit) -> Result<(), StoreError> {
            self.audits.lock().expect("lock").push(audit.status);
            Ok(())
        }
    }

    fn record(id: &str) -> MarketRecord {
        MarketRecord::new(
            id,
            CoinSymbol::parse(id).expect("symbol"),
            id,
            1.0,
            UtcDateTime::now(),
        )
        .expect("record")
    }

    #[tokio::test]
    async fn successful_cycle_reconciles_and_audits() {
        let store = Arc::new(CountingStore::default());
        let source = Arc::new(OneShot(Mutex::new(Some(Ok(vec![record("a"), record("b")])))));
        let mut sync = SyncLoop::new(source, store.clone(), SyncSettings::default());

        let report = sync.run_cycle().await;

        assert_eq!(report.outcome, CycleOutcome::Reconciled { upserted: 2 });
        assert_eq!(report.change, None);
        assert_eq!(sync.phase(), SyncPhase::Reconciling);
        assert!(sync.tracker().is_tracking());
        assert_eq!(*store.upserts.lock().expect("lock"), 1);
        assert_eq!(
            *store.audits.lock().expect("lock"),
            vec![CycleStatus::Reconciled]
        );
    }

    #[tokio::test]
    async fn hung_provider_is_bounded_by_fetch_timeout() {
        struct Hang;
        impl MarketDataSource for Hang {
            fn name(&self) -> &'static str {
                "hang"
            }
            fn fetch_top_n(&self, _n: usize) -> FetchFuture<'_> {
                Box::pin(std::future::pending())
            }
        }

        let store = Arc::new(CountingStore::default());
        let settings = SyncSettings {
            fetch_timeout: Duration::from_millis(20),
            ..SyncSettings::default()
        };
        let mut sync = SyncLoop::new(Arc::new(Hang), store.clone(), settings);

        let report = sync.run_cycle().await;

        assert!(matches!(report.outcome, CycleOutcome::FetchFailed(ref e) if e.retryable()));
        assert!(!sync.tracker().is_tracking());
        assert_eq!(*store.upserts.lock().expect("lock"), 0);
        assert!(store.audits.lock().expect("lock").is_empty());
    }

    /// First upsert blocks past the store timeout; tracks how many run at once.
    #[derive(Default)]
    struct SlowFirstUpsert {
        calls: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl MarketStore for SlowFirstUpsert {
        fn upsert_batch(&self, records: &[MarketRecord]) -> Result<usize, StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);
            if call == 0 {
                std::thread::sleep(Duration::from_millis(200));
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(records.len())
        }
        fn fetch_all(&self) -> Result<Vec<MarketRecord>, StoreError> {
            Ok(Vec::new())
        }
        fn fetch_by_symbol(&self, _: &CoinSymbol) -> Result<Option<MarketRecord>, StoreError> {
            Ok(None)
        }
        fn insert_one(&self, coin: &NewCoin) -> Result<InsertOutcome, StoreError> {
            Ok(InsertOutcome::Conflict {
                id: coin.id.clone(),
            })
        }
        fn update_price(
            &self,
            _: &CoinSymbol,
            _: f64,
        ) -> Result<Option<MarketRecord>, StoreError> {
            Ok(None)
        }
        fn delete_by_symbol(&self, _: &CoinSymbol) -> Result<Option<MarketRecord>, StoreError> {
            Ok(None)
        }
        fn record_cycle(&self, _: &CycleAudit) -> Result<(), StoreError> {
            Ok(())
        }
    }

    struct Always(Vec<MarketRecord>);

    impl MarketDataSource for Always {
        fn name(&self) -> &'static str {
            "always"
        }

        fn fetch_top_n(&self, _n: usize) -> FetchFuture<'_> {
            let records = self.0.clone();
            Box::pin(async move { Ok(records) })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timed_out_upsert_is_awaited_before_the_next_one() {
        let store = Arc::new(SlowFirstUpsert::default());
        let settings = SyncSettings {
            store_timeout: Duration::from_millis(150),
            ..SyncSettings::default()
        };
        let source = Arc::new(Always(vec![record("a"), record("b")]));
        let mut sync = SyncLoop::new(source, store.clone(), settings);

        let first = sync.run_cycle().await;
        let second = sync.run_cycle().await;
        let third = sync.run_cycle().await;

        assert!(matches!(
            first.outcome,
            CycleOutcome::ReconcileFailed(StoreError::Timeout {
                operation: "upsert_batch",
                ..
            })
        ));
        assert_eq!(second.outcome, CycleOutcome::Reconciled { upserted: 2 });
        assert_eq!(third.outcome, CycleOutcome::Reconciled { upserted: 2 });
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_is_honoured_between_cycles() {
        let store = Arc::new(CountingStore::default());
        let source = Arc::new(OneShot(Mutex::new(Some(Ok(vec![record("a")])))));
        let mut sync = SyncLoop::new(source, store.clone(), SyncSettings::default());

        sync.run_until(std::future::ready(())).await;

        assert_eq!(sync.phase(), SyncPhase::Sleeping);
        assert_eq!(store.audits.lock().expect("lock").len(), 1);
    }
}
