//! Watchdog: periodically re-publishes stuck jobs and escalates the ones that keep
//! failing to a permanent error with a receipt.
//!
//! A job is a candidate when its pending-index score (last enqueue/retry time) is at
//! or before `now - threshold`. For each candidate:
//!
//! - record gone or already resolved → drop it from the index
//! - still pending, `retry_count < max_retries` → publish again, `retry_count += 1`
//! - still pending, retries exhausted → write a receipt, mark `error`, drop from index
//!
//! The status read and the follow-up writes are not atomic; a completion landing in
//! between is overwritten by an escalation. That window is accepted.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use switchyard_core::{JobId, JobReceipt, JobStatus, MAX_RETRIES_MESSAGE, unix_now};

use crate::config::SchedulerConfig;
use crate::error::SchedulerResult;
use crate::message_bus::MessageBusService;
use crate::receipts::ReceiptStore;

/// Watchdog tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogSettings {
    pub stuck_job_threshold: Duration,
    pub max_retries: u32,
    pub interval: Duration,
    pub rescore_on_retry: bool,
}

impl From<&SchedulerConfig> for WatchdogSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            stuck_job_threshold: config.stuck_job_threshold(),
            max_retries: config.worker_max_job_retries,
            interval: config.watchdog_interval(),
            rescore_on_retry: config.rescore_on_retry,
        }
    }
}

/// Counters of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Candidates returned by the pending index.
    pub scanned: usize,
    /// Index entries dropped because the job was resolved or missing.
    pub cleaned_up: usize,
    pub retried: usize,
    pub escalated: usize,
    /// Candidates skipped because a store/broker call failed.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    CleanedUp,
    Retried,
    Escalated,
}

pub struct WatchdogService {
    bus: Arc<MessageBusService>,
    receipts: Arc<dyn ReceiptStore>,
    settings: WatchdogSettings,
}

impl WatchdogService {
    pub fn new(
        bus: Arc<MessageBusService>,
        receipts: Arc<dyn ReceiptStore>,
        settings: WatchdogSettings,
    ) -> Self {
        Self {
            bus,
            receipts,
            settings,
        }
    }

    /// Scan every `interval` until `cancel` fires. The first scan runs one interval
    /// after start. A slow scan delays the next tick instead of overlapping it.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.settings.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = period.as_secs(),
            threshold_secs = self.settings.stuck_job_threshold.as_secs(),
            max_retries = self.settings.max_retries,
            "watchdog started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.check_stuck_jobs().await {
                error!(error = %e, "watchdog scan failed");
            }
        }

        info!("watchdog stopped");
    }

    /// Scan once against the current time.
    pub async fn check_stuck_jobs(&self) -> SchedulerResult<ScanReport> {
        self.check_stuck_jobs_at(unix_now()).await
    }

    /// Scan once as if the time were `now` (Unix seconds).
    ///
    /// Fails only if the pending index cannot be read; errors on individual jobs are
    /// logged, counted in [`ScanReport::failed`], and the scan moves on.
    #[instrument(skip(self), err)]
    pub async fn check_stuck_jobs_at(&self, now: i64) -> SchedulerResult<ScanReport> {
        let threshold = i64::try_from(self.settings.stuck_job_threshold.as_secs()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(threshold);

        let candidates = self.bus.store().pending_before(cutoff).await?;
        let mut report = ScanReport {
            scanned: candidates.len(),
            ..ScanReport::default()
        };

        for id in candidates {
            match self.check_job(id, now).await {
                Ok(Action::CleanedUp) => report.cleaned_up += 1,
                Ok(Action::Retried) => report.retried += 1,
                Ok(Action::Escalated) => report.escalated += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(job_id = %id, error = %e, "failed to check stuck job");
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                cleaned_up = report.cleaned_up,
                retried = report.retried,
                escalated = report.escalated,
                failed = report.failed,
                "watchdog scan finished"
            );
        }
        Ok(report)
    }

    async fn check_job(&self, id: JobId, now: i64) -> SchedulerResult<Action> {
        let store = self.bus.store();

        match store.status(id).await? {
            Some(JobStatus::Pending) => {}
            Some(_) => {
                store.remove_pending(id).await?;
                return Ok(Action::CleanedUp);
            }
            None => {
                warn!(job_id = %id, "pending index entry without job record");
                store.remove_pending(id).await?;
                return Ok(Action::CleanedUp);
            }
        }

        let Some(record) = store.get(id).await? else {
            warn!(job_id = %id, "job record vanished during scan");
            store.remove_pending(id).await?;
            return Ok(Action::CleanedUp);
        };

        if record.retry_count < self.settings.max_retries {
            self.bus
                .send_retry_job_message(&record.name, &record.context, id)
                .await?;
            let retry_count = store.record_retry(id, now).await?;
            if self.settings.rescore_on_retry {
                store.index_pending(id, now).await?;
            }
            info!(job_id = %id, job_name = %record.name, retry_count, "stuck job re-published");
            return Ok(Action::Retried);
        }

        // Receipt first: it is unique per job, so if a later step fails the next scan
        // repeats the escalation without duplicating it.
        let receipt = JobReceipt::escalated(&record, now);
        self.receipts.insert(&receipt).await?;
        store.resolve(id, JobStatus::Error, MAX_RETRIES_MESSAGE, now).await?;
        store.remove_pending(id).await?;

        warn!(
            job_id = %id,
            job_name = %record.name,
            retry_count = record.retry_count,
            "job marked as failed after max retries"
        );
        Ok(Action::Escalated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{InMemoryBroker, JOBS_QUEUE};
    use crate::jobs::{InMemoryJobStore, JobStore, JobStoreError};
    use crate::receipts::InMemoryReceiptStore;
    use switchyard_core::{JobContext, JobRecord};

    struct Fixture {
        watchdog: WatchdogService,
        store: Arc<InMemoryJobStore>,
        broker: Arc<InMemoryBroker>,
        receipts: Arc<InMemoryReceiptStore>,
    }

    fn fixture(max_retries: u32, rescore_on_retry: bool) -> Fixture {
        let store = Arc::new(InMemoryJobStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let receipts = Arc::new(InMemoryReceiptStore::new());
        let bus = Arc::new(MessageBusService::new(store.clone(), broker.clone()));
        let watchdog = WatchdogService::new(
            bus,
            receipts.clone(),
            WatchdogSettings {
                stuck_job_threshold: Duration::from_secs(300),
                max_retries,
                interval: Duration::from_secs(60),
                rescore_on_retry,
            },
        );
        Fixture {
            watchdog,
            store,
            broker,
            receipts,
        }
    }

    async fn pending_job(store: &InMemoryJobStore, enqueued_at: i64) -> JobId {
        let record = JobRecord::pending(JobId::new(), "N", JobContext::new(), enqueued_at);
        store.create(&record).await.unwrap();
        store.index_pending(record.id, enqueued_at).await.unwrap();
        record.id
    }

    #[tokio::test]
    async fn fresh_jobs_are_left_alone() {
        let f = fixture(3, true);
        let id = pending_job(&f.store, 1_000).await;

        let report = f.watchdog.check_stuck_jobs_at(1_299).await.unwrap();

        assert_eq!(report, ScanReport::default());
        assert_eq!(f.store.pending_score(id), Some(1_000));
        assert!(f.broker.published(JOBS_QUEUE).is_empty());
    }

    #[tokio::test]
    async fn cutoff_is_inclusive() {
        let f = fixture(3, true);
        pending_job(&f.store, 1_000).await;

        let report = f.watchdog.check_stuck_jobs_at(1_300).await.unwrap();
        assert_eq!(report.retried, 1);
    }

    #[tokio::test]
    async fn resolved_job_is_only_removed_from_index() {
        let f = fixture(3, true);
        let id = pending_job(&f.store, 1_000).await;
        f.store.resolve(id, JobStatus::Ok, "done", 1_100).await.unwrap();

        let report = f.watchdog.check_stuck_jobs_at(2_000).await.unwrap();

        assert_eq!(report.cleaned_up, 1);
        assert_eq!(f.store.pending_score(id), None);
        let record = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Ok);
        assert_eq!(record.message, "done");
        assert!(f.broker.published(JOBS_QUEUE).is_empty());
        assert!(f.receipts.all().is_empty());
    }

    /// Status reads work; full record loads fail as if a field were unparseable.
    struct CorruptRecords(Arc<InMemoryJobStore>);

    #[async_trait::async_trait]
    impl JobStore for CorruptRecords {
        async fn create(&self, record: &JobRecord) -> Result<(), JobStoreError> {
            self.0.create(record).await
        }

        async fn get(&self, id: JobId) -> Result<Option<JobRecord>, JobStoreError> {
            Err(JobStoreError::Corrupt {
                id: id.to_string(),
                detail: "invalid created_at".into(),
            })
        }

        async fn status(&self, id: JobId) -> Result<Option<JobStatus>, JobStoreError> {
            self.0.status(id).await
        }

        async fn resolve(
            &self,
            id: JobId,
            status: JobStatus,
            message: &str,
            now: i64,
        ) -> Result<bool, JobStoreError> {
            self.0.resolve(id, status, message, now).await
        }

        async fn record_retry(&self, id: JobId, now: i64) -> Result<u32, JobStoreError> {
            self.0.record_retry(id, now).await
        }

        async fn index_pending(&self, id: JobId, score: i64) -> Result<(), JobStoreError> {
            self.0.index_pending(id, score).await
        }

        async fn pending_before(&self, cutoff: i64) -> Result<Vec<JobId>, JobStoreError> {
            self.0.pending_before(cutoff).await
        }

        async fn remove_pending(&self, id: JobId) -> Result<(), JobStoreError> {
            self.0.remove_pending(id).await
        }
    }

    #[tokio::test]
    async fn terminal_job_is_cleaned_up_without_loading_the_record() {
        let inner = Arc::new(InMemoryJobStore::new());
        let done = pending_job(&inner, 1_000).await;
        inner.resolve(done, JobStatus::Ok, "done", 1_100).await.unwrap();
        let stuck = pending_job(&inner, 1_000).await;

        let bus = Arc::new(MessageBusService::new(
            Arc::new(CorruptRecords(inner.clone())),
            Arc::new(InMemoryBroker::new()),
        ));
        let watchdog = WatchdogService::new(
            bus,
            Arc::new(InMemoryReceiptStore::new()),
            WatchdogSettings {
                stuck_job_threshold: Duration::from_secs(300),
                max_retries: 3,
                interval: Duration::from_secs(60),
                rescore_on_retry: true,
            },
        );

        let report = watchdog.check_stuck_jobs_at(2_000).await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.cleaned_up, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(inner.pending_score(done), None);
        assert_eq!(inner.pending_score(stuck), Some(1_000));
    }

    #[tokio::test]
    async fn missing_record_is_removed_from_index() {
        let f = fixture(3, true);
        let id = JobId::new();
        f.store.index_pending(id, 0).await.unwrap();

        let report = f.watchdog.check_stuck_jobs_at(1_000).await.unwrap();

        assert_eq!(report.cleaned_up, 1);
        assert_eq!(f.store.pending_len(), 0);
    }

    #[tokio::test]
    async fn stuck_job_is_republished_and_rescored() {
        let f = fixture(3, true);
        let id = pending_job(&f.store, 1_000).await;

        let report = f.watchdog.check_stuck_jobs_at(1_400).await.unwrap();

        assert_eq!(report.retried, 1);
        let record = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.updated_at, 1_400);
        assert_eq!(f.store.pending_score(id), Some(1_400));
        assert_eq!(f.broker.published(JOBS_QUEUE).len(), 1);

        // Not eligible again until another full threshold has passed.
        let report = f.watchdog.check_stuck_jobs_at(1_460).await.unwrap();
        assert_eq!(report.scanned, 0);
    }

    #[tokio::test]
    async fn without_rescore_job_is_retried_every_tick() {
        let f = fixture(3, false);
        let id = pending_job(&f.store, 1_000).await;

        f.watchdog.check_stuck_jobs_at(1_400).await.unwrap();
        f.watchdog.check_stuck_jobs_at(1_460).await.unwrap();

        assert_eq!(f.store.pending_score(id), Some(1_000));
        assert_eq!(f.store.get(id).await.unwrap().unwrap().retry_count, 2);
        assert_eq!(f.broker.published(JOBS_QUEUE).len(), 2);
    }

    #[tokio::test]
    async fn exhausted_job_is_escalated_with_receipt() {
        let f = fixture(3, true);
        let id = pending_job(&f.store, 1_000).await;
        let mut record = f.store.get(id).await.unwrap().unwrap();
        record.retry_count = 3;
        f.store.put(record);

        let report = f.watchdog.check_stuck_jobs_at(2_000).await.unwrap();

        assert_eq!(report.escalated, 1);
        let record = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Error);
        assert_eq!(record.message, MAX_RETRIES_MESSAGE);
        assert_eq!(f.store.pending_score(id), None);
        assert!(f.broker.published(JOBS_QUEUE).is_empty());

        let receipt = f.receipts.get(id).unwrap();
        assert_eq!(receipt.status, JobStatus::Error);
        assert_eq!(receipt.retry_count, 3);
        assert_eq!(receipt.job_name, "N");
        assert_eq!(receipt.updated_at, 2_000);
    }

    #[tokio::test]
    async fn zero_max_retries_escalates_on_first_scan() {
        let f = fixture(0, true);
        let id = pending_job(&f.store, 1_000).await;

        let report = f.watchdog.check_stuck_jobs_at(1_300).await.unwrap();

        assert_eq!(report.escalated, 1);
        assert!(f.receipts.get(id).is_some());
        assert!(f.broker.published(JOBS_QUEUE).is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let f = fixture(3, true);
        let watchdog = Arc::new(f.watchdog);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(watchdog.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
