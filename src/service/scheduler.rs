//! Monitoring scheduler: the recurring Buy Box check loop.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──start(interval)──► Running ──stop()──► Stopped
//! ```
//!
//! While running, one cycle executes immediately and then once per interval.
//! Each cycle loads the active configurations, fetches competitive pricing
//! batch by batch (with retry), evaluates every configuration that came back
//! with data, dispatches alerts and writes one [`JobRun`] row.
//!
//! Cycles of one scheduler never overlap. `stop()` only prevents future
//! cycles; a cycle already executing runs to completion. A panicking
//! collaborator fails the item or the cycle it ran in, never the loop.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use utoipa::ToSchema;

use crate::domain::{
    Alert, EventBus, JobRun, JobRunMetadata, JobStatistics, JobStatus, MonitorEvent,
    MonitoringConfig, PricingSnapshot,
};
use crate::error::ServiceError;
use crate::marketplace::ProviderError;
use crate::ports::{
    AlertDetector, JobLog, MonitoringConfigStore, NotificationDispatcher, PricingProvider,
};
use crate::retry::RetryPolicy;

/// Default number of ASINs fetched per pricing request.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default pause between batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(2);

/// Longest statistics window accepted.
pub const MAX_STATISTICS_DAYS: u32 = 365;

/// Batching and retry knobs for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// ASINs per pricing request. Zero is treated as one.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub batch_delay: Duration,
    /// Retry policy for pricing fetches.
    pub retry: RetryPolicy,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            retry: RetryPolicy::linear(3, Duration::from_secs(1)),
        }
    }
}

/// Summary of one executed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CycleReport {
    /// `cycle_completed` or `cycle_error`.
    pub status: JobStatus,
    /// Configurations evaluated.
    pub processed: u64,
    /// Alerts raised.
    pub alerts: u64,
    /// Batches attempted.
    pub batches: u64,
    /// Batches skipped because pricing was unavailable.
    pub skipped_batches: u64,
    /// Configurations whose evaluation failed.
    pub failed_items: u64,
    /// Wall time of the cycle.
    pub duration_ms: u64,
    /// Error that aborted the cycle.
    pub error: Option<String>,
    /// When the cycle finished.
    pub finished_at: DateTime<Utc>,
}

impl CycleReport {
    fn metadata(&self) -> JobRunMetadata {
        JobRunMetadata {
            duration_ms: self.duration_ms,
            processed: self.processed,
            alerts: self.alerts,
            batches: self.batches,
            skipped_batches: self.skipped_batches,
            failed_items: self.failed_items,
            error: self.error.clone(),
            interval_minutes: None,
        }
    }
}

/// Snapshot of the scheduler run-state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SchedulerStatus {
    /// Whether the recurring loop is active.
    pub running: bool,
    /// Interval of the active loop.
    pub interval_minutes: Option<u64>,
    /// When the loop was started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the most recent cycle began.
    pub last_run: Option<DateTime<Utc>>,
    /// When the next cycle is due.
    pub next_run: Option<DateTime<Utc>>,
    /// Whether a cycle is executing right now.
    pub cycle_in_progress: bool,
    /// Result of the most recent cycle.
    pub last_report: Option<CycleReport>,
}

/// Result of a single-ASIN check.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ManualCheckResult {
    /// Checked ASIN.
    pub asin: String,
    /// Configuration owner.
    pub owner: String,
    /// Pricing data, absent when the provider had none.
    pub snapshot: Option<PricingSnapshot>,
    /// Alerts raised.
    pub alerts: Vec<Alert>,
    /// Human-readable summary.
    pub message: String,
}

#[derive(Debug, Default)]
struct RunState {
    interval_minutes: Option<u64>,
    started_at: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    last_report: Option<CycleReport>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl RunState {
    const fn running(&self) -> bool {
        self.shutdown.is_some()
    }
}

#[derive(Debug, Default)]
struct CycleTally {
    processed: u64,
    alerts: u64,
    batches: u64,
    skipped_batches: u64,
    failed_items: u64,
}

enum ItemOutcome {
    Processed(u64),
    Failed,
}

/// Periodic monitoring loop over all active configurations.
pub struct MonitoringScheduler {
    configs: Arc<dyn MonitoringConfigStore>,
    pricing: Arc<dyn PricingProvider>,
    detector: Arc<dyn AlertDetector>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    job_log: Arc<dyn JobLog>,
    event_bus: EventBus,
    settings: SchedulerSettings,
    cycle_guard: tokio::sync::Mutex<()>,
    state: Mutex<RunState>,
}

impl fmt::Debug for MonitoringScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoringScheduler")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl MonitoringScheduler {
    /// Creates a stopped scheduler.
    #[must_use]
    pub fn new(
        configs: Arc<dyn MonitoringConfigStore>,
        pricing: Arc<dyn PricingProvider>,
        detector: Arc<dyn AlertDetector>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        job_log: Arc<dyn JobLog>,
        event_bus: EventBus,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            configs,
            pricing,
            detector,
            dispatcher,
            job_log,
            event_bus,
            settings,
            cycle_guard: tokio::sync::Mutex::new(()),
            state: Mutex::new(RunState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the recurring loop. Returns `false` if it was already running.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for a zero interval.
    pub async fn start(self: &Arc<Self>, interval_minutes: u64) -> Result<bool, ServiceError> {
        if interval_minutes == 0 {
            return Err(ServiceError::InvalidRequest(
                "interval_minutes must be at least 1".to_string(),
            ));
        }
        let period = Duration::from_secs(interval_minutes.saturating_mul(60));

        {
            let mut state = self.state();
            if state.running() {
                tracing::info!(
                    interval_minutes = ?state.interval_minutes,
                    "scheduler already running, start ignored"
                );
                return Ok(false);
            }
            let (tx, rx) = watch::channel(false);
            state.shutdown = Some(tx);
            state.interval_minutes = Some(interval_minutes);
            state.started_at = Some(Utc::now());
            state.next_run = Some(Utc::now());
            state.task = Some(tokio::spawn(Arc::clone(self).run_loop(period, rx)));
        }

        tracing::info!(interval_minutes, "monitoring scheduler started");
        self.record(JobRun::new(
            JobStatus::Started,
            JobRunMetadata {
                interval_minutes: Some(interval_minutes),
                ..JobRunMetadata::default()
            },
        ))
        .await;
        Ok(true)
    }

    /// Stops future cycles. Returns `false` if the loop was not running.
    pub async fn stop(&self) -> bool {
        let interval_minutes = {
            let mut state = self.state();
            let Some(shutdown) = state.shutdown.take() else {
                return false;
            };
            let _ = shutdown.send(true);
            // Detached, not aborted: an executing cycle finishes on its own.
            drop(state.task.take());
            state.next_run = None;
            state.interval_minutes.take()
        };

        tracing::info!("monitoring scheduler stopped");
        self.record(JobRun::new(
            JobStatus::Stopped,
            JobRunMetadata {
                interval_minutes,
                ..JobRunMetadata::default()
            },
        ))
        .await;
        true
    }

    /// Current run-state.
    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        let cycle_in_progress = self.cycle_guard.try_lock().is_err();
        let state = self.state();
        SchedulerStatus {
            running: state.running(),
            interval_minutes: state.interval_minutes,
            started_at: state.started_at,
            last_run: state.last_run,
            next_run: state.next_run,
            cycle_in_progress,
            last_report: state.last_report.clone(),
        }
    }

    /// Aggregates the job run log over the last `days` days.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for a zero or oversized
    /// window, or the store error when the log cannot be read.
    pub async fn statistics(&self, days: u32) -> Result<JobStatistics, ServiceError> {
        if days == 0 || days > MAX_STATISTICS_DAYS {
            return Err(ServiceError::InvalidRequest(format!(
                "days must be between 1 and {MAX_STATISTICS_DAYS}"
            )));
        }
        let since = Utc::now() - chrono::Duration::days(i64::from(days));
        let runs = self.job_log.runs_since(since).await?;
        Ok(JobStatistics::from_runs(days, &runs))
    }

    /// Runs one cycle immediately, outside the timer.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::CycleInProgress`] if another cycle is
    /// executing.
    pub async fn run_cycle_now(&self) -> Result<CycleReport, ServiceError> {
        self.run_guarded_cycle()
            .await
            .ok_or(ServiceError::CycleInProgress)
    }

    /// Checks one ASIN synchronously.
    ///
    /// Does not take the cycle guard and writes no job run row.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidRequest`] for empty identifiers.
    /// - [`ServiceError::ConfigNotFound`] for an unknown `(asin, owner)`.
    /// - [`ServiceError::Internal`] when alert evaluation fails.
    pub async fn run_manual_check(
        &self,
        asin: &str,
        owner: &str,
    ) -> Result<ManualCheckResult, ServiceError> {
        if asin.trim().is_empty() || owner.trim().is_empty() {
            return Err(ServiceError::InvalidRequest(
                "asin and owner are required".to_string(),
            ));
        }
        let config = self
            .configs
            .find(asin, owner)
            .await?
            .ok_or_else(|| ServiceError::ConfigNotFound {
                asin: asin.to_string(),
                owner: owner.to_string(),
            })?;

        let asins = vec![config.asin.clone()];
        let snapshot = match self.fetch_pricing(&asins).await {
            Ok(snapshots) => snapshots.into_iter().find(|s| s.asin == config.asin),
            Err(e) => {
                tracing::warn!(asin, owner, error = %e, "manual check: pricing unavailable");
                None
            }
        };
        let Some(snapshot) = snapshot else {
            return Ok(ManualCheckResult {
                asin: config.asin,
                owner: config.owner,
                snapshot: None,
                alerts: Vec::new(),
                message: "No pricing data available for this ASIN".to_string(),
            });
        };

        let alerts = self
            .detector
            .evaluate(&config, &snapshot)
            .await
            .map_err(|e| ServiceError::Internal(format!("alert evaluation failed: {e}")))?;
        self.dispatch(&alerts, &config).await;
        self.touch(&config).await;

        let message = if alerts.is_empty() {
            "No alerts".to_string()
        } else {
            format!("{} alert(s) raised", alerts.len())
        };
        tracing::info!(asin, owner, alerts = alerts.len(), "manual check completed");
        Ok(ManualCheckResult {
            asin: config.asin,
            owner: config.owner,
            snapshot: Some(snapshot),
            alerts,
            message,
        })
    }

    async fn run_loop(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(panic) = AssertUnwindSafe(self.run_guarded_cycle())
                        .catch_unwind()
                        .await
                    {
                        tracing::error!(
                            panic = %panic_message(panic.as_ref()),
                            "monitoring cycle aborted"
                        );
                    }
                    let mut state = self.state();
                    if state.running() {
                        state.next_run = chrono::Duration::from_std(period)
                            .ok()
                            .map(|d| Utc::now() + d);
                    }
                }
            }
        }
        tracing::debug!("monitoring loop exited");
    }

    /// Runs a cycle unless one is already executing, in which case the
    /// attempt is skipped and `None` returned.
    async fn run_guarded_cycle(&self) -> Option<CycleReport> {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            tracing::warn!("monitoring cycle already in progress, skipping");
            return None;
        };
        self.state().last_run = Some(Utc::now());

        let report = self.execute_cycle().await;
        self.state().last_report = Some(report.clone());
        Some(report)
    }

    async fn execute_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let result = match AssertUnwindSafe(self.process_all()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(ServiceError::Internal(format!(
                "monitoring cycle panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let report = match result {
            Ok(tally) => CycleReport {
                status: JobStatus::CycleCompleted,
                processed: tally.processed,
                alerts: tally.alerts,
                batches: tally.batches,
                skipped_batches: tally.skipped_batches,
                failed_items: tally.failed_items,
                duration_ms,
                error: None,
                finished_at: Utc::now(),
            },
            Err(e) => {
                tracing::error!(error = %e, "monitoring cycle failed");
                CycleReport {
                    status: JobStatus::CycleError,
                    processed: 0,
                    alerts: 0,
                    batches: 0,
                    skipped_batches: 0,
                    failed_items: 0,
                    duration_ms,
                    error: Some(e.to_string()),
                    finished_at: Utc::now(),
                }
            }
        };

        self.record(JobRun::new(report.status, report.metadata())).await;
        if report.status == JobStatus::CycleCompleted {
            tracing::info!(
                processed = report.processed,
                alerts = report.alerts,
                batches = report.batches,
                skipped_batches = report.skipped_batches,
                failed_items = report.failed_items,
                duration_ms,
                "monitoring cycle completed"
            );
            let _ = self.event_bus.publish(MonitorEvent::CycleCompleted {
                processed: report.processed,
                alerts: report.alerts,
                timestamp: report.finished_at,
            });
        }
        report
    }

    async fn process_all(&self) -> Result<CycleTally, ServiceError> {
        let configs = self.configs.list_active().await?;
        let mut tally = CycleTally::default();
        if configs.is_empty() {
            tracing::info!("no active monitoring configurations");
            return Ok(tally);
        }

        for (index, batch) in configs.chunks(self.settings.batch_size.max(1)).enumerate() {
            if index > 0 && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
            tally.batches += 1;
            if let Err(e) = self.process_batch(batch, &mut tally).await {
                tally.skipped_batches += 1;
                tracing::warn!(
                    batch = index + 1,
                    size = batch.len(),
                    error = %e,
                    "pricing unavailable, batch skipped"
                );
            }
        }
        Ok(tally)
    }

    async fn process_batch(
        &self,
        batch: &[MonitoringConfig],
        tally: &mut CycleTally,
    ) -> Result<(), ProviderError> {
        let asins: Vec<String> = batch.iter().map(|c| c.asin.clone()).collect();
        let snapshots = self.fetch_pricing(&asins).await?;
        let by_asin: HashMap<&str, &PricingSnapshot> =
            snapshots.iter().map(|s| (s.asin.as_str(), s)).collect();

        let evaluations = batch.iter().filter_map(|config| {
            by_asin
                .get(config.asin.as_str())
                .map(|snapshot| self.evaluate_one(config, snapshot))
        });
        for outcome in join_all(evaluations).await {
            match outcome {
                ItemOutcome::Processed(alerts) => {
                    tally.processed += 1;
                    tally.alerts += alerts;
                }
                ItemOutcome::Failed => tally.failed_items += 1,
            }
        }
        Ok(())
    }

    async fn fetch_pricing(&self, asins: &[String]) -> Result<Vec<PricingSnapshot>, ProviderError> {
        let pricing = &self.pricing;
        self.settings
            .retry
            .run("fetch_competitive_pricing", |_attempt| async move {
                match pricing.fetch_batch(asins).await {
                    Ok(snapshots) if snapshots.is_empty() => Err(ProviderError::Empty),
                    other => other,
                }
            })
            .await
    }

    async fn evaluate_one(
        &self,
        config: &MonitoringConfig,
        snapshot: &PricingSnapshot,
    ) -> ItemOutcome {
        let evaluation = AssertUnwindSafe(self.detector.evaluate(config, snapshot))
            .catch_unwind()
            .await;
        let outcome = match evaluation {
            Ok(Ok(alerts)) => {
                self.dispatch(&alerts, config).await;
                ItemOutcome::Processed(alerts.len() as u64)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    asin = %config.asin,
                    owner = %config.owner,
                    error = %e,
                    "alert evaluation failed"
                );
                ItemOutcome::Failed
            }
            Err(panic) => {
                tracing::error!(
                    asin = %config.asin,
                    owner = %config.owner,
                    panic = %panic_message(panic.as_ref()),
                    "alert evaluation panicked"
                );
                ItemOutcome::Failed
            }
        };
        self.touch(config).await;
        outcome
    }

    async fn dispatch(&self, alerts: &[Alert], config: &MonitoringConfig) {
        if alerts.is_empty() {
            return;
        }
        match AssertUnwindSafe(self.dispatcher.dispatch(alerts, config))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(asin = %config.asin, error = %e, "alert dispatch failed");
            }
            Err(panic) => {
                tracing::error!(
                    asin = %config.asin,
                    panic = %panic_message(panic.as_ref()),
                    "alert dispatch panicked"
                );
            }
        }
    }

    async fn touch(&self, config: &MonitoringConfig) {
        if let Err(e) = self.configs.touch(config.id, Utc::now()).await {
            tracing::warn!(asin = %config.asin, error = %e, "failed to update check metadata");
        }
    }

    async fn record(&self, run: JobRun) {
        if let Err(e) = self.job_log.record(&run).await {
            tracing::error!(status = %run.status, error = %e, "failed to write job run");
        }
    }
}

/// Best-effort text of a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::ConfigId;
    use crate::notify::{BroadcastDispatcher, BuyBoxAlertDetector};
    use crate::persistence::InMemoryStore;

    /// Answers every ASIN with an undercut snapshot, except those listed.
    #[derive(Debug, Default)]
    struct ScriptedPricing {
        unavailable: Vec<String>,
        always_empty: bool,
        delay: Option<Duration>,
        calls: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl PricingProvider for ScriptedPricing {
        async fn fetch_batch(
            &self,
            asins: &[String],
        ) -> Result<Vec<PricingSnapshot>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut sizes) = self.batch_sizes.lock() {
                sizes.push(asins.len());
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.always_empty {
                return Ok(Vec::new());
            }
            Ok(asins
                .iter()
                .filter(|a| !self.unavailable.contains(a))
                .map(|asin| PricingSnapshot {
                    asin: asin.clone(),
                    our_price: Some(Decimal::new(1299, 2)),
                    buy_box_price: Some(Decimal::new(1199, 2)),
                    buy_box_seller_id: None,
                    is_buy_box_winner: Some(true),
                    competitor_prices: vec![Decimal::new(1199, 2)],
                    offer_count: 2,
                    fetched_at: Utc::now(),
                })
                .collect())
        }
    }

    #[derive(Debug)]
    struct FailingDetector {
        failing_asin: String,
    }

    #[async_trait]
    impl AlertDetector for FailingDetector {
        async fn evaluate(
            &self,
            config: &MonitoringConfig,
            snapshot: &PricingSnapshot,
        ) -> anyhow::Result<Vec<Alert>> {
            if config.asin == self.failing_asin {
                anyhow::bail!("detector exploded for {}", config.asin);
            }
            BuyBoxAlertDetector.evaluate(config, snapshot).await
        }
    }

    #[derive(Debug)]
    struct PanickingDetector {
        panicking_asin: String,
    }

    #[async_trait]
    impl AlertDetector for PanickingDetector {
        async fn evaluate(
            &self,
            config: &MonitoringConfig,
            snapshot: &PricingSnapshot,
        ) -> anyhow::Result<Vec<Alert>> {
            if config.asin == self.panicking_asin {
                panic!("detector bug for {}", config.asin);
            }
            BuyBoxAlertDetector.evaluate(config, snapshot).await
        }
    }

    #[derive(Debug)]
    struct PanickingPricing;

    #[async_trait]
    impl PricingProvider for PanickingPricing {
        async fn fetch_batch(
            &self,
            _asins: &[String],
        ) -> Result<Vec<PricingSnapshot>, ProviderError> {
            panic!("pricing gateway client bug");
        }
    }

    #[derive(Debug)]
    struct BrokenConfigStore;

    #[async_trait]
    impl MonitoringConfigStore for BrokenConfigStore {
        async fn list_active(&self) -> Result<Vec<MonitoringConfig>, ServiceError> {
            Err(ServiceError::Persistence("connection refused".to_string()))
        }

        async fn find(
            &self,
            _asin: &str,
            _owner: &str,
        ) -> Result<Option<MonitoringConfig>, ServiceError> {
            Ok(None)
        }

        async fn touch(&self, _id: ConfigId, _at: DateTime<Utc>) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    fn settings(batch_size: usize) -> SchedulerSettings {
        SchedulerSettings {
            batch_size,
            batch_delay: Duration::from_secs(2),
            retry: RetryPolicy::linear(3, Duration::from_secs(1)),
        }
    }

    async fn seeded_store(count: usize) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..count {
            let priority = i32::try_from(i).unwrap_or(0);
            store
                .upsert_config(MonitoringConfig::new(format!("B{i:09}"), "seller-1", priority))
                .await;
        }
        store
    }

    fn scheduler_with(
        store: &Arc<InMemoryStore>,
        configs: Arc<dyn MonitoringConfigStore>,
        pricing: Arc<dyn PricingProvider>,
        detector: Arc<dyn AlertDetector>,
        batch_size: usize,
    ) -> Arc<MonitoringScheduler> {
        let bus = EventBus::new(64);
        Arc::new(MonitoringScheduler::new(
            configs,
            pricing,
            detector,
            Arc::new(BroadcastDispatcher::new(bus.clone())),
            Arc::clone(store) as Arc<dyn JobLog>,
            bus,
            settings(batch_size),
        ))
    }

    fn scheduler(
        store: &Arc<InMemoryStore>,
        pricing: Arc<ScriptedPricing>,
        batch_size: usize,
    ) -> Arc<MonitoringScheduler> {
        scheduler_with(
            store,
            Arc::clone(store) as Arc<dyn MonitoringConfigStore>,
            pricing,
            Arc::new(BuyBoxAlertDetector),
            batch_size,
        )
    }

    fn statuses(runs: &[JobRun]) -> Vec<JobStatus> {
        runs.iter().map(|r| r.status).collect()
    }

    async fn check_count(store: &InMemoryStore, asin: &str) -> i64 {
        store
            .configs()
            .await
            .into_iter()
            .find(|c| c.asin == asin)
            .map_or(0, |c| c.check_count)
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_splits_configs_into_batches() {
        let store = seeded_store(25).await;
        let pricing = Arc::new(ScriptedPricing::default());
        let sched = scheduler(&store, Arc::clone(&pricing), 10);

        let Ok(report) = sched.run_cycle_now().await else {
            panic!("cycle did not run");
        };
        assert_eq!(report.status, JobStatus::CycleCompleted);
        assert_eq!(report.batches, 3);
        assert_eq!(report.processed, 25);
        assert_eq!(report.alerts, 25);
        assert_eq!(report.skipped_batches, 0);

        let Ok(sizes) = pricing.batch_sizes.lock().map(|s| s.clone()) else {
            panic!("lock poisoned");
        };
        assert_eq!(sizes, vec![10, 10, 5]);

        let runs = store.job_runs().await;
        assert_eq!(statuses(&runs), vec![JobStatus::CycleCompleted]);
        assert!(store.configs().await.iter().all(|c| c.check_count == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn configs_without_pricing_are_not_processed() {
        let store = seeded_store(4).await;
        let pricing = Arc::new(ScriptedPricing {
            unavailable: vec!["B000000001".to_string()],
            ..ScriptedPricing::default()
        });
        let sched = scheduler(&store, pricing, 10);

        let Ok(report) = sched.run_cycle_now().await else {
            panic!("cycle did not run");
        };
        assert_eq!(report.processed, 3);
        let untouched: Vec<String> = store
            .configs()
            .await
            .into_iter()
            .filter(|c| c.check_count == 0)
            .map(|c| c.asin)
            .collect();
        assert_eq!(untouched, vec!["B000000001".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pricing_is_retried_then_batch_skipped() {
        let store = seeded_store(3).await;
        let pricing = Arc::new(ScriptedPricing {
            always_empty: true,
            ..ScriptedPricing::default()
        });
        let sched = scheduler(&store, Arc::clone(&pricing), 10);

        let started = Instant::now();
        let Ok(report) = sched.run_cycle_now().await else {
            panic!("cycle did not run");
        };
        // 1s after the first attempt, 2s after the second, none after the last
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(report.status, JobStatus::CycleCompleted);
        assert_eq!(report.batches, 1);
        assert_eq!(report.skipped_batches, 1);
        assert_eq!(report.processed, 0);
        assert_eq!(pricing.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn config_store_failure_writes_cycle_error() {
        let store = Arc::new(InMemoryStore::new());
        let sched = scheduler_with(
            &store,
            Arc::new(BrokenConfigStore),
            Arc::new(ScriptedPricing::default()),
            Arc::new(BuyBoxAlertDetector),
            10,
        );

        let Ok(report) = sched.run_cycle_now().await else {
            panic!("cycle did not run");
        };
        assert_eq!(report.status, JobStatus::CycleError);
        assert!(report.error.is_some_and(|e| e.contains("connection refused")));

        let runs = store.job_runs().await;
        assert_eq!(statuses(&runs), vec![JobStatus::CycleError]);
    }

    #[tokio::test(start_paused = true)]
    async fn evaluation_failure_is_isolated() {
        let store = seeded_store(5).await;
        let sched = scheduler_with(
            &store,
            Arc::clone(&store) as Arc<dyn MonitoringConfigStore>,
            Arc::new(ScriptedPricing::default()),
            Arc::new(FailingDetector {
                failing_asin: "B000000002".to_string(),
            }),
            2,
        );

        let Ok(report) = sched.run_cycle_now().await else {
            panic!("cycle did not run");
        };
        assert_eq!(report.processed, 4);
        assert_eq!(report.failed_items, 1);
        assert_eq!(report.batches, 3);
        assert_eq!(check_count(&store, "B000000002").await, 1);
        assert!(store.configs().await.iter().all(|c| c.check_count == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_batch_does_not_abort_later_batches() {
        // priority order puts B000000003 and B000000002 in the first batch
        let store = seeded_store(4).await;
        let pricing = Arc::new(ScriptedPricing {
            unavailable: vec!["B000000003".to_string(), "B000000002".to_string()],
            ..ScriptedPricing::default()
        });
        let sched = scheduler(&store, Arc::clone(&pricing), 2);

        let Ok(report) = sched.run_cycle_now().await else {
            panic!("cycle did not run");
        };
        assert_eq!(report.status, JobStatus::CycleCompleted);
        assert_eq!(report.batches, 2);
        assert_eq!(report.skipped_batches, 1);
        assert_eq!(report.processed, 2);
        assert_eq!(pricing.calls.load(Ordering::SeqCst), 4);
        assert_eq!(check_count(&store, "B000000003").await, 0);
        assert_eq!(check_count(&store, "B000000001").await, 1);
        assert_eq!(check_count(&store, "B000000000").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_are_spaced_by_the_batch_delay() {
        let store = seeded_store(25).await;
        let sched = scheduler(&store, Arc::new(ScriptedPricing::default()), 10);

        let started = Instant::now();
        let Ok(report) = sched.run_cycle_now().await else {
            panic!("cycle did not run");
        };
        assert_eq!(report.batches, 3);
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert!(report.duration_ms >= 4_000);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_detector_fails_one_item_and_the_loop_survives() {
        let store = seeded_store(3).await;
        let sched = scheduler_with(
            &store,
            Arc::clone(&store) as Arc<dyn MonitoringConfigStore>,
            Arc::new(ScriptedPricing::default()),
            Arc::new(PanickingDetector {
                panicking_asin: "B000000000".to_string(),
            }),
            10,
        );

        assert!(matches!(sched.start(1).await, Ok(true)));
        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        assert!(sched.status().running);
        assert!(sched.stop().await);

        let runs = store.job_runs().await;
        let completed: Vec<&JobRun> = runs
            .iter()
            .filter(|r| r.status == JobStatus::CycleCompleted)
            .collect();
        assert!(completed.len() >= 10, "only {} cycles ran", completed.len());
        assert!(
            completed
                .iter()
                .all(|r| r.metadata.processed == 2 && r.metadata.failed_items == 1)
        );
        assert_eq!(runs.last().map(|r| r.status), Some(JobStatus::Stopped));
        assert_eq!(
            check_count(&store, "B000000000").await,
            i64::try_from(completed.len()).unwrap_or(i64::MAX)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_pricing_provider_writes_cycle_error() {
        let store = seeded_store(2).await;
        let sched = scheduler_with(
            &store,
            Arc::clone(&store) as Arc<dyn MonitoringConfigStore>,
            Arc::new(PanickingPricing),
            Arc::new(BuyBoxAlertDetector),
            10,
        );

        let Ok(report) = sched.run_cycle_now().await else {
            panic!("cycle did not run");
        };
        assert_eq!(report.status, JobStatus::CycleError);
        assert!(report.error.is_some_and(|e| e.contains("pricing gateway client bug")));

        // the guard was released, so the next cycle runs too
        tokio_test::assert_ok!(sched.run_cycle_now().await);
        assert_eq!(
            statuses(&store.job_runs().await),
            vec![JobStatus::CycleError, JobStatus::CycleError]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_cycles_are_refused() {
        let store = seeded_store(2).await;
        let pricing = Arc::new(ScriptedPricing {
            delay: Some(Duration::from_secs(10)),
            ..ScriptedPricing::default()
        });
        let sched = scheduler(&store, pricing, 10);

        let (first, second) = tokio::join!(sched.run_cycle_now(), sched.run_cycle_now());
        tokio_test::assert_ok!(first);
        assert!(matches!(second, Err(ServiceError::CycleInProgress)));
        assert_eq!(store.job_runs().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_immediately_and_is_idempotent() {
        let store = seeded_store(3).await;
        let sched = scheduler(&store, Arc::new(ScriptedPricing::default()), 10);

        assert!(matches!(sched.start(60).await, Ok(true)));
        assert!(matches!(sched.start(5).await, Ok(false)));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let status = sched.status();
        assert!(status.running);
        assert_eq!(status.interval_minutes, Some(60));
        assert!(status.last_report.is_some_and(|r| r.processed == 3));

        tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        assert!(sched.stop().await);
        assert!(!sched.stop().await);
        tokio::time::sleep(Duration::from_secs(3 * 60 * 60)).await;

        let runs = store.job_runs().await;
        assert_eq!(
            statuses(&runs),
            vec![
                JobStatus::Started,
                JobStatus::CycleCompleted,
                JobStatus::CycleCompleted,
                JobStatus::Stopped,
            ]
        );
        assert!(!sched.status().running);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_rejected() {
        let store = seeded_store(0).await;
        let sched = scheduler(&store, Arc::new(ScriptedPricing::default()), 10);
        assert!(matches!(
            sched.start(0).await,
            Err(ServiceError::InvalidRequest(_))
        ));
        assert!(!sched.status().running);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_check_reports_alerts() {
        let store = seeded_store(1).await;
        let sched = scheduler(&store, Arc::new(ScriptedPricing::default()), 10);

        let Ok(result) = sched.run_manual_check("B000000000", "seller-1").await else {
            panic!("manual check failed");
        };
        assert!(result.snapshot.is_some());
        assert_eq!(result.alerts.len(), 1);
        assert!(store.job_runs().await.is_empty());

        assert!(matches!(
            sched.run_manual_check("B000000000", "someone-else").await,
            Err(ServiceError::ConfigNotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn statistics_fold_recent_cycles() {
        let store = seeded_store(4).await;
        let sched = scheduler(&store, Arc::new(ScriptedPricing::default()), 10);
        tokio_test::assert_ok!(sched.run_cycle_now().await);
        tokio_test::assert_ok!(sched.run_cycle_now().await);

        let Ok(stats) = sched.statistics(7).await else {
            panic!("statistics failed");
        };
        assert_eq!(stats.completed_cycles, 2);
        assert_eq!(stats.total_processed, 8);
        assert!(sched.statistics(0).await.is_err());
    }
}
