//! Scheduler loop that fires due cron rules.
//! Uses tokio::time::interval for zero-overhead ticking (sleeps between checks).
//!
//! Each tick:
//! ```text
//! RuleStore.due_rules(now)
//!   └── for each due rule (store order):
//!         ├── workflow inactive → skip (no log, next_run_at untouched)
//!         ├── SystemEvent::scheduled → ExecutionPipeline.run
//!         └── next_run_at = cron::next_run(expr, now)   (even if actions failed)
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use crate::cron;
use crate::event::SystemEvent;
use crate::pipeline::ExecutionPipeline;
use crate::store::RuleStore;

/// Summary of one scheduler pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Rules returned by the due query.
    pub due: usize,
    /// Rules whose actions ran.
    pub executed: usize,
    /// Executed rules where every action succeeded.
    pub succeeded: usize,
    /// Executed rules with at least one failure, plus unusable rows.
    pub failed: usize,
    /// Due rules left alone because their workflow is inactive.
    pub skipped_inactive: usize,
    /// Rules whose `next_run_at` could not be persisted.
    pub advance_failures: usize,
}

/// Shortest period the loop accepts.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Drives schedule-driven rules. Owns its timer; several independent
/// instances can coexist (tests, multi-tenant hosts).
pub struct Scheduler {
    store: Arc<dyn RuleStore>,
    pipeline: Arc<ExecutionPipeline>,
    interval: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn RuleStore>,
        pipeline: Arc<ExecutionPipeline>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            pipeline,
            // tokio intervals panic on a zero period
            interval: interval.max(MIN_INTERVAL),
            running: Mutex::new(None),
        }
    }

    /// Give every active schedule rule without a `next_run_at` its first run time.
    pub async fn initialize_scheduled_rules(&self) -> usize {
        self.initialize_scheduled_rules_at(Utc::now()).await
    }

    /// [`Self::initialize_scheduled_rules`] with an explicit clock.
    /// Returns how many rules were initialized.
    pub async fn initialize_scheduled_rules_at(&self, now: DateTime<Utc>) -> usize {
        let rules = match self.store.uninitialized_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!("❌ Failed to load uninitialized schedule rules: {e}");
                return 0;
            }
        };

        let mut initialized = 0;
        for rule in &rules {
            let Some(expression) = rule.cron_expression() else {
                continue;
            };
            let next = cron::next_run(expression, now);
            match self.store.set_next_run_at(&rule.id, next).await {
                Ok(()) => {
                    tracing::info!("📅 Rule '{}' scheduled: next run {}", rule.name, next);
                    initialized += 1;
                }
                Err(e) => tracing::warn!("⚠️ Failed to initialize rule '{}': {e}", rule.name),
            }
        }
        initialized
    }

    /// One scheduler pass at the current time.
    pub async fn process_scheduled_rules(&self) -> TickReport {
        self.process_scheduled_rules_at(Utc::now()).await
    }

    /// One scheduler pass with an explicit clock. Never fails; every problem
    /// is absorbed per rule and counted in the report.
    pub async fn process_scheduled_rules_at(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        let due = match self.store.due_rules(now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!("❌ Failed to query due rules: {e}");
                return report;
            }
        };
        if due.is_empty() {
            return report;
        }
        report.due = due.len();
        tracing::debug!("🔔 {} scheduled rule(s) due", due.len());

        for item in &due {
            let rule = &item.rule;

            // Frozen until the workflow is re-enabled: re-selected every tick.
            if !item.workflow.is_active {
                tracing::debug!(
                    "⏸️ Rule '{}' skipped: workflow {} is inactive",
                    rule.name,
                    item.workflow.id
                );
                report.skipped_inactive += 1;
                continue;
            }

            let Some(expression) = rule.cron_expression() else {
                tracing::warn!("⚠️ Due rule '{}' has no cron expression", rule.id);
                report.failed += 1;
                continue;
            };

            tracing::info!("🔔 Scheduled rule triggered: '{}'", rule.name);
            let event = SystemEvent::scheduled(rule, &item.workflow, now);
            let outcome = match &item.defect {
                Some(defect) => self.pipeline.record_failure(rule, &event, defect).await,
                None => self.pipeline.run(rule, &event).await,
            };
            report.executed += 1;
            if outcome.success {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }

            let next = cron::next_run(expression, now);
            if let Err(e) = self.store.set_next_run_at(&rule.id, next).await {
                tracing::warn!(
                    "⚠️ Failed to advance rule '{}' to {}: {e} (stays due)",
                    rule.name,
                    next
                );
                report.advance_failures += 1;
            }
        }

        tracing::info!(
            "⏰ Tick done: {} due, {} executed, {} failed, {} skipped",
            report.due,
            report.executed,
            report.failed,
            report.skipped_inactive
        );
        report
    }

    /// Spawn the loop on the current tokio runtime. Initialization runs once
    /// first; the first tick fires one interval later. Returns false if the
    /// loop is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if running.is_some() {
            tracing::warn!("⚠️ Scheduler already running");
            return false;
        }

        let (shutdown, mut stop_rx) = watch::channel(false);
        let scheduler = Arc::clone(self);
        let period = self.interval;
        let instance = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".into());
        let span = tracing::info_span!("scheduler", instance = %instance);

        let handle = tokio::spawn(
            async move {
                tracing::info!("⏰ Scheduler started (check every {}s)", period.as_secs());
                let initialized = scheduler.initialize_scheduled_rules().await;
                if initialized > 0 {
                    tracing::info!("📅 Initialized {} schedule rule(s)", initialized);
                }

                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            scheduler.process_scheduled_rules().await;
                        }
                        _ = stop_rx.changed() => break,
                    }
                }
                tracing::info!("🛑 Scheduler stopped");
            }
            .instrument(span),
        );

        *running = Some(RunningLoop { shutdown, handle });
        true
    }

    /// Signal the loop to stop and wait for it. A tick in progress finishes
    /// first. Returns false if the loop was not running.
    pub async fn stop(&self) -> bool {
        let running = match self.running.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(RunningLoop { shutdown, handle }) = running else {
            return false;
        };

        let _ = shutdown.send(true);
        if let Err(e) = handle.await {
            tracing::error!("❌ Scheduler task ended abnormally: {e}");
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|r| r.as_ref().is_some_and(|l| !l.handle.is_finished()))
            .unwrap_or(false)
    }
}
