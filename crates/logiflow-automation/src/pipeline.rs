//! Execution pipeline, shared by the scheduler and the rule matcher.
//!
//! ```text
//! (rule, event)
//!   → validate action descriptors      (rule-level failure → log, stop)
//!   → for each action, in order:
//!       → ActionExecutor.execute       (failure recorded, next action runs)
//!   → ExecutionLogger.record           (failure reported, never raised)
//! ```

use std::sync::Arc;

use logiflow_core::error::Result;

use crate::actions::ActionExecutor;
use crate::event::SystemEvent;
use crate::execution::{ActionOutcome, ExecutionLog, ExecutionLogger};
use crate::rules::Rule;

/// What happened when a rule ran. Mirrors the log row that was (or should
/// have been) written.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub rule_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub actions_run: Vec<ActionOutcome>,
    /// False when the execution log write failed.
    pub logged: bool,
}

/// Runs a rule's actions against an event and records the attempt.
pub struct ExecutionPipeline {
    executor: Arc<dyn ActionExecutor>,
    logger: Arc<dyn ExecutionLogger>,
}

impl ExecutionPipeline {
    pub fn new(executor: Arc<dyn ActionExecutor>, logger: Arc<dyn ExecutionLogger>) -> Self {
        Self { executor, logger }
    }

    /// Execute `rule` for `event`. Never fails: every problem ends up in the
    /// returned report, the execution log, or the operational log.
    pub async fn run(&self, rule: &Rule, event: &SystemEvent) -> ExecutionReport {
        let mut log = ExecutionLog::for_event(&rule.id, event);

        match self.run_actions(rule, event).await {
            Ok(outcomes) => {
                log.success = outcomes.iter().all(ActionOutcome::is_success);
                log.actions_run = outcomes;
            }
            Err(e) => {
                tracing::warn!("⚠️ Rule '{}' ({}) could not run: {e}", rule.name, rule.id);
                log.success = false;
                log.error = Some(e.to_string());
            }
        }
        self.finish(rule, event, log).await
    }

    /// Record a rule-level failure found before the pipeline could run the
    /// rule (e.g. an unreadable stored definition). No action runs.
    pub async fn record_failure(
        &self,
        rule: &Rule,
        event: &SystemEvent,
        error: &str,
    ) -> ExecutionReport {
        tracing::warn!("⚠️ Rule '{}' ({}) could not run: {error}", rule.name, rule.id);
        let mut log = ExecutionLog::for_event(&rule.id, event);
        log.success = false;
        log.error = Some(error.to_string());
        self.finish(rule, event, log).await
    }

    async fn finish(&self, rule: &Rule, event: &SystemEvent, log: ExecutionLog) -> ExecutionReport {
        if log.success {
            tracing::info!(
                "✅ Rule '{}' ran {} action(s) for {}",
                rule.name,
                log.actions_run.len(),
                event.event_type
            );
        } else {
            let failed = log.actions_run.iter().filter(|a| !a.is_success()).count();
            tracing::warn!(
                "⚠️ Rule '{}' finished with failures ({} of {} action(s) failed)",
                rule.name,
                failed,
                log.actions_run.len()
            );
        }

        let mut report = ExecutionReport {
            rule_id: rule.id.clone(),
            success: log.success,
            error: log.error.clone(),
            actions_run: log.actions_run.clone(),
            logged: true,
        };

        if let Err(e) = self.logger.record(log).await {
            tracing::error!("❌ Failed to write execution log for rule {}: {e}", rule.id);
            report.logged = false;
        }

        report
    }

    /// Rule-level preparation followed by in-order action execution.
    async fn run_actions(&self, rule: &Rule, event: &SystemEvent) -> Result<Vec<ActionOutcome>> {
        for (index, action) in rule.actions.iter().enumerate() {
            action.validate(&rule.id, index)?;
        }

        let mut outcomes = Vec::with_capacity(rule.actions.len());
        for action in &rule.actions {
            let outcome = match self
                .executor
                .execute(&action.action_type, &action.params, event)
                .await
            {
                Ok(()) => ActionOutcome::success(&action.action_type),
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Action '{}' of rule '{}' failed: {e}",
                        action.action_type,
                        rule.name
                    );
                    ActionOutcome::failed(&action.action_type, e.to_string())
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
