//! Queries the engine runs against persisted rules.
//!
//! [`InMemoryStore`] keeps everything in process memory (embedding, tests);
//! [`crate::persistence::SqliteStore`] survives restarts.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logiflow_core::error::{LogiflowError, Result};

use crate::execution::{ExecutionLog, ExecutionLogger};
use crate::rules::{DueRule, Rule, Workflow};

/// Persisted rule definitions, as seen by the scheduler and the matcher.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Active schedule rules with `next_run_at <= now`, joined with their
    /// workflow, ordered by `next_run_at` ascending. Inactive workflows are
    /// included; the caller decides what to do with them.
    async fn due_rules(&self, now: DateTime<Utc>) -> Result<Vec<DueRule>>;

    /// Active schedule rules that have never been given a `next_run_at`.
    async fn uninitialized_rules(&self) -> Result<Vec<Rule>>;

    /// Active event rules bound to `(entity_type, trigger_event)`, highest
    /// priority first.
    async fn event_rules(&self, entity_type: &str, trigger_event: &str) -> Result<Vec<Rule>>;

    /// Single-row update of a rule's next run.
    async fn set_next_run_at(&self, rule_id: &str, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Default)]
struct State {
    workflows: Vec<Workflow>,
    rules: Vec<Rule>,
    logs: Vec<ExecutionLog>,
}

/// Process-local rule store and execution logger.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| LogiflowError::Store("in-memory store lock poisoned".into()))
    }

    /// Insert or replace a workflow.
    pub fn save_workflow(&self, workflow: Workflow) -> Result<()> {
        let mut state = self.lock()?;
        state.workflows.retain(|w| w.id != workflow.id);
        state.workflows.push(workflow);
        Ok(())
    }

    /// Insert or replace a rule, keeping insertion order for new rules.
    pub fn save_rule(&self, rule: Rule) -> Result<()> {
        let mut state = self.lock()?;
        match state.rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => state.rules.push(rule),
        }
        Ok(())
    }

    /// Enable/disable a workflow.
    pub fn set_workflow_active(&self, workflow_id: &str, active: bool) -> Result<()> {
        let mut state = self.lock()?;
        let workflow = state
            .workflows
            .iter_mut()
            .find(|w| w.id == workflow_id)
            .ok_or_else(|| LogiflowError::NotFound(format!("workflow {workflow_id}")))?;
        workflow.is_active = active;
        Ok(())
    }

    pub fn rule(&self, rule_id: &str) -> Option<Rule> {
        self.lock()
            .ok()
            .and_then(|s| s.rules.iter().find(|r| r.id == rule_id).cloned())
    }

    /// All recorded execution logs, oldest first.
    pub fn logs(&self) -> Vec<ExecutionLog> {
        self.lock().map(|s| s.logs.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RuleStore for InMemoryStore {
    async fn due_rules(&self, now: DateTime<Utc>) -> Result<Vec<DueRule>> {
        let state = self.lock()?;
        let mut due: Vec<DueRule> = state
            .rules
            .iter()
            .filter(|r| r.is_due(now))
            .filter_map(|rule| {
                let workflow = state.workflows.iter().find(|w| w.id == rule.workflow_id)?;
                Some(DueRule::new(rule.clone(), workflow.to_ref()))
            })
            .collect();
        due.sort_by_key(|d| d.rule.next_run_at);
        Ok(due)
    }

    async fn uninitialized_rules(&self) -> Result<Vec<Rule>> {
        let state = self.lock()?;
        Ok(state
            .rules
            .iter()
            .filter(|r| r.is_active && r.is_scheduled() && r.next_run_at.is_none())
            .cloned()
            .collect())
    }

    async fn event_rules(&self, entity_type: &str, trigger_event: &str) -> Result<Vec<Rule>> {
        let state = self.lock()?;
        let mut rules: Vec<Rule> = state
            .rules
            .iter()
            .filter(|r| {
                r.is_active
                    && r.entity_type == entity_type
                    && r.trigger_event() == Some(trigger_event)
            })
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(rules)
    }

    async fn set_next_run_at(&self, rule_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock()?;
        let rule = state
            .rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| LogiflowError::NotFound(format!("rule {rule_id}")))?;
        rule.next_run_at = Some(at);
        Ok(())
    }
}

#[async_trait]
impl ExecutionLogger for InMemoryStore {
    async fn record(&self, log: ExecutionLog) -> Result<()> {
        self.lock()?.logs.push(log);
        Ok(())
    }
}
