//! Rule definitions: the data model the engine evaluates.

use chrono::{DateTime, Utc};
use logiflow_core::error::{LogiflowError, Result};
use serde::{Deserialize, Serialize};

use crate::cron;

/// A workflow groups rules and can bulk-disable them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    pub is_active: bool,
}

impl Workflow {
    pub fn new(name: &str, entity_type: &str) -> Self {
        Self {
            id: new_id("wf"),
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            is_active: true,
        }
    }

    /// The slice of workflow state the scheduler needs.
    pub fn to_ref(&self) -> WorkflowRef {
        WorkflowRef {
            id: self.id.clone(),
            entity_type: self.entity_type.clone(),
            is_active: self.is_active,
        }
    }
}

/// Parent workflow fields joined onto a due rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRef {
    pub id: String,
    pub entity_type: String,
    pub is_active: bool,
}

/// What fires a rule. A rule is schedule-driven or event-driven, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleTrigger {
    /// Fires when `next_run_at` arrives; advanced with the cron expression.
    Schedule { cron_expression: String },
    /// Fires when a matching event is published and `conditions` hold.
    Event {
        trigger_event: String,
        #[serde(default)]
        conditions: serde_json::Value,
    },
}

/// One action descriptor: a handler type tag plus its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ActionSpec {
    pub fn new(action_type: &str, params: serde_json::Value) -> Self {
        Self {
            action_type: action_type.to_string(),
            params,
        }
    }

    /// Structural check run before any action of the rule executes.
    pub fn validate(&self, rule_id: &str, index: usize) -> Result<()> {
        if self.action_type.trim().is_empty() {
            return Err(LogiflowError::invalid_rule(
                rule_id,
                format!("action #{index} has an empty type"),
            ));
        }
        if !(self.params.is_object() || self.params.is_null()) {
            return Err(LogiflowError::invalid_rule(
                rule_id,
                format!(
                    "action #{index} ('{}') params must be an object",
                    self.action_type
                ),
            ));
        }
        Ok(())
    }
}

/// A workflow rule: when the trigger fires → run the actions in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub workflow_id: String,
    pub name: String,
    pub entity_type: String,
    pub trigger: RuleTrigger,
    pub actions: Vec<ActionSpec>,
    pub is_active: bool,
    /// Higher fires first when several event rules match one event.
    pub priority: i32,
    /// Schedule rules only; `None` until initialized.
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    /// Create a schedule-driven rule. The cron expression must have 5 fields.
    pub fn scheduled(
        workflow_id: &str,
        name: &str,
        entity_type: &str,
        cron_expression: &str,
        actions: Vec<ActionSpec>,
    ) -> Result<Self> {
        cron::validate(cron_expression)?;
        Ok(Self::build(
            workflow_id,
            name,
            entity_type,
            RuleTrigger::Schedule {
                cron_expression: cron_expression.trim().to_string(),
            },
            actions,
        ))
    }

    /// Create an event-driven rule.
    pub fn on_event(
        workflow_id: &str,
        name: &str,
        entity_type: &str,
        trigger_event: &str,
        conditions: serde_json::Value,
        actions: Vec<ActionSpec>,
    ) -> Self {
        Self::build(
            workflow_id,
            name,
            entity_type,
            RuleTrigger::Event {
                trigger_event: trigger_event.to_string(),
                conditions,
            },
            actions,
        )
    }

    fn build(
        workflow_id: &str,
        name: &str,
        entity_type: &str,
        trigger: RuleTrigger,
        actions: Vec<ActionSpec>,
    ) -> Self {
        Self {
            id: new_id("rule"),
            workflow_id: workflow_id.to_string(),
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            trigger,
            actions,
            is_active: true,
            priority: 0,
            next_run_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn cron_expression(&self) -> Option<&str> {
        match &self.trigger {
            RuleTrigger::Schedule { cron_expression } => Some(cron_expression),
            RuleTrigger::Event { .. } => None,
        }
    }

    pub fn trigger_event(&self) -> Option<&str> {
        match &self.trigger {
            RuleTrigger::Event { trigger_event, .. } => Some(trigger_event),
            RuleTrigger::Schedule { .. } => None,
        }
    }

    pub fn conditions(&self) -> Option<&serde_json::Value> {
        match &self.trigger {
            RuleTrigger::Event { conditions, .. } => Some(conditions),
            RuleTrigger::Schedule { .. } => None,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.cron_expression().is_some()
    }

    /// Schedule rule that is active and whose `next_run_at` has arrived.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.is_scheduled() && self.next_run_at.is_some_and(|t| t <= now)
    }
}

/// A due schedule rule joined with its parent workflow.
#[derive(Debug, Clone)]
pub struct DueRule {
    pub rule: Rule,
    pub workflow: WorkflowRef,
    /// Set when the stored row could only be partially decoded. The rule is
    /// then recorded as a rule-level failure instead of being run.
    pub defect: Option<String>,
}

impl DueRule {
    pub fn new(rule: Rule, workflow: WorkflowRef) -> Self {
        Self {
            rule,
            workflow,
            defect: None,
        }
    }
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}
