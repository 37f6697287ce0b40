//! System events: the single input type of the execution pipeline.
//!
//! Domain mutations publish [`SystemEvent::domain`] events on the bus; the
//! scheduler manufactures [`SystemEvent::scheduled`] events for cron rules so
//! downstream code never has to care which side fired.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::{Rule, WorkflowRef};

/// Event type of every scheduler-synthesized event.
pub const SCHEDULED_EVENT_TYPE: &str = "scheduled:rule_triggered";
/// Action name carried by scheduler-synthesized events.
pub const SCHEDULED_EVENT_ACTION: &str = "rule_triggered";

/// Where an event came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventSource {
    /// Emitted by a real domain mutation.
    Domain,
    /// Synthesized by the scheduler for a due cron rule.
    Schedule { rule_id: String },
}

/// An event flowing through the automation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    /// e.g. "document.created", "scheduled:rule_triggered"
    pub event_type: String,
    /// e.g. "grn", "material_issue"
    pub entity_type: String,
    pub entity_id: String,
    /// e.g. "created", "approved"
    pub action: String,
    pub timestamp: DateTime<Utc>,
    /// Event data (freeform JSON)
    pub payload: serde_json::Value,
    pub source: EventSource,
}

impl SystemEvent {
    /// Create an event for a domain mutation, timestamped now.
    pub fn domain(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: action.to_string(),
            timestamp: Utc::now(),
            payload,
            source: EventSource::Domain,
        }
    }

    /// Synthesize the triggering event for a due schedule rule.
    pub fn scheduled(rule: &Rule, workflow: &WorkflowRef, now: DateTime<Utc>) -> Self {
        Self {
            event_type: SCHEDULED_EVENT_TYPE.to_string(),
            entity_type: workflow.entity_type.clone(),
            entity_id: rule.id.clone(),
            action: SCHEDULED_EVENT_ACTION.to_string(),
            timestamp: now,
            payload: serde_json::json!({
                "ruleName": rule.name,
                "cronExpression": rule.cron_expression().unwrap_or_default(),
            }),
            source: EventSource::Schedule {
                rule_id: rule.id.clone(),
            },
        }
    }

    /// Whether the scheduler manufactured this event.
    pub fn is_scheduled(&self) -> bool {
        matches!(self.source, EventSource::Schedule { .. })
    }

    /// JSON snapshot stored in the execution log.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
