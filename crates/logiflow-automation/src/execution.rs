//! Append-only audit record of one execution attempt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logiflow_core::error::Result;
use serde::{Deserialize, Serialize};

use crate::event::SystemEvent;

/// Outcome of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failed,
}

/// One entry of `actions_run`, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    #[serde(rename = "type")]
    pub action_type: String,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn success(action_type: &str) -> Self {
        Self {
            action_type: action_type.to_string(),
            status: ActionStatus::Success,
            error: None,
        }
    }

    pub fn failed(action_type: &str, error: impl Into<String>) -> Self {
        Self {
            action_type: action_type.to_string(),
            status: ActionStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}

/// Durable record of one rule execution attempt. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub rule_id: String,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub matched: bool,
    pub success: bool,
    pub error: Option<String>,
    pub event_data: serde_json::Value,
    pub actions_run: Vec<ActionOutcome>,
    pub created_at: DateTime<Utc>,
}

impl ExecutionLog {
    /// Start a log row for `rule_id` fired by `event`.
    pub fn for_event(rule_id: &str, event: &SystemEvent) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            event_type: event.event_type.clone(),
            entity_type: event.entity_type.clone(),
            entity_id: event.entity_id.clone(),
            matched: true,
            success: true,
            error: None,
            event_data: event.snapshot(),
            actions_run: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Sink for execution logs. Must be safe to call from the scheduler task and
/// from any publisher's task at the same time.
#[async_trait]
pub trait ExecutionLogger: Send + Sync {
    async fn record(&self, log: ExecutionLog) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization() {
        let ok = serde_json::to_value(ActionOutcome::success("notify")).unwrap();
        assert_eq!(ok, serde_json::json!({"type": "notify", "status": "success"}));

        let failed = serde_json::to_value(ActionOutcome::failed("email", "smtp down")).unwrap();
        assert_eq!(failed["status"], "failed");
        assert_eq!(failed["error"], "smtp down");
    }

    #[test]
    fn test_log_for_event() {
        let payload = serde_json::json!({});
        let event = SystemEvent::domain("document.approved", "mi", "mi-7", "approved", payload);
        let log = ExecutionLog::for_event("rule-1", &event);
        assert_eq!(log.entity_id, "mi-7");
        assert_eq!(log.event_type, "document.approved");
        assert!(log.matched);
        assert!(log.actions_run.is_empty());
        assert_eq!(log.event_data["action"], "approved");
    }
}
