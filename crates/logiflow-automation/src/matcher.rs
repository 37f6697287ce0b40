//! Rule Matcher: the event-driven side of the engine.
//!
//! ```text
//! SystemEvent (published on the bus)
//!   → RuleStore.event_rules(entity_type, event_type)   (priority desc)
//!     → ConditionEvaluator.evaluate(conditions, event)
//!       → ExecutionPipeline.run(rule, event)           (for every match)
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::EventHandler;
use crate::conditions::ConditionEvaluator;
use crate::event::SystemEvent;
use crate::pipeline::{ExecutionPipeline, ExecutionReport};
use crate::store::RuleStore;

/// Evaluates published events against event-driven rules.
pub struct RuleMatcher {
    store: Arc<dyn RuleStore>,
    conditions: Arc<dyn ConditionEvaluator>,
    pipeline: Arc<ExecutionPipeline>,
}

impl RuleMatcher {
    pub fn new(
        store: Arc<dyn RuleStore>,
        conditions: Arc<dyn ConditionEvaluator>,
        pipeline: Arc<ExecutionPipeline>,
    ) -> Self {
        Self {
            store,
            conditions,
            pipeline,
        }
    }

    /// Run every matching rule for `event`, highest priority first.
    /// Never fails; a store error means no rule runs for this event.
    pub async fn handle_event(&self, event: &SystemEvent) -> Vec<ExecutionReport> {
        let candidates = match self
            .store
            .event_rules(&event.entity_type, &event.event_type)
            .await
        {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(
                    "❌ Rule lookup failed for {} on {}: {e}",
                    event.event_type,
                    event.entity_type
                );
                return Vec::new();
            }
        };

        let mut reports = Vec::new();
        for rule in &candidates {
            let conditions = rule.conditions().unwrap_or(&serde_json::Value::Null);
            if !self.conditions.evaluate(conditions, event) {
                tracing::debug!("Rule '{}' conditions not met for {}", rule.name, event.entity_id);
                continue;
            }

            tracing::info!(
                "⚡ Workflow rule '{}' matched event '{}' ({}:{})",
                rule.name,
                event.event_type,
                event.entity_type,
                event.entity_id
            );
            reports.push(self.pipeline.run(rule, event).await);
        }
        reports
    }
}

#[async_trait]
impl EventHandler for RuleMatcher {
    async fn handle(&self, event: &SystemEvent) {
        self.handle_event(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::conditions::PayloadConditions;
    use crate::pipeline::tests::{Recorder, record, registry_with};
    use crate::rules::Rule;
    use crate::store::InMemoryStore;
    use chrono::{DateTime, Utc};
    use logiflow_core::error::{LogiflowError, Result};
    use serde_json::json;

    fn setup() -> (Arc<InMemoryStore>, Arc<Recorder>, RuleMatcher) {
        let store = Arc::new(InMemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        let pipeline = Arc::new(ExecutionPipeline::new(
            registry_with(recorder.clone()),
            store.clone(),
        ));
        let matcher = RuleMatcher::new(store.clone(), Arc::new(PayloadConditions), pipeline);
        (store, recorder, matcher)
    }

    fn created(id: &str, payload: serde_json::Value) -> SystemEvent {
        SystemEvent::domain("document.created", "grn", id, "created", payload)
    }

    #[tokio::test]
    async fn test_matching_rules_run_in_priority_order() {
        let (store, recorder, matcher) = setup();
        for (label, priority) in [("low", 1), ("high", 10), ("mid", 5)] {
            store
                .save_rule(
                    Rule::on_event("wf", label, "grn", "document.created", json!(null), vec![
                        record(label, false),
                    ])
                    .with_priority(priority),
                )
                .unwrap();
        }

        let reports = matcher.handle_event(&created("grn-1", json!({}))).await;
        assert_eq!(reports.len(), 3);
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["high@grn-1", "mid@grn-1", "low@grn-1"]
        );
        assert_eq!(store.logs().len(), 3);
    }

    #[tokio::test]
    async fn test_conditions_filter_rules() {
        let (store, recorder, matcher) = setup();
        store
            .save_rule(Rule::on_event(
                "wf",
                "big-receipts",
                "grn",
                "document.created",
                json!([{"field": "total", "operator": ">=", "value": 1000}]),
                vec![record("big", false)],
            ))
            .unwrap();

        assert!(matcher.handle_event(&created("grn-1", json!({"total": 50}))).await.is_empty());
        assert_eq!(matcher.handle_event(&created("grn-2", json!({"total": 5000}))).await.len(), 1);
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["big@grn-2"]);
        assert!(store.logs().iter().all(|l| l.entity_id == "grn-2"));
    }

    #[tokio::test]
    async fn test_bus_publish_runs_and_logs_before_returning() {
        let (store, recorder, matcher) = setup();
        for (label, priority) in [("low", 1), ("high", 10), ("mid", 5)] {
            store
                .save_rule(
                    Rule::on_event("wf", label, "grn", "document.created", json!(null), vec![
                        record(label, false),
                    ])
                    .with_priority(priority),
                )
                .unwrap();
        }
        store
            .save_rule(Rule::on_event("wf", "deleted", "grn", "document.deleted", json!(null), vec![
                record("deleted", false),
            ]))
            .unwrap();

        let bus = EventBus::new();
        bus.subscribe(|_, entity_type| entity_type == "grn", Arc::new(matcher));

        let event = SystemEvent::domain("document.created", "grn", "grn-4", "created", json!({}));
        assert_eq!(bus.publish(&event).await, 1);

        // Everything has run and been logged by the time publish returns.
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["high@grn-4", "mid@grn-4", "low@grn-4"]
        );
        let logs = store.logs();
        assert_eq!(logs.len(), 3);
        assert!(logs.iter().all(|l| l.success && l.entity_id == "grn-4"));

        let other = SystemEvent::domain("document.created", "mi", "mi-1", "created", json!({}));
        assert_eq!(bus.publish(&other).await, 0);
        assert_eq!(store.logs().len(), 3);
    }

    #[tokio::test]
    async fn test_entity_and_event_must_match() {
        let (store, _recorder, matcher) = setup();
        store
            .save_rule(Rule::on_event("wf", "r", "mi", "document.created", json!(null), vec![
                record("x", false),
            ]))
            .unwrap();
        assert!(matcher.handle_event(&created("grn-1", json!({}))).await.is_empty());
        assert!(store.logs().is_empty());
    }

    struct BrokenStore;

    #[async_trait]
    impl RuleStore for BrokenStore {
        async fn due_rules(&self, _: DateTime<Utc>) -> Result<Vec<crate::rules::DueRule>> {
            Err(LogiflowError::Store("offline".into()))
        }
        async fn uninitialized_rules(&self) -> Result<Vec<Rule>> {
            Err(LogiflowError::Store("offline".into()))
        }
        async fn event_rules(&self, _: &str, _: &str) -> Result<Vec<Rule>> {
            Err(LogiflowError::Store("offline".into()))
        }
        async fn set_next_run_at(&self, _: &str, _: DateTime<Utc>) -> Result<()> {
            Err(LogiflowError::Store("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_runs_nothing() {
        let logs = Arc::new(InMemoryStore::new());
        let pipeline = Arc::new(ExecutionPipeline::new(
            registry_with(Arc::new(Recorder::default())),
            logs.clone(),
        ));
        let matcher =
            RuleMatcher::new(Arc::new(BrokenStore), Arc::new(PayloadConditions), pipeline);
        assert!(matcher.handle_event(&created("grn-1", json!({}))).await.is_empty());
        assert!(logs.logs().is_empty());
    }
}
