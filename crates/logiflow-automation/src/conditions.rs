//! Condition evaluation for event-driven rules.
//!
//! The engine treats conditions as opaque: anything implementing
//! [`ConditionEvaluator`] can decide whether a rule applies to an event.
//! [`PayloadConditions`] is a small default good enough for field checks.

use crate::event::SystemEvent;

/// Decides whether a rule's `conditions` hold for an event.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, conditions: &serde_json::Value, event: &SystemEvent) -> bool;
}

impl<F> ConditionEvaluator for F
where
    F: Fn(&serde_json::Value, &SystemEvent) -> bool + Send + Sync,
{
    fn evaluate(&self, conditions: &serde_json::Value, event: &SystemEvent) -> bool {
        self(conditions, event)
    }
}

/// Field checks against `event.payload`.
///
/// - `null` or `{}` → always true
/// - `{"status": "approved", "warehouse": "WH-1"}` → every field equal
/// - `[{"field": "qty", "operator": ">", "value": 10}, ...]` → every clause holds
///
/// Field names may use dots for nested lookup (`"line.sku"`).
#[derive(Debug, Default, Clone, Copy)]
pub struct PayloadConditions;

impl ConditionEvaluator for PayloadConditions {
    fn evaluate(&self, conditions: &serde_json::Value, event: &SystemEvent) -> bool {
        match conditions {
            serde_json::Value::Null => true,
            serde_json::Value::Object(fields) => fields
                .iter()
                .all(|(field, expected)| lookup(&event.payload, field) == Some(expected)),
            serde_json::Value::Array(clauses) => clauses.iter().all(|c| clause_holds(c, event)),
            _ => {
                tracing::debug!("Unsupported condition shape: {}", conditions);
                false
            }
        }
    }
}

fn lookup<'a>(payload: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(payload, |value, key| value.get(key))
}

fn clause_holds(clause: &serde_json::Value, event: &SystemEvent) -> bool {
    let Some(field) = clause["field"].as_str() else {
        return false;
    };
    let expected = &clause["value"];
    let operator = clause["operator"].as_str().unwrap_or("==");
    let actual = lookup(&event.payload, field).unwrap_or(&serde_json::Value::Null);

    match operator {
        "==" => actual == expected,
        "!=" => actual != expected,
        ">" | ">=" | "<" | "<=" => match (actual.as_f64(), expected.as_f64()) {
            (Some(a), Some(b)) => match operator {
                ">" => a > b,
                ">=" => a >= b,
                "<" => a < b,
                _ => a <= b,
            },
            _ => false,
        },
        "contains" => match (actual, expected) {
            (serde_json::Value::String(a), serde_json::Value::String(b)) => a.contains(b.as_str()),
            (serde_json::Value::Array(items), v) => items.contains(v),
            _ => false,
        },
        _ => false,
    }
}
