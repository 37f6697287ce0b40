//! Action dispatch — resolves an action type tag to a registered handler.
//!
//! Handlers are registered once at startup. Every invocation goes through
//! [`ActionRegistry::execute`], which turns unknown types, timeouts and
//! panics into ordinary [`ActionError`]s so nothing escapes into the
//! scheduler task or the publisher.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;

use crate::event::SystemEvent;

/// Why a single action failed.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0}")]
    Failed(String),

    #[error("unknown action type '{0}'")]
    UnknownType(String),

    #[error("action timed out after {0:?}")]
    TimedOut(Duration),

    #[error("action panicked: {0}")]
    Panicked(String),
}

impl ActionError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Performs one unit of work for an action descriptor.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        action_type: &str,
        params: &serde_json::Value,
        event: &SystemEvent,
    ) -> Result<(), ActionError>;
}

/// A handler for one action type.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Type tag this handler is registered under, e.g. "notify".
    fn action_type(&self) -> &str;

    async fn handle(&self, params: &serde_json::Value, event: &SystemEvent)
    -> Result<(), ActionError>;
}

/// Map from action type tag to handler.
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
    timeout: Option<Duration>,
}

impl ActionRegistry {
    /// Create a new empty registry with no per-action timeout.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            timeout: None,
        }
    }

    /// Create registry with the built-in handlers.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(NotifyHandler));
        reg
    }

    /// Bound every handler invocation.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a handler, replacing any previous one for the same type.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        let action_type = handler.action_type().to_string();
        tracing::info!("🧩 Registered action handler: {}", action_type);
        self.handlers.insert(action_type, handler);
    }

    /// Registered type tags, sorted.
    pub fn action_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionExecutor for ActionRegistry {
    async fn execute(
        &self,
        action_type: &str,
        params: &serde_json::Value,
        event: &SystemEvent,
    ) -> Result<(), ActionError> {
        let handler = self
            .handlers
            .get(action_type)
            .ok_or_else(|| ActionError::UnknownType(action_type.to_string()))?;

        let run = AssertUnwindSafe(handler.handle(params, event)).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| ActionError::TimedOut(limit))?,
            None => run.await,
        };

        outcome.unwrap_or_else(|panic| Err(ActionError::Panicked(panic_message(panic.as_ref()))))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Built-in `notify` action: writes `params.message` to the operational log.
pub struct NotifyHandler;

#[async_trait]
impl ActionHandler for NotifyHandler {
    fn action_type(&self) -> &str {
        "notify"
    }

    async fn handle(
        &self,
        params: &serde_json::Value,
        event: &SystemEvent,
    ) -> Result<(), ActionError> {
        let message = params["message"]
            .as_str()
            .ok_or_else(|| ActionError::failed("notify: missing 'message' param"))?;
        tracing::info!(
            "📢 [{} {}:{}] {}",
            event.event_type,
            event.entity_type,
            event.entity_id,
            message
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sleepy;

    #[async_trait]
    impl ActionHandler for Sleepy {
        fn action_type(&self) -> &str {
            "sleepy"
        }

        async fn handle(&self, _: &serde_json::Value, _: &SystemEvent) -> Result<(), ActionError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    struct Explodes;

    #[async_trait]
    impl ActionHandler for Explodes {
        fn action_type(&self) -> &str {
            "explodes"
        }

        async fn handle(&self, _: &serde_json::Value, _: &SystemEvent) -> Result<(), ActionError> {
            panic!("boom");
        }
    }

    fn event() -> SystemEvent {
        SystemEvent::domain("document.created", "grn", "grn-1", "created", serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_notify_handler() {
        let reg = ActionRegistry::with_defaults();
        assert_eq!(reg.action_types(), vec!["notify"]);

        let ok = reg
            .execute("notify", &serde_json::json!({"message": "GRN received"}), &event())
            .await;
        assert!(ok.is_ok());

        let err = reg.execute("notify", &serde_json::json!({}), &event()).await;
        assert!(matches!(err, Err(ActionError::Failed(_))));
    }

    #[tokio::test]
    async fn test_unknown_type_is_error() {
        let reg = ActionRegistry::with_defaults();
        let err = reg
            .execute("approve_document", &serde_json::Value::Null, &event())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown action type 'approve_document'");
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut reg = ActionRegistry::new().with_timeout(Some(Duration::from_millis(100)));
        reg.register(Arc::new(Sleepy));
        let err = reg
            .execute("sleepy", &serde_json::Value::Null, &event())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let mut reg = ActionRegistry::new();
        reg.register(Arc::new(Explodes));
        let err = reg
            .execute("explodes", &serde_json::Value::Null, &event())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "action panicked: boom");
    }
}
