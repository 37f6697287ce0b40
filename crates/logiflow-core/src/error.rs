//! Error types for Logiflow.

use thiserror::Error;

/// Result alias used across the Logiflow crates.
pub type Result<T> = std::result::Result<T, LogiflowError>;

/// Errors raised by the engine's collaborators and configuration layer.
///
/// The scheduler and matcher entry points never surface these to callers;
/// they are reported through `tracing` and the execution log instead.
#[derive(Debug, Error)]
pub enum LogiflowError {
    /// Configuration could not be read or parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// Rule store query or update failed.
    #[error("Rule store error: {0}")]
    Store(String),

    /// Execution log write failed.
    #[error("Execution log error: {0}")]
    Logger(String),

    /// A rule definition is malformed (bad action list, missing cron expression).
    #[error("Invalid rule '{rule_id}': {reason}")]
    InvalidRule { rule_id: String, reason: String },

    /// A cron expression is structurally invalid.
    #[error("Invalid cron expression '{expression}': {reason}")]
    Cron { expression: String, reason: String },

    /// Referenced rule or workflow does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LogiflowError {
    /// Shorthand for a rule definition error.
    pub fn invalid_rule(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule_id: rule_id.into(),
            reason: reason.into(),
        }
    }
}
