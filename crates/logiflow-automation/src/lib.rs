//! # Logiflow Automation
//!
//! Workflow rule engine for the Logiflow document platform.
//! Rules fire on a cron schedule or on domain events, run an ordered list of
//! actions, and leave an append-only execution log behind.
//!
//! ## Design Principles
//! - Storage behind traits: SQLite by default, in-memory for tests
//! - Tokio timers only, zero overhead when idle
//! - One failing action never stops its siblings; one failing rule never stops a tick
//! - Every attempt is audited, including failures
//!
//! ## Architecture
//! ```text
//! Scheduler (tokio interval)                EventBus.publish(event)
//!   ├── RuleStore.due_rules(now)              └── RuleMatcher
//!   ├── workflow inactive → skip                    ├── RuleStore.event_rules(entity, event)
//!   ├── SystemEvent::scheduled                      └── ConditionEvaluator
//!   └── advance next_run_at (cron)
//!             │                                          │
//!             └──────────────► ExecutionPipeline ◄───────┘
//!                                ├── ActionRegistry (timeout + panic guard)
//!                                │     └── notify, ...
//!                                └── ExecutionLogger (SQLite / memory)
//! ```

pub mod actions;
pub mod bus;
pub mod conditions;
pub mod cron;
pub mod event;
pub mod execution;
pub mod matcher;
pub mod persistence;
pub mod pipeline;
pub mod rules;
pub mod scheduler;
pub mod store;

pub use actions::{ActionError, ActionExecutor, ActionHandler, ActionRegistry, NotifyHandler};
pub use bus::{EventBus, EventHandler, SubscriptionId};
pub use conditions::{ConditionEvaluator, PayloadConditions};
pub use event::{EventSource, SystemEvent};
pub use execution::{ActionOutcome, ActionStatus, ExecutionLog, ExecutionLogger};
pub use matcher::RuleMatcher;
pub use persistence::SqliteStore;
pub use pipeline::{ExecutionPipeline, ExecutionReport};
pub use rules::{ActionSpec, DueRule, Rule, RuleTrigger, Workflow, WorkflowRef};
pub use scheduler::{Scheduler, TickReport};
pub use store::{InMemoryStore, RuleStore};
