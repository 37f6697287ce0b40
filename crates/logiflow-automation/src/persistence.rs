//! SQLite-backed persistence for workflows, rules and execution logs.
//! Survives restarts; one connection shared behind a mutex.
//!
//! Timestamps are stored as RFC 3339 UTC text with millisecond precision
//! (`2026-03-02T14:23:00.000Z`) so string comparison orders them correctly.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use logiflow_core::error::{LogiflowError, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::execution::{ExecutionLog, ExecutionLogger};
use crate::rules::{DueRule, Rule, RuleTrigger, Workflow, WorkflowRef};
use crate::store::RuleStore;

const RULE_COLUMNS: &str = "r.id, r.workflow_id, r.name, r.entity_type, r.cron_expression, \
     r.trigger_event, r.conditions, r.actions, r.is_active, r.priority, r.next_run_at, \
     r.created_at";

/// SQLite rule store and execution logger.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the automation database, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Private database, gone when the store is dropped.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LogiflowError::Store("database lock poisoned".into()))
    }

    /// Create tables and indexes if missing.
    fn migrate(&self) -> Result<()> {
        self.lock()?.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            -- Exactly one of cron_expression / trigger_event is set
            CREATE TABLE IF NOT EXISTS workflow_rules (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                cron_expression TEXT,
                trigger_event TEXT,
                conditions TEXT NOT NULL DEFAULT 'null',   -- JSON
                actions TEXT NOT NULL DEFAULT '[]',        -- JSON array of {type, params}
                is_active INTEGER NOT NULL DEFAULT 1,
                priority INTEGER NOT NULL DEFAULT 0,
                next_run_at TEXT,
                created_at TEXT NOT NULL,
                CHECK ((cron_expression IS NULL) <> (trigger_event IS NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_rules_due
                ON workflow_rules(next_run_at) WHERE cron_expression IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_rules_event
                ON workflow_rules(entity_type, trigger_event) WHERE trigger_event IS NOT NULL;

            -- Append-only audit trail
            CREATE TABLE IF NOT EXISTS workflow_execution_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rule_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                matched INTEGER NOT NULL,
                success INTEGER NOT NULL,
                error TEXT,
                event_data TEXT NOT NULL,    -- JSON
                actions_run TEXT NOT NULL,   -- JSON array of {type, status, error?}
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_logs_rule
                ON workflow_execution_logs(rule_id, id);
            ",
        )?;
        Ok(())
    }

    // ─── Workflows ──────────────────────────────────────

    /// Insert or replace a workflow.
    pub fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        self.lock()?.execute(
            "INSERT INTO workflows (id, name, entity_type, is_active) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                entity_type = excluded.entity_type,
                is_active = excluded.is_active",
            params![
                workflow.id,
                workflow.name,
                workflow.entity_type,
                workflow.is_active
            ],
        )?;
        Ok(())
    }

    /// Enable or disable every rule of a workflow at once.
    pub fn set_workflow_active(&self, workflow_id: &str, active: bool) -> Result<()> {
        let changed = self.lock()?.execute(
            "UPDATE workflows SET is_active = ?1 WHERE id = ?2",
            params![active, workflow_id],
        )?;
        if changed == 0 {
            return Err(LogiflowError::NotFound(format!("workflow {workflow_id}")));
        }
        Ok(())
    }

    pub fn workflows(&self) -> Result<Vec<Workflow>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, entity_type, is_active FROM workflows ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Workflow {
                id: row.get(0)?,
                name: row.get(1)?,
                entity_type: row.get(2)?,
                is_active: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ─── Rules ──────────────────────────────────────

    /// Insert or replace a rule.
    pub fn save_rule(&self, rule: &Rule) -> Result<()> {
        let (cron_expression, trigger_event, conditions) = match &rule.trigger {
            RuleTrigger::Schedule { cron_expression } => {
                (Some(cron_expression.as_str()), None, serde_json::Value::Null)
            }
            RuleTrigger::Event {
                trigger_event,
                conditions,
            } => (None, Some(trigger_event.as_str()), conditions.clone()),
        };

        self.lock()?.execute(
            "INSERT OR REPLACE INTO workflow_rules
             (id, workflow_id, name, entity_type, cron_expression, trigger_event, conditions,
              actions, is_active, priority, next_run_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                rule.id,
                rule.workflow_id,
                rule.name,
                rule.entity_type,
                cron_expression,
                trigger_event,
                conditions.to_string(),
                serde_json::to_string(&rule.actions)?,
                rule.is_active,
                rule.priority,
                rule.next_run_at.map(to_db_time),
                to_db_time(rule.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn rule(&self, rule_id: &str) -> Result<Option<Rule>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {RULE_COLUMNS} FROM workflow_rules r WHERE r.id = ?1"),
                [rule_id],
                RawRule::from_row,
            )
            .optional()?;
        raw.map(RawRule::into_rule).transpose()
    }

    pub fn rules(&self) -> Result<Vec<Rule>> {
        self.query_rules(
            &format!("SELECT {RULE_COLUMNS} FROM workflow_rules r ORDER BY r.created_at, r.id"),
            [],
        )
    }

    fn query_rules<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Rule>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let raws = stmt
            .query_map(params, RawRule::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        decode_rules(raws)
    }

    // ─── Execution logs ──────────────────────────────────────

    /// Most recent logs for a rule, newest first.
    pub fn execution_logs(&self, rule_id: &str, limit: usize) -> Result<Vec<ExecutionLog>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT rule_id, event_type, entity_type, entity_id, matched, success, error,
                    event_data, actions_run, created_at
             FROM workflow_execution_logs WHERE rule_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![rule_id, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut logs = Vec::with_capacity(rows.len());
        for (
            rule_id,
            event_type,
            entity_type,
            entity_id,
            matched,
            success,
            error,
            event_data,
            actions_run,
            created_at,
        ) in rows
        {
            logs.push(ExecutionLog {
                rule_id,
                event_type,
                entity_type,
                entity_id,
                matched,
                success,
                error,
                event_data: serde_json::from_str(&event_data)?,
                actions_run: serde_json::from_str(&actions_run)?,
                created_at: from_db_time(&created_at)?,
            });
        }
        Ok(logs)
    }

    pub fn execution_log_count(&self) -> Result<usize> {
        let count: i64 = self.lock()?.query_row(
            "SELECT COUNT(*) FROM workflow_execution_logs",
            [],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }
}

#[async_trait]
impl RuleStore for SqliteStore {
    async fn due_rules(&self, now: DateTime<Utc>) -> Result<Vec<DueRule>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RULE_COLUMNS}, w.id, w.entity_type, w.is_active
             FROM workflow_rules r
             JOIN workflows w ON w.id = r.workflow_id
             WHERE r.is_active = 1
               AND r.cron_expression IS NOT NULL
               AND r.next_run_at IS NOT NULL
               AND r.next_run_at <= ?1
             ORDER BY r.next_run_at ASC, r.id ASC"
        ))?;
        let raws = stmt
            .query_map([to_db_time(now)], |row| {
                let rule = RawRule::from_row(row)?;
                let workflow = WorkflowRef {
                    id: row.get(12)?,
                    entity_type: row.get(13)?,
                    is_active: row.get(14)?,
                };
                Ok((rule, workflow))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // Decoded one by one: an unreadable row must not hide its siblings.
        Ok(raws
            .into_iter()
            .filter_map(|(raw, workflow)| raw.into_due_rule(workflow))
            .collect())
    }

    async fn uninitialized_rules(&self) -> Result<Vec<Rule>> {
        self.query_rules(
            &format!(
                "SELECT {RULE_COLUMNS} FROM workflow_rules r
                 WHERE r.is_active = 1 AND r.cron_expression IS NOT NULL AND r.next_run_at IS NULL
                 ORDER BY r.created_at, r.id"
            ),
            [],
        )
    }

    async fn event_rules(&self, entity_type: &str, trigger_event: &str) -> Result<Vec<Rule>> {
        self.query_rules(
            &format!(
                "SELECT {RULE_COLUMNS} FROM workflow_rules r
                 WHERE r.is_active = 1 AND r.entity_type = ?1 AND r.trigger_event = ?2
                 ORDER BY r.priority DESC, r.created_at, r.id"
            ),
            params![entity_type, trigger_event],
        )
    }

    async fn set_next_run_at(&self, rule_id: &str, at: DateTime<Utc>) -> Result<()> {
        let changed = self.lock()?.execute(
            "UPDATE workflow_rules SET next_run_at = ?1 WHERE id = ?2",
            params![to_db_time(at), rule_id],
        )?;
        if changed == 0 {
            return Err(LogiflowError::NotFound(format!("rule {rule_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionLogger for SqliteStore {
    async fn record(&self, log: ExecutionLog) -> Result<()> {
        let actions_run = serde_json::to_string(&log.actions_run)?;
        self.lock()?
            .execute(
                "INSERT INTO workflow_execution_logs
                 (rule_id, event_type, entity_type, entity_id, matched, success, error,
                  event_data, actions_run, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    log.rule_id,
                    log.event_type,
                    log.entity_type,
                    log.entity_id,
                    log.matched,
                    log.success,
                    log.error,
                    log.event_data.to_string(),
                    actions_run,
                    to_db_time(log.created_at),
                ],
            )
            .map_err(|e| LogiflowError::Logger(format!("execution log insert: {e}")))?;
        Ok(())
    }
}

/// Row as read from `workflow_rules`, before JSON and time decoding.
#[derive(Clone)]
struct RawRule {
    id: String,
    workflow_id: String,
    name: String,
    entity_type: String,
    cron_expression: Option<String>,
    trigger_event: Option<String>,
    conditions: String,
    actions: String,
    is_active: bool,
    priority: i32,
    next_run_at: Option<String>,
    created_at: String,
}

impl RawRule {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workflow_id: row.get(1)?,
            name: row.get(2)?,
            entity_type: row.get(3)?,
            cron_expression: row.get(4)?,
            trigger_event: row.get(5)?,
            conditions: row.get(6)?,
            actions: row.get(7)?,
            is_active: row.get(8)?,
            priority: row.get(9)?,
            next_run_at: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn into_rule(self) -> Result<Rule> {
        let trigger = match (self.cron_expression, self.trigger_event) {
            (Some(cron_expression), None) => RuleTrigger::Schedule { cron_expression },
            (None, Some(trigger_event)) => RuleTrigger::Event {
                trigger_event,
                conditions: serde_json::from_str(&self.conditions)?,
            },
            _ => {
                return Err(LogiflowError::invalid_rule(
                    &self.id,
                    "exactly one of cron_expression / trigger_event must be set",
                ));
            }
        };

        Ok(Rule {
            trigger,
            actions: serde_json::from_str(&self.actions)?,
            next_run_at: self.next_run_at.as_deref().map(from_db_time).transpose()?,
            created_at: from_db_time(&self.created_at)?,
            id: self.id,
            workflow_id: self.workflow_id,
            name: self.name,
            entity_type: self.entity_type,
            is_active: self.is_active,
            priority: self.priority,
        })
    }

    /// Decode a due row. A row whose JSON or timestamps no longer parse is
    /// kept with a `defect` (so the scheduler can record the failure and
    /// advance it) as long as its id and cron expression are usable.
    fn into_due_rule(self, workflow: WorkflowRef) -> Option<DueRule> {
        let salvage = self.clone();
        match self.into_rule() {
            Ok(rule) => Some(DueRule::new(rule, workflow)),
            Err(e) => {
                tracing::warn!("⚠️ Rule {} is unreadable: {e}", salvage.id);
                let rule = salvage.into_schedule_shell()?;
                Some(DueRule {
                    rule,
                    workflow,
                    defect: Some(format!("unreadable rule definition: {e}")),
                })
            }
        }
    }

    /// Schedule rule with no actions, built from the columns that are plain text.
    fn into_schedule_shell(self) -> Option<Rule> {
        let cron_expression = self.cron_expression?;
        Some(Rule {
            trigger: RuleTrigger::Schedule { cron_expression },
            actions: Vec::new(),
            next_run_at: self
                .next_run_at
                .as_deref()
                .and_then(|s| from_db_time(s).ok()),
            created_at: from_db_time(&self.created_at).unwrap_or_else(|_| Utc::now()),
            id: self.id,
            workflow_id: self.workflow_id,
            name: self.name,
            entity_type: self.entity_type,
            is_active: self.is_active,
            priority: self.priority,
        })
    }
}

/// Decode rows, skipping (and reporting) any that no longer parse so one bad
/// row cannot hide every other rule.
fn decode_rules(raws: Vec<RawRule>) -> Result<Vec<Rule>> {
    let mut rules = Vec::with_capacity(raws.len());
    for raw in raws {
        let id = raw.id.clone();
        match raw.into_rule() {
            Ok(rule) => rules.push(rule),
            Err(e) => tracing::warn!("⚠️ Skipping unreadable rule {id}: {e}"),
        }
    }
    Ok(rules)
}

fn to_db_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn from_db_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| LogiflowError::Store(format!("bad timestamp '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionRegistry;
    use crate::event::SystemEvent;
    use crate::execution::ActionOutcome;
    use crate::pipeline::ExecutionPipeline;
    use crate::rules::ActionSpec;
    use crate::scheduler::Scheduler;
    use std::sync::Arc;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn temp_store(name: &str) -> (std::path::PathBuf, SqliteStore) {
        let dir = std::env::temp_dir()
            .join(format!("logiflow-db-test-{name}-{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        let store = SqliteStore::open(&dir.join("nested").join("automation.db")).unwrap();
        (dir, store)
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn schedule_rule(wf: &Workflow, name: &str, next: Option<DateTime<Utc>>) -> Rule {
        let mut rule = Rule::scheduled(&wf.id, name, &wf.entity_type, "0 * * * *", vec![
            ActionSpec::new("notify", json!({"message": name})),
        ])
        .unwrap();
        rule.next_run_at = next;
        rule
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let (dir, store) = temp_store("open");
        assert!(dir.join("nested").join("automation.db").exists());
        assert!(store.rules().unwrap().is_empty());
        assert_eq!(store.execution_log_count().unwrap(), 0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rule_roundtrip_both_triggers() {
        let store = SqliteStore::open_in_memory().unwrap();
        let wf = Workflow::new("receiving", "grn");
        store.save_workflow(&wf).unwrap();

        let sched = schedule_rule(&wf, "hourly", Some(at(15, 0)));
        let event = Rule::on_event(
            &wf.id,
            "on-create",
            "grn",
            "document.created",
            json!({"status": "approved"}),
            vec![ActionSpec::new("notify", json!({"message": "new GRN"}))],
        )
        .with_priority(7);
        store.save_rule(&sched).unwrap();
        store.save_rule(&event).unwrap();

        let loaded = store.rule(&sched.id).unwrap().unwrap();
        assert_eq!(loaded.cron_expression(), Some("0 * * * *"));
        assert_eq!(loaded.next_run_at, Some(at(15, 0)));
        assert_eq!(loaded.actions, sched.actions);

        let loaded = store.rule(&event.id).unwrap().unwrap();
        assert_eq!(loaded.trigger_event(), Some("document.created"));
        assert_eq!(loaded.conditions(), Some(&json!({"status": "approved"})));
        assert_eq!(loaded.priority, 7);

        assert!(store.rule("rule-missing").unwrap().is_none());
    }

    #[test]
    fn test_check_constraint_rejects_both_triggers() {
        let store = SqliteStore::open_in_memory().unwrap();
        let wf = Workflow::new("w", "grn");
        store.save_workflow(&wf).unwrap();
        let conn = store.lock().unwrap();
        let res = conn.execute(
            "INSERT INTO workflow_rules
             (id, workflow_id, name, entity_type, cron_expression, trigger_event, created_at)
             VALUES ('bad', ?1, 'bad', 'grn', '* * * * *', 'document.created',
                     '2026-03-02T00:00:00.000Z')",
            [&wf.id],
        );
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_due_rules_join_and_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let wf = Workflow::new("w", "inventory");
        store.save_workflow(&wf).unwrap();

        let later = schedule_rule(&wf, "later", Some(at(14, 20)));
        let earlier = schedule_rule(&wf, "earlier", Some(at(14, 0)));
        let future = schedule_rule(&wf, "future", Some(at(15, 0)));
        let uninit = schedule_rule(&wf, "uninit", None);
        let mut inactive = schedule_rule(&wf, "inactive", Some(at(13, 0)));
        inactive.is_active = false;
        for r in [&later, &earlier, &future, &uninit, &inactive] {
            store.save_rule(r).unwrap();
        }

        let due = store.due_rules(at(14, 23)).await.unwrap();
        let names: Vec<_> = due.iter().map(|d| d.rule.name.as_str()).collect();
        assert_eq!(names, vec!["earlier", "later"]);
        assert_eq!(due[0].workflow.entity_type, "inventory");
        assert!(due[0].workflow.is_active);

        // Inactive workflows are still returned; the scheduler skips them.
        store.set_workflow_active(&wf.id, false).unwrap();
        let due = store.due_rules(at(14, 23)).await.unwrap();
        assert_eq!(due.len(), 2);
        assert!(!due[0].workflow.is_active);

        let pending = store.uninitialized_rules().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, uninit.id);
    }

    fn corrupt_actions(store: &SqliteStore, rule_id: &str) {
        store
            .lock()
            .unwrap()
            .execute(
                "UPDATE workflow_rules SET actions = 'not json' WHERE id = ?1",
                [rule_id],
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_due_rules_keep_unreadable_row_with_defect() {
        let store = SqliteStore::open_in_memory().unwrap();
        let wf = Workflow::new("w", "inventory");
        store.save_workflow(&wf).unwrap();
        let good = schedule_rule(&wf, "good", Some(at(14, 0)));
        let bad = schedule_rule(&wf, "bad", Some(at(14, 1)));
        store.save_rule(&good).unwrap();
        store.save_rule(&bad).unwrap();
        corrupt_actions(&store, &bad.id);

        let due = store.due_rules(at(14, 23)).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].rule.id, good.id);
        assert!(due[0].defect.is_none());
        assert_eq!(due[1].rule.id, bad.id);
        assert!(due[1].defect.as_deref().unwrap().contains("unreadable"));
        assert!(due[1].rule.actions.is_empty());
        assert_eq!(due[1].rule.next_run_at, Some(at(14, 1)));

        // Listing queries still skip the row.
        assert_eq!(store.rules().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_rule_does_not_block_siblings() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let wf = Workflow::new("w", "inventory");
        store.save_workflow(&wf).unwrap();
        let good = schedule_rule(&wf, "good", Some(at(14, 0)));
        let bad = schedule_rule(&wf, "bad", Some(at(14, 0)));
        store.save_rule(&good).unwrap();
        store.save_rule(&bad).unwrap();
        corrupt_actions(&store, &bad.id);

        let pipeline = Arc::new(ExecutionPipeline::new(
            Arc::new(ActionRegistry::with_defaults()),
            store.clone(),
        ));
        let scheduler = Scheduler::new(store.clone(), pipeline, std::time::Duration::from_secs(60));

        let report = scheduler.process_scheduled_rules_at(at(14, 23)).await;
        assert_eq!(report.due, 2);
        assert_eq!(report.executed, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.advance_failures, 0);

        let logs = store.execution_logs(&good.id, 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].success);
        assert_eq!(logs[0].actions_run.len(), 1);

        let logs = store.execution_logs(&bad.id, 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].success);
        assert!(logs[0].actions_run.is_empty());
        assert!(logs[0].error.as_deref().unwrap().contains("unreadable"));

        // Both advanced to the next hour, so neither is due again this hour.
        assert!(store.due_rules(at(14, 59)).await.unwrap().is_empty());
        assert_eq!(store.due_rules(at(15, 0)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_set_next_run_at() {
        let store = SqliteStore::open_in_memory().unwrap();
        let wf = Workflow::new("w", "inventory");
        store.save_workflow(&wf).unwrap();
        let rule = schedule_rule(&wf, "r", Some(at(14, 0)));
        store.save_rule(&rule).unwrap();

        store.set_next_run_at(&rule.id, at(15, 0)).await.unwrap();
        assert_eq!(store.rule(&rule.id).unwrap().unwrap().next_run_at, Some(at(15, 0)));
        assert!(store.due_rules(at(14, 30)).await.unwrap().is_empty());

        assert!(matches!(
            store.set_next_run_at("rule-missing", at(15, 0)).await,
            Err(LogiflowError::NotFound(_))
        ));
        assert!(matches!(
            store.set_workflow_active("wf-missing", true),
            Err(LogiflowError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_event_rules_priority_desc() {
        let store = SqliteStore::open_in_memory().unwrap();
        let wf = Workflow::new("w", "grn");
        store.save_workflow(&wf).unwrap();
        for (name, prio) in [("low", 1), ("high", 9), ("mid", 5)] {
            let rule = Rule::on_event(&wf.id, name, "grn", "document.created", json!(null), vec![])
                .with_priority(prio);
            store.save_rule(&rule).unwrap();
        }
        let other = Rule::on_event(&wf.id, "other", "grn", "document.deleted", json!(null), vec![]);
        store.save_rule(&other).unwrap();

        let rules = store.event_rules("grn", "document.created").await.unwrap();
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
        assert!(store.event_rules("mi", "document.created").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execution_logs_newest_first() {
        let (dir, store) = temp_store("logs");
        let wf = Workflow::new("w", "inventory");
        store.save_workflow(&wf).unwrap();
        let rule = schedule_rule(&wf, "r", Some(at(14, 0)));
        store.save_rule(&rule).unwrap();

        for minute in [0, 1, 2] {
            let event = SystemEvent::scheduled(&rule, &wf.to_ref(), at(14, minute));
            let mut log = ExecutionLog::for_event(&rule.id, &event);
            log.created_at = at(14, minute) + Duration::milliseconds(250);
            log.actions_run = vec![
                ActionOutcome::success("notify"),
                ActionOutcome::failed("webhook", "timeout"),
            ];
            log.success = false;
            store.record(log).await.unwrap();
        }

        let logs = store.execution_logs(&rule.id, 2).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].created_at, at(14, 2) + Duration::milliseconds(250));
        assert_eq!(logs[0].event_type, "scheduled:rule_triggered");
        assert_eq!(logs[0].actions_run[1].error.as_deref(), Some("timeout"));
        assert_eq!(logs[0].event_data["payload"]["ruleName"], "r");
        assert!(store.execution_logs("rule-other", 10).unwrap().is_empty());
        assert_eq!(store.execution_log_count().unwrap(), 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_reopen_keeps_data() {
        let (dir, store) = temp_store("reopen");
        let path = dir.join("nested").join("automation.db");
        let wf = Workflow::new("w", "inventory");
        store.save_workflow(&wf).unwrap();
        store.save_rule(&schedule_rule(&wf, "persisted", None)).unwrap();
        drop(store);

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.rules().unwrap().len(), 1);
        assert_eq!(store.workflows().unwrap()[0].id, wf.id);
        std::fs::remove_dir_all(&dir).ok();
    }
}
