//! AI task rows and workflow results.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use fc_domain::task::{AiTask, TaskStatus, WorkflowResult};
use fc_domain::{Error, Result};

use crate::{db_err, parse_ts, parse_uuid, Store};

impl Store {
    /// Insert a new task row or advance an existing one.
    ///
    /// Transitions are validated against the task state machine; an illegal
    /// transition (including any move out of a terminal state) is rejected
    /// atomically.
    pub fn upsert_task(&self, task: &AiTask) -> Result<()> {
        self.with_tx(|tx| {
            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM ai_tasks WHERE id = ?1",
                    params![task.id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;

            match current {
                None => {
                    tx.execute(
                        r#"
                        INSERT INTO ai_tasks
                            (id, clipboard_item_id, task_type, status, result,
                             error, attempts, created_at, completed_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                        "#,
                        params![
                            task.id.to_string(),
                            task.clipboard_item_id.to_string(),
                            task.task_type,
                            task.status.as_str(),
                            task.result.as_ref().map(|v| v.to_string()),
                            task.error,
                            task.attempts,
                            task.created_at.to_rfc3339(),
                            task.completed_at.map(|t| t.to_rfc3339()),
                        ],
                    )
                    .map_err(db_err)?;
                }
                Some(raw) => {
                    let from = TaskStatus::parse(&raw)
                        .ok_or_else(|| Error::StoreIo(format!("bad task status {raw:?}")))?;
                    if from != task.status && !TaskStatus::can_transition(from, task.status) {
                        return Err(Error::bad_transition(from, task.status));
                    }
                    tx.execute(
                        r#"
                        UPDATE ai_tasks
                        SET status = ?2, result = ?3, error = ?4,
                            attempts = ?5, completed_at = ?6
                        WHERE id = ?1
                        "#,
                        params![
                            task.id.to_string(),
                            task.status.as_str(),
                            task.result.as_ref().map(|v| v.to_string()),
                            task.error,
                            task.attempts,
                            task.completed_at.map(|t| t.to_rfc3339()),
                        ],
                    )
                    .map_err(db_err)?;
                }
            }
            Ok(())
        })
    }

    pub fn get_task(&self, id: Uuid) -> Result<AiTask> {
        self.with_tx(|tx| {
            tx.query_row(
                r#"
                SELECT id, clipboard_item_id, task_type, status, result,
                       error, attempts, created_at, completed_at
                FROM ai_tasks WHERE id = ?1
                "#,
                params![id.to_string()],
                row_to_task_parts,
            )
            .optional()
            .map_err(db_err)?
            .map(parts_to_task)
            .transpose()?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))
        })
    }

    /// All task rows for an item, newest first. Re-runs preserve history.
    pub fn list_tasks(&self, item_id: Uuid) -> Result<Vec<AiTask>> {
        self.with_tx(|tx| {
            let mut stmt = tx
                .prepare(
                    r#"
                    SELECT id, clipboard_item_id, task_type, status, result,
                           error, attempts, created_at, completed_at
                    FROM ai_tasks WHERE clipboard_item_id = ?1
                    ORDER BY created_at DESC
                    "#,
                )
                .map_err(db_err)?;
            let parts: Vec<TaskParts> = stmt
                .query_map(params![item_id.to_string()], row_to_task_parts)
                .map_err(db_err)?
                .collect::<std::result::Result<_, _>>()
                .map_err(db_err)?;
            parts.into_iter().map(parts_to_task).collect()
        })
    }

    pub fn insert_workflow_result(&self, result: &WorkflowResult) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                r#"
                INSERT INTO workflow_results
                    (id, clipboard_item_id, workflow_type, executed_at, payload, confidence)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    result.id.to_string(),
                    result.clipboard_item_id.to_string(),
                    result.workflow_type,
                    result.executed_at.to_rfc3339(),
                    result.payload.to_string(),
                    result.confidence,
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    /// Historical results for an item, newest first. Rows are never
    /// overwritten.
    pub fn list_workflow_results(&self, item_id: Uuid) -> Result<Vec<WorkflowResult>> {
        self.with_tx(|tx| {
            let mut stmt = tx
                .prepare(
                    r#"
                    SELECT id, clipboard_item_id, workflow_type, executed_at, payload, confidence
                    FROM workflow_results WHERE clipboard_item_id = ?1
                    ORDER BY executed_at DESC
                    "#,
                )
                .map_err(db_err)?;
            let rows: Vec<(String, String, String, String, String, Option<f64>)> = stmt
                .query_map(params![item_id.to_string()], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })
                .map_err(db_err)?
                .collect::<std::result::Result<_, _>>()
                .map_err(db_err)?;
            rows.into_iter()
                .map(|(id, item, wf, ts, payload, confidence)| {
                    Ok(WorkflowResult {
                        id: parse_uuid(&id)?,
                        clipboard_item_id: parse_uuid(&item)?,
                        workflow_type: wf,
                        executed_at: parse_ts(&ts)?,
                        payload: serde_json::from_str(&payload)
                            .map_err(|e| Error::StoreIo(format!("bad payload: {e}")))?,
                        confidence,
                    })
                })
                .collect()
        })
    }
}

// ── internals ───────────────────────────────────────────────────────

type TaskParts = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    String,
    Option<String>,
);

fn row_to_task_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn parts_to_task(parts: TaskParts) -> Result<AiTask> {
    let (id, item_id, task_type, status, result, error, attempts, created, completed) = parts;
    Ok(AiTask {
        id: parse_uuid(&id)?,
        clipboard_item_id: parse_uuid(&item_id)?,
        task_type,
        status: TaskStatus::parse(&status)
            .ok_or_else(|| Error::StoreIo(format!("bad task status {status:?}")))?,
        result: result
            .map(|v| serde_json::from_str(&v))
            .transpose()
            .map_err(|e| Error::StoreIo(format!("bad task result: {e}")))?,
        error,
        attempts: attempts as u32,
        created_at: parse_ts(&created)?,
        completed_at: completed.as_deref().map(parse_ts).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fc_domain::item::{CaptureContext, ClipboardItem};

    fn store_with_item() -> (Store, ClipboardItem) {
        let store = Store::open_in_memory().unwrap();
        let item = ClipboardItem::new("task fixture".into(), CaptureContext::default());
        store.insert_item(&item).unwrap();
        (store, item)
    }

    #[test]
    fn task_lifecycle_happy_path() {
        let (store, item) = store_with_item();
        let mut task = AiTask::new(item.id, "content_analysis");
        store.upsert_task(&task).unwrap();

        task.status = TaskStatus::Running;
        store.upsert_task(&task).unwrap();

        task.status = TaskStatus::Completed;
        task.attempts = 3;
        task.result = Some(serde_json::json!({"ok": true}));
        task.completed_at = Some(Utc::now());
        store.upsert_task(&task).unwrap();

        let got = store.get_task(task.id).unwrap();
        assert_eq!(got.status, TaskStatus::Completed);
        assert_eq!(got.attempts, 3);
        assert!(got.completed_at.is_some());
    }

    #[test]
    fn terminal_tasks_cannot_move() {
        let (store, item) = store_with_item();
        let mut task = AiTask::new(item.id, "research");
        store.upsert_task(&task).unwrap();
        task.status = TaskStatus::Running;
        store.upsert_task(&task).unwrap();
        task.status = TaskStatus::Failed;
        store.upsert_task(&task).unwrap();

        task.status = TaskStatus::Running;
        let err = store.upsert_task(&task).unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[test]
    fn pending_cannot_skip_to_terminal() {
        let (store, item) = store_with_item();
        let mut task = AiTask::new(item.id, "research");
        store.upsert_task(&task).unwrap();

        task.status = TaskStatus::Completed;
        let err = store.upsert_task(&task).unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[test]
    fn reruns_preserve_history() {
        let (store, item) = store_with_item();
        for _ in 0..2 {
            let task = AiTask::new(item.id, "summarization");
            store.upsert_task(&task).unwrap();
        }
        assert_eq!(store.list_tasks(item.id).unwrap().len(), 2);
    }

    #[test]
    fn workflow_results_newest_first() {
        let (store, item) = store_with_item();
        for i in 0..3 {
            let result = WorkflowResult {
                id: Uuid::new_v4(),
                clipboard_item_id: item.id,
                workflow_type: "research".into(),
                executed_at: Utc::now() + chrono::Duration::seconds(i),
                payload: serde_json::json!({"round": i}),
                confidence: Some(0.8),
            };
            store.insert_workflow_result(&result).unwrap();
        }
        let results = store.list_workflow_results(item.id).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].payload["round"], 2);
    }

    #[test]
    fn deleting_item_cascades_tasks_and_results() {
        let (store, item) = store_with_item();
        let task = AiTask::new(item.id, "research");
        store.upsert_task(&task).unwrap();
        store.delete_item(item.id).unwrap();
        assert!(matches!(store.get_task(task.id), Err(Error::NotFound(_))));
    }
}
