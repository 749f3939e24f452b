//! AI tasks — one row per workflow execution against an item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// pending → running → {completed | failed}; exactly one terminal edge.
    pub fn can_transition(from: Self, to: Self) -> bool {
        use TaskStatus::*;
        matches!(
            (from, to),
            (Pending, Running) | (Running, Completed) | (Running, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single workflow execution against an item.
///
/// Re-running a workflow for the same `(item, task_type)` creates a new
/// row; completed rows are never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiTask {
    pub id: Uuid,
    pub clipboard_item_id: Uuid,
    pub task_type: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// Model attempts consumed (1 on first success, more after retries).
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AiTask {
    pub fn new(clipboard_item_id: Uuid, task_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            clipboard_item_id,
            task_type: task_type.into(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            attempts: 0,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Per-item record of one completed workflow of a given type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub id: Uuid,
    pub clipboard_item_id: Uuid,
    pub workflow_type: String,
    pub executed_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub confidence: Option<f64>,
}
