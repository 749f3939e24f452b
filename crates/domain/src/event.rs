//! Bus event schema.
//!
//! Field names here are a stable contract with UI collaborators: every
//! event serializes with a `type` tag and an `at` timestamp, and research
//! progress events carry the exact camelCase keys consumers already parse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::{SessionStatus, SessionType};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Research progress payload
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Phase of a session research run. Progression for one session is always
/// a prefix of `initializing, queries_generated, searching*, consolidating,
/// completed|failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    Initializing,
    QueriesGenerated,
    Searching,
    Consolidating,
    Completed,
    Failed,
}

/// Live progress of a session research run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchProgress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<ResearchPhase>,
    #[serde(rename = "currentQuery", skip_serializing_if = "Option::is_none")]
    pub current_query: Option<String>,
    #[serde(rename = "currentAspect", skip_serializing_if = "Option::is_none")]
    pub current_aspect: Option<String>,
    #[serde(rename = "langGraphQuery", skip_serializing_if = "Option::is_none")]
    pub lang_graph_query: Option<String>,
    #[serde(rename = "langGraphStatus", skip_serializing_if = "Option::is_none")]
    pub lang_graph_status: Option<String>,
    #[serde(rename = "resultsCount", skip_serializing_if = "Option::is_none")]
    pub results_count: Option<usize>,
    #[serde(rename = "totalQueries", skip_serializing_if = "Option::is_none")]
    pub total_queries: Option<usize>,
    #[serde(rename = "completedQueries", skip_serializing_if = "Option::is_none")]
    pub completed_queries: Option<usize>,
    #[serde(rename = "findingsCount", skip_serializing_if = "Option::is_none")]
    pub findings_count: Option<usize>,
}

impl ResearchProgress {
    pub fn phase(phase: ResearchPhase) -> Self {
        Self {
            phase: Some(phase),
            ..Default::default()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bus events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every event the core broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    #[serde(rename = "clipboard-item-added")]
    ItemAdded { at: DateTime<Utc>, item_id: Uuid },

    #[serde(rename = "clipboard-item-updated")]
    ItemUpdated { at: DateTime<Utc>, item_id: Uuid },

    #[serde(rename = "workflow-started")]
    WorkflowStarted {
        at: DateTime<Utc>,
        workflow: String,
        item_id: Option<Uuid>,
    },

    #[serde(rename = "workflow-node-completed")]
    WorkflowNodeCompleted {
        at: DateTime<Utc>,
        workflow: String,
        node: String,
        ms: u64,
    },

    #[serde(rename = "workflow-completed")]
    WorkflowCompleted {
        at: DateTime<Utc>,
        workflow: String,
        ok: bool,
    },

    #[serde(rename = "workflow-failed")]
    WorkflowFailed {
        at: DateTime<Utc>,
        workflow: String,
        error: String,
    },

    #[serde(rename = "session-created")]
    SessionCreated {
        at: DateTime<Utc>,
        session_id: Uuid,
        session_type: SessionType,
    },

    #[serde(rename = "session-updated")]
    SessionUpdated {
        at: DateTime<Utc>,
        session_id: Uuid,
        status: SessionStatus,
        item_count: usize,
    },

    #[serde(rename = "session-research-started")]
    ResearchStarted { at: DateTime<Utc>, session_id: Uuid },

    #[serde(rename = "session-research-progress")]
    ResearchProgressed {
        at: DateTime<Utc>,
        session_id: Uuid,
        #[serde(flatten)]
        progress: ResearchProgress,
    },

    #[serde(rename = "session-research-completed")]
    ResearchCompleted {
        at: DateTime<Utc>,
        session_id: Uuid,
        findings_count: usize,
        total_sources: usize,
        research_quality: String,
    },

    #[serde(rename = "session-research-failed")]
    ResearchFailed {
        at: DateTime<Utc>,
        session_id: Uuid,
        reason: String,
    },

    #[serde(rename = "automation-dispatched")]
    AutomationDispatched {
        at: DateTime<Utc>,
        session_id: Uuid,
        webhook_url: String,
    },

    #[serde(rename = "automation-failed")]
    AutomationFailed {
        at: DateTime<Utc>,
        session_id: Uuid,
        error: String,
    },
}

impl BusEvent {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::ItemAdded { at, .. }
            | Self::ItemUpdated { at, .. }
            | Self::WorkflowStarted { at, .. }
            | Self::WorkflowNodeCompleted { at, .. }
            | Self::WorkflowCompleted { at, .. }
            | Self::WorkflowFailed { at, .. }
            | Self::SessionCreated { at, .. }
            | Self::SessionUpdated { at, .. }
            | Self::ResearchStarted { at, .. }
            | Self::ResearchProgressed { at, .. }
            | Self::ResearchCompleted { at, .. }
            | Self::ResearchFailed { at, .. }
            | Self::AutomationDispatched { at, .. }
            | Self::AutomationFailed { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_type_tag() {
        let ev = BusEvent::WorkflowCompleted {
            at: Utc::now(),
            workflow: "content_analysis".into(),
            ok: true,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "workflow-completed");
        assert!(json["at"].is_string());
    }

    #[test]
    fn research_progress_uses_contract_keys() {
        let ev = BusEvent::ResearchProgressed {
            at: Utc::now(),
            session_id: Uuid::new_v4(),
            progress: ResearchProgress {
                phase: Some(ResearchPhase::Searching),
                current_query: Some("hilton toronto".into()),
                lang_graph_status: Some("searching".into()),
                results_count: Some(4),
                total_queries: Some(6),
                completed_queries: Some(2),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "session-research-progress");
        assert_eq!(json["phase"], "searching");
        assert_eq!(json["currentQuery"], "hilton toronto");
        assert_eq!(json["langGraphStatus"], "searching");
        assert_eq!(json["resultsCount"], 4);
        assert_eq!(json["totalQueries"], 6);
        assert_eq!(json["completedQueries"], 2);
    }
}
