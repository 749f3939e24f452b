//! Typed outputs of the content-analysis and summarization workflows.
//!
//! The model boundary validates raw JSON into these records; inner layers
//! never see untyped blobs.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recommended actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Closed set of actions the analysis workflow may recommend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Research,
    Summarize,
    FactCheck,
    Translate,
    Explain,
    Expand,
    CreateTask,
    Cite,
    Respond,
    Schedule,
}

impl ActionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "research" => Some(Self::Research),
            "summarize" => Some(Self::Summarize),
            "fact_check" => Some(Self::FactCheck),
            "translate" => Some(Self::Translate),
            "explain" => Some(Self::Explain),
            "expand" => Some(Self::Expand),
            "create_task" => Some(Self::CreateTask),
            "cite" => Some(Self::Cite),
            "respond" => Some(Self::Respond),
            "schedule" => Some(Self::Schedule),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub kind: ActionKind,
    pub priority: Priority,
    pub reason: String,
}

/// Deduplicate by kind (keeping the highest-priority occurrence), then rank
/// by `(priority_rank, model_confidence)`.
///
/// Confidence is uniform within one analysis, so it acts as a tie-break key
/// only when rankings from several analyses are merged; the stable sort
/// preserves model order among equal-priority actions.
pub fn dedup_and_rank(mut actions: Vec<RecommendedAction>, _confidence: f64) -> Vec<RecommendedAction> {
    actions.sort_by_key(|a| a.priority.rank());
    let mut seen = std::collections::HashSet::new();
    actions.into_iter().filter(|a| seen.insert(a.kind)).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Content analysis
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const MAX_TAGS: usize = 12;
pub const TOP_ACTIONS: usize = 3;

/// Unified analysis of a newly captured item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub content_type: String,
    pub sentiment: String,
    pub purpose: String,
    pub tags: Vec<String>,
    pub recommended_actions: Vec<RecommendedAction>,
    #[serde(default)]
    pub visual_context: Option<String>,
    pub confidence: f64,
}

impl ContentAnalysis {
    /// The top actions surfaced to UI collaborators.
    pub fn top_actions(&self) -> &[RecommendedAction] {
        let n = self.recommended_actions.len().min(TOP_ACTIONS);
        &self.recommended_actions[..n]
    }

    /// A minimal analysis used when the workflow fails: the item is still
    /// persisted with empty analysis and whatever tags the heuristics give.
    pub fn minimal(content_type: &str, tags: Vec<String>) -> Self {
        Self {
            content_type: content_type.to_string(),
            sentiment: "neutral".into(),
            purpose: String::new(),
            tags,
            recommended_actions: Vec::new(),
            visual_context: None,
            confidence: 0.0,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Summarization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Quality threshold below which the refinement node runs.
pub const SUMMARY_QUALITY_FLOOR: f64 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryOutput {
    pub summary: String,
    pub key_points: Vec<String>,
    pub quality_score: f64,
    pub final_summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn act(kind: ActionKind, priority: Priority) -> RecommendedAction {
        RecommendedAction {
            kind,
            priority,
            reason: "r".into(),
        }
    }

    #[test]
    fn dedup_keeps_highest_priority() {
        let out = dedup_and_rank(
            vec![
                act(ActionKind::Research, Priority::Low),
                act(ActionKind::Research, Priority::High),
                act(ActionKind::Summarize, Priority::Medium),
            ],
            0.9,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, ActionKind::Research);
        assert_eq!(out[0].priority, Priority::High);
    }

    #[test]
    fn rank_orders_by_priority() {
        let out = dedup_and_rank(
            vec![
                act(ActionKind::Cite, Priority::Low),
                act(ActionKind::Explain, Priority::Medium),
                act(ActionKind::Research, Priority::High),
            ],
            0.9,
        );
        let kinds: Vec<_> = out.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![ActionKind::Research, ActionKind::Explain, ActionKind::Cite]
        );
    }

    #[test]
    fn top_actions_caps_at_three() {
        let analysis = ContentAnalysis {
            content_type: "text".into(),
            sentiment: "neutral".into(),
            purpose: "p".into(),
            tags: vec![],
            recommended_actions: vec![
                act(ActionKind::Research, Priority::High),
                act(ActionKind::Summarize, Priority::High),
                act(ActionKind::Explain, Priority::Medium),
                act(ActionKind::Cite, Priority::Low),
            ],
            visual_context: None,
            confidence: 1.0,
        };
        assert_eq!(analysis.top_actions().len(), 3);
    }
}
