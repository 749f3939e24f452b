//! Typed outputs of the research and session-management workflows, and the
//! consolidated-research sum type the strategies produce.

use serde::{Deserialize, Serialize};

use crate::session::SessionType;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sources & single-item research
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const MAX_KEY_FINDINGS: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// Canonical form used for deduplication: scheme+host lowercased, fragment
/// and trailing slash stripped, query preserved.
pub fn canonical_url(url: &str) -> String {
    let trimmed = url.trim();
    let no_fragment = trimmed.split('#').next().unwrap_or(trimmed);
    let (head, tail) = match no_fragment.find("://") {
        Some(idx) => {
            let after = &no_fragment[idx + 3..];
            let host_end = after.find('/').unwrap_or(after.len());
            (
                format!(
                    "{}://{}",
                    no_fragment[..idx].to_lowercase(),
                    after[..host_end].to_lowercase()
                ),
                &after[host_end..],
            )
        }
        None => (no_fragment.to_lowercase(), ""),
    };
    let tail = tail.trim_end_matches('/');
    format!("{head}{tail}")
}

/// Drop sources that canonicalize to an already-seen URL, preserving order.
pub fn dedup_sources(sources: Vec<Source>) -> Vec<Source> {
    let mut seen = std::collections::HashSet::new();
    sources
        .into_iter()
        .filter(|s| seen.insert(canonical_url(&s.url)))
        .collect()
}

/// Output of the single-item research workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutput {
    pub queries: Vec<String>,
    pub key_findings: Vec<String>,
    pub sources: Vec<Source>,
    pub confidence: f64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session management
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsolidationStrategy {
    Compare,
    Merge,
    Complement,
    Generic,
}

impl ConsolidationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compare => "COMPARE",
            Self::Merge => "MERGE",
            Self::Complement => "COMPLEMENT",
            Self::Generic => "GENERIC",
        }
    }

    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "COMPARE" => Self::Compare,
            "MERGE" => Self::Merge,
            "COMPLEMENT" => Self::Complement,
            _ => Self::Generic,
        }
    }
}

/// Relationship analysis between the entities of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRelationships {
    pub consolidation_strategy: ConsolidationStrategy,
    pub relationship_type: String,
    pub entities: Vec<String>,
    #[serde(default)]
    pub comparison_dimensions: Vec<String>,
    pub reasoning: String,
    pub confidence: f64,
}

impl Default for EntityRelationships {
    fn default() -> Self {
        Self {
            consolidation_strategy: ConsolidationStrategy::Generic,
            relationship_type: "independent".into(),
            entities: Vec::new(),
            comparison_dimensions: Vec::new(),
            reasoning: String::new(),
            confidence: 0.0,
        }
    }
}

/// Decision returned by the session-management workflow for one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDecision {
    pub session_type: SessionType,
    pub belongs_to_session: bool,
    pub decision: String,
    pub confidence: f64,
    #[serde(default)]
    pub intent_analysis: Option<serde_json::Value>,
    #[serde(default)]
    pub relationships: EntityRelationships,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Consolidated research — one variant per strategy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Rectangular matrix: one row per dimension, one column per entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMatrix {
    /// Entity names, one per column.
    pub columns: Vec<String>,
    /// Dimension name plus one cell per column.
    pub rows: Vec<MatrixRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub dimension: String,
    pub cells: Vec<String>,
    /// Winning entity for this dimension, when one stands out.
    #[serde(default)]
    pub winner: Option<String>,
}

impl ComparisonMatrix {
    /// True when every row has exactly one cell per column.
    pub fn is_rectangular(&self) -> bool {
        self.rows.iter().all(|r| r.cells.len() == self.columns.len())
    }
}

/// Fields common to every consolidation strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationCore {
    pub research_objective: String,
    pub summary: String,
    pub primary_intent: String,
    pub research_goals: Vec<String>,
    pub next_steps: Vec<String>,
    pub key_findings: Vec<String>,
    pub sources: Vec<Source>,
    pub confidence: f64,
}

/// The final session research artifact, one variant per strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "UPPERCASE")]
pub enum ConsolidatedResearch {
    Compare {
        #[serde(flatten)]
        core: ConsolidationCore,
        matrix: ComparisonMatrix,
    },
    Merge {
        #[serde(flatten)]
        core: ConsolidationCore,
        consolidated_profile: serde_json::Value,
    },
    Complement {
        #[serde(flatten)]
        core: ConsolidationCore,
        synergies: Vec<String>,
        common_themes: Vec<String>,
    },
    Generic {
        #[serde(flatten)]
        core: ConsolidationCore,
    },
}

impl ConsolidatedResearch {
    pub fn core(&self) -> &ConsolidationCore {
        match self {
            Self::Compare { core, .. }
            | Self::Merge { core, .. }
            | Self::Complement { core, .. }
            | Self::Generic { core } => core,
        }
    }

    pub fn strategy(&self) -> ConsolidationStrategy {
        match self {
            Self::Compare { .. } => ConsolidationStrategy::Compare,
            Self::Merge { .. } => ConsolidationStrategy::Merge,
            Self::Complement { .. } => ConsolidationStrategy::Complement,
            Self::Generic { .. } => ConsolidationStrategy::Generic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_url_normalizes() {
        assert_eq!(
            canonical_url("HTTPS://Example.COM/Path/"),
            "https://example.com/Path"
        );
        assert_eq!(
            canonical_url("https://example.com/a#frag"),
            "https://example.com/a"
        );
        assert_eq!(
            canonical_url("https://example.com/a?q=1"),
            "https://example.com/a?q=1"
        );
    }

    #[test]
    fn dedup_by_canonical_form() {
        let sources = vec![
            Source {
                title: "a".into(),
                url: "https://example.com/x".into(),
                snippet: None,
            },
            Source {
                title: "b".into(),
                url: "https://EXAMPLE.com/x/".into(),
                snippet: None,
            },
            Source {
                title: "c".into(),
                url: "https://example.com/y".into(),
                snippet: None,
            },
        ];
        let deduped = dedup_sources(sources);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "a");
    }

    #[test]
    fn matrix_rectangularity() {
        let m = ComparisonMatrix {
            columns: vec!["Hilton".into(), "Ritz".into()],
            rows: vec![MatrixRow {
                dimension: "price".into(),
                cells: vec!["$".into(), "$$$".into()],
                winner: Some("Hilton".into()),
            }],
        };
        assert!(m.is_rectangular());
    }

    #[test]
    fn strategy_parse_lossy() {
        assert_eq!(
            ConsolidationStrategy::parse_lossy("compare"),
            ConsolidationStrategy::Compare
        );
        assert_eq!(
            ConsolidationStrategy::parse_lossy("??"),
            ConsolidationStrategy::Generic
        );
    }
}
