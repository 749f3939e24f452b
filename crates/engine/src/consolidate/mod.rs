//! Research consolidation: strategy selection, the consolidation workflow
//! invocation, and the strategy builders with deterministic fallbacks.
//!
//! Consolidation is idempotent: identical inputs (and identical model
//! outputs) produce identical findings and the same strategy choice.

use std::sync::Arc;

use serde_json::json;

use fc_domain::research::{
    dedup_sources, ConsolidatedResearch, ConsolidationCore, ConsolidationStrategy,
    EntityRelationships, Source,
};
use fc_domain::session::SessionType;
use fc_domain::Result;
use fc_workflow::catalog::SESSION_RESEARCH_CONSOLIDATION;
use fc_workflow::{ExecOptions, WorkflowRuntime, WorkflowState};

mod compare;
mod complement;
mod generic;
mod merge;

/// Confidence scale applied when the model consolidation is unavailable
/// and the deterministic fallback shapes the output.
const FALLBACK_CONFIDENCE_SCALE: f64 = 0.7;

/// Tunable thresholds for the research quality label.
const QUALITY_HIGH: f64 = 0.8;
const QUALITY_GOOD: f64 = 0.6;
const QUALITY_MODERATE: f64 = 0.4;

pub fn quality_label(confidence: f64) -> &'static str {
    if confidence >= QUALITY_HIGH {
        "high"
    } else if confidence >= QUALITY_GOOD {
        "good"
    } else if confidence >= QUALITY_MODERATE {
        "moderate"
    } else {
        "basic"
    }
}

/// Raw research aggregated for one entity of a session.
#[derive(Debug, Clone)]
pub struct EntityResearch {
    pub entity: String,
    pub findings: Vec<String>,
    pub sources: Vec<Source>,
    pub summaries: Vec<String>,
}

/// Everything a strategy builder works from.
pub struct ConsolidateInput<'a> {
    pub session_type: SessionType,
    pub research: &'a [EntityResearch],
    pub relationships: &'a EntityRelationships,
}

impl ConsolidateInput<'_> {
    pub fn entities(&self) -> Vec<String> {
        self.research.iter().map(|r| r.entity.clone()).collect()
    }

    pub fn all_findings(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.research
            .iter()
            .flat_map(|r| r.findings.iter())
            .filter(|f| seen.insert((*f).clone()))
            .cloned()
            .collect()
    }

    pub fn all_sources(&self) -> Vec<Source> {
        dedup_sources(
            self.research
                .iter()
                .flat_map(|r| r.sources.iter().cloned())
                .collect(),
        )
    }
}

/// The strategy table: one entity merges, same-type sets compare,
/// complementary sets complement, anything else is generic.
pub fn choose_strategy(
    research: &[EntityResearch],
    relationships: &EntityRelationships,
) -> ConsolidationStrategy {
    if research.len() <= 1 {
        return ConsolidationStrategy::Merge;
    }
    match relationships.relationship_type.as_str() {
        "same-entity" => ConsolidationStrategy::Merge,
        "comparable-entities" => ConsolidationStrategy::Compare,
        "complementary" => ConsolidationStrategy::Complement,
        "independent" => ConsolidationStrategy::Generic,
        _ => relationships.consolidation_strategy,
    }
}

/// Confidence over findings volume, aspect coverage, and source density.
/// Only the final sum is clamped; a rich term may make up for a thin one.
pub fn confidence(findings: usize, aspect_coverage: usize, sources: usize) -> f64 {
    let avg_sources = if findings == 0 {
        0.0
    } else {
        sources as f64 / findings as f64
    };
    (findings as f64 / 10.0 * 0.6
        + aspect_coverage as f64 / 5.0 * 0.2
        + avg_sources / 3.0 * 0.2)
        .min(1.0)
}

/// Assemble the shared core fields, preferring model channels.
fn build_core(
    model: Option<&WorkflowState>,
    input: &ConsolidateInput<'_>,
    aspect_coverage: usize,
) -> ConsolidationCore {
    let key_findings = input.all_findings();
    let sources = input.all_sources();
    let base = confidence(key_findings.len(), aspect_coverage, sources.len());
    let entities = input.entities().join(", ");

    let (objective, summary, intent, goals, steps, conf) = match model {
        Some(state) => (
            state
                .str_channel("researchObjective")
                .unwrap_or_default()
                .to_owned(),
            state.str_channel("summary").unwrap_or_default().to_owned(),
            state
                .str_channel("primaryIntent")
                .unwrap_or_default()
                .to_owned(),
            state.list_channel("researchGoals"),
            state.list_channel("nextSteps"),
            base,
        ),
        None => (
            format!(
                "Consolidate research on {} ({})",
                entities,
                input.session_type.as_str()
            ),
            format!(
                "{} findings across {} entities.",
                key_findings.len(),
                input.research.len()
            ),
            input.session_type.label_noun().to_owned(),
            vec![format!("Understand {entities}")],
            vec!["Review the collected findings".to_owned()],
            base * FALLBACK_CONFIDENCE_SCALE,
        ),
    };

    ConsolidationCore {
        research_objective: objective,
        summary,
        primary_intent: intent,
        research_goals: goals,
        next_steps: steps,
        key_findings,
        sources,
        confidence: conf,
    }
}

/// Chooses the strategy and produces the final consolidated artifact.
pub struct ResearchConsolidator {
    runtime: Arc<WorkflowRuntime>,
}

impl ResearchConsolidator {
    pub fn new(runtime: Arc<WorkflowRuntime>) -> Self {
        Self { runtime }
    }

    pub async fn consolidate(
        &self,
        session_type: SessionType,
        research: &[EntityResearch],
        relationships: &EntityRelationships,
    ) -> ConsolidatedResearch {
        let strategy = choose_strategy(research, relationships);
        let input = ConsolidateInput {
            session_type,
            research,
            relationships,
        };

        match self.run_model(strategy, &input).await {
            Ok(state) => build(strategy, Some(&state), &input),
            Err(err) => {
                tracing::warn!(error = %err, strategy = strategy.as_str(),
                    "model consolidation unavailable, using fallback");
                build(strategy, None, &input)
            }
        }
    }

    async fn run_model(
        &self,
        strategy: ConsolidationStrategy,
        input: &ConsolidateInput<'_>,
    ) -> Result<WorkflowState> {
        let initial = WorkflowState::from_pairs([
            ("strategy", json!(strategy.as_str())),
            ("sessionType", json!(input.session_type.as_str())),
            ("entities", json!(input.entities())),
            ("aggregatedFindings", json!(input.all_findings())),
        ]);
        self.runtime
            .execute(SESSION_RESEARCH_CONSOLIDATION, initial, ExecOptions::default())
            .await
    }
}

/// Dispatch to the strategy builder. Exposed for fallback-path tests.
pub fn build(
    strategy: ConsolidationStrategy,
    model: Option<&WorkflowState>,
    input: &ConsolidateInput<'_>,
) -> ConsolidatedResearch {
    match strategy {
        ConsolidationStrategy::Compare => compare::build(model, input),
        ConsolidationStrategy::Merge => merge::build(model, input),
        ConsolidationStrategy::Complement => complement::build(model, input),
        ConsolidationStrategy::Generic => generic::build(model, input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn research(entities: &[&str]) -> Vec<EntityResearch> {
        entities
            .iter()
            .map(|e| EntityResearch {
                entity: e.to_string(),
                findings: vec![format!("{e} finding")],
                sources: vec![Source {
                    title: e.to_string(),
                    url: format!("https://example.com/{e}"),
                    snippet: None,
                }],
                summaries: vec![],
            })
            .collect()
    }

    fn rel(kind: &str) -> EntityRelationships {
        EntityRelationships {
            relationship_type: kind.into(),
            ..Default::default()
        }
    }

    #[test]
    fn strategy_table() {
        assert_eq!(
            choose_strategy(&research(&["a"]), &rel("comparable-entities")),
            ConsolidationStrategy::Merge
        );
        assert_eq!(
            choose_strategy(&research(&["a", "b"]), &rel("comparable-entities")),
            ConsolidationStrategy::Compare
        );
        assert_eq!(
            choose_strategy(&research(&["a", "b"]), &rel("complementary")),
            ConsolidationStrategy::Complement
        );
        assert_eq!(
            choose_strategy(&research(&["a", "b"]), &rel("independent")),
            ConsolidationStrategy::Generic
        );
    }

    #[test]
    fn confidence_formula_weights() {
        // 10 findings, 5 aspects, 3 sources per finding saturates at 1.0.
        assert_eq!(confidence(10, 5, 30), 1.0);
        assert_eq!(confidence(0, 0, 0), 0.0);
        // 5 findings, 2 aspects, 1 source per finding:
        // 0.5*0.6 + 0.4*0.2 + (1/3)*0.2
        let c = confidence(5, 2, 5);
        let expected = 0.3 + 0.08 + (1.0f64 / 3.0) * 0.2;
        assert!((c - expected).abs() < 1e-9);

        // Terms are not clamped individually: 6 aspects contribute their
        // full 6/5 share, only the sum is capped.
        let c = confidence(5, 6, 0);
        let expected = 0.3 + 6.0 / 5.0 * 0.2;
        assert!((c - expected).abs() < 1e-9);
    }

    #[test]
    fn quality_labels() {
        assert_eq!(quality_label(0.9), "high");
        assert_eq!(quality_label(0.7), "good");
        assert_eq!(quality_label(0.5), "moderate");
        assert_eq!(quality_label(0.1), "basic");
    }

    #[test]
    fn consolidation_is_idempotent() {
        let research = research(&["Hilton", "Ritz"]);
        let relationships = rel("comparable-entities");
        let input = ConsolidateInput {
            session_type: SessionType::HotelResearch,
            research: &research,
            relationships: &relationships,
        };
        let a = build(ConsolidationStrategy::Compare, None, &input);
        let b = build(ConsolidationStrategy::Compare, None, &input);
        assert_eq!(a.core().key_findings, b.core().key_findings);
        assert_eq!(a.strategy(), b.strategy());
    }
}
