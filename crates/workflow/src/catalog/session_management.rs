//! `session_management`: type detection, membership evaluation, and
//! the final session decision with entity relationships.
//!
//! Input channels: `content`, `context`, and optionally
//! `candidateContext` (the candidate session's type, label, and member
//! contents). Without a candidate the workflow acts as pure type
//! detection.

use std::sync::Arc;

use serde_json::{json, Value};

use fc_domain::research::{ConsolidationStrategy, EntityRelationships, SessionDecision};
use fc_domain::session::SessionType;
use fc_domain::Result;
use fc_model::parse;

use crate::catalog::{analyze_json, content_channel, context_block, prompts, SESSION_MANAGEMENT};
use crate::graph::{Node, NodeCtx, NodeOutcome, Workflow};
use crate::state::{Patch, WorkflowState};
use crate::END;

pub fn workflow() -> Workflow {
    Workflow::new(SESSION_MANAGEMENT, "analyze_session_context")
        .add_node(Arc::new(AnalyzeSessionContext))
        .add_node(Arc::new(EvaluateSessionMembership))
        .add_node(Arc::new(GenerateSessionDecision))
        .edge_to("analyze_session_context", "evaluate_session_membership")
        .edge_to("evaluate_session_membership", "generate_session_decision")
        .edge_to("generate_session_decision", END)
}

struct AnalyzeSessionContext;

#[async_trait::async_trait]
impl Node for AnalyzeSessionContext {
    fn name(&self) -> &'static str {
        "analyze_session_context"
    }

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let content = content_channel(state)?;
        let user = format!(
            "Capture:\n{content}\n\nCapture context:\n{}",
            context_block(state)
        );
        let obj = analyze_json(ctx, prompts::SESSION_CONTEXT_SYSTEM, user).await?;

        let session_type =
            SessionType::parse_lossy(&parse::str_field(&obj, "sessionType").unwrap_or_default());
        let confidence = parse::clamp_confidence(
            obj.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
        );

        Ok(NodeOutcome::patch(
            Patch::new()
                .set("sessionType", json!(session_type.as_str()))
                .set("sessionTypeConfidence", json!(confidence))
                .set("entities", obj.get("entities").cloned().unwrap_or(json!([])))
                .set(
                    "intentAnalysis",
                    json!({
                        "intent": parse::opt_str_field(&obj, "intent").unwrap_or_default(),
                        "confidence": confidence,
                    }),
                ),
        ))
    }
}

struct EvaluateSessionMembership;

#[async_trait::async_trait]
impl Node for EvaluateSessionMembership {
    fn name(&self) -> &'static str {
        "evaluate_session_membership"
    }

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let Some(candidate) = state.get("candidateContext").filter(|v| !v.is_null()) else {
            // Type detection run: nothing to join.
            return Ok(NodeOutcome::patch(
                Patch::new()
                    .set("belongsToSession", json!(false))
                    .set("membershipConfidence", json!(0.0))
                    .set("membershipReasoning", json!("no candidate session")),
            ));
        };

        let content = content_channel(state)?;
        let user = format!(
            "Candidate session:\n{candidate}\n\nNew capture:\n{content}\n\nDetected type: {}",
            state.str_channel("sessionType").unwrap_or("general_research"),
        );
        let obj = analyze_json(ctx, prompts::MEMBERSHIP_SYSTEM, user).await?;

        Ok(NodeOutcome::patch(
            Patch::new()
                .set(
                    "belongsToSession",
                    json!(parse::bool_field(&obj, "belongsToSession").unwrap_or(false)),
                )
                .set(
                    "membershipConfidence",
                    json!(parse::clamp_confidence(
                        obj.get("confidence").and_then(Value::as_f64).unwrap_or(0.0)
                    )),
                )
                .set(
                    "membershipReasoning",
                    json!(parse::opt_str_field(&obj, "reasoning").unwrap_or_default()),
                ),
        ))
    }
}

struct GenerateSessionDecision;

#[async_trait::async_trait]
impl Node for GenerateSessionDecision {
    fn name(&self) -> &'static str {
        "generate_session_decision"
    }

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let session_type =
            SessionType::parse_lossy(state.str_channel("sessionType").unwrap_or_default());
        let belongs = state.bool_channel("belongsToSession").unwrap_or(false);
        let confidence = state.f64_channel("membershipConfidence").unwrap_or(0.0);
        let entities = state.list_channel("entities");

        // Relationship analysis only earns a model call once a session has
        // more than one entity in play; a lone capture is trivially MERGE.
        let relationships = if entities.len() <= 1 && !belongs {
            EntityRelationships {
                consolidation_strategy: ConsolidationStrategy::Merge,
                relationship_type: "same-entity".into(),
                entities,
                comparison_dimensions: Vec::new(),
                reasoning: "single entity".into(),
                confidence: state.f64_channel("sessionTypeConfidence").unwrap_or(0.0),
            }
        } else {
            let user = format!(
                "Session type: {}\nEntities:\n{}\nNew capture:\n{}",
                session_type.as_str(),
                entities.join("\n"),
                content_channel(state)?,
            );
            let obj = analyze_json(ctx, prompts::RELATIONSHIP_SYSTEM, user).await?;
            EntityRelationships {
                consolidation_strategy: ConsolidationStrategy::parse_lossy(
                    &parse::str_field(&obj, "consolidationStrategy").unwrap_or_default(),
                ),
                relationship_type: parse::opt_str_field(&obj, "relationshipType")
                    .unwrap_or_else(|| "independent".into()),
                entities: {
                    let model_entities = parse::str_list(&obj, "entities");
                    if model_entities.is_empty() {
                        entities
                    } else {
                        model_entities
                    }
                },
                comparison_dimensions: parse::str_list(&obj, "comparisonDimensions"),
                reasoning: parse::opt_str_field(&obj, "reasoning").unwrap_or_default(),
                confidence: parse::clamp_confidence(
                    obj.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
                ),
            }
        };

        let decision = SessionDecision {
            session_type,
            belongs_to_session: belongs,
            decision: if belongs {
                "join_existing".into()
            } else {
                "create_new".into()
            },
            confidence,
            intent_analysis: state.get("intentAnalysis").cloned(),
            relationships,
        };

        Ok(NodeOutcome::patch(
            Patch::new()
                .set("sessionDecision", serde_json::to_value(&decision)?)
                .set(
                    "entityRelationships",
                    serde_json::to_value(&decision.relationships)?,
                ),
        ))
    }
}

/// Parse the decision channel back out of a final state.
pub fn decision_from_state(state: &WorkflowState) -> Result<SessionDecision> {
    state
        .get("sessionDecision")
        .cloned()
        .map(serde_json::from_value)
        .transpose()?
        .ok_or_else(|| fc_domain::Error::Other("missing sessionDecision channel".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ExecOptions, WorkflowRuntime};
    use fc_domain::bus::Bus;
    use fc_domain::config::ModelConfig;
    use fc_model::testing::ScriptedClient;
    use fc_model::ThrottledClient;
    use fc_store::Store;

    fn runtime_with(scripted: ScriptedClient) -> WorkflowRuntime {
        let model = Arc::new(ThrottledClient::new(
            Arc::new(scripted),
            ModelConfig::default(),
        ));
        let rt = WorkflowRuntime::new(model, Arc::new(Store::open_in_memory().unwrap()), Bus::new());
        rt.register(workflow()).unwrap();
        rt
    }

    #[tokio::test]
    async fn type_detection_without_candidate() {
        let scripted = ScriptedClient::new();
        scripted.push_json(json!({
            "sessionType": "hotel_research",
            "confidence": 0.85,
            "entities": ["Hilton Toronto Downtown"],
            "intent": "comparing hotels"
        }));
        let rt = runtime_with(scripted);

        let state = rt
            .execute(
                SESSION_MANAGEMENT,
                WorkflowState::from_pairs([("content", json!("Hilton Toronto Downtown"))]),
                ExecOptions::default(),
            )
            .await
            .unwrap();

        let decision = decision_from_state(&state).unwrap();
        assert_eq!(decision.session_type, SessionType::HotelResearch);
        assert!(!decision.belongs_to_session);
        assert_eq!(
            decision.relationships.consolidation_strategy,
            ConsolidationStrategy::Merge
        );
    }

    #[tokio::test]
    async fn membership_accepted_with_candidate() {
        let scripted = ScriptedClient::new();
        scripted.push_json(json!({
            "sessionType": "hotel_research",
            "confidence": 0.8,
            "entities": ["The Ritz-Carlton, Toronto"],
            "intent": "comparing hotels"
        }));
        scripted.push_json(json!({
            "belongsToSession": true,
            "confidence": 0.9,
            "reasoning": "same city, same activity"
        }));
        scripted.push_json(json!({
            "consolidationStrategy": "COMPARE",
            "relationshipType": "comparable-entities",
            "entities": ["Hilton Toronto Downtown", "The Ritz-Carlton, Toronto"],
            "comparisonDimensions": ["price", "amenities", "location", "reviews"],
            "reasoning": "two hotels in the same city",
            "confidence": 0.9
        }));
        let rt = runtime_with(scripted);

        let state = rt
            .execute(
                SESSION_MANAGEMENT,
                WorkflowState::from_pairs([
                    ("content", json!("The Ritz-Carlton, Toronto")),
                    (
                        "candidateContext",
                        json!("hotel_research session: Hilton Toronto Downtown"),
                    ),
                ]),
                ExecOptions::default(),
            )
            .await
            .unwrap();

        let decision = decision_from_state(&state).unwrap();
        assert!(decision.belongs_to_session);
        assert_eq!(decision.confidence, 0.9);
        assert_eq!(
            decision.relationships.consolidation_strategy,
            ConsolidationStrategy::Compare
        );
        assert_eq!(decision.relationships.entities.len(), 2);
    }
}
