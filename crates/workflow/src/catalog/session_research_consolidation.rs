//! `session_research_consolidation`: one node over aggregated
//! per-entity research, prompted per strategy.
//!
//! The consolidator (engine side) owns validation and fallback; this
//! workflow surfaces the parsed model output as channels.

use std::sync::Arc;

use serde_json::{json, Value};

use fc_domain::research::ConsolidationStrategy;
use fc_domain::Result;
use fc_model::parse;

use crate::catalog::{analyze_json, prompts, SESSION_RESEARCH_CONSOLIDATION};
use crate::graph::{Node, NodeCtx, NodeOutcome, Workflow};
use crate::state::{Patch, WorkflowState};
use crate::END;

pub fn workflow() -> Workflow {
    Workflow::new(SESSION_RESEARCH_CONSOLIDATION, "consolidate_session_research")
        .add_node(Arc::new(ConsolidateSessionResearch))
        .edge_to("consolidate_session_research", END)
}

fn strategy_task(strategy: ConsolidationStrategy) -> &'static str {
    match strategy {
        ConsolidationStrategy::Compare => prompts::CONSOLIDATION_COMPARE_TASK,
        ConsolidationStrategy::Merge => prompts::CONSOLIDATION_MERGE_TASK,
        ConsolidationStrategy::Complement => prompts::CONSOLIDATION_COMPLEMENT_TASK,
        ConsolidationStrategy::Generic => prompts::CONSOLIDATION_GENERIC_TASK,
    }
}

struct ConsolidateSessionResearch;

#[async_trait::async_trait]
impl Node for ConsolidateSessionResearch {
    fn name(&self) -> &'static str {
        "consolidate_session_research"
    }

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let strategy = ConsolidationStrategy::parse_lossy(
            state.str_channel("strategy").unwrap_or("GENERIC"),
        );
        let entities = state.list_channel("entities");
        let findings = state.list_channel("aggregatedFindings");

        let user = format!(
            "{}\n\nSession type: {}\nEntities:\n{}\n\nFindings:\n{}",
            strategy_task(strategy),
            state.str_channel("sessionType").unwrap_or("general_research"),
            entities.join("\n"),
            findings.join("\n"),
        );
        let obj = analyze_json(ctx, prompts::CONSOLIDATION_SYSTEM, user).await?;

        let mut patch = Patch::new()
            .set(
                "researchObjective",
                json!(parse::str_field(&obj, "researchObjective")?),
            )
            .set("summary", json!(parse::str_field(&obj, "summary")?))
            .set(
                "primaryIntent",
                json!(parse::opt_str_field(&obj, "primaryIntent").unwrap_or_default()),
            )
            .set("researchGoals", json!(parse::str_list(&obj, "researchGoals")))
            .set("nextSteps", json!(parse::str_list(&obj, "nextSteps")));

        match strategy {
            ConsolidationStrategy::Compare => {
                patch = patch.set(
                    "comparisonMatrix",
                    obj.get("comparisonMatrix").cloned().unwrap_or(Value::Null),
                );
            }
            ConsolidationStrategy::Merge => {
                patch = patch.set(
                    "consolidatedProfile",
                    obj.get("consolidatedProfile").cloned().unwrap_or(Value::Null),
                );
            }
            ConsolidationStrategy::Complement => {
                patch = patch
                    .set("synergies", json!(parse::str_list(&obj, "synergies")))
                    .set("commonThemes", json!(parse::str_list(&obj, "commonThemes")));
            }
            ConsolidationStrategy::Generic => {}
        }

        Ok(NodeOutcome::patch(patch))
    }
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

    #[tokio::test]
    async fn compare_strategy_surfaces_matrix() {
        let scripted = ScriptedClient::new();
        scripted.push_json(json!({
            "researchObjective": "pick a hotel",
            "summary": "three hotels compared",
            "primaryIntent": "booking",
            "researchGoals": ["compare price"],
            "nextSteps": ["book"],
            "comparisonMatrix": {
                "columns": ["Hilton", "Ritz"],
                "rows": [{"dimension": "price", "cells": ["$", "$$$"], "winner": "Hilton"}]
            }
        }));
        let model = Arc::new(ThrottledClient::new(
            Arc::new(scripted),
            ModelConfig::default(),
        ));
        let rt = WorkflowRuntime::new(model, Arc::new(Store::open_in_memory().unwrap()), Bus::new());
        rt.register(workflow()).unwrap();

        let state = rt
            .execute(
                SESSION_RESEARCH_CONSOLIDATION,
                WorkflowState::from_pairs([
                    ("strategy", json!("COMPARE")),
                    ("sessionType", json!("hotel_research")),
                    ("entities", json!(["Hilton", "Ritz"])),
                    ("aggregatedFindings", json!(["a", "b"])),
                ]),
                ExecOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(state.str_channel("summary"), Some("three hotels compared"));
        assert_eq!(state.get("comparisonMatrix").unwrap()["columns"][0], "Hilton");
    }

    #[tokio::test]
    async fn missing_required_fields_fail_schema() {
        let scripted = ScriptedClient::new();
        scripted.push_json(json!({"summary": "no objective"}));
        let model = Arc::new(ThrottledClient::new(
            Arc::new(scripted),
            ModelConfig::default(),
        ));
        let rt = WorkflowRuntime::new(model, Arc::new(Store::open_in_memory().unwrap()), Bus::new());
        rt.register(workflow()).unwrap();

        let err = rt
            .execute(
                SESSION_RESEARCH_CONSOLIDATION,
                WorkflowState::from_pairs([("strategy", json!("GENERIC"))]),
                ExecOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, fc_domain::Error::WorkflowNodeFailed { .. }));
    }
}
