//! `hotel_research`: the research pipeline specialized to one fixed
//! entity type, with per-aspect queries.

use std::sync::Arc;

use serde_json::json;

use fc_domain::Result;
use fc_model::parse;

use crate::catalog::research::{perform_searches, summarize_sources};
use crate::catalog::{analyze_json, content_channel, prompts, HOTEL_RESEARCH};
use crate::graph::{Node, NodeCtx, NodeOutcome, Workflow};
use crate::state::{Patch, WorkflowState};
use crate::END;

/// Aspects every hotel query set covers.
pub const HOTEL_ASPECTS: [&str; 4] = ["price", "amenities", "location", "reviews"];

pub fn workflow() -> Workflow {
    Workflow::new(HOTEL_RESEARCH, "analyze_hotel_requirements")
        .add_node(Arc::new(AnalyzeHotelRequirements))
        .add_node(Arc::new(GenerateHotelQueries))
        .add_node(Arc::new(PerformHotelResearch))
        .edge_to("analyze_hotel_requirements", "generate_hotel_queries")
        .edge_to("generate_hotel_queries", "perform_hotel_research")
        .edge_to("perform_hotel_research", END)
}

struct AnalyzeHotelRequirements;

#[async_trait::async_trait]
impl Node for AnalyzeHotelRequirements {
    fn name(&self) -> &'static str {
        "analyze_hotel_requirements"
    }

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let content = content_channel(state)?;
        let obj = analyze_json(ctx, prompts::HOTEL_REQUIREMENTS_SYSTEM, content.clone()).await?;

        let hotel_name = parse::opt_str_field(&obj, "hotelName")
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(content);
        Ok(NodeOutcome::patch(
            Patch::new()
                .set("hotelName", json!(hotel_name))
                .set(
                    "location",
                    json!(parse::opt_str_field(&obj, "location").unwrap_or_default()),
                )
                .set("requirements", json!(parse::str_list(&obj, "requirements"))),
        ))
    }
}

struct GenerateHotelQueries;

#[async_trait::async_trait]
impl Node for GenerateHotelQueries {
    fn name(&self) -> &'static str {
        "generate_hotel_queries"
    }

    async fn run(&self, _ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let hotel = state.str_channel("hotelName").unwrap_or_default();
        let location = state.str_channel("location").unwrap_or_default();
        let subject = if location.is_empty() {
            hotel.to_owned()
        } else {
            format!("{hotel} {location}")
        };

        let queries: Vec<String> = HOTEL_ASPECTS
            .iter()
            .map(|aspect| format!("{subject} {aspect}"))
            .collect();
        let aspects: Vec<String> = HOTEL_ASPECTS.iter().map(|a| a.to_string()).collect();

        Ok(NodeOutcome::patch(
            Patch::new()
                .set("hotelQueries", json!(queries))
                .set("aspects", json!(aspects)),
        ))
    }
}

struct PerformHotelResearch;

#[async_trait::async_trait]
impl Node for PerformHotelResearch {
    fn name(&self) -> &'static str {
        "perform_hotel_research"
    }

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let queries = state.list_channel("hotelQueries");
        let aspects = state.list_channel("aspects");
        let run = perform_searches(ctx, &queries, Some(&aspects)).await?;

        let (key_findings, confidence) = summarize_sources(&run.sources, run.completed, run.failed);
        Ok(NodeOutcome::patch(
            Patch::new()
                .set("keyFindings", json!(key_findings))
                .set("sources", serde_json::to_value(&run.sources)?)
                .set("completedQueries", json!(run.completed))
                .set("failedQueries", json!(run.failed))
                .set("confidence", json!(confidence)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressSink;
    use crate::runtime::{ExecOptions, WorkflowRuntime};
    use fc_domain::bus::Bus;
    use fc_domain::config::ModelConfig;
    use fc_model::testing::ScriptedClient;
    use fc_model::ThrottledClient;
    use fc_store::Store;

    #[tokio::test]
    async fn covers_all_aspects_with_progress() {
        let scripted = ScriptedClient::new();
        scripted.push_json(json!({
            "hotelName": "Shangri-La Hotel",
            "location": "Toronto",
            "requirements": ["spa"]
        }));
        let model = Arc::new(ThrottledClient::new(
            Arc::new(scripted),
            ModelConfig::default(),
        ));
        let rt = WorkflowRuntime::new(model, Arc::new(Store::open_in_memory().unwrap()), Bus::new());
        rt.register(workflow()).unwrap();

        let (sink, mut rx) = ProgressSink::channel(64);
        let state = rt
            .execute(
                HOTEL_RESEARCH,
                WorkflowState::from_pairs([("content", json!("Shangri-La Hotel Toronto"))]),
                ExecOptions {
                    progress: Some(sink),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let queries = state.list_channel("hotelQueries");
        assert_eq!(queries.len(), HOTEL_ASPECTS.len());
        assert!(queries[0].contains("Shangri-La Hotel Toronto"));
        assert_eq!(state.f64_channel("completedQueries"), Some(4.0));

        let mut aspects_seen = std::collections::HashSet::new();
        while let Ok(ev) = rx.try_recv() {
            if let Some(aspect) = ev.current_aspect {
                aspects_seen.insert(aspect);
            }
        }
        assert_eq!(aspects_seen.len(), HOTEL_ASPECTS.len());
    }
}
