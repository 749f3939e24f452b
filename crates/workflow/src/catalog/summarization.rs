//! `summarization` with conditional quality refinement.
//!
//! The quality node scores its own summary; below the floor, the
//! conditional edge routes through `refine_summary` before the sink.

use std::sync::Arc;

use serde_json::{json, Value};

use fc_domain::analysis::SUMMARY_QUALITY_FLOOR;
use fc_domain::Result;
use fc_model::parse;

use crate::catalog::{analyze_json, content_channel, prompts, SUMMARIZATION};
use crate::graph::{Node, NodeCtx, NodeOutcome, Workflow};
use crate::state::{Patch, WorkflowState};
use crate::END;

pub fn workflow() -> Workflow {
    Workflow::new(SUMMARIZATION, "extract_and_contextualize")
        .add_node(Arc::new(ExtractAndContextualize))
        .add_node(Arc::new(GenerateQualitySummary))
        .add_node(Arc::new(RefineSummary))
        .edge_to("extract_and_contextualize", "generate_quality_summary")
        .conditional("generate_quality_summary", [("refine", "refine_summary")], END)
        .edge_to("refine_summary", END)
}

struct ExtractAndContextualize;

#[async_trait::async_trait]
impl Node for ExtractAndContextualize {
    fn name(&self) -> &'static str {
        "extract_and_contextualize"
    }

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let content = content_channel(state)?;
        let obj = analyze_json(ctx, prompts::EXTRACT_SYSTEM, content).await?;
        Ok(NodeOutcome::patch(
            Patch::new()
                .set("keyPoints", obj.get("keyPoints").cloned().unwrap_or(json!([])))
                .set(
                    "contextNotes",
                    obj.get("contextNotes").cloned().unwrap_or(json!("")),
                ),
        ))
    }
}

struct GenerateQualitySummary;

#[async_trait::async_trait]
impl Node for GenerateQualitySummary {
    fn name(&self) -> &'static str {
        "generate_quality_summary"
    }

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let user = format!(
            "Key points:\n{}\n\nContext: {}",
            state.list_channel("keyPoints").join("\n"),
            state.str_channel("contextNotes").unwrap_or_default(),
        );
        let obj = analyze_json(ctx, prompts::SUMMARY_SYSTEM, user).await?;
        let summary = parse::str_field(&obj, "summary")?;
        let quality = parse::clamp_confidence(
            obj.get("qualityScore").and_then(Value::as_f64).unwrap_or(0.0),
        );

        let patch = Patch::new()
            .set("summary", json!(summary))
            .set("qualityScore", json!(quality))
            // Overwritten by the refinement node when it runs.
            .set("finalSummary", json!(summary));

        let route = if quality < SUMMARY_QUALITY_FLOOR {
            "refine"
        } else {
            "done"
        };
        Ok(NodeOutcome::routed(patch, route))
    }
}

struct RefineSummary;

#[async_trait::async_trait]
impl Node for RefineSummary {
    fn name(&self) -> &'static str {
        "refine_summary"
    }

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let user = format!(
            "Draft (scored {:.2}):\n{}\n\nKey points:\n{}",
            state.f64_channel("qualityScore").unwrap_or(0.0),
            state.str_channel("summary").unwrap_or_default(),
            state.list_channel("keyPoints").join("\n"),
        );
        let obj = analyze_json(ctx, prompts::REFINE_SYSTEM, user).await?;
        let refined = parse::str_field(&obj, "summary")?;
        Ok(NodeOutcome::patch(
            Patch::new().set("finalSummary", json!(refined)),
        ))
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
    async fn high_quality_summary_skips_refinement() {
        let scripted = ScriptedClient::new();
        scripted.push_json(json!({"keyPoints": ["p1", "p2"], "contextNotes": "notes"}));
        scripted.push_json(json!({"summary": "good summary", "qualityScore": 0.9}));
        let rt = runtime_with(scripted);

        let state = rt
            .execute(
                SUMMARIZATION,
                WorkflowState::from_pairs([("content", json!("long text"))]),
                ExecOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(state.str_channel("finalSummary"), Some("good summary"));
        assert_eq!(state.f64_channel("qualityScore"), Some(0.9));
    }

    #[tokio::test]
    async fn low_quality_summary_is_refined() {
        let scripted = ScriptedClient::new();
        scripted.push_json(json!({"keyPoints": ["p1"], "contextNotes": ""}));
        scripted.push_json(json!({"summary": "weak draft", "qualityScore": 0.4}));
        scripted.push_json(json!({"summary": "much better"}));
        let rt = runtime_with(scripted);

        let state = rt
            .execute(
                SUMMARIZATION,
                WorkflowState::from_pairs([("content", json!("long text"))]),
                ExecOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(state.str_channel("summary"), Some("weak draft"));
        assert_eq!(state.str_channel("finalSummary"), Some("much better"));
    }
}
