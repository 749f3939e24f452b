//! `content_analysis`: one unified analysis of a new item.
//!
//! `comprehensive_analysis` runs the model (with the screenshot attached
//! when one exists, cached per input fingerprint); `enhance_results`
//! normalizes the output into a [`ContentAnalysis`] record.

use std::sync::Arc;

use serde_json::{json, Value};

use fc_domain::analysis::{
    dedup_and_rank, ActionKind, ContentAnalysis, Priority, RecommendedAction, MAX_TAGS,
};
use fc_domain::item::normalize_tag;
use fc_domain::Result;
use fc_model::parse;
use fc_model::AnalyzeRequest;

use crate::cache::fingerprint;
use crate::catalog::{content_channel, context_block, prompts, CONTENT_ANALYSIS};
use crate::graph::{Node, NodeCtx, NodeOutcome, Workflow};
use crate::state::{Patch, WorkflowState};
use crate::END;

pub fn workflow() -> Workflow {
    Workflow::new(CONTENT_ANALYSIS, "comprehensive_analysis")
        .add_node(Arc::new(ComprehensiveAnalysis))
        .add_node(Arc::new(EnhanceResults))
        .edge_to("comprehensive_analysis", "enhance_results")
        .edge_to("enhance_results", END)
}

struct ComprehensiveAnalysis;

#[async_trait::async_trait]
impl Node for ComprehensiveAnalysis {
    fn name(&self) -> &'static str {
        "comprehensive_analysis"
    }

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let content = content_channel(state)?;
        let screenshot = state.str_channel("screenshotPath").map(str::to_owned);

        let user = format!(
            "Copied content:\n{content}\n\nCapture context:\n{}",
            context_block(state)
        );

        // Screenshot analyses are worth caching: a burst of re-analysis
        // within one session hits the same (content, screenshot) pair.
        let cache_key = screenshot
            .as_ref()
            .map(|shot| fingerprint(format!("{content}\n{shot}").as_bytes()));
        if let Some(key) = &cache_key {
            if let Some(cached) = ctx.cache.get(self.name(), key) {
                return Ok(NodeOutcome::patch(raw_patch(&cached)));
            }
        }

        let mut req = AnalyzeRequest::json(prompts::CONTENT_ANALYSIS_SYSTEM, user);
        if let Some(shot) = &screenshot {
            req = req.with_image(shot.clone());
        }
        let output = ctx.analyze(req).await?;
        let obj = parse::json_object(&output)?;

        if let Some(key) = &cache_key {
            ctx.cache.put(self.name(), key, obj.clone());
        }
        Ok(NodeOutcome::patch(raw_patch(&obj)))
    }
}

fn raw_patch(obj: &Value) -> Patch {
    Patch::new()
        .set(
            "contentType",
            obj.get("contentType").cloned().unwrap_or(json!("text")),
        )
        .set(
            "sentiment",
            obj.get("sentiment").cloned().unwrap_or(json!("neutral")),
        )
        .set("purpose", obj.get("purpose").cloned().unwrap_or(json!("")))
        .set("tags", obj.get("tags").cloned().unwrap_or(json!([])))
        .set(
            "recommendedActionsRaw",
            obj.get("recommendedActions").cloned().unwrap_or(json!([])),
        )
        .set(
            "visualContext",
            obj.get("visualContext").cloned().unwrap_or(Value::Null),
        )
        .set(
            "confidence",
            json!(parse::clamp_confidence(
                obj.get("confidence").and_then(Value::as_f64).unwrap_or(0.5)
            )),
        )
}

struct EnhanceResults;

#[async_trait::async_trait]
impl Node for EnhanceResults {
    fn name(&self) -> &'static str {
        "enhance_results"
    }

    async fn run(&self, _ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let confidence = state.f64_channel("confidence").unwrap_or(0.0);

        let mut seen = std::collections::HashSet::new();
        let mut tags: Vec<String> = state
            .list_channel("tags")
            .iter()
            .map(|t| normalize_tag(t))
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();
        tags.truncate(MAX_TAGS);

        let actions = parse_actions(state.get("recommendedActionsRaw"));
        let ranked = dedup_and_rank(actions, confidence);

        let analysis = ContentAnalysis {
            content_type: state
                .str_channel("contentType")
                .unwrap_or("text")
                .to_owned(),
            sentiment: state.str_channel("sentiment").unwrap_or("neutral").to_owned(),
            purpose: state.str_channel("purpose").unwrap_or_default().to_owned(),
            tags: tags.clone(),
            recommended_actions: ranked.clone(),
            visual_context: state.str_channel("visualContext").map(str::to_owned),
            confidence,
        };

        Ok(NodeOutcome::patch(
            Patch::new()
                .set("tags", json!(tags))
                .set("recommendedActions", serde_json::to_value(&ranked)?)
                .set("analysis", serde_json::to_value(&analysis)?),
        ))
    }
}

/// Parse the model's raw action list, skipping anything outside the
/// closed action set.
fn parse_actions(raw: Option<&Value>) -> Vec<RecommendedAction> {
    let Some(items) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let kind = ActionKind::parse(item.get("action")?.as_str()?)?;
            let priority =
                Priority::parse_lossy(item.get("priority").and_then(Value::as_str).unwrap_or(""));
            let reason = item
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            Some(RecommendedAction {
                kind,
                priority,
                reason,
            })
        })
        .collect()
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
        let store = Arc::new(Store::open_in_memory().unwrap());
        let rt = WorkflowRuntime::new(model, store, Bus::new());
        rt.register(workflow()).unwrap();
        rt
    }

    fn model_answer() -> serde_json::Value {
        json!({
            "contentType": "text",
            "sentiment": "neutral",
            "purpose": "researching hotels",
            "tags": ["Hotels", "Toronto", "hotels", "travel"],
            "recommendedActions": [
                {"action": "research", "priority": "high", "reason": "hotel name"},
                {"action": "research", "priority": "low", "reason": "dup"},
                {"action": "summarize", "priority": "medium", "reason": "long text"},
                {"action": "dance", "priority": "high", "reason": "outside the set"}
            ],
            "visualContext": null,
            "confidence": 0.9
        })
    }

    #[tokio::test]
    async fn produces_ranked_deduped_analysis() {
        let scripted = ScriptedClient::new();
        scripted.push_json(model_answer());
        let rt = runtime_with(scripted);

        let state = rt
            .execute(
                CONTENT_ANALYSIS,
                WorkflowState::from_pairs([
                    ("content", json!("Hilton Toronto Downtown")),
                    ("context", json!({"source_app": "Safari"})),
                ]),
                ExecOptions::default(),
            )
            .await
            .unwrap();

        // Tags normalized and deduped.
        let tags = state.list_channel("tags");
        assert_eq!(tags, vec!["hotels", "toronto", "travel"]);

        // Actions deduped by kind, unknown kinds dropped, high first.
        let analysis: ContentAnalysis =
            serde_json::from_value(state.get("analysis").unwrap().clone()).unwrap();
        assert_eq!(analysis.recommended_actions.len(), 2);
        assert_eq!(analysis.recommended_actions[0].kind, ActionKind::Research);
        assert_eq!(analysis.recommended_actions[0].priority, Priority::High);
        assert_eq!(analysis.confidence, 0.9);
    }

    #[tokio::test]
    async fn screenshot_analysis_cached_per_fingerprint() {
        let scripted = ScriptedClient::new();
        scripted.push_json(model_answer());
        // One scripted answer only: the second run must hit the node cache.
        let rt = runtime_with(scripted);

        let initial = || {
            WorkflowState::from_pairs([
                ("content", json!("Hilton Toronto Downtown")),
                ("screenshotPath", json!("/shots/1.png")),
            ])
        };
        rt.execute(CONTENT_ANALYSIS, initial(), ExecOptions::default())
            .await
            .unwrap();
        let state = rt
            .execute(CONTENT_ANALYSIS, initial(), ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(state.str_channel("purpose"), Some("researching hotels"));
    }
}
