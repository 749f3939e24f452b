//! `research_query_generation`: 1–3 queries per session entry.
//!
//! The original content always appears verbatim as the first query;
//! contextual variations come from the model, topped up deterministically
//! from tags and session type when it returns fewer.

use std::sync::Arc;

use serde_json::json;

use fc_domain::Result;
use fc_model::parse;

use crate::catalog::{analyze_json, content_channel, prompts, RESEARCH_QUERY_GENERATION};
use crate::graph::{Node, NodeCtx, NodeOutcome, Workflow};
use crate::state::{Patch, WorkflowState};
use crate::END;

pub const MAX_ENTRY_QUERIES: usize = 3;

pub fn workflow() -> Workflow {
    Workflow::new(RESEARCH_QUERY_GENERATION, "generate_entry_queries")
        .add_node(Arc::new(GenerateEntryQueries))
        .edge_to("generate_entry_queries", END)
}

/// Deterministic variations used to top up short model output.
pub(crate) fn contextual_variations(content: &str, tags: &[String], session_type: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(topic) = session_type.strip_suffix("_research") {
        if topic != "general" {
            out.push(format!("{content} {topic}"));
        }
    }
    for tag in tags {
        out.push(format!("{content} {tag}"));
    }
    out.push(format!("{content} reviews"));
    out
}

struct GenerateEntryQueries;

#[async_trait::async_trait]
impl Node for GenerateEntryQueries {
    fn name(&self) -> &'static str {
        "generate_entry_queries"
    }

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let content = content_channel(state)?;
        let tags = state.list_channel("tags");
        let session_type = state
            .str_channel("sessionType")
            .unwrap_or("general_research")
            .to_owned();

        let user = format!(
            "Entry:\n{content}\n\nTags: {}\nSession type: {session_type}",
            tags.join(", ")
        );
        let obj = analyze_json(ctx, prompts::ENTRY_QUERIES_SYSTEM, user).await?;

        let mut queries = vec![content.clone()];
        for q in parse::str_list(&obj, "queries") {
            let q = q.trim().to_owned();
            if !q.is_empty() && !queries.contains(&q) && queries.len() < MAX_ENTRY_QUERIES {
                queries.push(q);
            }
        }
        for q in contextual_variations(&content, &tags, &session_type) {
            if queries.len() >= 2 {
                break;
            }
            if !queries.contains(&q) {
                queries.push(q);
            }
        }

        Ok(NodeOutcome::patch(
            Patch::new().set("entryQueries", json!(queries)),
        ))
    }
}
