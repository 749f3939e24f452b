//! `research`: single-item research with live progress.
//!
//! Queries run sequentially through the web-search stream; each emits a
//! progress event per step. A failed query lowers confidence but never
//! fails the workflow.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::json;

use fc_domain::event::ResearchProgress;
use fc_domain::research::{dedup_sources, Source, MAX_KEY_FINDINGS};
use fc_domain::Result;
use fc_model::SearchStatus;

use crate::catalog::{analyze_json, content_channel, prompts, RESEARCH};
use crate::graph::{Node, NodeCtx, NodeOutcome, Workflow};
use crate::state::{Patch, WorkflowState};
use crate::END;

pub fn workflow() -> Workflow {
    Workflow::new(RESEARCH, "generate_research_queries")
        .add_node(Arc::new(GenerateResearchQueries))
        .add_node(Arc::new(PerformWebResearch))
        .add_node(Arc::new(ProcessResearchResults))
        .edge_to("generate_research_queries", "perform_web_research")
        .edge_to("perform_web_research", "process_research_results")
        .edge_to("process_research_results", END)
}

struct GenerateResearchQueries;

#[async_trait::async_trait]
impl Node for GenerateResearchQueries {
    fn name(&self) -> &'static str {
        "generate_research_queries"
    }

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        // Callers that already chose their queries (the session research
        // pipeline seeds one query per invocation) pass through untouched.
        if !state.list_channel("researchQueries").is_empty() {
            return Ok(NodeOutcome::patch(Patch::new()));
        }

        let content = content_channel(state)?;
        let obj = analyze_json(ctx, prompts::RESEARCH_QUERIES_SYSTEM, content.clone()).await?;
        let mut queries = fc_model::parse::str_list(&obj, "queries");
        queries.retain(|q| !q.trim().is_empty());
        queries.truncate(3);
        if queries.is_empty() {
            queries.push(content);
        }
        Ok(NodeOutcome::patch(
            Patch::new().set("researchQueries", json!(queries)),
        ))
    }
}

/// Outcome of driving one batch of search queries.
pub(crate) struct SearchRun {
    pub sources: Vec<Source>,
    pub completed: usize,
    pub failed: usize,
}

/// Drive the web-search stream for each query in order, forwarding one
/// progress event per stream step. `aspects` labels each query for the
/// hotel specialization.
pub(crate) async fn perform_searches(
    ctx: &NodeCtx,
    queries: &[String],
    aspects: Option<&[String]>,
) -> Result<SearchRun> {
    let mut run = SearchRun {
        sources: Vec::new(),
        completed: 0,
        failed: 0,
    };

    for (idx, query) in queries.iter().enumerate() {
        ctx.cancel.check()?;
        let aspect = aspects.and_then(|a| a.get(idx)).cloned();
        let mut stream = ctx.search(query.clone()).await?;

        while let Some(step) = stream.next().await {
            ctx.cancel.check()?;
            ctx.emit_progress(ResearchProgress {
                current_aspect: aspect.clone(),
                lang_graph_query: Some(step.query.clone()),
                lang_graph_status: Some(status_label(step.status).to_owned()),
                results_count: Some(step.results_count),
                total_queries: Some(queries.len()),
                completed_queries: Some(run.completed),
                ..Default::default()
            })
            .await;

            match step.status {
                SearchStatus::Searching => {}
                SearchStatus::Completed => {
                    run.completed += 1;
                    run.sources.extend(step.results);
                }
                SearchStatus::Failed => {
                    run.failed += 1;
                    tracing::debug!(query = %step.query, "search query failed");
                }
            }
        }
    }

    run.sources = dedup_sources(run.sources);
    Ok(run)
}

fn status_label(status: SearchStatus) -> &'static str {
    match status {
        SearchStatus::Searching => "searching",
        SearchStatus::Completed => "completed",
        SearchStatus::Failed => "failed",
    }
}

struct PerformWebResearch;

#[async_trait::async_trait]
impl Node for PerformWebResearch {
    fn name(&self) -> &'static str {
        "perform_web_research"
    }

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let queries = state.list_channel("researchQueries");
        let run = perform_searches(ctx, &queries, None).await?;
        Ok(NodeOutcome::patch(
            Patch::new()
                .set("searchResults", serde_json::to_value(&run.sources)?)
                .set("completedQueries", json!(run.completed))
                .set("failedQueries", json!(run.failed)),
        ))
    }
}

/// Turn deduplicated sources into findings and a coverage-based confidence.
pub(crate) fn summarize_sources(
    sources: &[Source],
    completed: usize,
    failed: usize,
) -> (Vec<String>, f64) {
    let key_findings: Vec<String> = sources
        .iter()
        .map(|s| match &s.snippet {
            Some(snippet) => snippet.clone(),
            None => s.title.clone(),
        })
        .take(MAX_KEY_FINDINGS)
        .collect();

    let total = completed + failed;
    let coverage = if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64
    };
    let density = (key_findings.len() as f64 / MAX_KEY_FINDINGS as f64).min(1.0);
    let confidence = (coverage * 0.7 + density * 0.3).clamp(0.0, 1.0);
    (key_findings, confidence)
}

struct ProcessResearchResults;

#[async_trait::async_trait]
impl Node for ProcessResearchResults {
    fn name(&self) -> &'static str {
        "process_research_results"
    }

    async fn run(&self, _ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome> {
        let sources: Vec<Source> = state
            .get("searchResults")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        let completed = state.f64_channel("completedQueries").unwrap_or(0.0) as usize;
        let failed = state.f64_channel("failedQueries").unwrap_or(0.0) as usize;

        let (key_findings, confidence) = summarize_sources(&sources, completed, failed);
        Ok(NodeOutcome::patch(
            Patch::new()
                .set("keyFindings", json!(key_findings))
                .set("sources", serde_json::to_value(&sources)?)
                .set("confidence", json!(confidence)),
        ))
    }
}
