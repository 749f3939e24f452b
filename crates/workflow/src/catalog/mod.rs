//! The workflow catalog: declarative definitions of the seven workflows.

use serde_json::Value;

use fc_domain::Result;
use fc_model::parse;
use fc_model::AnalyzeRequest;

use crate::graph::NodeCtx;
use crate::runtime::WorkflowRuntime;
use crate::state::WorkflowState;

pub mod content_analysis;
pub mod hotel_research;
pub mod prompts;
pub mod query_generation;
pub mod research;
pub mod session_management;
pub mod session_research_consolidation;
pub mod summarization;

pub const CONTENT_ANALYSIS: &str = "content_analysis";
pub const SUMMARIZATION: &str = "summarization";
pub const RESEARCH: &str = "research";
pub const SESSION_MANAGEMENT: &str = "session_management";
pub const SESSION_RESEARCH_CONSOLIDATION: &str = "session_research_consolidation";
pub const RESEARCH_QUERY_GENERATION: &str = "research_query_generation";
pub const HOTEL_RESEARCH: &str = "hotel_research";

/// Register every catalog workflow on a runtime.
pub fn register_all(runtime: &WorkflowRuntime) -> Result<()> {
    runtime.register(content_analysis::workflow())?;
    runtime.register(summarization::workflow())?;
    runtime.register(research::workflow())?;
    runtime.register(session_management::workflow())?;
    runtime.register(session_research_consolidation::workflow())?;
    runtime.register(query_generation::workflow())?;
    runtime.register(hotel_research::workflow())?;
    Ok(())
}

// ── shared node helpers ─────────────────────────────────────────────

/// One JSON-mode model call, validated at the parse boundary.
pub(crate) async fn analyze_json(
    ctx: &NodeCtx,
    system: &str,
    user: impl Into<String>,
) -> Result<Value> {
    let output = ctx.analyze(AnalyzeRequest::json(system, user)).await?;
    parse::json_object(&output)
}

/// Render the capture context channel as a prompt block.
pub(crate) fn context_block(state: &WorkflowState) -> String {
    let mut lines = Vec::new();
    if let Some(ctx) = state.get("context") {
        for (label, key) in [
            ("Source app", "source_app"),
            ("Window title", "window_title"),
            ("Surrounding text", "surrounding_text"),
        ] {
            if let Some(v) = ctx.get(key).and_then(Value::as_str) {
                if !v.is_empty() {
                    lines.push(format!("{label}: {v}"));
                }
            }
        }
    }
    if lines.is_empty() {
        "(no capture context)".to_owned()
    } else {
        lines.join("\n")
    }
}

/// The item content channel, required by most start nodes.
pub(crate) fn content_channel(state: &WorkflowState) -> Result<String> {
    state
        .str_channel("content")
        .map(str::to_owned)
        .ok_or_else(|| fc_domain::Error::Other("missing content channel".into()))
}
