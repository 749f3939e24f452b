//! MERGE: one entity, everything known about it flattened into a single
//! profile.

use serde_json::{json, Value};

use fc_domain::research::ConsolidatedResearch;
use fc_workflow::WorkflowState;

use super::{build_core, ConsolidateInput};

pub(super) fn build(
    model: Option<&WorkflowState>,
    input: &ConsolidateInput<'_>,
) -> ConsolidatedResearch {
    let aspect_coverage = input
        .research
        .iter()
        .map(|r| r.summaries.len())
        .sum::<usize>()
        .max(1);
    let core = build_core(model, input, aspect_coverage);

    let profile = model
        .and_then(|state| state.get("consolidatedProfile"))
        .filter(|v| v.is_object())
        .cloned()
        .unwrap_or_else(|| fallback_profile(input, &core.key_findings));

    ConsolidatedResearch::Merge {
        core,
        consolidated_profile: profile,
    }
}

fn fallback_profile(input: &ConsolidateInput<'_>, findings: &[String]) -> Value {
    let entity = input
        .research
        .first()
        .map(|r| r.entity.clone())
        .unwrap_or_default();
    json!({
        "entity": entity,
        "findings": findings,
        "sourceCount": input.all_sources().len(),
    })
}
