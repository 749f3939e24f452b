//! GENERIC: independent entities, core summary only.

use fc_domain::research::ConsolidatedResearch;
use fc_workflow::WorkflowState;

use super::{build_core, ConsolidateInput};

pub(super) fn build(
    model: Option<&WorkflowState>,
    input: &ConsolidateInput<'_>,
) -> ConsolidatedResearch {
    let core = build_core(model, input, input.research.len().min(5));
    ConsolidatedResearch::Generic { core }
}
