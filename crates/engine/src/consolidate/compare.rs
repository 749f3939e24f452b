//! COMPARE: a rectangular matrix of dimensions × entities with a
//! per-dimension winner.

use serde_json::Value;

use fc_domain::research::{ComparisonMatrix, ConsolidatedResearch, MatrixRow};
use fc_domain::session::SessionType;
use fc_workflow::WorkflowState;

use super::{build_core, ConsolidateInput};

/// Dimensions every hotel comparison carries even when the model offers
/// fewer.
const HOTEL_DIMENSIONS: [&str; 4] = ["price", "amenities", "location", "reviews"];

pub(super) fn build(
    model: Option<&WorkflowState>,
    input: &ConsolidateInput<'_>,
) -> ConsolidatedResearch {
    let columns = input.entities();
    let model_matrix = model
        .and_then(|state| state.get("comparisonMatrix"))
        .and_then(parse_model_matrix);

    let dimensions = collect_dimensions(input, model_matrix.as_ref());
    let rows = dimensions
        .iter()
        .map(|dimension| build_row(dimension, &columns, input, model_matrix.as_ref()))
        .collect();

    let matrix = ComparisonMatrix {
        columns,
        rows,
    };
    debug_assert!(matrix.is_rectangular());

    let core = build_core(model, input, matrix.rows.len());
    ConsolidatedResearch::Compare { core, matrix }
}

/// Model dimensions first (they carry cell text), then the relationship
/// analysis dimensions, then the per-type defaults.
fn collect_dimensions(
    input: &ConsolidateInput<'_>,
    model_matrix: Option<&ComparisonMatrix>,
) -> Vec<String> {
    fn push(out: &mut Vec<String>, dim: &str) {
        let dim = dim.trim().to_lowercase();
        if !dim.is_empty() && !out.contains(&dim) {
            out.push(dim);
        }
    }

    let mut out: Vec<String> = Vec::new();
    if let Some(matrix) = model_matrix {
        for row in &matrix.rows {
            push(&mut out, &row.dimension);
        }
    }
    for dim in &input.relationships.comparison_dimensions {
        push(&mut out, dim);
    }
    if input.session_type == SessionType::HotelResearch {
        for dim in HOTEL_DIMENSIONS {
            push(&mut out, dim);
        }
    }
    if out.is_empty() {
        push(&mut out, "overview");
    }
    out
}

fn build_row(
    dimension: &str,
    columns: &[String],
    input: &ConsolidateInput<'_>,
    model_matrix: Option<&ComparisonMatrix>,
) -> MatrixRow {
    // A model row is usable when its cells line up with our columns.
    if let Some(row) = model_matrix.and_then(|m| {
        m.rows
            .iter()
            .find(|r| r.dimension.eq_ignore_ascii_case(dimension) && r.cells.len() == columns.len())
    }) {
        let winner = row
            .winner
            .as_ref()
            .filter(|w| columns.iter().any(|c| c == *w))
            .cloned();
        return MatrixRow {
            dimension: dimension.to_owned(),
            cells: row.cells.clone(),
            winner,
        };
    }

    // Deterministic cells: the entity's findings that mention the
    // dimension, or a placeholder.
    let cells: Vec<String> = input
        .research
        .iter()
        .map(|entity| {
            entity
                .findings
                .iter()
                .find(|f| f.to_lowercase().contains(dimension))
                .cloned()
                .unwrap_or_else(|| "no data".to_owned())
        })
        .collect();

    // Winner: the single entity with dimension-relevant findings.
    let with_data: Vec<&str> = input
        .research
        .iter()
        .zip(&cells)
        .filter(|(_, cell)| cell.as_str() != "no data")
        .map(|(entity, _)| entity.entity.as_str())
        .collect();
    let winner = match with_data.as_slice() {
        [only] => Some((*only).to_owned()),
        _ => None,
    };

    MatrixRow {
        dimension: dimension.to_owned(),
        cells,
        winner,
    }
}

fn parse_model_matrix(raw: &Value) -> Option<ComparisonMatrix> {
    serde_json::from_value(raw.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::EntityResearch;
    use fc_domain::research::EntityRelationships;

    fn input_fixture(research: &[EntityResearch]) -> ConsolidateInput<'_> {
        // Leaked relationships keep the fixture simple; tests only.
        let relationships = Box::leak(Box::new(EntityRelationships {
            relationship_type: "comparable-entities".into(),
            comparison_dimensions: vec!["price".into()],
            ..Default::default()
        }));
        ConsolidateInput {
            session_type: SessionType::HotelResearch,
            research,
            relationships,
        }
    }

    #[test]
    fn fallback_matrix_is_rectangular_with_hotel_dimensions() {
        let research = vec![
            EntityResearch {
                entity: "Hilton".into(),
                findings: vec!["Hilton price from $200".into()],
                sources: vec![],
                summaries: vec![],
            },
            EntityResearch {
                entity: "Ritz".into(),
                findings: vec!["Ritz amenities include a spa".into()],
                sources: vec![],
                summaries: vec![],
            },
            EntityResearch {
                entity: "Shangri-La".into(),
                findings: vec![],
                sources: vec![],
                summaries: vec![],
            },
        ];
        let input = input_fixture(&research);

        let ConsolidatedResearch::Compare { matrix, .. } = build(None, &input) else {
            panic!("expected compare variant");
        };

        assert_eq!(matrix.columns.len(), 3);
        assert!(matrix.is_rectangular());
        let dims: Vec<&str> = matrix.rows.iter().map(|r| r.dimension.as_str()).collect();
        for required in ["price", "amenities", "location", "reviews"] {
            assert!(dims.contains(&required), "missing dimension {required}");
        }

        // The only entity with price data wins the price row.
        let price_row = matrix.rows.iter().find(|r| r.dimension == "price").unwrap();
        assert_eq!(price_row.winner.as_deref(), Some("Hilton"));
    }
}
