//! COMPLEMENT: different-but-related entities; surfaces synergies and at
//! least two common themes (keyword fallback when the model is absent).

use std::collections::HashMap;

use fc_domain::research::ConsolidatedResearch;
use fc_workflow::WorkflowState;

use super::{build_core, ConsolidateInput};

const MIN_COMMON_THEMES: usize = 2;

/// Frequent words that carry no theme signal.
const THEME_STOPWORDS: [&str; 10] = [
    "about", "their", "there", "which", "would", "could", "these", "those", "where", "while",
];

pub(super) fn build(
    model: Option<&WorkflowState>,
    input: &ConsolidateInput<'_>,
) -> ConsolidatedResearch {
    let mut common_themes = model
        .map(|state| state.list_channel("commonThemes"))
        .unwrap_or_default();
    if common_themes.len() < MIN_COMMON_THEMES {
        common_themes = keyword_themes(input);
    }

    let synergies = {
        let from_model = model
            .map(|state| state.list_channel("synergies"))
            .unwrap_or_default();
        if from_model.is_empty() {
            fallback_synergies(input)
        } else {
            from_model
        }
    };

    let core = build_core(model, input, common_themes.len());
    ConsolidatedResearch::Complement {
        core,
        synergies,
        common_themes,
    }
}

/// Keyword-based fallback: words appearing in the findings of at least
/// two entities, most shared first, padded to the minimum.
fn keyword_themes(input: &ConsolidateInput<'_>) -> Vec<String> {
    let mut presence: HashMap<String, usize> = HashMap::new();
    for entity in input.research {
        let mut seen = std::collections::HashSet::new();
        for finding in &entity.findings {
            for word in finding
                .to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.len() >= 5 && !THEME_STOPWORDS.contains(w))
            {
                if seen.insert(word.to_owned()) {
                    *presence.entry(word.to_owned()).or_default() += 1;
                }
            }
        }
    }

    let mut shared: Vec<(String, usize)> = presence
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .collect();
    shared.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut themes: Vec<String> = shared.into_iter().map(|(word, _)| word).collect();
    if themes.len() < MIN_COMMON_THEMES {
        if let Some(topic) = input.session_type.as_str().strip_suffix("_research") {
            if !themes.contains(&topic.to_owned()) {
                themes.push(topic.to_owned());
            }
        }
    }
    if themes.len() < MIN_COMMON_THEMES {
        themes.push("planning".to_owned());
    }
    themes.truncate(6);
    themes
}

fn fallback_synergies(input: &ConsolidateInput<'_>) -> Vec<String> {
    let entities = input.entities();
    match entities.as_slice() {
        [] => Vec::new(),
        [one] => vec![format!("{one} stands alone")],
        many => vec![format!("{} cover complementary needs", many.join(" and "))],
    }
}
