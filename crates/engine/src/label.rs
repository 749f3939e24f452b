//! Session label derivation.
//!
//! Labels read "Hotel Research — Toronto": the session type noun plus the
//! best proper name or location extracted from member contents. The label
//! stays stable across member additions unless a member finally yields a
//! qualifier for a session that had none.

use regex::Regex;
use std::sync::OnceLock;

use fc_domain::session::SessionType;

/// Words that look like proper nouns but never make good qualifiers.
const STOPWORDS: [&str; 12] = [
    "The", "A", "An", "How", "What", "Why", "When", "Where", "Hotel", "Restaurant", "Review",
    "Downtown",
];

fn capitalized_phrase() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Z][a-zA-Z']+(?:[ -][A-Z][a-zA-Z']+)*\b").expect("static regex")
    })
}

/// Extract candidate proper-name qualifiers from content, best last.
///
/// Locations tend to close a phrase ("Hilton Toronto Downtown", "The
/// Ritz-Carlton, Toronto"), so the final capitalized word of the final
/// phrase is preferred.
fn qualifiers(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    for cap in capitalized_phrase().find_iter(content) {
        for word in cap.as_str().split([' ', '-']) {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.len() >= 3 && !STOPWORDS.contains(&word) {
                out.push(word.to_owned());
            }
        }
    }
    out
}

/// Pick the qualifier shared by the most members, falling back to the
/// last qualifier of the first member.
fn shared_qualifier(member_contents: &[String]) -> Option<String> {
    let per_member: Vec<Vec<String>> = member_contents.iter().map(|c| qualifiers(c)).collect();

    if per_member.len() > 1 {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for word in per_member.iter().flatten() {
            match counts.iter_mut().find(|(w, _)| w == word) {
                Some((_, n)) => *n += 1,
                None => counts.push((word.clone(), 1)),
            }
        }
        if let Some((word, n)) = counts.iter().max_by_key(|(_, n)| *n) {
            if *n > 1 {
                return Some(word.clone());
            }
        }
    }

    per_member.first().and_then(|words| words.last().cloned())
}

/// Derive a label for a session from its type and member contents.
pub fn derive(session_type: SessionType, member_contents: &[String]) -> String {
    let noun = session_type.label_noun();
    match shared_qualifier(member_contents) {
        Some(qualifier) => format!("{noun} — {qualifier}"),
        None => noun.to_owned(),
    }
}

/// Whether a freshly derived label should replace the current one.
///
/// Only an unqualified label gets upgraded; an established qualifier is
/// kept even when later members would suggest another.
pub fn should_relabel(current: &str, derived: &str) -> bool {
    !current.contains('—') && derived.contains('—')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hotel_session_labeled_by_city() {
        let members = vec![
            "Hilton Toronto Downtown".to_string(),
            "The Ritz-Carlton, Toronto".to_string(),
            "Shangri-La Hotel Toronto".to_string(),
        ];
        assert_eq!(
            derive(SessionType::HotelResearch, &members),
            "Hotel Research — Toronto"
        );
    }

    #[test]
    fn single_member_uses_its_last_qualifier() {
        let members = vec!["Hilton Toronto Downtown".to_string()];
        assert_eq!(
            derive(SessionType::HotelResearch, &members),
            "Hotel Research — Toronto"
        );
    }

    #[test]
    fn no_proper_names_falls_back_to_noun() {
        let members = vec!["how to make pancakes".to_string()];
        assert_eq!(derive(SessionType::GeneralResearch, &members), "General Research");
    }

    #[test]
    fn relabel_only_upgrades_unqualified_labels() {
        assert!(should_relabel("Hotel Research", "Hotel Research — Toronto"));
        assert!(!should_relabel(
            "Hotel Research — Toronto",
            "Hotel Research — Paris"
        ));
        assert!(!should_relabel("General Research", "General Research"));
    }
}
