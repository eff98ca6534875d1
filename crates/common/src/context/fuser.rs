//! Rendering of structured and semantic results into one context block

use super::prompt::CONTEXT_PLACEHOLDER;
use crate::dataset::CityRecord;
use crate::vector_store::RetrievedSnippet;
use std::fmt;

/// Rendered in place of the structured section when no city matched
pub const NO_MATCH_SENTENCE: &str =
    "No specific match was found in the city dataset for this query.";

/// Rendered in place of the snippet list when retrieval returned nothing
pub const NO_SNIPPETS_SENTENCE: &str = "No snippets were retrieved for this query.";

const STRUCTURED_HEADER: &str = "Structured data:";
const RETRIEVED_HEADER: &str = "Retrieved context:";
const SNIPPET_DELIMITER: &str = "\n---\n";

/// The context block handed to the prompt composer; never empty and never
/// contains [`CONTEXT_PLACEHOLDER`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusedContext(String);

impl FusedContext {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for FusedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Merge the best city and the retrieved snippets into a fixed two-section layout
pub fn fuse(best_city: Option<&CityRecord>, snippets: &[RetrievedSnippet]) -> FusedContext {
    let structured = match best_city {
        Some(city) => summarize_city(city),
        None => NO_MATCH_SENTENCE.to_string(),
    };

    let retrieved = if snippets.is_empty() {
        NO_SNIPPETS_SENTENCE.to_string()
    } else {
        snippets
            .iter()
            .map(|s| format!("[from {}]: {}", s.source_label, s.text))
            .collect::<Vec<_>>()
            .join(SNIPPET_DELIMITER)
    };

    let rendered = format!(
        "{} {}\n\n{}\n{}",
        STRUCTURED_HEADER, structured, RETRIEVED_HEADER, retrieved
    );
    FusedContext(neutralize_placeholder(rendered))
}

/// Rewrite `{{CONTEXT}}` as `{CONTEXT}` until no placeholder is left.
/// Each pass shortens the text, so nested braces terminate.
fn neutralize_placeholder(mut text: String) -> String {
    let escaped = &CONTEXT_PLACEHOLDER[1..CONTEXT_PLACEHOLDER.len() - 1];
    while text.contains(CONTEXT_PLACEHOLDER) {
        text = text.replace(CONTEXT_PLACEHOLDER, escaped);
    }
    text
}

fn summarize_city(city: &CityRecord) -> String {
    let places = if city.places.is_empty() {
        "none listed".to_string()
    } else {
        city.places
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "{} ({}). Average lodging cost: {} per night. Average food cost: {} per day. \
         Notable places: {}.",
        city.name, city.region, city.average_lodging_cost, city.average_food_cost, places
    )
}
