//! Memory context retrieval for a turn

use std::collections::HashSet;

use futures::future::join_all;

use super::analysis::AgentAnalysis;
use crate::db::{MemoryRecord, MemoryStore};

/// Keywords searched per turn
pub const MAX_KEYWORDS: usize = 5;

/// Records kept per turn
pub const MAX_RECORDS: usize = 5;

/// Filler words too common to be worth a search
const STOPWORDS: &[&str] = &[
    "that", "this", "with", "have", "what", "your", "about", "there", "would", "could", "should",
    "just", "like", "from", "they", "them", "then", "than", "when", "where", "will", "want",
    "know", "it's", "i'm", "you're", "does", "were", "been", "some", "very", "really", "okay",
];

/// Up to five distinct search keywords (longer than three characters) from
/// the utterance and its entities
#[must_use]
pub fn search_keywords(analysis: &AgentAnalysis) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    let candidates = analysis
        .entities
        .iter()
        .map(String::as_str)
        .chain(analysis.text.split_whitespace());

    for raw in candidates {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'');
        let lower = word.to_lowercase();
        if word.chars().count() <= 3 || STOPWORDS.contains(&lower.as_str()) {
            continue;
        }
        if seen.insert(lower) {
            keywords.push(word.to_string());
            if keywords.len() == MAX_KEYWORDS {
                break;
            }
        }
    }

    keywords
}

/// Search the store for each keyword concurrently
///
/// A failing keyword search is logged and skipped. Results are deduplicated
/// by id, ordered by importance and capped at [`MAX_RECORDS`].
pub async fn gather_memory(store: &dyn MemoryStore, analysis: &AgentAnalysis) -> Vec<MemoryRecord> {
    if !analysis.needs_memory {
        return Vec::new();
    }

    let keywords = search_keywords(analysis);
    if keywords.is_empty() {
        return Vec::new();
    }

    let results = join_all(keywords.iter().map(|kw| store.search(kw))).await;

    let mut seen = HashSet::new();
    let mut records: Vec<MemoryRecord> = Vec::new();
    for (keyword, result) in keywords.iter().zip(results) {
        match result {
            Ok(found) => {
                for record in found {
                    if seen.insert(record.id.clone()) {
                        records.push(record);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(keyword = %keyword, error = %e, "memory search failed, skipping keyword");
            }
        }
    }

    // Stable sort keeps search order among equal importance
    records.sort_by(|a, b| b.importance.cmp(&a.importance));
    records.truncate(MAX_RECORDS);
    records
}
