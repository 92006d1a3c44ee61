//! Menu deduplicator
//!
//! Overlapping image bands show strains at band edges twice, and repeated
//! extraction passes can return the same strain again. Merging keys every
//! candidate by its normalized name.
//!
//! Conflict rule: the candidate with more populated fields (category, THC
//! range, price) wins; ties keep the first-seen record. Output keeps
//! first-seen menu order.

use crate::types::ExtractionCandidate;
use std::collections::HashMap;
use tracing::debug;

/// Dedup key: lowercase, trimmed, internal whitespace collapsed
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Flatten and deduplicate candidate lists
pub fn merge<I>(lists: I) -> Vec<ExtractionCandidate>
where
    I: IntoIterator<Item = Vec<ExtractionCandidate>>,
{
    let mut merged: Vec<ExtractionCandidate> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();
    let mut seen = 0usize;

    for candidate in lists.into_iter().flatten() {
        seen += 1;
        let key = normalize_name(&candidate.name);
        if key.is_empty() {
            continue;
        }

        match index_by_key.get(&key) {
            Some(&index) => {
                if candidate.populated_fields() > merged[index].populated_fields() {
                    debug!(name = %candidate.name, "Replacing duplicate with richer record");
                    merged[index] = candidate;
                }
            }
            None => {
                index_by_key.insert(key, merged.len());
                merged.push(candidate);
            }
        }
    }

    debug!(seen, unique = merged.len(), "Merged extraction candidates");
    merged
}
