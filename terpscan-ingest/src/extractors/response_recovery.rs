//! Layered recovery of strain records from free-text model output
//!
//! Models are asked for strict JSON but regularly return prose around it,
//! code fences, or an answer cut off at the token limit mid-object. Each
//! stage below is less informative than the previous one and more likely to
//! succeed:
//!
//! 1. Full JSON (`{"strains": [...]}`, a bare array, or a single object)
//! 2. Name + category pairs pulled from object fragments by pattern
//! 3. Bare name strings
//!
//! The fourth stage (a text-model cleanup pass) needs a model call and lives
//! in [`super::vision_extractor`].

use crate::types::{ExtractionCandidate, PercentRange, StrainType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Which recovery stage produced the candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    FullJson,
    NameCategoryPairs,
    BareNames,
    ModelCleanup,
}

/// Candidates recovered from one response
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub candidates: Vec<ExtractionCandidate>,
    pub strategy: RecoveryStrategy,
}

/// Run stages 1-3 in order
///
/// `None` means no structural stage found anything; the caller decides
/// whether to try a cleanup pass. A well-formed JSON answer with an empty
/// list is a successful stage 1 with zero candidates.
pub fn recover_structured(response: &str) -> Option<Recovered> {
    let text = strip_code_fences(response);

    if let Some(candidates) = parse_full_json(&text) {
        debug!(count = candidates.len(), "Recovered candidates from full JSON");
        return Some(Recovered {
            candidates,
            strategy: RecoveryStrategy::FullJson,
        });
    }

    let pairs = parse_name_category_pairs(&text);
    if pairs.iter().any(|c| c.strain_type.is_some()) {
        debug!(count = pairs.len(), "Recovered name/category pairs from partial JSON");
        return Some(Recovered {
            candidates: pairs,
            strategy: RecoveryStrategy::NameCategoryPairs,
        });
    }

    let names = parse_bare_names(&text);
    if !names.is_empty() {
        debug!(count = names.len(), "Recovered bare strain names");
        return Some(Recovered {
            candidates: names,
            strategy: RecoveryStrategy::BareNames,
        });
    }

    None
}

/// Parse the answer of a cleanup pass
///
/// Accepts anything [`recover_structured`] accepts, then falls back to
/// list items (`- Name`, `2. Name`). Unmarked prose is never a name.
pub fn parse_cleanup_response(response: &str) -> Vec<ExtractionCandidate> {
    if let Some(recovered) = recover_structured(response) {
        return recovered.candidates;
    }

    strip_code_fences(response)
        .lines()
        .filter(|line| LIST_MARKER.is_match(line))
        .map(|line| {
            LIST_MARKER
                .replace(line, "")
                .trim()
                .trim_matches('"')
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty() && line.chars().count() <= 60)
        .filter(|line| !line.ends_with(':') && !line.contains('{') && !line.contains('}'))
        .map(ExtractionCandidate::named)
        .collect()
}

// ============================================================================
// Stage 1: full JSON
// ============================================================================

fn parse_full_json(text: &str) -> Option<Vec<ExtractionCandidate>> {
    let value = serde_json::from_str::<Value>(text.trim())
        .ok()
        .or_else(|| outer_json_block(text).and_then(|block| serde_json::from_str(block).ok()))?;

    let items: Vec<&Value> = match &value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => {
            match ["strains", "products", "items", "menu"]
                .iter()
                .find_map(|key| map.get(*key).and_then(|v| v.as_array()))
            {
                Some(items) => items.iter().collect(),
                None if map.contains_key("name") => vec![&value],
                None => return None,
            }
        }
        _ => return None,
    };

    Some(items.into_iter().filter_map(candidate_from_json).collect())
}

/// Build a candidate from one JSON object, tolerating key variants
pub fn candidate_from_json(value: &Value) -> Option<ExtractionCandidate> {
    let map = value.as_object()?;
    let text_field = |keys: &[&str]| -> Option<String> {
        keys.iter().find_map(|k| match map.get(*k) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    };
    let range_field = |keys: &[&str]| -> Option<PercentRange> {
        keys.iter()
            .find_map(|k| map.get(*k).and_then(PercentRange::from_json))
    };

    let name = text_field(&["name", "strain_name", "strain"])?;

    Some(ExtractionCandidate {
        name,
        strain_type: text_field(&["type", "category", "strain_type"])
            .map(|t| StrainType::parse(&t)),
        thc: range_field(&["thc", "thc_range", "thc_percent"]),
        cbd: range_field(&["cbd", "cbd_range", "cbd_percent"]),
        price: text_field(&["price"]),
        description: text_field(&["description"]),
        product_type: text_field(&["product_type", "product", "form"]),
    })
}

// ============================================================================
// Stages 2 and 3: pattern matching over partial JSON
// ============================================================================

static NAME_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:name|strain_name|strain)"\s*:\s*"((?:[^"\\]|\\.)+)""#).expect("static regex")
});

static CATEGORY_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:type|category|strain_type)"\s*:\s*"((?:[^"\\]|\\.)+)""#)
        .expect("static regex")
});

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").expect("static regex"));

/// One candidate per named fragment; a missing or null category stays `None`
fn parse_name_category_pairs(text: &str) -> Vec<ExtractionCandidate> {
    text.split('{')
        .filter_map(|fragment| {
            let name = unescape(NAME_FIELD.captures(fragment)?.get(1)?.as_str());
            if name.trim().is_empty() {
                return None;
            }
            let category = CATEGORY_FIELD
                .captures(fragment)
                .and_then(|caps| caps.get(1))
                .map(|m| StrainType::parse(m.as_str()));
            Some(ExtractionCandidate {
                strain_type: category,
                ..ExtractionCandidate::named(name)
            })
        })
        .collect()
}

fn parse_bare_names(text: &str) -> Vec<ExtractionCandidate> {
    NAME_FIELD
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| unescape(m.as_str()))
        .filter(|name| !name.trim().is_empty())
        .map(ExtractionCandidate::named)
        .collect()
}

fn unescape(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string())
}

// ============================================================================
// Text helpers (shared with the terpene estimator)
// ============================================================================

/// Remove Markdown code fence lines (```json ... ```)
pub fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Slice from the first `{`/`[` to the last matching closer
fn outer_json_block(text: &str) -> Option<&str> {
    let start = text.find(|c| c == '{' || c == '[')?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

/// First balanced `{...}` object, skipping braces inside strings
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
