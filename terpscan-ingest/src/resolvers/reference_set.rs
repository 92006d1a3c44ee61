//! Local reference set of curated strains
//!
//! Read-only after construction and injected into the resolver as an
//! `Arc<ReferenceSet>`; there is no global instance. The bundled set ships
//! inside the binary; a JSON file with the same shape can replace it.
//!
//! Lookup is exact on the normalized name first, then the closest entry by
//! Levenshtein distance within `max(3, floor(0.4 × query length))`.

use crate::fusion::normalize_name;
use crate::types::{PercentRange, StrainType};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use terpscan_common::{Error, Result, TerpeneProfile};
use tracing::{debug, info, warn};

/// Bundled reference data
const BUNDLED_JSON: &str = include_str!("../../data/reference_strains.json");

/// Queries shorter than this only match exactly
const MIN_FUZZY_QUERY_CHARS: usize = 3;

#[derive(Debug, Deserialize)]
struct ReferenceFile {
    strains: Vec<ReferenceRecord>,
}

#[derive(Debug, Deserialize)]
struct ReferenceRecord {
    name: String,
    #[serde(rename = "type", default)]
    strain_type: Option<String>,
    #[serde(default)]
    thc: Option<String>,
    #[serde(default)]
    cbd: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    effects: Vec<String>,
    #[serde(default)]
    flavors: Vec<String>,
    terpenes: TerpeneProfile,
}

/// One curated strain
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceStrain {
    pub name: String,
    pub strain_type: StrainType,
    pub thc: Option<PercentRange>,
    pub cbd: Option<PercentRange>,
    pub description: Option<String>,
    pub effects: Vec<String>,
    pub flavors: Vec<String>,
    pub terpenes: TerpeneProfile,
}

/// A lookup hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceMatch<'a> {
    pub strain: &'a ReferenceStrain,
    /// Edit distance between normalized names (0 for exact hits)
    pub distance: usize,
}

/// Curated strains keyed by normalized name
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    entries: BTreeMap<String, ReferenceStrain>,
}

impl ReferenceSet {
    /// The reference set compiled into the binary
    pub fn bundled() -> Result<Self> {
        Self::from_json_str(BUNDLED_JSON)
    }

    /// Load a reference set from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read reference set {} failed: {}", path.display(), e))
        })?;
        let set = Self::from_json_str(&content)?;
        info!(path = %path.display(), strains = set.len(), "Loaded reference set");
        Ok(set)
    }

    /// Parse `{"strains": [...]}` JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: ReferenceFile = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("Invalid reference set JSON: {}", e)))?;

        let mut entries = BTreeMap::new();
        for record in file.strains {
            let key = normalize_name(&record.name);
            if key.is_empty() || record.terpenes.is_zero() {
                warn!(name = %record.name, "Skipping reference entry without name or terpenes");
                continue;
            }
            let strain = ReferenceStrain {
                name: record.name,
                strain_type: record
                    .strain_type
                    .as_deref()
                    .map(StrainType::parse)
                    .unwrap_or_default(),
                thc: record.thc.as_deref().and_then(PercentRange::parse),
                cbd: record.cbd.as_deref().and_then(PercentRange::parse),
                description: record.description,
                effects: record.effects,
                flavors: record.flavors,
                terpenes: record.terpenes,
            };
            if entries.insert(key, strain).is_some() {
                warn!("Duplicate reference entry, keeping the later one");
            }
        }

        Ok(Self { entries })
    }

    /// Build directly from strains (fixtures, custom sets)
    pub fn from_strains<I: IntoIterator<Item = ReferenceStrain>>(strains: I) -> Self {
        let entries = strains
            .into_iter()
            .map(|s| (normalize_name(&s.name), s))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Display names in normalized-name order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|s| s.name.as_str())
    }

    /// Exact or fuzzy lookup by strain name
    pub fn lookup(&self, name: &str) -> Option<ReferenceMatch<'_>> {
        let query = normalize_name(name);
        if query.is_empty() {
            return None;
        }

        if let Some(strain) = self.entries.get(&query) {
            return Some(ReferenceMatch { strain, distance: 0 });
        }

        let query_chars = query.chars().count();
        if query_chars < MIN_FUZZY_QUERY_CHARS {
            return None;
        }
        let threshold = fuzzy_threshold(query_chars);

        let mut best: Option<ReferenceMatch<'_>> = None;
        for (key, strain) in &self.entries {
            let distance = strsim::levenshtein(&query, key);
            if distance > threshold {
                continue;
            }
            // strict < keeps the first entry in sorted order on ties
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(ReferenceMatch { strain, distance });
            }
        }

        if let Some(hit) = &best {
            debug!(
                query = %name,
                matched = %hit.strain.name,
                distance = hit.distance,
                "Fuzzy reference match"
            );
        }
        best
    }
}

/// Maximum edit distance accepted for a query of `query_chars` characters
pub fn fuzzy_threshold(query_chars: usize) -> usize {
    // floor(0.4 × n) == 2n / 5 in integer arithmetic
    (query_chars * 2 / 5).max(3)
}
