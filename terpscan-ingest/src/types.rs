//! Core types and trait definitions for terpscan-ingest
//!
//! - **Data model:** `ExtractionCandidate`, `Strain`, `SimilarityResult`
//! - **Seams:** `VisionModel`, `TextModel`, `ChemicalProfileSource`
//!
//! Everything that talks to the network sits behind one of the traits so the
//! pipeline runs against in-memory fakes in tests.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use terpscan_common::{Terpene, TerpeneProfile};
use thiserror::Error;

// ============================================================================
// Strain classification
// ============================================================================

/// Strain category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrainType {
    Indica,
    Sativa,
    Hybrid,
    #[default]
    Unknown,
}

impl StrainType {
    /// Lenient, case-insensitive parse
    ///
    /// Dominance phrases ("indica-dominant", "sativa dom hybrid") are hybrids.
    pub fn parse(text: &str) -> StrainType {
        let lower = text.trim().to_lowercase();
        if lower.contains("hybrid") || lower.contains("dominant") || lower.contains(" dom") {
            StrainType::Hybrid
        } else if lower.contains("indica") {
            StrainType::Indica
        } else if lower.contains("sativa") {
            StrainType::Sativa
        } else {
            StrainType::Unknown
        }
    }

    /// Lowercase label ("indica", "sativa", "hybrid", "unknown")
    pub fn label(self) -> &'static str {
        match self {
            StrainType::Indica => "indica",
            StrainType::Sativa => "sativa",
            StrainType::Hybrid => "hybrid",
            StrainType::Unknown => "unknown",
        }
    }

    pub fn is_known(self) -> bool {
        self != StrainType::Unknown
    }
}

/// Percentage range (THC / CBD), inclusive bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentRange {
    pub min: f64,
    pub max: f64,
}

impl PercentRange {
    /// Range with ordered bounds
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Parse `"18-24%"`, `"22%"`, `"THC 21.5%"`, `"18 to 24"`
    ///
    /// Only the first two numbers count; anything outside [0, 100] is rejected.
    pub fn parse(text: &str) -> Option<PercentRange> {
        static NUMBER: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("static regex"));

        let numbers: Vec<f64> = NUMBER
            .find_iter(text)
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .take(2)
            .collect();

        let range = match numbers.as_slice() {
            [single] => PercentRange::new(*single, *single),
            [a, b] => PercentRange::new(*a, *b),
            _ => return None,
        };
        range.is_valid().then_some(range)
    }

    /// Build from a JSON value (number, string or `{min, max}` object)
    pub fn from_json(value: &serde_json::Value) -> Option<PercentRange> {
        match value {
            serde_json::Value::Number(n) => {
                let v = n.as_f64()?;
                let range = PercentRange::new(v, v);
                range.is_valid().then_some(range)
            }
            serde_json::Value::String(s) => PercentRange::parse(s),
            serde_json::Value::Object(map) => {
                let min = map.get("min").and_then(|v| v.as_f64());
                let max = map.get("max").and_then(|v| v.as_f64());
                let range = match (min, max) {
                    (Some(a), Some(b)) => PercentRange::new(a, b),
                    (Some(v), None) | (None, Some(v)) => PercentRange::new(v, v),
                    (None, None) => return None,
                };
                range.is_valid().then_some(range)
            }
            _ => None,
        }
    }

    fn is_valid(&self) -> bool {
        self.min.is_finite() && self.min >= 0.0 && self.max <= 100.0
    }
}

// ============================================================================
// Extraction output
// ============================================================================

/// Raw strain record recovered from a model response
///
/// Transient: lives between extraction and resolution only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExtractionCandidate {
    pub name: String,
    pub strain_type: Option<StrainType>,
    pub thc: Option<PercentRange>,
    pub cbd: Option<PercentRange>,
    pub price: Option<String>,
    pub description: Option<String>,
    /// "flower", "vape", "edible", ... when the menu says
    pub product_type: Option<String>,
}

impl ExtractionCandidate {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Number of populated dedup-relevant fields (category, THC, price)
    pub fn populated_fields(&self) -> usize {
        let has_type = self.strain_type.map(|t| t.is_known()).unwrap_or(false);
        [has_type, self.thc.is_some(), self.price.is_some()]
            .iter()
            .filter(|present| **present)
            .count()
    }

    /// Flower unless the menu labels it as some other product
    pub fn is_flower(&self) -> bool {
        match &self.product_type {
            None => true,
            Some(kind) => {
                let kind = kind.to_lowercase();
                kind.trim().is_empty() || kind.contains("flower") || kind.contains("bud")
            }
        }
    }
}

// ============================================================================
// Resolved strain
// ============================================================================

/// Where a strain's terpene vector came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerpeneSource {
    /// Bundled or configured reference set
    LocalReference,
    /// External chemical-profile database
    ChemicalDatabase,
    /// Text-model estimate
    ModelEstimate,
    /// Every source missed; vector is all zero
    Unresolved,
    /// Straight from extraction, not yet resolved
    Extraction,
}

/// A named strain with its 11-dimensional terpene vector
///
/// Resolution never mutates a strain in place; it produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strain {
    pub name: String,
    pub strain_type: StrainType,
    pub thc: Option<PercentRange>,
    pub cbd: Option<PercentRange>,
    pub price: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub effects: Vec<String>,
    #[serde(default)]
    pub flavors: Vec<String>,
    pub terpenes: TerpeneProfile,
    pub terpene_source: TerpeneSource,
}

impl Strain {
    /// Partial strain straight from extraction (terpenes all zero)
    pub fn from_candidate(candidate: &ExtractionCandidate) -> Self {
        Self {
            name: candidate.name.trim().to_string(),
            strain_type: candidate.strain_type.unwrap_or_default(),
            thc: candidate.thc,
            cbd: candidate.cbd,
            price: candidate.price.clone(),
            description: candidate.description.clone(),
            effects: Vec::new(),
            flavors: Vec::new(),
            terpenes: TerpeneProfile::zeros(),
            terpene_source: TerpeneSource::Extraction,
        }
    }

    /// Copy with a resolved terpene vector
    pub fn with_terpenes(&self, terpenes: TerpeneProfile, source: TerpeneSource) -> Self {
        Self {
            terpenes,
            terpene_source: source,
            ..self.clone()
        }
    }
}

// ============================================================================
// Scoring output
// ============================================================================

/// Human-readable label for an overall similarity score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchRating {
    #[serde(rename = "Very Different")]
    VeryDifferent,
    #[serde(rename = "Poor Match")]
    Poor,
    #[serde(rename = "Moderate Match")]
    Moderate,
    #[serde(rename = "Good Match")]
    Good,
    #[serde(rename = "Very Good Match")]
    VeryGood,
    #[serde(rename = "Excellent Match")]
    Excellent,
    #[serde(rename = "Perfect Match")]
    Perfect,
}

impl MatchRating {
    pub fn from_score(score: f64) -> MatchRating {
        match score {
            s if s >= 0.9 => MatchRating::Perfect,
            s if s >= 0.8 => MatchRating::Excellent,
            s if s >= 0.7 => MatchRating::VeryGood,
            s if s >= 0.6 => MatchRating::Good,
            s if s >= 0.5 => MatchRating::Moderate,
            s if s >= 0.3 => MatchRating::Poor,
            _ => MatchRating::VeryDifferent,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MatchRating::Perfect => "Perfect Match",
            MatchRating::Excellent => "Excellent Match",
            MatchRating::VeryGood => "Very Good Match",
            MatchRating::Good => "Good Match",
            MatchRating::Moderate => "Moderate Match",
            MatchRating::Poor => "Poor Match",
            MatchRating::VeryDifferent => "Very Different",
        }
    }
}

/// Per-terpene gap between a candidate and the ideal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerpeneDifference {
    pub terpene: Terpene,
    pub candidate: f64,
    pub ideal: f64,
    /// candidate − ideal
    pub difference: f64,
}

/// A strain scored against an ideal profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub strain: Strain,
    /// Weighted blend, in [0, 1]
    pub overall: f64,
    pub cosine: f64,
    pub euclidean: f64,
    pub pearson: f64,
    pub match_rating: MatchRating,
    /// Sorted by |difference| descending
    pub differences: Vec<TerpeneDifference>,
}

// ============================================================================
// Model seams
// ============================================================================

/// One image (or vertical band of one) ready to send to a vision model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSegment {
    /// Encoded image bytes
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`
    pub mime_type: String,
    /// First source row covered by this segment
    pub offset_y: u32,
    /// Rows covered
    pub height: u32,
}

/// Failure calling a vision or text model
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelCallError {
    /// Transport failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Success status but no content
    #[error("Model returned an empty response")]
    EmptyResponse,

    /// Response envelope did not match the chat-completions shape
    #[error("Malformed response envelope: {0}")]
    Malformed(String),
}

/// Vision-capable language model
#[async_trait::async_trait]
pub trait VisionModel: Send + Sync {
    /// Send one image segment with an instruction, return the raw text answer
    async fn describe_image(
        &self,
        segment: &ImageSegment,
        instruction: &str,
    ) -> Result<String, ModelCallError>;
}

/// Text-only language model
#[async_trait::async_trait]
pub trait TextModel: Send + Sync {
    /// Single-turn completion
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, ModelCallError>;
}

// ============================================================================
// Chemical profile seam
// ============================================================================

/// One strain record from a chemical-profile database
#[derive(Debug, Clone, PartialEq)]
pub struct ChemicalRecord {
    pub name: String,
    pub terpenes: TerpeneProfile,
    pub strain_type: Option<StrainType>,
    pub thc: Option<PercentRange>,
    pub cbd: Option<PercentRange>,
    pub description: Option<String>,
    pub effects: Vec<String>,
    pub flavors: Vec<String>,
}

/// Failure querying a chemical-profile database
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// External chemical-profile lookup by strain name
#[async_trait::async_trait]
pub trait ChemicalProfileSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &'static str;

    /// Zero or one matching record
    async fn lookup(&self, strain_name: &str) -> Result<Option<ChemicalRecord>, LookupError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strain_type_parse() {
        assert_eq!(StrainType::parse("INDICA"), StrainType::Indica);
        assert_eq!(StrainType::parse(" sativa "), StrainType::Sativa);
        assert_eq!(StrainType::parse("Hybrid"), StrainType::Hybrid);
        assert_eq!(StrainType::parse("Indica-Dominant Hybrid"), StrainType::Hybrid);
        assert_eq!(StrainType::parse("sativa dominant"), StrainType::Hybrid);
        assert_eq!(StrainType::parse("CBD"), StrainType::Unknown);
        assert_eq!(StrainType::parse(""), StrainType::Unknown);
    }

    #[test]
    fn test_percent_range_parse() {
        assert_eq!(PercentRange::parse("18-24%"), Some(PercentRange::new(18.0, 24.0)));
        assert_eq!(PercentRange::parse("22%"), Some(PercentRange::new(22.0, 22.0)));
        assert_eq!(PercentRange::parse("THC 21.5%"), Some(PercentRange::new(21.5, 21.5)));
        assert_eq!(PercentRange::parse("24 - 18"), Some(PercentRange::new(18.0, 24.0)));
        assert_eq!(PercentRange::parse("n/a"), None);
        assert_eq!(PercentRange::parse("250 mg"), None);
    }

    #[test]
    fn test_percent_range_from_json() {
        assert_eq!(
            PercentRange::from_json(&serde_json::json!(19.5)),
            Some(PercentRange::new(19.5, 19.5))
        );
        assert_eq!(
            PercentRange::from_json(&serde_json::json!({"min": 20, "max": 26})),
            Some(PercentRange::new(20.0, 26.0))
        );
        assert_eq!(PercentRange::from_json(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_populated_fields() {
        let mut candidate = ExtractionCandidate::named("Blue Dream");
        assert_eq!(candidate.populated_fields(), 0);

        candidate.strain_type = Some(StrainType::Unknown);
        assert_eq!(candidate.populated_fields(), 0);

        candidate.strain_type = Some(StrainType::Hybrid);
        candidate.price = Some("$40".to_string());
        assert_eq!(candidate.populated_fields(), 2);
    }

    #[test]
    fn test_is_flower() {
        let mut candidate = ExtractionCandidate::named("Gelato");
        assert!(candidate.is_flower());

        candidate.product_type = Some("Flower - 3.5g".to_string());
        assert!(candidate.is_flower());

        candidate.product_type = Some("Top Shelf Buds".to_string());
        assert!(candidate.is_flower());

        candidate.product_type = Some("Vape Cartridge".to_string());
        assert!(!candidate.is_flower());

        candidate.product_type = Some("edible".to_string());
        assert!(!candidate.is_flower());
    }

    #[test]
    fn test_with_terpenes_produces_new_value() {
        let candidate = ExtractionCandidate {
            strain_type: Some(StrainType::Hybrid),
            ..ExtractionCandidate::named(" Blue Dream ")
        };
        let partial = Strain::from_candidate(&candidate);
        assert_eq!(partial.name, "Blue Dream");
        assert!(partial.terpenes.is_zero());
        assert_eq!(partial.terpene_source, TerpeneSource::Extraction);

        let profile = TerpeneProfile::zeros().with(Terpene::Myrcene, 0.55);
        let resolved = partial.with_terpenes(profile, TerpeneSource::LocalReference);
        assert_eq!(resolved.terpenes.get(Terpene::Myrcene), 0.55);
        assert!(partial.terpenes.is_zero());
        assert_eq!(resolved.strain_type, StrainType::Hybrid);
    }

    #[test]
    fn test_match_rating_thresholds() {
        assert_eq!(MatchRating::from_score(0.95), MatchRating::Perfect);
        assert_eq!(MatchRating::from_score(0.9), MatchRating::Perfect);
        assert_eq!(MatchRating::from_score(0.85), MatchRating::Excellent);
        assert_eq!(MatchRating::from_score(0.72), MatchRating::VeryGood);
        assert_eq!(MatchRating::from_score(0.6), MatchRating::Good);
        assert_eq!(MatchRating::from_score(0.55), MatchRating::Moderate);
        assert_eq!(MatchRating::from_score(0.3), MatchRating::Poor);
        assert_eq!(MatchRating::from_score(0.1), MatchRating::VeryDifferent);
        assert_eq!(MatchRating::Good.label(), "Good Match");
    }
}
