//! Text-model terpene estimation
//!
//! Last step of the resolution chain: ask the text model for a typical
//! profile of the named strain. The answer is approximate by nature and is
//! tagged `TerpeneSource::ModelEstimate` downstream.

use crate::extractors::response_recovery::{first_balanced_object, strip_code_fences};
use crate::types::{ModelCallError, StrainType, TextModel};
use serde_json::Value;
use std::sync::Arc;
use terpscan_common::TerpeneProfile;
use tracing::debug;

/// Sampling temperature for estimates
pub const ESTIMATE_TEMPERATURE: f32 = 0.2;

const ESTIMATE_SYSTEM_PROMPT: &str = "You are a cannabis chemistry reference. \
Given a strain name, return the typical terpene profile of that strain as ONE JSON object and nothing else. \
Use exactly these keys with decimal values between 0 and 1: \
myrcene, limonene, caryophyllene, pinene, linalool, humulene, terpinolene, ocimene, nerolidol, bisabolol, eucalyptol.\n\
Realistic ranges:\n\
- Major: myrcene (0.1-0.8), limonene (0.05-0.6), caryophyllene (0.05-0.5), pinene (0.05-0.4), linalool (0.02-0.3)\n\
- Minor: humulene (0.001-0.2), terpinolene (0.001-0.15), ocimene (0.001-0.1), nerolidol (0.0001-0.05), \
bisabolol (0.0001-0.05), eucalyptol (0.0001-0.03)";

/// Estimates terpene profiles with a text model
pub struct ModelEstimator {
    text: Arc<dyn TextModel>,
}

impl ModelEstimator {
    pub fn new(text: Arc<dyn TextModel>) -> Self {
        Self { text }
    }

    /// Estimate a profile; `Ok(None)` when the answer holds no usable values
    pub async fn estimate(
        &self,
        strain_name: &str,
        strain_type: StrainType,
    ) -> Result<Option<TerpeneProfile>, ModelCallError> {
        let user = match strain_type {
            StrainType::Unknown => format!("Strain: {}", strain_name),
            known => format!("Strain: {} (category: {})", strain_name, known.label()),
        };

        let raw = self
            .text
            .complete(ESTIMATE_SYSTEM_PROMPT, &user, ESTIMATE_TEMPERATURE)
            .await?;

        let estimate = parse_estimate(&raw);
        if estimate.is_none() {
            debug!(strain = %strain_name, chars = raw.len(), "Unusable terpene estimate");
        }
        Ok(estimate)
    }
}

/// Parse a model estimate into a unit-clamped profile
///
/// Takes the first balanced `{...}` object (a nested `"terpenes"` object
/// wins), accepts numbers or numeric strings, and rejects all-zero results.
pub fn parse_estimate(raw: &str) -> Option<TerpeneProfile> {
    let text = strip_code_fences(raw);
    let object: Value = serde_json::from_str(first_balanced_object(&text)?).ok()?;

    let map = object
        .get("terpenes")
        .and_then(Value::as_object)
        .or_else(|| object.as_object())?;

    let profile = TerpeneProfile::from_pairs(map.iter().filter_map(|(key, value)| {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
            _ => None,
        };
        number.map(|v| (key.as_str(), v))
    }))
    .clamped_unit();

    (!profile.is_zero()).then_some(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use terpscan_common::Terpene;

    struct RecordingText {
        answer: String,
        last_user: Mutex<Option<String>>,
    }

    #[async_trait]
    impl TextModel for RecordingText {
        async fn complete(
            &self,
            _system: &str,
            user: &str,
            temperature: f32,
        ) -> Result<String, ModelCallError> {
            assert_eq!(temperature, ESTIMATE_TEMPERATURE);
            *self.last_user.lock().unwrap() = Some(user.to_string());
            Ok(self.answer.clone())
        }
    }

    #[test]
    fn test_parse_plain_object() {
        let raw = r#"{"myrcene": 0.45, "limonene": "0.3", "pinene": 1.7, "linalool": -0.2}"#;
        let profile = parse_estimate(raw).unwrap();
        assert_eq!(profile.get(Terpene::Myrcene), 0.45);
        assert_eq!(profile.get(Terpene::Limonene), 0.3);
        assert_eq!(profile.get(Terpene::Pinene), 1.0);
        assert_eq!(profile.get(Terpene::Linalool), 0.0);
    }

    #[test]
    fn test_parse_fenced_nested_object_with_prose() {
        let raw = "Here you go:\n```json\n{\"terpenes\": {\"myrcene\": 0.6, \"caryophyllene\": 0.2}, \"type\": \"indica\"}\n```";
        let profile = parse_estimate(raw).unwrap();
        assert_eq!(profile.get(Terpene::Myrcene), 0.6);
        assert_eq!(profile.get(Terpene::Caryophyllene), 0.2);
    }

    #[test]
    fn test_all_zero_is_no_estimate() {
        assert!(parse_estimate(r#"{"myrcene": 0, "limonene": 0}"#).is_none());
        assert!(parse_estimate("no idea").is_none());
        assert!(parse_estimate("{\"myrcene\": 0.4").is_none());
    }

    #[tokio::test]
    async fn test_estimate_includes_category() {
        let text = Arc::new(RecordingText {
            answer: r#"{"limonene": 0.5}"#.to_string(),
            last_user: Mutex::new(None),
        });
        let estimator = ModelEstimator::new(text.clone());

        let profile = estimator.estimate("Lemon Haze", StrainType::Sativa).await.unwrap().unwrap();
        assert_eq!(profile.get(Terpene::Limonene), 0.5);

        let user = text.last_user.lock().unwrap().clone().unwrap();
        assert!(user.contains("Lemon Haze"));
        assert!(user.contains("sativa"));
    }
}
