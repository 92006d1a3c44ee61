//! Cannlytics strain-data client
//!
//! Second step of the terpene resolution chain. Queries a Cannlytics-style
//! strain API by name and maps the lab fields onto the 11-terpene schema.
//!
//! # API
//! - `GET {base}/{slug}`: single strain, `{"success": bool, "data": {...}}`
//! - `GET {base}?limit=100`: strain list, `{"success": bool, "data": [...]}`
//!
//! Matching on the list is word/substring based only; edit-distance fuzzing
//! is reserved for the local reference set.
//!
//! Rate limited with governor (default 2 requests/second).

use crate::types::{ChemicalProfileSource, ChemicalRecord, LookupError, PercentRange, StrainType};
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use terpscan_common::config::get_user_agent;
use terpscan_common::{Error, Result, TerpeneProfile};
use tracing::debug;

/// Total request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Page size for the list fallback
const SEARCH_LIMIT: u32 = 100;

/// Lab totals above this are percentages rather than fractions
const PERCENT_SCALE_THRESHOLD: f64 = 10.0;

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
}

/// Cannlytics API client
pub struct CannlyticsClient {
    http_client: Client,
    base_url: String,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl CannlyticsClient {
    /// Create a client for `base_url` (e.g. `https://cannlytics.com/api/data/strains`)
    pub fn new(base_url: impl Into<String>, requests_per_second: u32) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(get_user_agent())
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    /// Fetch one strain by slug; `Ok(None)` on 404 or empty data
    async fn fetch_by_slug(
        &self,
        strain_name: &str,
    ) -> std::result::Result<Option<ChemicalRecord>, LookupError> {
        let url = format!("{}/{}", self.base_url, slug(strain_name));
        let Some(envelope) = self.get_envelope(&url).await? else {
            return Ok(None);
        };
        if !envelope.success {
            return Ok(None);
        }
        Ok(parse_record(&envelope.data))
    }

    /// Scan the strain list for the first usable name match
    async fn search(
        &self,
        strain_name: &str,
    ) -> std::result::Result<Option<ChemicalRecord>, LookupError> {
        let url = format!("{}?limit={}", self.base_url, SEARCH_LIMIT);
        let Some(envelope) = self.get_envelope(&url).await? else {
            return Ok(None);
        };
        if !envelope.success {
            return Ok(None);
        }

        let records = envelope
            .data
            .as_array()
            .ok_or_else(|| LookupError::Parse("search data is not an array".to_string()))?;

        Ok(records
            .iter()
            .filter(|record| {
                record
                    .get("strain_name")
                    .and_then(Value::as_str)
                    .map_or(false, |api_name| names_match(strain_name, api_name))
            })
            .find_map(parse_record))
    }

    /// GET + decode; `Ok(None)` for 404
    async fn get_envelope(
        &self,
        url: &str,
    ) -> std::result::Result<Option<ApiEnvelope>, LookupError> {
        self.rate_limiter.until_ready().await;
        debug!(url = %url, "Cannlytics request");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| LookupError::Network(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if !status.is_success() => Err(LookupError::Status(status.as_u16())),
            _ => response
                .json::<ApiEnvelope>()
                .await
                .map(Some)
                .map_err(|e| LookupError::Parse(e.to_string())),
        }
    }
}

#[async_trait]
impl ChemicalProfileSource for CannlyticsClient {
    fn name(&self) -> &'static str {
        "Cannlytics"
    }

    async fn lookup(
        &self,
        strain_name: &str,
    ) -> std::result::Result<Option<ChemicalRecord>, LookupError> {
        if let Some(record) = self.fetch_by_slug(strain_name).await? {
            debug!(query = %strain_name, matched = %record.name, "Cannlytics slug hit");
            return Ok(Some(record));
        }

        let found = self.search(strain_name).await?;
        match &found {
            Some(record) => debug!(
                query = %strain_name,
                matched = %record.name,
                "Cannlytics search hit"
            ),
            None => debug!(query = %strain_name, "Cannlytics miss"),
        }
        Ok(found)
    }
}

/// URL slug: lowercase, trimmed, spaces to dashes, apostrophes dropped
pub fn slug(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(['\'', '’'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Exact, all-words, or substring match (case-insensitive)
pub fn names_match(query: &str, api_name: &str) -> bool {
    let query = query.trim().to_lowercase();
    let api_name = api_name.trim().to_lowercase();
    if query.is_empty() || api_name.is_empty() {
        return false;
    }

    query == api_name
        || query.split_whitespace().all(|word| api_name.contains(word))
        || api_name.contains(&query)
        || query.contains(&api_name)
}

/// Map one API record; `None` when it has no positive terpene value
pub fn parse_record(data: &Value) -> Option<ChemicalRecord> {
    let map = data.as_object()?;

    let scale = match map.get("total_terpenes").and_then(Value::as_f64) {
        Some(total) if total > PERCENT_SCALE_THRESHOLD => 100.0,
        _ => 1.0,
    };
    let terpenes = TerpeneProfile::from_pairs(
        map.iter()
            .filter_map(|(key, value)| value.as_f64().map(|v| (key.as_str(), v / scale))),
    );
    if terpenes.is_zero() {
        return None;
    }

    let name = map
        .get("strain_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let description = map
        .get("description")
        .and_then(Value::as_str)
        .filter(|d| !d.trim().is_empty())
        .map(str::to_string);

    let percent = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| map.get(*k).and_then(Value::as_f64))
            .find(|v| *v > 0.0)
            .map(|v| PercentRange::new(v, v))
    };

    Some(ChemicalRecord {
        strain_type: description.as_deref().and_then(infer_type),
        thc: percent(&["delta_9_thc", "total_thc"]),
        cbd: percent(&["cbd", "total_cbd"]),
        effects: tag_list(map.get("potential_effects"), "effect_"),
        flavors: tag_list(map.get("potential_aromas"), "aroma_"),
        name,
        terpenes,
        description,
    })
}

fn tag_list(value: Option<&Value>, prefix: &str) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|tag| tag.trim_start_matches(prefix).replace('_', " ").to_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn infer_type(description: &str) -> Option<StrainType> {
    let lower = description.to_lowercase();
    let (indica, sativa) = (lower.contains("indica"), lower.contains("sativa"));
    match (indica, sativa) {
        (true, false) => Some(StrainType::Indica),
        (false, true) => Some(StrainType::Sativa),
        _ if lower.contains("hybrid") => Some(StrainType::Hybrid),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use terpscan_common::Terpene;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CannlyticsClient {
        CannlyticsClient::new(format!("{}/api/data/strains", server.uri()), 100).unwrap()
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Blue Dream"), "blue-dream");
        assert_eq!(slug("  Charlotte's  Web "), "charlottes-web");
        assert_eq!(slug("OG Kush"), "og-kush");
    }

    #[test]
    fn test_names_match() {
        assert!(names_match("Blue Dream", "blue dream"));
        assert!(names_match("dream blue", "Blue Dream"));
        assert!(names_match("Gelato", "Gelato #33"));
        assert!(names_match("Super Sour Diesel", "Sour Diesel"));
        assert!(!names_match("Gelato", "Wedding Cake"));
        assert!(!names_match("Gelato", ""));
    }

    #[test]
    fn test_parse_record_percent_scaling_and_aliases() {
        let record = parse_record(&json!({
            "strain_name": "Blue Dream",
            "beta_myrcene": 35.0,
            "alpha_pinene": 12.0,
            "beta_pinene": 20.0,
            "geraniol": 5.0,
            "total_terpenes": 80.0,
            "total_thc": 21.0,
            "description": "A sativa-dominant favorite",
            "potential_effects": ["effect_happy", "effect_uplifted"],
            "potential_aromas": ["aroma_berry"]
        }))
        .unwrap();

        assert_eq!(record.name, "Blue Dream");
        assert!((record.terpenes.get(Terpene::Myrcene) - 0.35).abs() < 1e-9);
        assert!((record.terpenes.get(Terpene::Pinene) - 0.20).abs() < 1e-9);
        assert_eq!(record.thc, Some(PercentRange::new(21.0, 21.0)));
        assert_eq!(record.strain_type, Some(StrainType::Sativa));
        assert_eq!(record.effects, vec!["happy", "uplifted"]);
        assert_eq!(record.flavors, vec!["berry"]);
    }

    #[test]
    fn test_parse_record_fraction_values_unscaled() {
        let record = parse_record(&json!({
            "strain_name": "Lemon", "d_limonene": 0.6, "total_terpenes": 1.2
        }))
        .unwrap();
        assert_eq!(record.terpenes.get(Terpene::Limonene), 0.6);
    }

    #[test]
    fn test_record_without_terpenes_is_no_match() {
        assert!(parse_record(&json!({"strain_name": "Mystery", "total_thc": 20.0})).is_none());
    }

    #[tokio::test]
    async fn test_lookup_by_slug() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/data/strains/blue-dream"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"strain_name": "Blue Dream", "beta_myrcene": 0.4, "d_limonene": 0.3}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let record = client_for(&server).lookup("Blue Dream").await.unwrap().unwrap();
        assert_eq!(record.terpenes.get(Terpene::Myrcene), 0.4);
        assert_eq!(record.terpenes.get(Terpene::Limonene), 0.3);
    }

    #[tokio::test]
    async fn test_lookup_falls_back_to_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/data/strains/gelato-33"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/data/strains"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [
                    {"strain_name": "Wedding Cake", "d_limonene": 0.7},
                    {"strain_name": "Gelato 33", "beta_caryophyllene": 0.5},
                    {"strain_name": "Gelato #33 Reserve", "beta_caryophyllene": 0.9}
                ]
            })))
            .mount(&server)
            .await;

        let record = client_for(&server).lookup("Gelato 33").await.unwrap().unwrap();
        assert_eq!(record.name, "Gelato 33");
        assert_eq!(record.terpenes.get(Terpene::Caryophyllene), 0.5);
    }

    #[tokio::test]
    async fn test_lookup_miss() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/data/strains/zkittlez"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": false, "data": null})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/data/strains"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": []})),
            )
            .mount(&server)
            .await;

        assert!(client_for(&server).lookup("Zkittlez").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).lookup("Blue Dream").await.unwrap_err();
        assert_eq!(err, LookupError::Status(503));
    }
}
