//! Search-provider adapter
//!
//! The provider returns a ranked candidate sequence for a query. Ranking
//! quality is the provider's business; this module only maps its hits into
//! [`Candidate`] values the mixing engine can label.

use async_trait::async_trait;
use curio_common::config::SearchConfig;
use curio_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("curio/", env!("CARGO_PKG_VERSION"));

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Identifier assigned by the search provider
    pub object_id: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Lower-cased `key:value` signature used for diversity scoring
    #[serde(default)]
    pub attributes: BTreeSet<String>,
    /// Position in the provider's ranking, 0 = most relevant
    pub relevance_rank: u32,
    /// Optional embedding, e.g. derived from the query image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<f32>>,
    /// Raw provider hit
    #[serde(default)]
    pub payload: Value,
}

impl Candidate {
    pub fn new(object_id: impl Into<String>, relevance_rank: u32) -> Self {
        Self {
            object_id: object_id.into(),
            category: None,
            attributes: BTreeSet::new(),
            relevance_rank,
            features: None,
            payload: Value::Null,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_features(mut self, features: Vec<f32>) -> Self {
        self.features = Some(features);
        self
    }

    /// Subset of the hit kept with an interaction in the training corpus
    pub fn feature_subset(&self) -> Value {
        let mut subset = json!({
            "category": self.category,
            "attributes": self.attributes,
            "relevance_rank": self.relevance_rank,
        });
        if let Some(features) = &self.features {
            subset["features"] = json!(features);
        }
        subset
    }
}

/// Source of ranked candidates
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str, image_features: Option<&[f32]>) -> Result<Vec<Candidate>>;
}

/// Stand-in used when no search endpoint is configured
#[derive(Debug, Default)]
pub struct DisabledSearchProvider;

#[async_trait]
impl SearchProvider for DisabledSearchProvider {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn search(&self, _query: &str, _image_features: Option<&[f32]>) -> Result<Vec<Candidate>> {
        Err(Error::Provider(
            "No search endpoint configured ([search] endpoint in config.toml)".to_string(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    hits: Vec<Value>,
}

/// Client for an Algolia-compatible query API
///
/// POST `{endpoint}/1/indexes/{index}/query` with `{"query", "hitsPerPage"}`.
pub struct HttpSearchProvider {
    http_client: reqwest::Client,
    query_url: String,
    config: SearchConfig,
}

impl HttpSearchProvider {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(|e| e.trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::Config("search endpoint is not set".to_string()))?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Provider(e.to_string()))?;

        Ok(Self {
            http_client,
            query_url: format!("{}/1/indexes/{}/query", endpoint, config.index),
            config,
        })
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }

    fn request_body(&self, query: &str, image_features: Option<&[f32]>) -> Value {
        let mut body = json!({
            "query": query,
            "hitsPerPage": self.config.hits_per_page,
        });
        if let Some(features) = image_features {
            body["imageFeatures"] = json!(features);
        }
        body
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn search(&self, query: &str, image_features: Option<&[f32]>) -> Result<Vec<Candidate>> {
        let mut request = self
            .http_client
            .post(&self.query_url)
            .json(&self.request_body(query, image_features));

        if let Some(app_id) = &self.config.app_id {
            request = request.header("X-Algolia-Application-Id", app_id);
        }
        if let Some(api_key) = &self.config.api_key {
            request = request.header("X-Algolia-API-Key", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Unreadable response: {}", e)))?;

        let candidates = candidates_from_hits(parsed.hits, &self.config.attribute_keys);
        debug!(query, hits = candidates.len(), "Search provider returned candidates");
        Ok(candidates)
    }
}

/// Map raw hits to candidates, ranked by position
///
/// Hits without an `objectID` are dropped.
pub fn candidates_from_hits(hits: Vec<Value>, attribute_keys: &[String]) -> Vec<Candidate> {
    let mut candidates = Vec::with_capacity(hits.len());

    for hit in hits {
        let object_id = match hit.get("objectID") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                warn!("Dropping search hit without objectID");
                continue;
            }
        };

        let category = hit
            .get("category")
            .and_then(Value::as_str)
            .or_else(|| {
                hit.get("categories")
                    .and_then(Value::as_array)
                    .and_then(|c| c.first())
                    .and_then(Value::as_str)
            })
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty());

        let mut attributes = BTreeSet::new();
        for key in attribute_keys {
            match hit.get(key) {
                Some(Value::String(s)) => {
                    attributes.insert(format!("{}:{}", key, s.trim().to_lowercase()));
                }
                Some(Value::Array(values)) => {
                    for v in values.iter().filter_map(Value::as_str) {
                        attributes.insert(format!("{}:{}", key, v.trim().to_lowercase()));
                    }
                }
                _ => {}
            }
        }
        if let Some(tags) = hit.get("_tags").and_then(Value::as_array) {
            for tag in tags.iter().filter_map(Value::as_str) {
                attributes.insert(format!("tag:{}", tag.trim().to_lowercase()));
            }
        }

        let features = hit.get("features").and_then(Value::as_array).and_then(|values| {
            values
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32))
                .collect::<Option<Vec<f32>>>()
        });

        candidates.push(Candidate {
            object_id,
            category,
            attributes,
            relevance_rank: candidates.len() as u32,
            features,
            payload: hit,
        });
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<String> {
        SearchConfig::default().attribute_keys
    }

    #[test]
    fn test_hits_map_to_ranked_candidates() {
        let hits = vec![
            json!({"objectID": "a", "category": "Lamps", "brand": "Acme", "_tags": ["Sale"]}),
            json!({"objectID": 42, "categories": ["rugs", "home"], "color": ["Red", "blue"]}),
        ];

        let candidates = candidates_from_hits(hits, &keys());

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].object_id, "a");
        assert_eq!(candidates[0].relevance_rank, 0);
        assert_eq!(candidates[0].category.as_deref(), Some("lamps"));
        assert!(candidates[0].attributes.contains("brand:acme"));
        assert!(candidates[0].attributes.contains("tag:sale"));

        assert_eq!(candidates[1].object_id, "42");
        assert_eq!(candidates[1].relevance_rank, 1);
        assert_eq!(candidates[1].category.as_deref(), Some("rugs"));
        assert!(candidates[1].attributes.contains("color:red"));
        assert!(candidates[1].attributes.contains("color:blue"));
    }

    #[test]
    fn test_hits_without_object_id_are_dropped_and_ranks_stay_dense() {
        let hits = vec![
            json!({"title": "no id"}),
            json!({"objectID": ""}),
            json!({"objectID": "kept"}),
        ];

        let candidates = candidates_from_hits(hits, &keys());

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].object_id, "kept");
        assert_eq!(candidates[0].relevance_rank, 0);
    }

    #[test]
    fn test_feature_vector_is_read_when_numeric() {
        let hits = vec![
            json!({"objectID": "a", "features": [0.5, 1.0]}),
            json!({"objectID": "b", "features": [0.5, "x"]}),
        ];

        let candidates = candidates_from_hits(hits, &keys());

        assert_eq!(candidates[0].features, Some(vec![0.5, 1.0]));
        assert_eq!(candidates[1].features, None);
    }

    #[test]
    fn test_feature_subset_omits_payload() {
        let candidate = Candidate::new("a", 3)
            .with_category("lamps")
            .with_attributes(["brand:acme"]);

        let subset = candidate.feature_subset();

        assert_eq!(subset["category"], "lamps");
        assert_eq!(subset["relevance_rank"], 3);
        assert_eq!(subset["attributes"], json!(["brand:acme"]));
        assert!(subset.get("payload").is_none());
        assert!(subset.get("features").is_none());
    }

    #[test]
    fn test_http_provider_requires_endpoint() {
        let result = HttpSearchProvider::new(SearchConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_http_provider_query_url_and_body() {
        let provider = HttpSearchProvider::new(SearchConfig {
            endpoint: Some("https://search.example.test/".to_string()),
            index: "catalog".to_string(),
            hits_per_page: 12,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            provider.query_url(),
            "https://search.example.test/1/indexes/catalog/query"
        );

        let body = provider.request_body("oak table", Some(&[0.25, 0.5]));
        assert_eq!(body["query"], "oak table");
        assert_eq!(body["hitsPerPage"], 12);
        assert_eq!(body["imageFeatures"], json!([0.25, 0.5]));

        let body = provider.request_body("oak table", None);
        assert!(body.get("imageFeatures").is_none());
    }

    #[tokio::test]
    async fn test_disabled_provider_reports_provider_error() {
        let result = DisabledSearchProvider.search("lamp", None).await;
        assert!(matches!(result, Err(Error::Provider(_))));
    }
}
