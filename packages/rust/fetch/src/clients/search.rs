//! Search API client (Serper-style JSON endpoint).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use glossgen_shared::config::SearchSettings;
use glossgen_shared::{GlossgenError, ResourceKind, Result};

use super::{USER_AGENT, Upstream};

/// Runtime search client configuration with the resolved API key.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// API key resolved from the environment at startup.
    pub api_key: String,
    /// Search endpoint URL.
    pub endpoint: String,
    /// Results requested per query.
    pub results_per_query: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl SearchConfig {
    /// Build a runtime config from settings plus a resolved API key.
    pub fn from_settings(settings: &SearchSettings, api_key: String) -> Self {
        Self {
            api_key,
            endpoint: settings.endpoint.clone(),
            results_per_query: settings.results_per_query,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Client for keyword research queries against the search API.
pub struct SearchClient {
    client: reqwest::Client,
    config: SearchConfig,
}

impl SearchClient {
    /// Create a new search client with the given configuration.
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                GlossgenError::upstream(None, format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Upstream for SearchClient {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Search
    }

    async fn fetch(&self, key: &str) -> Result<String> {
        debug!(query = %key, "search request");

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("X-API-KEY", &self.config.api_key)
            .json(&serde_json::json!({
                "q": key,
                "num": self.config.results_per_query,
            }))
            .send()
            .await
            .map_err(|e| {
                GlossgenError::upstream(
                    e.status().map(|s| s.as_u16()),
                    format!("search {key:?}: {e}"),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GlossgenError::upstream(
                Some(status.as_u16()),
                format!("search {key:?}: HTTP {status}"),
            ));
        }

        let body = response.text().await.map_err(|e| {
            GlossgenError::upstream(None, format!("search {key:?}: body read failed: {e}"))
        })?;

        // Validate before the payload lands in the cache.
        serde_json::from_str::<serde_json::Value>(&body)
            .map_err(|e| GlossgenError::parse(format!("search {key:?}: invalid JSON: {e}")))?;

        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

/// One organic search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Extract the organic result list from a raw search payload.
pub fn organic_results(payload: &str) -> Result<Vec<SearchHit>> {
    #[derive(Deserialize)]
    struct Body {
        #[serde(default)]
        organic: Vec<SearchHit>,
    }

    let body: Body = serde_json::from_str(payload)
        .map_err(|e| GlossgenError::parse(format!("search payload: {e}")))?;
    Ok(body.organic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(endpoint: String) -> SearchConfig {
        SearchConfig {
            api_key: "test-key".into(),
            endpoint,
            results_per_query: 5,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn fetch_returns_validated_payload() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "organic": [
                {"title": "Consistent hashing", "link": "https://a.dev/ch", "snippet": "..."},
                {"title": "Hash rings", "link": "https://b.dev/rings"}
            ]
        });

        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("X-API-KEY", "test-key"))
            .and(body_partial_json(serde_json::json!({"q": "consistent hashing"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let client = SearchClient::new(test_config(format!("{}/search", server.uri()))).unwrap();
        let payload = client.fetch("consistent hashing").await.expect("fetch");

        let hits = organic_results(&payload).expect("parse");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].link, "https://a.dev/ch");
        assert_eq!(hits[1].snippet, None);
    }

    #[tokio::test]
    async fn http_429_maps_to_structured_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = SearchClient::new(test_config(server.uri())).unwrap();
        let err = client.fetch("anything").await.unwrap_err();
        assert_eq!(err.status(), Some(429));
        assert!(crate::classify::is_rate_limited(&err));
    }

    #[tokio::test]
    async fn non_json_body_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let client = SearchClient::new(test_config(server.uri())).unwrap();
        let err = client.fetch("anything").await.unwrap_err();
        assert!(matches!(err, GlossgenError::Parse { .. }));
        assert!(!crate::classify::is_rate_limited(&err));
    }

    #[test]
    fn organic_results_tolerates_missing_list() {
        let hits = organic_results(r#"{"searchParameters": {"q": "x"}}"#).expect("parse");
        assert!(hits.is_empty());

        assert!(organic_results("not json").is_err());
    }
}
