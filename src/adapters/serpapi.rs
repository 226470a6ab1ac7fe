//! Google Trends topic source via SerpApi.
//!
//! Endpoint: GET /search.json?engine=google_trends&data_type=RELATED_QUERIES
//! Auth: `api_key` query parameter

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{http, select_topic, TopicSource};
use crate::config::{vars, Settings};
use crate::domain::{Locale, Topic};
use crate::error::StageError;

const PROVIDER: &str = "google_trends";
const SERPAPI_URL: &str = "https://serpapi.com";
const SEED_QUERY: &str = "mental health";

/// Trending mental health searches from Google Trends
pub struct GoogleTrendsTopics {
    api_key: String,
    keywords: Vec<String>,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TrendsResponse {
    #[serde(default)]
    related_queries: Option<RelatedQueries>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RelatedQueries {
    #[serde(default)]
    rising: Vec<RelatedQuery>,
    #[serde(default)]
    top: Vec<RelatedQuery>,
}

#[derive(Debug, Deserialize)]
struct RelatedQuery {
    query: String,
}

impl GoogleTrendsTopics {
    pub fn new(api_key: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            api_key: api_key.into(),
            keywords,
            base_url: SERPAPI_URL.to_string(),
            client: http::client(),
        }
    }

    /// Fails with a configuration error when `SERPAPI_API_KEY` is absent
    pub fn from_settings(settings: &Settings) -> Result<Self, StageError> {
        let api_key = settings.credential(vars::SERPAPI_API_KEY)?;
        Ok(Self::new(api_key, settings.content.keywords.clone()))
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn query_params(&self, locale: Option<&Locale>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("engine", "google_trends".to_string()),
            ("q", SEED_QUERY.to_string()),
            ("data_type", "RELATED_QUERIES".to_string()),
            ("date", "now 7-d".to_string()),
        ];

        if let Some(locale) = locale {
            params.push(("hl", locale.language.clone()));
            if let Some(ref region) = locale.region {
                params.push(("geo", region.clone()));
            }
        }

        params.push(("api_key", self.api_key.clone()));
        params
    }
}

/// Rising queries first, then top queries
fn candidates(response: TrendsResponse) -> Result<Vec<String>, StageError> {
    if let Some(error) = response.error {
        return Err(StageError::Decode {
            provider: PROVIDER,
            message: error,
        });
    }

    let related = response.related_queries.unwrap_or_default();
    Ok(related
        .rising
        .into_iter()
        .chain(related.top)
        .map(|q| q.query)
        .collect())
}

#[async_trait]
impl TopicSource for GoogleTrendsTopics {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip(self), fields(provider = PROVIDER))]
    async fn fetch_topic(&self, locale: Option<&Locale>) -> Result<Topic, StageError> {
        let url = format!("{}/search.json", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&self.query_params(locale))
            .send()
            .await
            .map_err(StageError::transport(PROVIDER))?;

        let body: TrendsResponse = http::read_json(PROVIDER, response).await?;
        let candidates = candidates(body)?;
        debug!(count = candidates.len(), "Fetched trend candidates");

        select_topic(&candidates, &self.keywords)
            .map(|text| Topic::new(text, PROVIDER))
            .ok_or(StageError::NoTopic { provider: PROVIDER })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvMap;

    #[test]
    fn test_missing_key_fails_before_any_request() {
        let settings = Settings::resolve(&EnvMap::new(), None).unwrap();
        let err = GoogleTrendsTopics::from_settings(&settings).err().unwrap();
        assert!(matches!(err, StageError::Configuration { ref var } if var == "SERPAPI_API_KEY"));
    }

    #[test]
    fn test_candidates_order_rising_then_top() {
        let json = r#"{
            "search_metadata": {"status": "Success"},
            "related_queries": {
                "rising": [{"query": "seasonal depression", "value": "+250%"}],
                "top": [{"query": "mental health day", "value": "100"}, {"query": "therapy near me"}]
            }
        }"#;
        let response: TrendsResponse = serde_json::from_str(json).unwrap();

        assert_eq!(
            candidates(response).unwrap(),
            vec!["seasonal depression", "mental health day", "therapy near me"]
        );
    }

    #[test]
    fn test_error_payload_is_reported() {
        let json = r#"{"error": "Invalid API key."}"#;
        let response: TrendsResponse = serde_json::from_str(json).unwrap();

        let err = candidates(response).unwrap_err();
        assert!(err.to_string().contains("Invalid API key."));
    }

    #[test]
    fn test_locale_maps_to_hl_and_geo() {
        let topics = GoogleTrendsTopics::new("key", vec![]);
        let locale = Locale::parse("en-GB").unwrap();
        let params = topics.query_params(Some(&locale));

        assert!(params.contains(&("hl", "en".to_string())));
        assert!(params.contains(&("geo", "GB".to_string())));
        assert!(topics.query_params(None).iter().all(|(k, _)| *k != "geo"));
    }
}
