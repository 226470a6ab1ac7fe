//! NewsAPI topic source: recent mental health headlines.
//!
//! Endpoint: GET /v2/everything
//! Auth: `X-Api-Key` header

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{http, select_topic, TopicSource};
use crate::config::{vars, Settings};
use crate::domain::{Locale, Topic};
use crate::error::StageError;

const PROVIDER: &str = "newsapi";
const NEWSAPI_URL: &str = "https://newsapi.org/v2";
const SEED_QUERY: &str = "\"mental health\"";

pub struct NewsApiTopics {
    api_key: String,
    keywords: Vec<String>,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    articles: Vec<Article>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: Option<String>,
}

impl NewsApiTopics {
    pub fn new(api_key: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            api_key: api_key.into(),
            keywords,
            base_url: NEWSAPI_URL.to_string(),
            client: http::client(),
        }
    }

    /// Fails with a configuration error when `NEWSAPI_API_KEY` is absent
    pub fn from_settings(settings: &Settings) -> Result<Self, StageError> {
        let api_key = settings.credential(vars::NEWSAPI_API_KEY)?;
        Ok(Self::new(api_key, settings.content.keywords.clone()))
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

/// Headlines usually end in " - Publisher"; keep only the headline
fn clean_headline(title: &str) -> Option<String> {
    let title = title.trim();
    if title.is_empty() || title == "[Removed]" {
        return None;
    }

    let headline = match title.rsplit_once(" - ") {
        Some((head, _source)) if !head.trim().is_empty() => head.trim(),
        _ => title,
    };
    Some(headline.to_string())
}

fn candidates(response: EverythingResponse) -> Result<Vec<String>, StageError> {
    if response.status != "ok" {
        return Err(StageError::Decode {
            provider: PROVIDER,
            message: response
                .message
                .unwrap_or_else(|| format!("status '{}'", response.status)),
        });
    }

    Ok(response
        .articles
        .iter()
        .filter_map(|a| a.title.as_deref())
        .filter_map(clean_headline)
        .collect())
}

#[async_trait]
impl TopicSource for NewsApiTopics {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip(self), fields(provider = PROVIDER))]
    async fn fetch_topic(&self, locale: Option<&Locale>) -> Result<Topic, StageError> {
        let url = format!("{}/everything", self.base_url);
        let language = locale.map(|l| l.language.as_str()).unwrap_or("en");

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", SEED_QUERY),
                ("sortBy", "publishedAt"),
                ("searchIn", "title"),
                ("pageSize", "20"),
                ("language", language),
            ])
            .send()
            .await
            .map_err(StageError::transport(PROVIDER))?;

        let body: EverythingResponse = http::read_json(PROVIDER, response).await?;
        let candidates = candidates(body)?;
        debug!(count = candidates.len(), "Fetched headline candidates");

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
        let err = NewsApiTopics::from_settings(&settings).err().unwrap();
        assert!(matches!(err, StageError::Configuration { ref var } if var == "NEWSAPI_API_KEY"));
    }

    #[test]
    fn test_clean_headline() {
        assert_eq!(
            clean_headline("Teens and social media anxiety - The Guardian").as_deref(),
            Some("Teens and social media anxiety")
        );
        assert_eq!(clean_headline("No source suffix").as_deref(), Some("No source suffix"));
        assert_eq!(clean_headline("[Removed]"), None);
        assert_eq!(clean_headline("   "), None);
    }

    #[test]
    fn test_candidates_from_articles() {
        let json = r#"{
            "status": "ok",
            "totalResults": 3,
            "articles": [
                {"source": {"name": "BBC"}, "title": "Workplace burnout rises - BBC News"},
                {"source": {"name": "X"}, "title": null},
                {"source": {"name": "Y"}, "title": "[Removed]"}
            ]
        }"#;
        let response: EverythingResponse = serde_json::from_str(json).unwrap();

        assert_eq!(candidates(response).unwrap(), vec!["Workplace burnout rises"]);
    }

    #[test]
    fn test_error_status_is_reported() {
        let json = r#"{"status": "error", "code": "rateLimited", "message": "Too many requests"}"#;
        let response: EverythingResponse = serde_json::from_str(json).unwrap();

        let err = candidates(response).unwrap_err();
        assert!(err.to_string().contains("Too many requests"));
    }
}
