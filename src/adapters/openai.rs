//! OpenAI chat completions as the script generator.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{http, ScriptGenerator};
use crate::config::{vars, Settings};
use crate::domain::Topic;
use crate::error::StageError;

const PROVIDER: &str = "openai";
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You write short narration scripts for a daily mental health awareness video. \
Be warm, accurate and non-clinical. Never give diagnoses or medication advice. \
Write plain spoken sentences only: no headings, no stage directions, no emojis, no hashtags.";

pub struct OpenAiScripts {
    api_key: String,
    model: String,
    min_words: usize,
    max_words: usize,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiScripts {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            min_words: 115,
            max_words: 150,
            base_url: OPENAI_API_URL.to_string(),
            client: http::client(),
        }
    }

    /// Fails with a configuration error when `OPENAI_API_KEY` is absent
    pub fn from_settings(settings: &Settings) -> Result<Self, StageError> {
        let api_key = settings.credential(vars::OPENAI_API_KEY)?;
        Ok(Self::new(api_key, settings.openai_model.clone())
            .with_word_range(settings.content.min_words, settings.content.max_words))
    }

    pub fn with_word_range(mut self, min_words: usize, max_words: usize) -> Self {
        self.min_words = min_words.min(max_words);
        self.max_words = max_words.max(min_words);
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap, StageError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|_| {
            StageError::InvalidSetting {
                var: vars::OPENAI_API_KEY.to_string(),
                message: "contains characters not allowed in a header".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn user_prompt(&self, topic: &Topic) -> String {
        format!(
            "Today's topic: \"{topic}\".\n\
             Write a {min}-{max} word narration (about 45-60 seconds spoken) that explains why \
             this matters for mental health and offers one or two practical, gentle suggestions. \
             Mention \"{topic}\" by name in the first sentence. End by encouraging viewers to \
             reach out for support if they need it.",
            topic = topic.text,
            min = self.min_words,
            max = self.max_words,
        )
    }
}

fn narration(response: ChatResponse) -> Result<String, StageError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| StageError::Decode {
            provider: PROVIDER,
            message: "response contained no narration text".to_string(),
        })
}

#[async_trait]
impl ScriptGenerator for OpenAiScripts {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip(self, topic), fields(provider = PROVIDER, model = %self.model))]
    async fn generate(&self, topic: &Topic) -> Result<String, StageError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: self.user_prompt(topic),
                },
            ],
            temperature: 0.7,
        };

        debug!("OpenAI chat request");

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(StageError::transport(PROVIDER))?;

        let body: ChatResponse = http::read_json(PROVIDER, response).await?;
        narration(body)
    }
}
