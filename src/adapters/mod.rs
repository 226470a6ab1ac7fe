//! Provider interfaces for the four pipeline stages.
//!
//! Each stage is a trait with a single operation so providers can be
//! swapped without touching orchestration. Constructors check credentials
//! up front: a provider that exists has everything it needs to make calls.

pub mod did;
pub mod heygen;
pub mod http;
pub mod instagram;
pub mod newsapi;
pub mod openai;
pub mod poll;
pub mod serpapi;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::domain::{Caption, Locale, PublishResult, Script, Topic, VideoArtifact};
use crate::error::StageError;

pub use did::DidRenderer;
pub use heygen::HeyGenRenderer;
pub use instagram::InstagramPublisher;
pub use newsapi::NewsApiTopics;
pub use openai::OpenAiScripts;
pub use serpapi::GoogleTrendsTopics;

/// Picks the day's topic
#[async_trait]
pub trait TopicSource: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    async fn fetch_topic(&self, locale: Option<&Locale>) -> Result<Topic, StageError>;
}

/// Writes narration text for a topic
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, topic: &Topic) -> Result<String, StageError>;
}

/// Renders narration into a video file at `dest`, replacing any existing file
#[async_trait]
pub trait VideoSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    async fn render(&self, script: &Script, dest: &Path) -> Result<VideoArtifact, StageError>;
}

/// Uploads a video with a caption
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, video: &Path, caption: &Caption) -> Result<PublishResult, StageError>;
}

/// Trending topic providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TrendSource {
    /// Google Trends related queries via SerpApi
    #[default]
    #[value(name = "google_trends")]
    GoogleTrends,

    /// Recent headlines via NewsAPI
    #[value(name = "newsapi")]
    NewsApi,
}

impl TrendSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendSource::GoogleTrends => "google_trends",
            TrendSource::NewsApi => "newsapi",
        }
    }
}

impl fmt::Display for TrendSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrendSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "google_trends" | "google" | "trends" => Ok(TrendSource::GoogleTrends),
            "newsapi" | "news_api" | "news" => Ok(TrendSource::NewsApi),
            other => Err(format!(
                "unknown trend source '{}' (expected google_trends or newsapi)",
                other
            )),
        }
    }
}

/// Video rendering providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VideoProvider {
    /// HeyGen avatar videos
    #[default]
    #[value(name = "heygen")]
    HeyGen,

    /// D-ID talking-head videos
    #[value(name = "did")]
    DId,
}

impl VideoProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoProvider::HeyGen => "heygen",
            VideoProvider::DId => "did",
        }
    }
}

impl fmt::Display for VideoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "heygen" => Ok(VideoProvider::HeyGen),
            "did" => Ok(VideoProvider::DId),
            other => Err(format!(
                "unknown video provider '{}' (expected heygen or did)",
                other
            )),
        }
    }
}

/// Build the selected topic source
pub fn topic_source(
    settings: &Settings,
    source: TrendSource,
) -> Result<Box<dyn TopicSource>, StageError> {
    Ok(match source {
        TrendSource::GoogleTrends => Box::new(GoogleTrendsTopics::from_settings(settings)?),
        TrendSource::NewsApi => Box::new(NewsApiTopics::from_settings(settings)?),
    })
}

pub fn script_generator(settings: &Settings) -> Result<Box<dyn ScriptGenerator>, StageError> {
    Ok(Box::new(OpenAiScripts::from_settings(settings)?))
}

/// Build the selected video synthesizer
pub fn video_synthesizer(
    settings: &Settings,
    provider: VideoProvider,
) -> Result<Box<dyn VideoSynthesizer>, StageError> {
    Ok(match provider {
        VideoProvider::HeyGen => Box::new(HeyGenRenderer::from_settings(settings)?),
        VideoProvider::DId => Box::new(DidRenderer::from_settings(settings)?),
    })
}

pub fn publisher(settings: &Settings) -> Result<Box<dyn Publisher>, StageError> {
    Ok(Box::new(InstagramPublisher::from_settings(settings)?))
}

/// Choose one topic from provider candidates.
///
/// The first candidate mentioning any keyword (case-insensitive) wins;
/// otherwise the first non-blank candidate.
pub fn select_topic<S: AsRef<str>>(candidates: &[S], keywords: &[String]) -> Option<String> {
    let cleaned: Vec<&str> = candidates
        .iter()
        .map(|c| c.as_ref().trim())
        .filter(|c| !c.is_empty())
        .collect();

    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    cleaned
        .iter()
        .find(|c| {
            let lower = c.to_lowercase();
            keywords.iter().any(|k| lower.contains(k.as_str()))
        })
        .or_else(|| cleaned.first())
        .map(|c| c.to_string())
}
