//! Values that flow between stages: topic, script, video, caption, publish result.
//!
//! None of these outlive a single run. The script and video are persisted to
//! fixed paths that every run overwrites.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Spoken narration pace used to estimate duration
pub const WORDS_PER_MINUTE: f64 = 150.0;

/// Instagram caption length limit (characters)
pub const MAX_CAPTION_CHARS: usize = 2200;

/// Instagram hashtag limit per post
pub const MAX_HASHTAGS: usize = 30;

/// Locale hint for topic providers, e.g. `en-US`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    /// Lowercase ISO 639-1 language code
    pub language: String,

    /// Uppercase ISO 3166-1 region code, if given
    pub region: Option<String>,
}

impl Locale {
    /// Parse `en`, `en-US` or `en_US`. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let mut parts = raw.splitn(2, ['-', '_']);
        let language = parts.next()?.trim().to_lowercase();
        if language.is_empty() {
            return None;
        }
        let region = parts
            .next()
            .map(|r| r.trim().to_uppercase())
            .filter(|r| !r.is_empty());

        Some(Self { language, region })
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}-{}", self.language, region),
            None => f.write_str(&self.language),
        }
    }
}

/// The subject of a day's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub text: String,

    /// Provider that selected it
    pub source: String,
}

impl Topic {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
            source: source.into(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Narration text derived from a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub topic: String,
    pub text: String,
}

impl Script {
    /// Build a script from a generated body, guaranteeing the topic appears
    /// verbatim. A body that never mentions the topic gets it as a title line.
    pub fn compose(topic: &Topic, body: &str) -> Self {
        let body = body.trim();
        let text = if body.contains(topic.text.as_str()) {
            body.to_string()
        } else if body.is_empty() {
            topic.text.clone()
        } else {
            format!("{}\n\n{}", topic.text, body)
        };

        Self {
            topic: topic.text.clone(),
            text,
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Estimated narration length at [`WORDS_PER_MINUTE`]
    pub fn estimated_seconds(&self) -> f64 {
        self.word_count() as f64 * 60.0 / WORDS_PER_MINUTE
    }
}

/// A rendered video on local disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub path: PathBuf,

    /// Rendering provider name
    pub provider: String,

    /// Provider-side job identifier
    pub job_id: String,

    pub bytes: u64,
}

/// Caption text for the published post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption(String);

impl Caption {
    /// Use caption text as given, clipped to the platform limit
    pub fn new(text: impl Into<String>) -> Self {
        Self(clip_chars(text.into().trim(), MAX_CAPTION_CHARS))
    }

    /// Build the daily caption: topic line, short call to action, hashtags.
    pub fn for_topic(topic: &Topic, hashtags: &[String]) -> Self {
        let tags: Vec<String> = hashtags
            .iter()
            .map(|t| t.trim().trim_start_matches('#').replace(' ', ""))
            .filter(|t| !t.is_empty())
            .take(MAX_HASHTAGS)
            .map(|t| format!("#{}", t))
            .collect();

        let mut text = format!(
            "{}\n\nTake a moment for yourself today. If you are struggling, reach out to someone you trust or a local support line.",
            topic.text
        );
        if !tags.is_empty() {
            text.push_str("\n\n");
            text.push_str(&tags.join(" "));
        }

        Self::new(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Caption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn clip_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Terminal status of the publish stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResult {
    pub success: bool,

    /// The uploaded file, exactly as passed to the publisher
    pub video_path: PathBuf,

    pub caption: String,

    /// Platform media id of the published post
    pub media_id: Option<String>,

    /// Raw provider response for the final publish call
    pub response: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_parsing() {
        let locale = Locale::parse("en-us").unwrap();
        assert_eq!(locale.language, "en");
        assert_eq!(locale.region.as_deref(), Some("US"));
        assert_eq!(locale.to_string(), "en-US");

        let locale = Locale::parse("de_AT").unwrap();
        assert_eq!(locale.to_string(), "de-AT");

        let locale = Locale::parse("fr").unwrap();
        assert!(locale.region.is_none());

        assert!(Locale::parse("  ").is_none());
    }

    #[test]
    fn test_script_keeps_body_mentioning_topic() {
        let topic = Topic::new("Sleep hygiene", "test");
        let script = Script::compose(&topic, "Let's talk about Sleep hygiene and rest.");
        assert_eq!(script.text, "Let's talk about Sleep hygiene and rest.");
    }

    #[test]
    fn test_script_prepends_missing_topic() {
        let topic = Topic::new("Burnout", "test");
        let script = Script::compose(&topic, "Rest matters more than you think.");
        assert!(script.text.starts_with("Burnout\n\n"));
        assert!(script.text.contains("Burnout"));
    }

    #[test]
    fn test_script_prepends_when_only_case_differs() {
        let topic = Topic::new("Seasonal Depression", "test");
        let script = Script::compose(&topic, "seasonal depression is common in winter.");
        assert!(script.text.contains("Seasonal Depression"));
    }

    #[test]
    fn test_script_duration_estimate() {
        let topic = Topic::new("Anxiety", "test");
        let body = format!("Anxiety {}", "word ".repeat(149));
        let script = Script::compose(&topic, &body);
        assert_eq!(script.word_count(), 150);
        assert!((script.estimated_seconds() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_caption_for_topic_formats_hashtags() {
        let topic = Topic::new("Loneliness", "test");
        let tags = vec![
            "#mentalhealth".to_string(),
            "self care".to_string(),
            " ".to_string(),
        ];
        let caption = Caption::for_topic(&topic, &tags);

        assert!(caption.as_str().starts_with("Loneliness"));
        assert!(caption.as_str().ends_with("#mentalhealth #selfcare"));
    }

    #[test]
    fn test_caption_limits() {
        let topic = Topic::new("Stress", "test");
        let tags: Vec<String> = (0..40).map(|i| format!("tag{}", i)).collect();
        let caption = Caption::for_topic(&topic, &tags);
        assert_eq!(caption.as_str().matches('#').count(), MAX_HASHTAGS);

        let long = Caption::new("é".repeat(MAX_CAPTION_CHARS + 10));
        assert_eq!(long.as_str().chars().count(), MAX_CAPTION_CHARS);
    }
}
