//! HeyGen avatar video renderer.
//!
//! Submit: POST /v2/video/generate
//! Status: GET /v1/video_status.get?video_id=...
//! Auth: `X-Api-Key` header

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use super::poll::{poll_job, JobStatus, PollFailure};
use super::{http, VideoSynthesizer};
use crate::config::{vars, HeyGenSettings, Settings};
use crate::core::pipeline::RetryPolicy;
use crate::domain::{Script, VideoArtifact};
use crate::error::StageError;

const PROVIDER: &str = "heygen";
const HEYGEN_API_URL: &str = "https://api.heygen.com";

/// Portrait 720p, the Reels aspect ratio
const WIDTH: u32 = 720;
const HEIGHT: u32 = 1280;

pub struct HeyGenRenderer {
    api_key: String,
    avatar: HeyGenSettings,
    poll_interval: Duration,
    render_timeout: Duration,
    retry: RetryPolicy,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Option<serde_json::Value>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct GenerateData {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    status: String,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl HeyGenRenderer {
    pub fn new(api_key: impl Into<String>, avatar: HeyGenSettings) -> Self {
        Self {
            api_key: api_key.into(),
            avatar,
            poll_interval: Duration::from_secs(10),
            render_timeout: Duration::from_secs(900),
            retry: RetryPolicy::default(),
            base_url: HEYGEN_API_URL.to_string(),
            client: http::client(),
        }
    }

    /// Fails with a configuration error when `HEYGEN_API_KEY` is absent
    pub fn from_settings(settings: &Settings) -> Result<Self, StageError> {
        let api_key = settings.credential(vars::HEYGEN_API_KEY)?;
        Ok(Self::new(api_key, settings.heygen.clone())
            .with_polling(settings.limits.poll_interval(), settings.limits.render_timeout())
            .with_retry_policy(settings.limits.retry.clone()))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.render_timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn generate_body(&self, script: &Script) -> serde_json::Value {
        json!({
            "video_inputs": [{
                "character": {
                    "type": "avatar",
                    "avatar_id": self.avatar.avatar_id,
                    "avatar_style": "normal",
                },
                "voice": {
                    "type": "text",
                    "input_text": script.text,
                    "voice_id": self.avatar.voice_id,
                },
            }],
            "dimension": { "width": WIDTH, "height": HEIGHT },
        })
    }

    async fn submit(&self, script: &Script) -> Result<String, StageError> {
        let url = format!("{}/v2/video/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .json(&self.generate_body(script))
            .send()
            .await
            .map_err(StageError::transport(PROVIDER))?;

        let envelope: Envelope<GenerateData> = http::read_json(PROVIDER, response).await?;
        match envelope.data {
            Some(data) => Ok(data.video_id),
            None => Err(StageError::Render {
                provider: PROVIDER,
                message: describe_error(envelope.error.as_ref()),
            }),
        }
    }

    async fn status(&self, video_id: &str) -> Result<JobStatus<String>, StageError> {
        let url = format!("{}/v1/video_status.get", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(&[("video_id", video_id)])
            .send()
            .await
            .map_err(StageError::transport(PROVIDER))?;

        let envelope: Envelope<StatusData> = http::read_json(PROVIDER, response).await?;
        let data = envelope.data.ok_or_else(|| StageError::Decode {
            provider: PROVIDER,
            message: describe_error(envelope.error.as_ref()),
        })?;

        Ok(job_status(data))
    }

    async fn checked_status(&self, job_id: &str) -> Result<JobStatus<String>, StageError> {
        http::with_retry(PROVIDER, &self.retry, || self.status(job_id)).await
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, StageError> {
        http::with_retry(PROVIDER, &self.retry, || {
            http::download_to(&self.client, PROVIDER, url, dest)
        })
        .await
    }
}

/// Once a job exists, a retry of the whole stage would submit (and bill) a
/// second render, so leftover transient errors become render failures.
fn after_submit(job_id: &str, error: StageError) -> StageError {
    if error.is_transient() {
        StageError::Render {
            provider: PROVIDER,
            message: format!("job {}: {}", job_id, error),
        }
    } else {
        error
    }
}

fn job_status(data: StatusData) -> JobStatus<String> {
    match data.status.as_str() {
        "completed" => match data.video_url {
            Some(url) if !url.is_empty() => JobStatus::Done(url),
            _ => JobStatus::Failed("completed without a video_url".to_string()),
        },
        "failed" => JobStatus::Failed(describe_error(data.error.as_ref())),
        _ => JobStatus::Pending,
    }
}

fn describe_error(error: Option<&serde_json::Value>) -> String {
    match error {
        Some(serde_json::Value::String(message)) => message.clone(),
        Some(value) if !value.is_null() => value
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        _ => "unknown error".to_string(),
    }
}

#[async_trait]
impl VideoSynthesizer for HeyGenRenderer {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip(self, script), fields(provider = PROVIDER, dest = %dest.display()))]
    async fn render(&self, script: &Script, dest: &Path) -> Result<VideoArtifact, StageError> {
        let video_id = self.submit(script).await?;
        info!(%video_id, "Render job submitted");

        let video_url = poll_job(&video_id, self.poll_interval, self.render_timeout, || {
            self.checked_status(&video_id)
        })
        .await
        .map_err(|failure| match failure {
            PollFailure::Failed(message) => StageError::Render {
                provider: PROVIDER,
                message,
            },
            PollFailure::TimedOut(waited) => StageError::RenderTimeout {
                provider: PROVIDER,
                job_id: video_id.clone(),
                waited,
            },
            PollFailure::Check(e) => after_submit(&video_id, e),
        })?;

        let bytes = self
            .download(&video_url, dest)
            .await
            .map_err(|e| after_submit(&video_id, e))?;
        if bytes == 0 {
            return Err(StageError::Render {
                provider: PROVIDER,
                message: "downloaded video is empty".to_string(),
            });
        }

        Ok(VideoArtifact {
            path: dest.to_path_buf(),
            provider: PROVIDER.to_string(),
            job_id: video_id,
            bytes,
        })
    }
}
