//! D-ID talking-head renderer.
//!
//! Submit: POST /talks
//! Status: GET /talks/{id}
//! Auth: `Authorization: Basic <DID_API_KEY>`

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use super::poll::{poll_job, JobStatus, PollFailure};
use super::{http, VideoSynthesizer};
use crate::config::{vars, DidSettings, Settings};
use crate::core::pipeline::RetryPolicy;
use crate::domain::{Script, VideoArtifact};
use crate::error::StageError;

const PROVIDER: &str = "did";
const DID_API_URL: &str = "https://api.d-id.com";

pub struct DidRenderer {
    api_key: String,
    presenter: DidSettings,
    poll_interval: Duration,
    render_timeout: Duration,
    retry: RetryPolicy,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CreateTalkResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TalkResponse {
    status: String,
    #[serde(default)]
    result_url: Option<String>,
    #[serde(default)]
    error: Option<TalkError>,
}

#[derive(Debug, Deserialize)]
struct TalkError {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl DidRenderer {
    pub fn new(api_key: impl Into<String>, presenter: DidSettings) -> Self {
        Self {
            api_key: api_key.into(),
            presenter,
            poll_interval: Duration::from_secs(10),
            render_timeout: Duration::from_secs(900),
            retry: RetryPolicy::default(),
            base_url: DID_API_URL.to_string(),
            client: http::client(),
        }
    }

    /// Fails with a configuration error when `DID_API_KEY` is absent
    pub fn from_settings(settings: &Settings) -> Result<Self, StageError> {
        let api_key = settings.credential(vars::DID_API_KEY)?;
        Ok(Self::new(api_key, settings.did.clone())
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

    fn talk_body(&self, script: &Script) -> serde_json::Value {
        json!({
            "source_url": self.presenter.source_url,
            "script": {
                "type": "text",
                "input": script.text,
                "provider": {
                    "type": "microsoft",
                    "voice_id": self.presenter.voice_id,
                },
            },
            "config": { "stitch": true },
        })
    }

    fn auth_header(&self) -> String {
        format!("Basic {}", self.api_key)
    }

    async fn submit(&self, script: &Script) -> Result<String, StageError> {
        let url = format!("{}/talks", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&self.talk_body(script))
            .send()
            .await
            .map_err(StageError::transport(PROVIDER))?;

        let talk: CreateTalkResponse = http::read_json(PROVIDER, response).await?;
        Ok(talk.id)
    }

    async fn status(&self, talk_id: &str) -> Result<JobStatus<String>, StageError> {
        let url = format!("{}/talks/{}", self.base_url, talk_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(StageError::transport(PROVIDER))?;

        let talk: TalkResponse = http::read_json(PROVIDER, response).await?;
        Ok(job_status(talk))
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

fn job_status(talk: TalkResponse) -> JobStatus<String> {
    match talk.status.as_str() {
        "done" => match talk.result_url {
            Some(url) if !url.is_empty() => JobStatus::Done(url),
            _ => JobStatus::Failed("talk finished without a result_url".to_string()),
        },
        "error" | "rejected" => {
            let message = talk
                .error
                .and_then(|e| e.description.or(e.kind))
                .unwrap_or_else(|| format!("talk {}", talk.status));
            JobStatus::Failed(message)
        }
        _ => JobStatus::Pending,
    }
}

#[async_trait]
impl VideoSynthesizer for DidRenderer {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip(self, script), fields(provider = PROVIDER, dest = %dest.display()))]
    async fn render(&self, script: &Script, dest: &Path) -> Result<VideoArtifact, StageError> {
        let talk_id = self.submit(script).await?;
        info!(%talk_id, "Talk submitted");

        let result_url = poll_job(&talk_id, self.poll_interval, self.render_timeout, || {
            self.checked_status(&talk_id)
        })
        .await
        .map_err(|failure| match failure {
            PollFailure::Failed(message) => StageError::Render {
                provider: PROVIDER,
                message,
            },
            PollFailure::TimedOut(waited) => StageError::RenderTimeout {
                provider: PROVIDER,
                job_id: talk_id.clone(),
                waited,
            },
            PollFailure::Check(e) => after_submit(&talk_id, e),
        })?;

        let bytes = self
            .download(&result_url, dest)
            .await
            .map_err(|e| after_submit(&talk_id, e))?;
        if bytes == 0 {
            return Err(StageError::Render {
                provider: PROVIDER,
                message: "downloaded video is empty".to_string(),
            });
        }

        Ok(VideoArtifact {
            path: dest.to_path_buf(),
            provider: PROVIDER.to_string(),
            job_id: talk_id,
            bytes,
        })
    }
}
