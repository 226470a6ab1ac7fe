//! Instagram Reels publisher (Instagram Graph API, resumable upload).
//!
//! 1. POST /{ig-user-id}/media with `upload_type=resumable` creates a container
//! 2. POST the video bytes to the container's rupload URI
//! 3. Poll GET /{container-id}?fields=status_code until FINISHED
//! 4. POST /{ig-user-id}/media_publish with `creation_id`
//!
//! Steps 1-3 are retried on transient errors; step 4 is sent once so a lost
//! response can never produce a second post. Every failure past credential
//! lookup surfaces as [`StageError::Upload`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, instrument};

use super::poll::{poll_job, JobStatus, PollFailure};
use super::{http, Publisher};
use crate::config::{vars, Settings};
use crate::core::pipeline::RetryPolicy;
use crate::domain::{Caption, PublishResult};
use crate::error::StageError;

const PROVIDER: &str = "instagram";
const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0";
const UPLOAD_BASE: &str = "https://rupload.facebook.com/ig-api-upload/v19.0";

pub struct InstagramPublisher {
    access_token: String,
    user_id: String,
    poll_interval: Duration,
    processing_timeout: Duration,
    retry: RetryPolicy,
    graph_url: String,
    upload_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ContainerResponse {
    id: String,
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    #[serde(default)]
    status_code: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl InstagramPublisher {
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            user_id: user_id.into(),
            poll_interval: Duration::from_secs(10),
            processing_timeout: Duration::from_secs(900),
            retry: RetryPolicy::default(),
            graph_url: GRAPH_API_BASE.to_string(),
            upload_url: UPLOAD_BASE.to_string(),
            client: http::client(),
        }
    }

    /// Fails with a configuration error when `INSTAGRAM_ACCESS_TOKEN` or
    /// `INSTAGRAM_USER_ID` is absent
    pub fn from_settings(settings: &Settings) -> Result<Self, StageError> {
        let access_token = settings.credential(vars::INSTAGRAM_ACCESS_TOKEN)?;
        let user_id = settings.credential(vars::INSTAGRAM_USER_ID)?;
        Ok(Self::new(access_token, user_id)
            .with_polling(settings.limits.poll_interval(), settings.limits.render_timeout())
            .with_retry_policy(settings.limits.retry.clone()))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.processing_timeout = timeout;
        self
    }

    pub fn with_base_urls(mut self, graph_url: &str, upload_url: &str) -> Self {
        self.graph_url = graph_url.trim_end_matches('/').to_string();
        self.upload_url = upload_url.trim_end_matches('/').to_string();
        self
    }

    async fn create_container(&self, caption: &Caption) -> Result<ContainerResponse, StageError> {
        let url = format!("{}/{}/media", self.graph_url, self.user_id);
        let params = [
            ("media_type", "REELS"),
            ("upload_type", "resumable"),
            ("share_to_feed", "true"),
            ("caption", caption.as_str()),
            ("access_token", self.access_token.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(StageError::transport(PROVIDER))?;

        http::read_json(PROVIDER, response).await
    }

    async fn upload(&self, container: &ContainerResponse, bytes: &[u8]) -> Result<(), StageError> {
        let uri = container
            .uri
            .clone()
            .unwrap_or_else(|| format!("{}/{}", self.upload_url, container.id));
        let size = bytes.len();

        let response = self
            .client
            .post(&uri)
            .header("Authorization", format!("OAuth {}", self.access_token))
            .header("offset", "0")
            .header("file_size", size.to_string())
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(StageError::transport(PROVIDER))?;

        let upload: UploadResponse = http::read_json(PROVIDER, response).await?;
        if !upload.success {
            return Err(StageError::Upload {
                message: upload
                    .message
                    .unwrap_or_else(|| "upload was not acknowledged".to_string()),
            });
        }

        info!(bytes = size, "Video bytes uploaded");
        Ok(())
    }

    async fn container_status(&self, container_id: &str) -> Result<JobStatus<()>, StageError> {
        let url = format!("{}/{}", self.graph_url, container_id);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("fields", "status_code,status"),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(StageError::transport(PROVIDER))?;

        let status: ContainerStatus = http::read_json(PROVIDER, response).await?;
        Ok(container_job_status(status))
    }

    async fn checked_status(&self, container_id: &str) -> Result<JobStatus<()>, StageError> {
        http::with_retry(PROVIDER, &self.retry, || self.container_status(container_id)).await
    }

    async fn publish_container(&self, container_id: &str) -> Result<serde_json::Value, StageError> {
        let url = format!("{}/{}/media_publish", self.graph_url, self.user_id);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("creation_id", container_id),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(StageError::transport(PROVIDER))?;

        http::read_json(PROVIDER, response).await
    }
}

fn container_job_status(status: ContainerStatus) -> JobStatus<()> {
    match status.status_code.as_deref() {
        Some("FINISHED") | Some("PUBLISHED") => JobStatus::Done(()),
        Some("ERROR") | Some("EXPIRED") => JobStatus::Failed(
            status
                .status
                .unwrap_or_else(|| "container processing failed".to_string()),
        ),
        _ => JobStatus::Pending,
    }
}

/// Fold provider-call failures into upload failures
fn as_upload_error(error: StageError) -> StageError {
    match error {
        StageError::Http { status, body, .. } => StageError::Upload {
            message: format!("Instagram API error ({}): {}", status, body),
        },
        StageError::Transport { source, .. } => StageError::Upload {
            message: format!("network failure: {}", source),
        },
        StageError::Decode { message, .. } => StageError::Upload {
            message: format!("unexpected response: {}", message),
        },
        other => other,
    }
}

fn media_id(response: &serde_json::Value) -> Option<String> {
    response
        .get("id")
        .and_then(|id| id.as_str())
        .map(str::to_string)
}

#[async_trait]
impl Publisher for InstagramPublisher {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip(self, caption), fields(provider = PROVIDER, video = %video.display()))]
    async fn publish(&self, video: &Path, caption: &Caption) -> Result<PublishResult, StageError> {
        let bytes = tokio::fs::read(video)
            .await
            .map_err(|e| StageError::io(video, e))?;
        if bytes.is_empty() {
            return Err(StageError::Upload {
                message: format!("{} is empty", video.display()),
            });
        }

        let container = http::with_retry(PROVIDER, &self.retry, || self.create_container(caption))
            .await
            .map_err(as_upload_error)?;
        info!(container_id = %container.id, "Media container created");

        http::with_retry(PROVIDER, &self.retry, || self.upload(&container, &bytes))
            .await
            .map_err(as_upload_error)?;

        poll_job(&container.id, self.poll_interval, self.processing_timeout, || {
            self.checked_status(&container.id)
        })
        .await
        .map_err(|failure| match failure {
            PollFailure::Failed(message) => StageError::Upload { message },
            PollFailure::TimedOut(waited) => StageError::Upload {
                message: format!(
                    "container {} was not ready after {:?}",
                    container.id, waited
                ),
            },
            PollFailure::Check(e) => as_upload_error(e),
        })?;

        let response = self
            .publish_container(&container.id)
            .await
            .map_err(as_upload_error)?;
        let media_id = media_id(&response);
        info!(media_id = ?media_id, "Reel published");

        Ok(PublishResult {
            success: media_id.is_some(),
            video_path: video.to_path_buf(),
            caption: caption.as_str().to_string(),
            media_id,
            response,
        })
    }
}
