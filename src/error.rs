//! Typed errors for stage operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::Stage;

/// Everything a stage can fail with.
#[derive(Debug, Error)]
pub enum StageError {
    /// A required credential or setting is missing or invalid
    #[error("Configuration error: {var} is not set")]
    Configuration { var: String },

    #[error("Invalid value for {var}: {message}")]
    InvalidSetting { var: String, message: String },

    #[error("{provider} API error ({status}): {body}")]
    Http {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected {provider} response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} returned no topic candidates")]
    NoTopic { provider: &'static str },

    #[error("{provider} render failed: {message}")]
    Render {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} render job {job_id} did not finish within {waited:?}")]
    RenderTimeout {
        provider: &'static str,
        job_id: String,
        waited: Duration,
    },

    #[error("Upload failed: {message}")]
    Upload { message: String },

    #[error("Stage '{stage}' timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    pub fn missing(var: impl Into<String>) -> Self {
        Self::Configuration { var: var.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transport(provider: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Transport { provider, source }
    }

    pub fn decode(provider: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |e| Self::Decode {
            provider,
            message: e.to_string(),
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StageError::Transport { .. } | StageError::Timeout { .. } => true,
            StageError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether this is a configuration problem (never retried)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StageError::Configuration { .. } | StageError::InvalidSetting { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_names_variable() {
        let err = StageError::missing("OPENAI_API_KEY");
        assert_eq!(err.to_string(), "Configuration error: OPENAI_API_KEY is not set");
        assert!(err.is_configuration());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        let http = |status| StageError::Http {
            provider: "openai",
            status,
            body: String::new(),
        };
        assert!(http(429).is_transient());
        assert!(http(503).is_transient());
        assert!(!http(401).is_transient());
        assert!(!http(400).is_transient());

        let timeout = StageError::Timeout {
            stage: Stage::Topic,
            after: Duration::from_secs(1),
        };
        assert!(timeout.is_transient());

        let upload = StageError::Upload {
            message: "rejected".to_string(),
        };
        assert!(!upload.is_transient());
    }
}
