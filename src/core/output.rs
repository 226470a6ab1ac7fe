//! Local output files: the narration script and the rendered video.
//!
//! Both live at fixed paths and are overwritten on every run.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::domain::Script;
use crate::error::StageError;

/// Where a run writes its outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub output_dir: PathBuf,
    pub script: PathBuf,
    pub video: PathBuf,
}

impl OutputPaths {
    pub fn new(output_dir: PathBuf, script: PathBuf, video: PathBuf) -> Self {
        Self {
            output_dir,
            script,
            video,
        }
    }

    /// All outputs inside one directory with the default file names
    pub fn in_dir(output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            script: output_dir.join("script.txt"),
            video: output_dir.join("video.mp4"),
            output_dir,
        }
    }

    /// Directory holding the per-run journals
    pub fn runs_dir(&self) -> PathBuf {
        self.output_dir.join("runs")
    }

    /// Persist the script text verbatim, replacing any previous script
    pub async fn write_script(&self, script: &Script) -> Result<(), StageError> {
        ensure_parent(&self.script).await?;
        fs::write(&self.script, script.text.as_bytes())
            .await
            .map_err(|e| StageError::io(&self.script, e))
    }

    pub async fn read_script(&self) -> Result<String, StageError> {
        fs::read_to_string(&self.script)
            .await
            .map_err(|e| StageError::io(&self.script, e))
    }
}

/// Create the parent directory of `path` if needed
pub async fn ensure_parent(path: &Path) -> Result<(), StageError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|e| StageError::io(parent, e)),
        _ => Ok(()),
    }
}
