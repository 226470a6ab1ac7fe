//! Pipeline stages in execution order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the four pipeline stages.
///
/// Ordering follows execution order, so a `BTreeMap<Stage, _>` iterates
/// stages the way a run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Pick a trending topic
    Topic,

    /// Write narration for the topic
    Script,

    /// Render narration into a video file
    Video,

    /// Upload the video with a caption
    Publish,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 4] = [Stage::Topic, Stage::Script, Stage::Video, Stage::Publish];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Topic => "topic",
            Stage::Script => "script",
            Stage::Video => "video",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a stage within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet started
    #[default]
    Pending,

    /// Currently executing
    Running,

    /// Completed successfully
    Completed,

    /// Failed (with error)
    Failed,

    /// Deliberately not executed (dry run)
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_matches_execution() {
        let mut sorted = Stage::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, Stage::ALL.to_vec());
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Stage::Publish).unwrap(), "\"publish\"");
        assert_eq!(Stage::Video.to_string(), "video");
    }
}
