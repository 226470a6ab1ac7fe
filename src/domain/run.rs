//! Run state and reconstruction from journal events.
//!
//! A Run represents a single execution of the daily pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::content::{PublishResult, Script, Topic, VideoArtifact};
use super::events::{Event, EventType};
use super::stage::{Stage, StageStatus};

/// A pipeline execution run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Current state of the run
    pub state: RunState,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished (if applicable)
    pub completed_at: Option<DateTime<Utc>>,

    /// Status of each stage
    pub stage_statuses: BTreeMap<Stage, StageStatus>,

    /// Topic text, once the topic stage has completed
    pub topic: Option<String>,

    /// Stage outputs produced in this process (not rebuilt from the journal)
    #[serde(skip)]
    pub outputs: RunOutputs,
}

/// In-memory results of the stages that have completed
#[derive(Debug, Clone, Default)]
pub struct RunOutputs {
    pub topic: Option<Topic>,
    pub script: Option<Script>,
    pub video: Option<VideoArtifact>,
    pub publish: Option<PublishResult>,
}

impl Run {
    /// Create a new run
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            state: RunState::Running,
            started_at: Utc::now(),
            completed_at: None,
            stage_statuses: Stage::ALL
                .iter()
                .map(|s| (*s, StageStatus::Pending))
                .collect(),
            topic: None,
            outputs: RunOutputs::default(),
        }
    }

    /// Reconstruct run state from a sequence of events
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first_event = events.first()?;

        let mut run = Self::new(first_event.run_id);
        run.started_at = first_event.timestamp;

        for event in events {
            run.apply_event(event);
        }

        Some(run)
    }

    /// Apply a single event to update run state
    pub fn apply_event(&mut self, event: &Event) {
        match event.event_type {
            EventType::RunStarted => {
                self.state = RunState::Running;
                self.started_at = event.timestamp;
            }
            EventType::RunCompleted => {
                self.state = RunState::Completed;
                self.completed_at = Some(event.timestamp);
            }
            EventType::RunFailed => {
                self.state = RunState::Failed {
                    stage: event.stage,
                    error: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
            EventType::StageStarted | EventType::StageRetrying => {
                self.set_status(event, StageStatus::Running);
            }
            EventType::StageCompleted => {
                self.set_status(event, StageStatus::Completed);
                if event.stage == Some(Stage::Topic) {
                    self.topic = event.detail.clone();
                }
            }
            EventType::StageFailed => {
                self.set_status(event, StageStatus::Failed);
            }
            EventType::StageSkipped => {
                self.set_status(event, StageStatus::Skipped);
            }
        }
    }

    fn set_status(&mut self, event: &Event, status: StageStatus) {
        if let Some(stage) = event.stage {
            self.stage_statuses.insert(stage, status);
        }
    }

    /// Check if the run is still in progress
    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running)
    }

    /// Check if the run has finished (successfully or not)
    pub fn is_finished(&self) -> bool {
        !self.is_running()
    }

    pub fn status_of(&self, stage: Stage) -> StageStatus {
        self.stage_statuses.get(&stage).copied().unwrap_or_default()
    }

    /// The stage a failed run stopped at
    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.state {
            RunState::Failed { stage, .. } => *stage,
            _ => None,
        }
    }
}

/// State of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Currently executing
    #[default]
    Running,

    /// Completed successfully
    Completed,

    /// Failed with error
    Failed { stage: Option<Stage>, error: String },
}

impl RunState {
    pub fn label(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(run_id: Uuid, stage: Option<Stage>, event_type: EventType, status: StageStatus) -> Event {
        Event::new(run_id, stage, event_type, "test", status)
    }

    #[test]
    fn test_run_creation() {
        let run_id = Uuid::new_v4();
        let run = Run::new(run_id);

        assert_eq!(run.id, run_id);
        assert!(run.is_running());
        assert_eq!(run.status_of(Stage::Publish), StageStatus::Pending);
    }

    #[test]
    fn test_run_from_events() {
        let run_id = Uuid::new_v4();

        let events = vec![
            event(run_id, None, EventType::RunStarted, StageStatus::Running),
            event(run_id, Some(Stage::Topic), EventType::StageStarted, StageStatus::Running),
            event(run_id, Some(Stage::Topic), EventType::StageCompleted, StageStatus::Completed)
                .with_detail("Burnout recovery"),
            event(run_id, Some(Stage::Script), EventType::StageStarted, StageStatus::Running),
            event(run_id, Some(Stage::Script), EventType::StageFailed, StageStatus::Failed)
                .with_error("OpenAI API error"),
            event(run_id, Some(Stage::Script), EventType::RunFailed, StageStatus::Failed)
                .with_error("OpenAI API error"),
        ];

        let run = Run::from_events(&events).unwrap();

        assert_eq!(run.id, run_id);
        assert_eq!(run.topic.as_deref(), Some("Burnout recovery"));
        assert_eq!(run.status_of(Stage::Topic), StageStatus::Completed);
        assert_eq!(run.status_of(Stage::Script), StageStatus::Failed);
        assert_eq!(run.status_of(Stage::Video), StageStatus::Pending);
        assert_eq!(run.failed_stage(), Some(Stage::Script));
        assert!(run.is_finished());
    }

    #[test]
    fn test_from_empty_events() {
        assert!(Run::from_events(&[]).is_none());
    }
}
