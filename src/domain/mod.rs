//! Domain types for the awareness pipeline.
//!
//! This module contains the core data structures:
//! - Stage: The four pipeline stages and their statuses
//! - Content: Topic, Script, VideoArtifact, Caption, PublishResult
//! - Events: Immutable journal records of state changes
//! - Run: Pipeline execution state

pub mod content;
pub mod events;
pub mod run;
pub mod stage;

// Re-export commonly used types
pub use content::{Caption, Locale, PublishResult, Script, Topic, VideoArtifact};
pub use events::{Event, EventType};
pub use run::{Run, RunOutputs, RunState};
pub use stage::{Stage, StageStatus};
