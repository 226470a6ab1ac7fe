//! Core orchestration logic.
//!
//! This module contains:
//! - EventStore: Append-only run journal
//! - Limits: Timeouts and retry policy
//! - OutputPaths: Where the script and video land
//! - Orchestrator: Main execution engine

pub mod event_store;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod stages;

// Re-export commonly used types
pub use event_store::{file_digest, hash_content, EventStore};
pub use orchestrator::{Orchestrator, Providers, RunOptions};
pub use output::OutputPaths;
pub use pipeline::{Limits, RetryPolicy};
