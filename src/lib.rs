//! awareness-bot - daily mental-health awareness video pipeline
//!
//! One run takes a trending topic, writes a short narration script about it,
//! renders an avatar video of the narration and publishes the video as an
//! Instagram Reel.
//!
//! # Architecture
//!
//! - Each stage is a trait with one implementation per provider
//! - Stages run strictly in order; a failure ends the run
//! - Every transition is journaled; run state is derived by replaying events
//!
//! # Modules
//!
//! - `adapters`: Provider integrations (SerpApi, NewsAPI, OpenAI, HeyGen, D-ID, Instagram)
//! - `config`: Environment and config-file resolution
//! - `core`: Orchestration logic (Orchestrator, EventStore, Limits)
//! - `domain`: Data structures (Topic, Script, Event, Run)
//! - `error`: Stage errors
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Full daily run
//! awareness-bot run
//!
//! # Everything except publishing
//! awareness-bot run --dry-run
//!
//! # Check a past run
//! awareness-bot status <run-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;

// Re-export main types at crate root for convenience
pub use config::Settings;
pub use core::{Orchestrator, Providers, RunOptions};
pub use domain::{Caption, Event, EventType, Run, RunState, Script, Stage, Topic};
pub use error::StageError;
