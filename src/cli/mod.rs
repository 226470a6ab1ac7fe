//! Command-line interface for awareness-bot.
//!
//! Provides commands for the full daily run, each stage on its own,
//! inspecting past runs and showing the resolved configuration.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::{self, TrendSource, VideoProvider};
use crate::config::{vars, Settings};
use crate::core::{stages, EventStore, Orchestrator, RunOptions};
use crate::domain::{Caption, EventType, Locale, Run, RunState, Script, Stage, Topic};

/// awareness-bot - daily mental-health awareness video pipeline
#[derive(Parser, Debug)]
#[command(name = "awareness-bot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Defaults to `run`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline: topic, script, video, publish
    Run {
        /// Stop after rendering the video
        #[arg(long)]
        dry_run: bool,

        /// Locale hint for the topic source (e.g. en-US)
        #[arg(short, long)]
        locale: Option<String>,
    },

    /// Fetch today's topic and print it
    Topic {
        /// Topic provider (defaults to TREND_SOURCE)
        #[arg(short, long, value_enum)]
        source: Option<TrendSource>,

        /// Locale hint (e.g. en-US)
        #[arg(short, long)]
        locale: Option<String>,
    },

    /// Generate and save a script for a topic
    Script {
        /// Topic text
        topic: String,
    },

    /// Render the saved script into a video
    Render {
        /// Video provider (defaults to VIDEO_PROVIDER)
        #[arg(short, long, value_enum)]
        provider: Option<VideoProvider>,

        /// Script file (defaults to the configured script path)
        #[arg(long)]
        script_file: Option<PathBuf>,
    },

    /// Publish a video as a Reel
    Publish {
        /// Video file (defaults to the configured video path)
        #[arg(long)]
        video: Option<PathBuf>,

        /// Caption text
        #[arg(short, long)]
        caption: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Check the status of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::load()?;

        match self.command.unwrap_or(Commands::Run {
            dry_run: false,
            locale: None,
        }) {
            Commands::Run { dry_run, locale } => run_pipeline(&settings, dry_run, locale).await,
            Commands::Topic { source, locale } => fetch_topic(&settings, source, locale).await,
            Commands::Script { topic } => write_script(&settings, &topic).await,
            Commands::Render {
                provider,
                script_file,
            } => render_video(&settings, provider, script_file).await,
            Commands::Publish { video, caption } => {
                publish_video(&settings, video, &caption).await
            }
            Commands::Runs { limit } => list_runs(&settings, limit).await,
            Commands::Status { run_id } => show_status(&settings, &run_id).await,
            Commands::Config => show_config(&settings),
        }
    }
}

fn parse_locale(raw: Option<String>, settings: &Settings) -> Result<Option<Locale>> {
    match raw {
        Some(raw) => Locale::parse(&raw)
            .map(Some)
            .with_context(|| format!("Invalid locale: '{}'", raw)),
        None => Ok(settings.locale.clone()),
    }
}

/// Run the full pipeline
async fn run_pipeline(settings: &Settings, dry_run: bool, locale: Option<String>) -> Result<()> {
    let options = RunOptions {
        dry_run,
        locale: parse_locale(locale, settings)?,
    };

    let orchestrator = Orchestrator::from_settings(settings)?;
    let run = orchestrator.run(&options).await?;

    match &run.state {
        RunState::Completed => {
            if let Some(topic) = &run.outputs.topic {
                println!("Topic:  {}", topic);
            }
            println!("Script: {}", orchestrator.paths().script.display());
            if let Some(video) = &run.outputs.video {
                println!("Video:  {} ({} bytes)", video.path.display(), video.bytes);
            }
            match &run.outputs.publish {
                Some(result) => println!(
                    "Reel:   {}",
                    result.media_id.as_deref().unwrap_or("(no media id)")
                ),
                None => println!("Reel:   (dry run, not published)"),
            }
            eprintln!("\n[Run {} completed successfully]", run.id);
        }
        RunState::Failed { stage, error } => {
            let stage = stage.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string());
            eprintln!("\n[Run {} failed at {}: {}]", run.id, stage, error);
            std::process::exit(1);
        }
        RunState::Running => {
            eprintln!("\n[Run {} in state: {}]", run.id, run.state.label());
        }
    }

    Ok(())
}

/// Fetch a topic without running later stages
async fn fetch_topic(
    settings: &Settings,
    source: Option<TrendSource>,
    locale: Option<String>,
) -> Result<()> {
    let locale = parse_locale(locale, settings)?;
    let topics = adapters::topic_source(settings, source.unwrap_or(settings.trend_source))?;

    let topic = topics.fetch_topic(locale.as_ref()).await?;
    println!("{}", topic);
    eprintln!("[source: {}]", topic.source);

    Ok(())
}

/// Generate a script for a given topic
async fn write_script(settings: &Settings, topic: &str) -> Result<()> {
    if topic.trim().is_empty() {
        anyhow::bail!("Topic is empty");
    }

    let generator = adapters::script_generator(settings)?;
    let topic = Topic::new(topic, "cli");
    let script = stages::write_script(
        generator.as_ref(),
        &topic,
        &settings.paths,
        settings.content.min_words..=settings.content.max_words,
    )
    .await?;

    println!("{}", script.text);
    eprintln!(
        "\n[{} words written to {}]",
        script.word_count(),
        settings.paths.script.display()
    );

    Ok(())
}

/// Render a saved script
async fn render_video(
    settings: &Settings,
    provider: Option<VideoProvider>,
    script_file: Option<PathBuf>,
) -> Result<()> {
    let synthesizer =
        adapters::video_synthesizer(settings, provider.unwrap_or(settings.video_provider))?;

    let text = match script_file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read script file: {}", path.display()))?,
        None => settings.paths.read_script().await?,
    };
    if text.trim().is_empty() {
        anyhow::bail!("Script is empty");
    }

    let script = Script {
        topic: String::new(),
        text: text.trim().to_string(),
    };
    let video = stages::render_video(synthesizer.as_ref(), &script, &settings.paths).await?;

    println!("{}", video.path.display());
    eprintln!("[{} bytes from {}, job {}]", video.bytes, video.provider, video.job_id);

    Ok(())
}

/// Publish an existing video
async fn publish_video(settings: &Settings, video: Option<PathBuf>, caption: &str) -> Result<()> {
    let publisher = adapters::publisher(settings)?;
    let video = video.unwrap_or_else(|| settings.paths.video.clone());

    let result = publisher.publish(&video, &Caption::new(caption)).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        eprintln!("\n[Publish of {} was not confirmed]", video.display());
        std::process::exit(1);
    }

    Ok(())
}

/// List recent runs
async fn list_runs(settings: &Settings, limit: usize) -> Result<()> {
    let runs = EventStore::load_runs(&settings.paths.runs_dir(), limit).await?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("{:<38} {:<22} {:<11} {}", "RUN ID", "STARTED", "STATE", "TOPIC");
    println!("{}", "-".repeat(100));

    for run in runs {
        println!(
            "{:<38} {:<22} {:<11} {}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.state.label(),
            run.topic.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

/// Show the status of a run
async fn show_status(settings: &Settings, run_id_str: &str) -> Result<()> {
    let run_id =
        Uuid::parse_str(run_id_str).with_context(|| format!("Invalid run ID: {}", run_id_str))?;

    let runs_dir = settings.paths.runs_dir();
    if !runs_dir.join(run_id.to_string()).is_dir() {
        anyhow::bail!("Run not found: {}", run_id);
    }

    let store = EventStore::open(&runs_dir, run_id).await?;
    print!("{}", status_report(&store).await?);

    Ok(())
}

/// Render a run's replayed state, including the last stage failure if any
async fn status_report(store: &EventStore) -> Result<String> {
    let run: Run = store
        .load_run()
        .await?
        .with_context(|| format!("No events in {}", store.events_path().display()))?;

    let mut out = String::new();
    writeln!(out, "Run ID:  {}", run.id)?;
    writeln!(out, "State:   {}", run.state.label())?;
    writeln!(out, "Started: {}", run.started_at)?;
    if let Some(completed) = run.completed_at {
        writeln!(out, "Ended:   {}", completed)?;
    }
    if let Some(topic) = &run.topic {
        writeln!(out, "Topic:   {}", topic)?;
    }
    if let RunState::Failed { error, .. } = &run.state {
        writeln!(out, "Error:   {}", error)?;
    }

    writeln!(out, "\nStage statuses:")?;
    for stage in Stage::ALL {
        writeln!(out, "  {:<8} {}", stage.as_str(), run.status_of(stage))?;
    }

    if let Some(failure) = store.last_event_of_type(EventType::StageFailed).await? {
        writeln!(
            out,
            "\nLast failure ({}):",
            failure.timestamp.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(out, "  {}", failure.summary)?;
        if let Some(error) = &failure.error {
            writeln!(out, "  {}", error)?;
        }
    }

    Ok(out)
}

/// Show resolved configuration, never credential values
fn show_config(settings: &Settings) -> Result<()> {
    println!(
        "Config file: {}",
        settings
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Providers:");
    println!("  Trend source:   {}", settings.trend_source);
    println!(
        "  Locale:         {}",
        settings
            .locale
            .as_ref()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "(provider default)".to_string())
    );
    println!("  OpenAI model:   {}", settings.openai_model);
    println!("  Video provider: {}", settings.video_provider);
    println!();
    println!("Paths:");
    println!("  Output: {}", settings.paths.output_dir.display());
    println!("  Script: {}", settings.paths.script.display());
    println!("  Video:  {}", settings.paths.video.display());
    println!("  Runs:   {}", settings.paths.runs_dir().display());
    println!();
    println!("Limits:");
    println!("  Stage timeout:  {}s", settings.limits.stage_timeout_seconds);
    println!("  Render timeout: {}s", settings.limits.render_timeout_seconds);
    println!("  Poll interval:  {}s", settings.limits.poll_interval_seconds);
    println!("  Max attempts:   {}", settings.limits.retry.max_attempts);
    println!();
    println!("Credentials:");
    for var in vars::CREDENTIALS {
        let state = if settings.credentials().is_set(var) {
            "set"
        } else {
            "missing"
        };
        println!("  {:<24} {}", var, state);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Event, StageStatus};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_status_report_shows_last_failure() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let store = EventStore::open(temp.path(), run_id).await.unwrap();

        let events = [
            Event::new(
                run_id,
                None,
                EventType::RunStarted,
                "Run started",
                StageStatus::Running,
            ),
            Event::new(
                run_id,
                Some(Stage::Topic),
                EventType::StageFailed,
                "Stage 'topic' failed after 3 attempt(s)",
                StageStatus::Failed,
            )
            .with_error("newsapi returned HTTP 503"),
            Event::new(
                run_id,
                Some(Stage::Topic),
                EventType::RunFailed,
                "Run failed at stage 'topic'",
                StageStatus::Failed,
            )
            .with_error("newsapi returned HTTP 503"),
        ];
        for event in &events {
            store.append(event).await.unwrap();
        }

        let report = status_report(&store).await.unwrap();

        assert!(report.contains(&format!("Run ID:  {}", run_id)));
        assert!(report.contains("  topic    failed"));
        assert!(report.contains("Last failure"));
        assert!(report.contains("  Stage 'topic' failed after 3 attempt(s)\n"));
    }

    #[tokio::test]
    async fn test_status_report_without_failures() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let store = EventStore::open(temp.path(), run_id).await.unwrap();
        store
            .append(&Event::new(
                run_id,
                None,
                EventType::RunStarted,
                "Run started",
                StageStatus::Running,
            ))
            .await
            .unwrap();

        let report = status_report(&store).await.unwrap();

        assert!(report.contains("  publish  pending"));
        assert!(!report.contains("Last failure"));
    }

    #[tokio::test]
    async fn test_status_report_of_empty_journal_is_error() {
        let temp = TempDir::new().unwrap();
        let store = EventStore::open(temp.path(), Uuid::new_v4()).await.unwrap();

        assert!(status_report(&store).await.is_err());
    }
}
