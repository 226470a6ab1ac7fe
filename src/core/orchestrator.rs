//! Main orchestrator for the daily pipeline.
//!
//! Runs topic -> script -> video -> publish strictly in order, journaling
//! every transition, applying per-stage timeouts and retrying transient
//! failures. A failed stage ends the run; later stages never start.

use std::future::Future;
use std::ops::RangeInclusive;
use std::time::Instant;

use anyhow::Result;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{self, Publisher, ScriptGenerator, TopicSource, VideoSynthesizer};
use crate::config::Settings;
use crate::domain::{Caption, Event, EventType, Locale, Run, RunState, Stage, StageStatus};
use crate::error::StageError;

use super::event_store::{file_digest, hash_content, EventStore};
use super::output::OutputPaths;
use super::pipeline::Limits;
use super::stages;

/// One provider per stage
pub struct Providers {
    pub topics: Box<dyn TopicSource>,
    pub scripts: Box<dyn ScriptGenerator>,
    pub videos: Box<dyn VideoSynthesizer>,
    pub publisher: Box<dyn Publisher>,
}

impl Providers {
    /// Build the configured providers in stage order.
    ///
    /// The first missing credential aborts construction, so a run without
    /// credentials fails at the topic stage before any request is made.
    pub fn from_settings(settings: &Settings) -> std::result::Result<Self, StageError> {
        Ok(Self {
            topics: adapters::topic_source(settings, settings.trend_source)?,
            scripts: adapters::script_generator(settings)?,
            videos: adapters::video_synthesizer(settings, settings.video_provider)?,
            publisher: adapters::publisher(settings)?,
        })
    }
}

/// Per-run switches
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after rendering; never publish
    pub dry_run: bool,

    /// Locale hint for the topic source
    pub locale: Option<Locale>,
}

/// Main pipeline orchestrator
pub struct Orchestrator {
    providers: Providers,
    paths: OutputPaths,
    limits: Limits,
    hashtags: Vec<String>,
    word_range: RangeInclusive<usize>,
}

impl Orchestrator {
    /// Create an orchestrator over explicit providers
    pub fn new(providers: Providers, paths: OutputPaths, limits: Limits) -> Self {
        Self {
            providers,
            paths,
            limits,
            hashtags: Vec::new(),
            word_range: 115..=150,
        }
    }

    /// Create an orchestrator with the configured providers
    pub fn from_settings(settings: &Settings) -> std::result::Result<Self, StageError> {
        let providers = Providers::from_settings(settings)?;
        Ok(Self::new(providers, settings.paths.clone(), settings.limits.clone())
            .with_hashtags(settings.content.hashtags.clone())
            .with_word_range(settings.content.min_words..=settings.content.max_words))
    }

    pub fn with_hashtags(mut self, hashtags: Vec<String>) -> Self {
        self.hashtags = hashtags;
        self
    }

    pub fn with_word_range(mut self, word_range: RangeInclusive<usize>) -> Self {
        self.word_range = word_range;
        self
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Execute one full run
    #[instrument(skip(self, options), fields(dry_run = options.dry_run))]
    pub async fn run(&self, options: &RunOptions) -> Result<Run> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "Starting daily run");

        let store = EventStore::open(&self.paths.runs_dir(), run_id).await?;
        let mut run = Run::new(run_id);

        let start_event = Event::new(
            run_id,
            None,
            EventType::RunStarted,
            format!(
                "Run started with {} -> {} -> {} -> {}",
                self.providers.topics.name(),
                self.providers.scripts.name(),
                self.providers.videos.name(),
                self.providers.publisher.name()
            ),
            StageStatus::Running,
        );
        self.record(&store, &mut run, start_event).await?;

        // Topic
        let locale = options.locale.as_ref();
        let (topic, duration_ms) = match self
            .execute_stage(&store, &mut run, Stage::Topic, || {
                self.providers.topics.fetch_topic(locale)
            })
            .await?
        {
            Ok(done) => done,
            Err(e) => return self.fail_run(&store, &mut run, Stage::Topic, e).await,
        };
        let event = self
            .completed(run_id, Stage::Topic, duration_ms, format!("Topic '{}'", topic))
            .with_detail(topic.text.clone());
        self.record(&store, &mut run, event).await?;
        run.outputs.topic = Some(topic.clone());

        // Script
        let (script, duration_ms) = match self
            .execute_stage(&store, &mut run, Stage::Script, || {
                stages::write_script(
                    self.providers.scripts.as_ref(),
                    &topic,
                    &self.paths,
                    self.word_range.clone(),
                )
            })
            .await?
        {
            Ok(done) => done,
            Err(e) => return self.fail_run(&store, &mut run, Stage::Script, e).await,
        };
        let event = self
            .completed(
                run_id,
                Stage::Script,
                duration_ms,
                format!("Script of {} words", script.word_count()),
            )
            .with_detail(self.paths.script.display().to_string())
            .with_digest(hash_content(script.text.as_bytes()));
        self.record(&store, &mut run, event).await?;
        run.outputs.script = Some(script.clone());

        // Video
        let (video, duration_ms) = match self
            .execute_stage(&store, &mut run, Stage::Video, || {
                stages::render_video(self.providers.videos.as_ref(), &script, &self.paths)
            })
            .await?
        {
            Ok(done) => done,
            Err(e) => return self.fail_run(&store, &mut run, Stage::Video, e).await,
        };
        let digest = match file_digest(&video.path).await {
            Ok(digest) => digest,
            Err(e) => {
                let fail_event = Event::new(
                    run_id,
                    Some(Stage::Video),
                    EventType::StageFailed,
                    "Rendered video is unreadable",
                    StageStatus::Failed,
                )
                .with_duration(duration_ms)
                .with_error(e.to_string());
                self.record(&store, &mut run, fail_event).await?;
                return self.fail_run(&store, &mut run, Stage::Video, e).await;
            }
        };
        let event = self
            .completed(
                run_id,
                Stage::Video,
                duration_ms,
                format!("Video of {} bytes from {}", video.bytes, video.provider),
            )
            .with_detail(video.path.display().to_string())
            .with_digest(digest);
        self.record(&store, &mut run, event).await?;
        run.outputs.video = Some(video.clone());

        // Publish
        if options.dry_run {
            let event = Event::new(
                run_id,
                Some(Stage::Publish),
                EventType::StageSkipped,
                "Dry run: publishing skipped",
                StageStatus::Skipped,
            );
            self.record(&store, &mut run, event).await?;
            return self.complete_run(&store, &mut run).await;
        }

        let caption = Caption::for_topic(&topic, &self.hashtags);
        let (result, duration_ms) = match self
            .execute_stage(&store, &mut run, Stage::Publish, || {
                self.providers.publisher.publish(&video.path, &caption)
            })
            .await?
        {
            Ok((result, _)) if !result.success => {
                let e = StageError::Upload {
                    message: format!("publish was not confirmed: {}", result.response),
                };
                return self.fail_run(&store, &mut run, Stage::Publish, e).await;
            }
            Ok(done) => done,
            Err(e) => return self.fail_run(&store, &mut run, Stage::Publish, e).await,
        };
        let mut event = self.completed(
            run_id,
            Stage::Publish,
            duration_ms,
            format!("Published via {}", self.providers.publisher.name()),
        );
        if let Some(ref media_id) = result.media_id {
            event = event.with_detail(media_id.clone());
        }
        self.record(&store, &mut run, event).await?;
        run.outputs.publish = Some(result);

        self.complete_run(&store, &mut run).await
    }

    /// Run one stage with timeout and retry.
    ///
    /// The outer result carries journal failures; the inner one the stage
    /// outcome with its duration in milliseconds.
    async fn execute_stage<T, F, Fut>(
        &self,
        store: &EventStore,
        run: &mut Run,
        stage: Stage,
        mut attempt_fn: F,
    ) -> Result<std::result::Result<(T, u64), StageError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, StageError>>,
    {
        let policy = self.limits.retry_for(stage);
        let timeout = self.limits.stage_timeout(stage);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let stage_start = Instant::now();

            let start_event = Event::new(
                run.id,
                Some(stage),
                EventType::StageStarted,
                format!("Stage '{}' attempt {}", stage, attempt),
                StageStatus::Running,
            );
            self.record(store, run, start_event).await?;

            let result = match tokio::time::timeout(timeout, attempt_fn()).await {
                Ok(result) => result,
                Err(_) => Err(StageError::Timeout {
                    stage,
                    after: timeout,
                }),
            };

            let duration_ms = stage_start.elapsed().as_millis() as u64;

            let e = match result {
                Ok(value) => return Ok(Ok((value, duration_ms))),
                Err(e) => e,
            };

            if e.is_transient() && policy.should_retry(attempt) {
                let delay = policy.delay_for_attempt(attempt);

                let retry_event = Event::new(
                    run.id,
                    Some(stage),
                    EventType::StageRetrying,
                    format!("Stage '{}' failed, retrying in {:?}", stage, delay),
                    StageStatus::Running,
                )
                .with_error(e.to_string());
                self.record(store, run, retry_event).await?;

                warn!(
                    %stage,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Stage failed, retrying"
                );

                tokio::time::sleep(delay).await;
                continue;
            }

            let fail_event = Event::new(
                run.id,
                Some(stage),
                EventType::StageFailed,
                format!("Stage '{}' failed after {} attempt(s)", stage, attempt),
                StageStatus::Failed,
            )
            .with_duration(duration_ms)
            .with_error(e.to_string());
            self.record(store, run, fail_event).await?;

            error!(%stage, attempt, error = %e, "Stage failed permanently");
            return Ok(Err(e));
        }
    }

    fn completed(&self, run_id: Uuid, stage: Stage, duration_ms: u64, summary: String) -> Event {
        info!(%stage, duration_ms, "{}", summary);
        Event::new(
            run_id,
            Some(stage),
            EventType::StageCompleted,
            summary,
            StageStatus::Completed,
        )
        .with_duration(duration_ms)
    }

    /// Append to the journal and apply to the in-memory run, keeping the two identical
    async fn record(&self, store: &EventStore, run: &mut Run, event: Event) -> Result<()> {
        store.append(&event).await?;
        run.apply_event(&event);
        Ok(())
    }

    /// Handle a run failure
    async fn fail_run(
        &self,
        store: &EventStore,
        run: &mut Run,
        stage: Stage,
        error: StageError,
    ) -> Result<Run> {
        let error_msg = error.to_string();
        error!(%stage, %error_msg, "Run failed");

        let event = Event::new(
            run.id,
            Some(stage),
            EventType::RunFailed,
            format!("Run failed at stage '{}'", stage),
            StageStatus::Failed,
        )
        .with_error(error_msg);
        self.record(store, run, event).await?;

        Ok(run.clone())
    }

    /// Complete a successful run
    async fn complete_run(&self, store: &EventStore, run: &mut Run) -> Result<Run> {
        info!(run_id = %run.id, "Run completed successfully");

        let event = Event::new(
            run.id,
            None,
            EventType::RunCompleted,
            "Run completed",
            StageStatus::Completed,
        );
        self.record(store, run, event).await?;
        debug_assert_eq!(run.state, RunState::Completed);

        Ok(run.clone())
    }
}
