//! Append-only run journal with file-based persistence.
//!
//! Events are stored as newline-delimited JSON (JSONL), one file per run at
//! `<runs_dir>/<run_id>/events.jsonl`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{Event, EventType, Run};
use crate::error::StageError;

/// File-based event store using JSONL format
pub struct EventStore {
    /// Directory containing the run
    run_dir: PathBuf,

    /// Path to the events.jsonl file
    events_path: PathBuf,
}

impl EventStore {
    /// Create or open the journal for a run
    pub async fn open(runs_dir: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = runs_dir.join(run_id.to_string());

        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        let events_path = run_dir.join("events.jsonl");

        Ok(Self {
            run_dir,
            events_path,
        })
    }

    /// Get the path to the events file
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Get the run directory
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open events file: {}",
                    self.events_path.display()
                )
            })?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Rebuild the run from its journal
    pub async fn load_run(&self) -> Result<Option<Run>> {
        let events = self.replay().await?;
        Ok(Run::from_events(&events))
    }

    /// Get the last event of a specific type
    pub async fn last_event_of_type(&self, event_type: EventType) -> Result<Option<Event>> {
        let events = self.replay().await?;
        Ok(events.into_iter().rev().find(|e| e.event_type == event_type))
    }

    /// List all run IDs under the runs directory
    pub async fn list_runs(runs_dir: &Path) -> Result<Vec<Uuid>> {
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(runs_dir)
            .await
            .with_context(|| format!("Failed to read runs directory: {}", runs_dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }

    /// Load every run under the runs directory, most recent first
    pub async fn load_runs(runs_dir: &Path, limit: usize) -> Result<Vec<Run>> {
        let mut runs = Vec::new();

        for run_id in Self::list_runs(runs_dir).await? {
            let store = Self::open(runs_dir, run_id).await?;
            if let Ok(Some(run)) = store.load_run().await {
                runs.push(run);
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);

        Ok(runs)
    }
}

/// Short content digest (first 16 hex chars of SHA-256)
pub fn hash_content(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// Digest of a file on disk
pub async fn file_digest(path: &Path) -> std::result::Result<String, StageError> {
    let bytes = fs::read(path)
        .await
        .map_err(|e| StageError::io(path, e))?;
    Ok(hash_content(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Stage, StageStatus};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_event_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let store = EventStore::open(temp.path(), run_id).await.unwrap();

        let event1 = Event::new(
            run_id,
            None,
            EventType::RunStarted,
            "Run started",
            StageStatus::Running,
        );
        let event2 = Event::new(
            run_id,
            Some(Stage::Topic),
            EventType::StageStarted,
            "Stage 'topic' attempt 1",
            StageStatus::Running,
        );

        store.append(&event1).await.unwrap();
        store.append(&event2).await.unwrap();

        let events = store.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::RunStarted);
        assert_eq!(events[1].stage, Some(Stage::Topic));
        assert!(store.events_path().starts_with(store.run_dir()));
    }

    #[tokio::test]
    async fn test_replay_of_missing_journal_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = EventStore::open(temp.path(), Uuid::new_v4()).await.unwrap();

        assert!(store.replay().await.unwrap().is_empty());
        assert!(store.load_run().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_event_of_type() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let store = EventStore::open(temp.path(), run_id).await.unwrap();

        for stage in [Stage::Topic, Stage::Script] {
            let event = Event::new(
                run_id,
                Some(stage),
                EventType::StageCompleted,
                format!("Stage '{}' completed", stage),
                StageStatus::Completed,
            );
            store.append(&event).await.unwrap();
        }

        let last = store
            .last_event_of_type(EventType::StageCompleted)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.stage, Some(Stage::Script));
        assert!(store
            .last_event_of_type(EventType::RunFailed)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_digest_of_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("video.mp4");

        let err = file_digest(&missing).await.unwrap_err();
        assert!(matches!(err, StageError::Io { ref path, .. } if *path == missing));

        tokio::fs::write(&missing, b"abc").await.unwrap();
        assert_eq!(file_digest(&missing).await.unwrap(), hash_content(b"abc"));
    }

    #[tokio::test]
    async fn test_list_runs_ignores_foreign_entries() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        EventStore::open(temp.path(), run_id).await.unwrap();
        std::fs::create_dir_all(temp.path().join("not-a-run")).unwrap();
        std::fs::write(temp.path().join("notes.txt"), "x").unwrap();

        let runs = EventStore::list_runs(temp.path()).await.unwrap();
        assert_eq!(runs, vec![run_id]);
    }

    #[test]
    fn test_hash_consistency() {
        let hash1 = hash_content(b"test input");
        let hash2 = hash_content(b"test input");
        let hash3 = hash_content(b"different input");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 16); // 8 bytes = 16 hex chars
    }
}
