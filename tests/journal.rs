//! Run Journal Integration Tests
//!
//! Tests for the JSONL event format, append order, replay and run listing.

use awareness_bot::core::{hash_content, EventStore};
use awareness_bot::domain::{Event, EventType, RunState, Stage, StageStatus};
use tempfile::TempDir;
use uuid::Uuid;

#[tokio::test]
async fn test_event_line_format() {
    let temp = TempDir::new().unwrap();
    let run_id = Uuid::new_v4();
    let store = EventStore::open(temp.path(), run_id).await.unwrap();

    let event = Event::new(
        run_id,
        Some(Stage::Script),
        EventType::StageCompleted,
        "Script of 132 words",
        StageStatus::Completed,
    )
    .with_digest(hash_content(b"narration"))
    .with_duration(840);
    store.append(&event).await.unwrap();

    let raw = tokio::fs::read_to_string(store.events_path()).await.unwrap();
    assert_eq!(raw.lines().count(), 1);

    let value: serde_json::Value = serde_json::from_str(raw.trim()).unwrap();
    assert_eq!(value["run_id"], run_id.to_string());
    assert_eq!(value["stage"], "script");
    assert_eq!(value["event_type"], "stage_completed");
    assert_eq!(value["status"], "completed");
    assert_eq!(value["duration_ms"], 840);
    assert_eq!(value["digest"].as_str().unwrap().len(), 16);

    // Unset optional fields are omitted
    assert!(value.get("error").is_none());
    assert!(value.get("detail").is_none());

    // Timestamp is ISO 8601
    assert!(value["timestamp"].as_str().unwrap().contains('T'));
}

#[tokio::test]
async fn test_replay_preserves_append_order() {
    let temp = TempDir::new().unwrap();
    let run_id = Uuid::new_v4();
    let store = EventStore::open(temp.path(), run_id).await.unwrap();

    let sequence = [
        (None, EventType::RunStarted, StageStatus::Running),
        (Some(Stage::Topic), EventType::StageStarted, StageStatus::Running),
        (Some(Stage::Topic), EventType::StageRetrying, StageStatus::Running),
        (Some(Stage::Topic), EventType::StageStarted, StageStatus::Running),
        (Some(Stage::Topic), EventType::StageCompleted, StageStatus::Completed),
    ];
    for (stage, event_type, status) in sequence {
        store
            .append(&Event::new(run_id, stage, event_type, "step", status))
            .await
            .unwrap();
    }

    let replayed: Vec<EventType> = store
        .replay()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    let expected: Vec<EventType> = sequence.iter().map(|(_, t, _)| *t).collect();
    assert_eq!(replayed, expected);

    let last = store
        .last_event_of_type(EventType::StageStarted)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.stage, Some(Stage::Topic));
}

#[tokio::test]
async fn test_failed_run_reconstruction() {
    let temp = TempDir::new().unwrap();
    let run_id = Uuid::new_v4();
    let store = EventStore::open(temp.path(), run_id).await.unwrap();

    let events = vec![
        Event::new(run_id, None, EventType::RunStarted, "start", StageStatus::Running),
        Event::new(run_id, Some(Stage::Topic), EventType::StageCompleted, "topic", StageStatus::Completed)
            .with_detail("Postpartum depression"),
        Event::new(run_id, Some(Stage::Script), EventType::StageCompleted, "script", StageStatus::Completed),
        Event::new(run_id, Some(Stage::Video), EventType::StageFailed, "video", StageStatus::Failed)
            .with_error("heygen render failed: avatar not found"),
        Event::new(run_id, Some(Stage::Video), EventType::RunFailed, "failed", StageStatus::Failed)
            .with_error("heygen render failed: avatar not found"),
    ];
    for event in &events {
        store.append(event).await.unwrap();
    }

    let run = store.load_run().await.unwrap().unwrap();
    assert_eq!(run.topic.as_deref(), Some("Postpartum depression"));
    assert_eq!(run.status_of(Stage::Video), StageStatus::Failed);
    assert_eq!(run.status_of(Stage::Publish), StageStatus::Pending);
    assert_eq!(
        run.state,
        RunState::Failed {
            stage: Some(Stage::Video),
            error: "heygen render failed: avatar not found".to_string(),
        }
    );
    assert!(run.completed_at.is_some());
}

#[tokio::test]
async fn test_load_runs_most_recent_first() {
    let temp = TempDir::new().unwrap();

    let mut ids = Vec::new();
    for _ in 0..3 {
        let run_id = Uuid::new_v4();
        let store = EventStore::open(temp.path(), run_id).await.unwrap();
        store
            .append(&Event::new(run_id, None, EventType::RunStarted, "start", StageStatus::Running))
            .await
            .unwrap();
        ids.push(run_id);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    // Stray entries are ignored
    tokio::fs::create_dir_all(temp.path().join("not-a-run")).await.unwrap();

    let runs = EventStore::load_runs(temp.path(), 2).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, ids[2]);
    assert_eq!(runs[1].id, ids[1]);
}

#[tokio::test]
async fn test_list_runs_without_directory() {
    let temp = TempDir::new().unwrap();
    let runs = EventStore::list_runs(&temp.path().join("runs")).await.unwrap();
    assert!(runs.is_empty());
}

#[test]
fn test_content_hash_consistency() {
    let hash1 = hash_content("Take a breath.".as_bytes());
    let hash2 = hash_content("Take a breath.".as_bytes());
    let hash3 = hash_content("unicode: 日本語".as_bytes());

    assert_eq!(hash1, hash2);
    assert_ne!(hash1, hash3);
    assert_eq!(hash1.len(), 16);
}
