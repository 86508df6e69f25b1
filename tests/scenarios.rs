//! End-to-end scenarios over a real SQLite document store.

use std::sync::Arc;

use anyhow::Result;
use jobtagger::category::Category;
use jobtagger::jobs::{BaseUrlDirectory, JobRef};
use jobtagger::recorder::HISTORY_CAPACITY;
use jobtagger::rename::EntityKind;
use jobtagger::step::{BuildStep, StepError, StepState};
use jobtagger::storage::{open_pool, SqliteDocuments};
use jobtagger::tracker::Tracker;

fn open(path: &std::path::Path) -> Result<Tracker> {
    let pool = open_pool(path.to_str().unwrap())?;
    Tracker::open(
        Arc::new(SqliteDocuments::new(pool)),
        Arc::new(BaseUrlDirectory::new(None)),
    )
}

async fn seeded(path: &std::path::Path) -> Result<Tracker> {
    let tracker = open(path)?;
    tracker
        .registry()
        .update(Some(vec![
            Category::with_id("c1", "Infra"),
            Category::with_id("c2", "App"),
        ]))
        .await?;
    Ok(tracker)
}

async fn record_six(tracker: &Tracker) -> Result<()> {
    for (i, cat) in ["c1", "c2", "c1", "c2", "c1", "c2"].iter().enumerate() {
        tracker
            .on_execution_complete(JobRef::new(format!("j{}", i + 1)), cat)
            .await?;
    }
    Ok(())
}

async fn history_refs(tracker: &Tracker) -> Vec<String> {
    tracker
        .recorder()
        .history()
        .await
        .into_iter()
        .map(|r| r.job_reference.to_string())
        .collect()
}

#[tokio::test]
async fn test_six_alternating_executions_evict_first() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let tracker = seeded(&dir.path().join("t.db")).await?;
    record_six(&tracker).await?;

    assert_eq!(history_refs(&tracker).await, vec!["j2", "j3", "j4", "j5", "j6"]);
    let recorder = tracker.recorder();
    assert_eq!(recorder.latest_for("c1").await.as_deref(), Some("j5"));
    assert_eq!(recorder.latest_for("c2").await.as_deref(), Some("j6"));
    assert_eq!(recorder.latest_per_category().await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_rename_after_scenario_is_idempotent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let tracker = seeded(&dir.path().join("t.db")).await?;
    record_six(&tracker).await?;

    tracker.on_rename(EntityKind::Job, "j3", "j3-renamed").await;
    let once = history_refs(&tracker).await;
    assert_eq!(once, vec!["j2", "j3-renamed", "j4", "j5", "j6"]);

    let report = tracker.on_rename(EntityKind::Job, "j3", "j3-renamed").await;
    assert!(report.is_clean());
    assert_eq!(history_refs(&tracker).await, once);
    Ok(())
}

#[tokio::test]
async fn test_missing_category_leaves_step_unbound_and_aborts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let tracker = seeded(&dir.path().join("t.db")).await?;

    assert!(tracker.registry().resolve("missing-id").await.is_none());
    let mut step = BuildStep::new(tracker.registry(), "missing-id").await;
    assert!(matches!(step.state(), StepState::Unbound { .. }));

    let err = step
        .perform(JobRef::new("j1"), tracker.recorder())
        .await
        .unwrap_err();
    assert!(matches!(err, StepError::CategoryUnset { .. }));
    assert!(tracker.recorder().history().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_state_survives_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("t.db");
    {
        let tracker = seeded(&path).await?;
        tracker.registry().set_label("Build Farm").await?;
        record_six(&tracker).await?;
        tracker
            .on_rename(EntityKind::Job, "j6", "j6-moved")
            .await;
    }

    let tracker = open(&path)?;
    assert_eq!(tracker.registry().label().await.as_deref(), Some("Build Farm"));
    assert_eq!(tracker.registry().list_all().await.len(), 2);
    assert_eq!(
        history_refs(&tracker).await,
        vec!["j2", "j3", "j4", "j5", "j6-moved"]
    );
    assert_eq!(
        tracker.registry().last_categorized_job().await.as_deref(),
        Some("j6-moved")
    );
    assert_eq!(tracker.recorder().latest_for("c2").await.as_deref(), Some("j6-moved"));
    Ok(())
}

#[tokio::test]
async fn test_history_never_exceeds_capacity() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let tracker = seeded(&dir.path().join("t.db")).await?;

    for i in 0..23 {
        let cat = if i % 2 == 0 { "c1" } else { "C2" };
        tracker
            .on_execution_complete(JobRef::new(format!("pipeline#{}", i)), cat)
            .await?;
        assert!(tracker.recorder().history().await.len() <= HISTORY_CAPACITY);
    }

    let expected: Vec<String> = (18..23).map(|i| format!("pipeline#{}", i)).collect();
    assert_eq!(history_refs(&tracker).await, expected);
    Ok(())
}
