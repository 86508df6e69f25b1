//! Execution recorder -- the last few categorized runs, system-wide.
//!
//! Keeps a bounded FIFO history of execution records plus a projection of the
//! most recent job path per category.  Append, eviction, projection upsert
//! and persist happen inside one critical section, so concurrent completions
//! and renames never interleave.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::category::{normalize_id, Category};
use crate::jobs::JobRef;
use crate::rename::{EntityKind, RenameEvent, RenameListener};
use crate::storage::documents::{load_json, save_json};
use crate::storage::DocumentStore;

/// Maximum number of retained execution records.
pub const HISTORY_CAPACITY: usize = 5;

/// Document key of the persisted recorder state.
pub const RECORDER_KEY: &str = "execution_recorder";

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to persist execution history: {0:#}")]
    Persist(anyhow::Error),
}

/// One completed run tagged with its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub job_reference: JobRef,
    pub category: Category,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RecorderState {
    #[serde(default)]
    history: VecDeque<ExecutionRecord>,
    /// Normalized category id -> job path of the latest run.
    #[serde(default)]
    latest_per_category: BTreeMap<String, String>,
}

struct Inner {
    state: RecorderState,
    dirty: bool,
}

pub struct ExecutionRecorder {
    inner: Mutex<Inner>,
    store: Arc<dyn DocumentStore>,
}

impl ExecutionRecorder {
    /// Load persisted history, or start empty.
    pub fn load(store: Arc<dyn DocumentStore>) -> anyhow::Result<Self> {
        let mut state: RecorderState = load_json(store.as_ref(), RECORDER_KEY)?;
        while state.history.len() > HISTORY_CAPACITY {
            state.history.pop_front();
        }
        info!(
            history = state.history.len(),
            categories = state.latest_per_category.len(),
            "loaded execution history"
        );
        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                dirty: false,
            }),
            store,
        })
    }

    fn persist(&self, inner: &mut Inner) -> Result<(), RecorderError> {
        match save_json(self.store.as_ref(), RECORDER_KEY, &inner.state) {
            Ok(()) => {
                inner.dirty = false;
                Ok(())
            }
            Err(e) => {
                inner.dirty = true;
                warn!(error = %e, "execution history persist failed; keeping in-memory state");
                Err(RecorderError::Persist(e))
            }
        }
    }

    /// Append a record, evicting the oldest one when full, and make it the
    /// latest run for its category.
    pub async fn record(
        &self,
        job: JobRef,
        category: Category,
    ) -> Result<ExecutionRecord, RecorderError> {
        let record = ExecutionRecord {
            job_reference: job,
            category,
            recorded_at: Utc::now(),
        };

        let mut inner = self.inner.lock().await;
        if inner.state.history.len() >= HISTORY_CAPACITY {
            if let Some(evicted) = inner.state.history.pop_front() {
                debug!(job = %evicted.job_reference, "evicted oldest execution");
            }
        }
        inner.state.history.push_back(record.clone());
        inner.state.latest_per_category.insert(
            record.category.key(),
            record.job_reference.job_path().to_string(),
        );
        info!(
            job = %record.job_reference,
            category = record.category.id(),
            "recorded execution"
        );
        self.persist(&mut inner)?;
        Ok(record)
    }

    /// Retained records, oldest first.
    pub async fn history(&self) -> Vec<ExecutionRecord> {
        self.inner.lock().await.state.history.iter().cloned().collect()
    }

    /// Latest job path per (normalized) category id.
    pub async fn latest_per_category(&self) -> BTreeMap<String, String> {
        self.inner.lock().await.state.latest_per_category.clone()
    }

    pub async fn latest_for(&self, category_id: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner
            .state
            .latest_per_category
            .get(&normalize_id(category_id))
            .cloned()
    }

    pub async fn is_dirty(&self) -> bool {
        self.inner.lock().await.dirty
    }

    /// Rewrite stored references after a job rename.  Returns how many
    /// entries changed; a repeated call finds nothing left to match.
    pub async fn rename_job(&self, old: &str, new: &str) -> Result<usize, RecorderError> {
        let mut inner = self.inner.lock().await;
        let mut changed = 0;

        for record in inner.state.history.iter_mut() {
            if let Some(renamed) = record.job_reference.renamed(old, new) {
                record.job_reference = renamed;
                changed += 1;
            }
        }
        for path in inner.state.latest_per_category.values_mut() {
            if *path == old && old != new {
                *path = new.to_string();
                changed += 1;
            }
        }

        if changed == 0 {
            return Ok(0);
        }
        info!(old, new, changed, "rewrote job references");
        self.persist(&mut inner)?;
        Ok(changed)
    }

    /// Category identity is its id, which never changes, so stored records
    /// need no rewriting.
    pub async fn rename_category(&self, old: &str, new: &str) -> Result<(), RecorderError> {
        debug!(old, new, "category rename needs no history rewrite");
        Ok(())
    }

    /// Retry a persist that previously failed.
    pub async fn flush(&self) -> Result<(), RecorderError> {
        let mut inner = self.inner.lock().await;
        if !inner.dirty {
            return Ok(());
        }
        self.persist(&mut inner)
    }
}

#[async_trait]
impl RenameListener for ExecutionRecorder {
    fn name(&self) -> &'static str {
        "execution-recorder"
    }

    async fn on_rename(&self, event: &RenameEvent) -> anyhow::Result<()> {
        match event.kind {
            EntityKind::Job => {
                self.rename_job(&event.old_name, &event.new_name).await?;
            }
            EntityKind::Category => {
                self.rename_category(&event.old_name, &event.new_name).await?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
