//! Tracker -- the explicitly constructed root of all process-wide state.
//!
//! Built once at startup from a document store and a job directory, it owns
//! the configuration store, the execution recorder, and the rename
//! propagator both stores are registered with.  Dropping it at shutdown
//! releases everything.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::jobs::{JobDirectory, JobRef};
use crate::recorder::{ExecutionRecord, ExecutionRecorder};
use crate::registry::ConfigurationStore;
use crate::rename::{EntityKind, RenameEvent, RenameListener, RenamePropagator, RenameReport};
use crate::step::{BuildStep, StepError};
use crate::storage::DocumentStore;

/// A history record prepared for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    pub job_reference: String,
    pub job_path: String,
    pub category_id: String,
    pub category_name: String,
    pub recorded_at: DateTime<Utc>,
    /// `None` when the job can no longer be found.
    pub url: Option<String>,
}

pub struct Tracker {
    registry: Arc<ConfigurationStore>,
    recorder: Arc<ExecutionRecorder>,
    propagator: RenamePropagator,
    jobs: Arc<dyn JobDirectory>,
    /// Held across a whole completion (record, then pointer update) and a
    /// whole rename dispatch, so neither observes the other half-done.
    events: Mutex<()>,
}

impl Tracker {
    /// Load both stores and register them for rename notifications.
    pub fn open(store: Arc<dyn DocumentStore>, jobs: Arc<dyn JobDirectory>) -> anyhow::Result<Self> {
        let registry = Arc::new(ConfigurationStore::load(store.clone())?);
        let recorder = Arc::new(ExecutionRecorder::load(store)?);

        let mut propagator = RenamePropagator::new();
        propagator.register(registry.clone());
        propagator.register(recorder.clone());

        Ok(Self {
            registry,
            recorder,
            propagator,
            jobs,
            events: Mutex::new(()),
        })
    }

    pub fn registry(&self) -> &Arc<ConfigurationStore> {
        &self.registry
    }

    pub fn recorder(&self) -> &Arc<ExecutionRecorder> {
        &self.recorder
    }

    pub fn propagator(&self) -> &RenamePropagator {
        &self.propagator
    }

    /// Add another component that must follow renames.
    pub fn register_listener(&mut self, listener: Arc<dyn RenameListener>) {
        self.propagator.register(listener);
    }

    /// A job run finished: bind its step to the category and record it.
    pub async fn on_execution_complete(
        &self,
        job: JobRef,
        category_identifier: &str,
    ) -> Result<ExecutionRecord, StepError> {
        let _events = self.events.lock().await;
        let mut step = BuildStep::new(&self.registry, category_identifier).await;
        let record = step.perform(job, &self.recorder).await?;

        let path = record.job_reference.job_path();
        if let Err(e) = self.registry.set_last_categorized_job(path).await {
            warn!(job = path, error = %e, "could not persist last categorized job");
        }
        Ok(record)
    }

    /// An entity was renamed by the hosting system.
    pub async fn on_rename(&self, kind: EntityKind, old_name: &str, new_name: &str) -> RenameReport {
        let event = RenameEvent {
            kind,
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
        };
        let report = {
            let _events = self.events.lock().await;
            self.propagator.dispatch(&event).await
        };
        if !report.is_clean() {
            warn!(failed = report.failed.len(), "rename only partially applied");
        }
        report
    }

    /// History records, oldest first, each with its resolved link.
    pub async fn history_view(&self) -> Vec<HistoryItem> {
        self.recorder
            .history()
            .await
            .into_iter()
            .map(|r| HistoryItem {
                url: self.jobs.url_of(&r.job_reference),
                job_path: r.job_reference.job_path().to_string(),
                job_reference: r.job_reference.to_string(),
                category_id: r.category.id().to_string(),
                category_name: r.category.name().to_string(),
                recorded_at: r.recorded_at,
            })
            .collect()
    }

    /// Retry any persists that failed earlier.
    pub async fn flush(&self) -> anyhow::Result<()> {
        self.registry.flush().await?;
        self.recorder.flush().await?;
        info!("flushed pending state");
        Ok(())
    }
}
