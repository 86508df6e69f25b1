//! Build step -- binds a category to a job step and records its completion.
//!
//! State machine: `Unbound -> Bound(category) -> Executed(category)`.  The
//! category identifier is resolved once, at construction.  Executing an
//! unbound step is a configuration failure and aborts the run.

use thiserror::Error;
use tracing::{error, info, warn};

use crate::category::Category;
use crate::jobs::JobRef;
use crate::recorder::{ExecutionRecord, ExecutionRecorder, RecorderError};
use crate::registry::ConfigurationStore;

/// Reasons a step execution is aborted.  The hosting job must be marked
/// failed when any of these is returned.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("no category configured for identifier '{requested}'")]
    CategoryUnset { requested: String },

    #[error("failed to record execution for category {category}: {source}")]
    RecordFailed {
        category: String,
        #[source]
        source: RecorderError,
    },

    #[error("step already executed")]
    AlreadyExecuted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepState {
    Unbound { requested: String },
    Bound(Category),
    Executed(Category),
}

#[derive(Debug, Clone)]
pub struct BuildStep {
    state: StepState,
}

impl BuildStep {
    /// Create a step for `identifier`, resolving it against the registry.
    /// A miss leaves the step unbound.
    pub async fn new(registry: &ConfigurationStore, identifier: &str) -> Self {
        let state = match registry.resolve(identifier).await {
            Some(category) => StepState::Bound(category),
            None => {
                warn!(identifier, "category not found; step left unbound");
                StepState::Unbound {
                    requested: identifier.to_string(),
                }
            }
        };
        Self { state }
    }

    pub fn state(&self) -> &StepState {
        &self.state
    }

    pub fn category(&self) -> Option<&Category> {
        match &self.state {
            StepState::Bound(c) | StepState::Executed(c) => Some(c),
            StepState::Unbound { .. } => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, StepState::Bound(_))
    }

    /// Record the completion of `job` under the bound category.
    pub async fn perform(
        &mut self,
        job: JobRef,
        recorder: &ExecutionRecorder,
    ) -> Result<ExecutionRecord, StepError> {
        let category = match &self.state {
            StepState::Bound(c) => c.clone(),
            StepState::Unbound { requested } => {
                let err = StepError::CategoryUnset {
                    requested: requested.clone(),
                };
                error!(job = %job, error = %err, "step aborted");
                return Err(err);
            }
            StepState::Executed(_) => return Err(StepError::AlreadyExecuted),
        };

        info!(job = %job, category = category.name(), "categorizing execution");
        let record = recorder
            .record(job.clone(), category.clone())
            .await
            .map_err(|source| {
                let err = StepError::RecordFailed {
                    category: category.id().to_string(),
                    source,
                };
                error!(job = %job, error = %err, "step aborted");
                err
            })?;

        self.state = StepState::Executed(category);
        Ok(record)
    }
}
