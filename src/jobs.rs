//! Job references and the external job-lookup collaborator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque reference to one run of an external job, conventionally
/// `<job path>#<run number>` (e.g. `infra/deploy#42`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobRef(String);

impl JobRef {
    pub fn new(reference: impl Into<String>) -> Self {
        JobRef(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable path of the owning job (the reference minus its run
    /// suffix).
    pub fn job_path(&self) -> &str {
        match self.0.rsplit_once('#') {
            Some((path, _)) => path,
            None => &self.0,
        }
    }

    /// Run suffix after the last `#`, if any.
    pub fn run(&self) -> Option<&str> {
        self.0.rsplit_once('#').map(|(_, run)| run)
    }

    /// The reference this one becomes when `old` is renamed to `new`.
    ///
    /// `old` matches either the whole reference or the job path; in the
    /// latter case the run suffix is carried over.  Returns `None` when the
    /// rename does not concern this reference.  Matching is exact
    /// (case-sensitive).
    pub fn renamed(&self, old: &str, new: &str) -> Option<JobRef> {
        if old == new {
            return None;
        }
        if self.0 == old {
            return Some(JobRef::new(new));
        }
        match self.0.rsplit_once('#') {
            Some((path, run)) if path == old => Some(JobRef(format!("{}#{}", new, run))),
            _ => None,
        }
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobRef {
    fn from(s: &str) -> Self {
        JobRef(s.to_string())
    }
}

impl From<String> for JobRef {
    fn from(s: String) -> Self {
        JobRef(s)
    }
}

// ---------------------------------------------------------------------------
// JobDirectory
// ---------------------------------------------------------------------------

/// Resolves job references to viewable links.
///
/// Returning `None` means the job can no longer be found; callers render that
/// as an absent link rather than an error.
pub trait JobDirectory: Send + Sync {
    fn url_of(&self, job: &JobRef) -> Option<String>;
}

/// Builds links under a fixed base URL: `infra/deploy#42` becomes
/// `<base>/job/infra/job/deploy/42/`.
///
/// It has no view of the hosting system, so every referenced job is assumed
/// to still exist. A link is withheld only when no base URL is configured or
/// the reference has no job path; stale references still get a URL.
#[derive(Clone, Debug, Default)]
pub struct BaseUrlDirectory {
    base_url: Option<String>,
}

impl BaseUrlDirectory {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|b| b.trim_end_matches('/').to_string())
            .filter(|b| !b.is_empty());
        Self { base_url }
    }
}

impl JobDirectory for BaseUrlDirectory {
    fn url_of(&self, job: &JobRef) -> Option<String> {
        let base = self.base_url.as_deref()?;
        let path = job.job_path();
        if path.is_empty() {
            return None;
        }

        let mut url = String::from(base);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            url.push_str("/job/");
            url.push_str(segment);
        }
        url.push('/');
        if let Some(run) = job.run().filter(|r| !r.is_empty()) {
            url.push_str(run);
            url.push('/');
        }
        Some(url)
    }
}
