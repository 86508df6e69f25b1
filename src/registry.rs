//! Configuration store and category registry.
//!
//! Holds the administrator-edited configuration: free-form label and
//! description, the ordered category list, and a pointer to the job most
//! recently categorized by a build step.  The whole configuration is one
//! persisted document; every successful mutation rewrites it while the store
//! lock is held.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::category::{Category, CategoryOption};
use crate::rename::{EntityKind, RenameEvent, RenameListener};
use crate::storage::documents::{load_json, save_json};
use crate::storage::DocumentStore;

/// Document key of the persisted configuration.
pub const CONFIGURATION_KEY: &str = "configuration";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field value failed its format check.  Prior state is retained.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("category {0} not found")]
    UnknownCategory(String),

    /// The in-memory change was applied but could not be written out.
    #[error("failed to persist configuration: {0:#}")]
    Persist(anyhow::Error),
}

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

/// Persisted configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub last_categorized_job: Option<String>,
}

/// A category as submitted by an administrator; the id may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
}

impl From<CategoryInput> for Category {
    fn from(input: CategoryInput) -> Self {
        Category::new(input.name, input.id.as_deref())
    }
}

/// A whole administrative submission.
///
/// Absent `label` / `description` leave those fields unchanged; an absent
/// `categories` list clears the registry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigurationForm {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Option<Vec<CategoryInput>>,
}

/// Result of an interactive field check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FieldCheck {
    Ok,
    Warning(String),
    Error(String),
}

/// Labels may contain only ASCII letters and spaces, and must not be empty.
pub fn is_valid_label(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c == ' ' || c.is_ascii_alphabetic())
}

pub fn check_label(value: &str) -> FieldCheck {
    if value.is_empty() {
        return FieldCheck::Warning("Please specify a name.".to_string());
    }
    if !is_valid_label(value) {
        return FieldCheck::Error("The name must only contain letters and spaces.".to_string());
    }
    FieldCheck::Ok
}

pub fn check_description(value: &str) -> FieldCheck {
    if value.is_empty() {
        return FieldCheck::Warning("Please specify a description.".to_string());
    }
    FieldCheck::Ok
}

fn label_error(value: &str) -> ConfigError {
    ConfigError::Validation {
        field: "label",
        reason: format!("'{}' must only contain letters and spaces", value),
    }
}

// ---------------------------------------------------------------------------
// ConfigurationStore
// ---------------------------------------------------------------------------

struct Inner {
    config: Configuration,
    /// Memory holds changes that the last persist failed to write.
    dirty: bool,
}

/// Process-wide configuration, constructed once at startup and shared by
/// reference.
pub struct ConfigurationStore {
    inner: Mutex<Inner>,
    store: Arc<dyn DocumentStore>,
}

impl ConfigurationStore {
    /// Load the persisted configuration, or start empty if none was saved.
    pub fn load(store: Arc<dyn DocumentStore>) -> anyhow::Result<Self> {
        let config: Configuration = load_json(store.as_ref(), CONFIGURATION_KEY)?;
        info!(
            categories = config.categories.len(),
            "loaded configuration"
        );
        Ok(Self {
            inner: Mutex::new(Inner {
                config,
                dirty: false,
            }),
            store,
        })
    }

    fn persist(&self, inner: &mut Inner) -> Result<(), ConfigError> {
        match save_json(self.store.as_ref(), CONFIGURATION_KEY, &inner.config) {
            Ok(()) => {
                inner.dirty = false;
                Ok(())
            }
            Err(e) => {
                inner.dirty = true;
                warn!(error = %e, "configuration persist failed; keeping in-memory state");
                Err(ConfigError::Persist(e))
            }
        }
    }

    /// Find the first category whose id matches `identifier`
    /// (case-insensitive).  `None` means the category is unset.
    pub async fn resolve(&self, identifier: &str) -> Option<Category> {
        let inner = self.inner.lock().await;
        inner
            .config
            .categories
            .iter()
            .find(|c| c.matches(identifier))
            .cloned()
    }

    /// All categories in registry order.
    pub async fn list_all(&self) -> Vec<Category> {
        self.inner.lock().await.config.categories.clone()
    }

    /// `(name, id)` pairs for a selection list, in registry order.
    pub async fn options(&self) -> Vec<CategoryOption> {
        let inner = self.inner.lock().await;
        inner.config.categories.iter().map(CategoryOption::from).collect()
    }

    pub async fn snapshot(&self) -> Configuration {
        self.inner.lock().await.config.clone()
    }

    pub async fn label(&self) -> Option<String> {
        self.inner.lock().await.config.label.clone()
    }

    pub async fn description(&self) -> Option<String> {
        self.inner.lock().await.config.description.clone()
    }

    pub async fn last_categorized_job(&self) -> Option<String> {
        self.inner.lock().await.config.last_categorized_job.clone()
    }

    pub async fn is_dirty(&self) -> bool {
        self.inner.lock().await.dirty
    }

    /// Set the label.  Values that are not letters-and-spaces are rejected
    /// without touching the stored label or persisting.
    pub async fn set_label(&self, value: &str) -> Result<(), ConfigError> {
        if !is_valid_label(value) {
            debug!(value, "rejected label");
            return Err(label_error(value));
        }
        let mut inner = self.inner.lock().await;
        inner.config.label = Some(value.to_string());
        self.persist(&mut inner)
    }

    pub async fn set_description(&self, value: &str) -> Result<(), ConfigError> {
        let mut inner = self.inner.lock().await;
        inner.config.description = Some(value.to_string());
        self.persist(&mut inner)
    }

    pub async fn set_last_categorized_job(&self, path: &str) -> Result<(), ConfigError> {
        let mut inner = self.inner.lock().await;
        if inner.config.last_categorized_job.as_deref() == Some(path) {
            return Ok(());
        }
        inner.config.last_categorized_job = Some(path.to_string());
        self.persist(&mut inner)
    }

    /// Replace the whole registry.  `None` clears it.
    pub async fn update(&self, categories: Option<Vec<Category>>) -> Result<(), ConfigError> {
        let categories = categories.unwrap_or_default();
        let mut inner = self.inner.lock().await;
        info!(count = categories.len(), "replacing category registry");
        inner.config.categories = categories;
        self.persist(&mut inner)
    }

    /// Apply an administrative submission as one atomic change.  An invalid
    /// label rejects the whole form.
    pub async fn configure(&self, form: ConfigurationForm) -> Result<(), ConfigError> {
        if let Some(label) = form.label.as_deref() {
            if !is_valid_label(label) {
                return Err(label_error(label));
            }
        }

        let categories: Vec<Category> = form
            .categories
            .unwrap_or_default()
            .into_iter()
            .map(Category::from)
            .collect();

        let mut inner = self.inner.lock().await;
        if let Some(label) = form.label {
            inner.config.label = Some(label);
        }
        if let Some(description) = form.description {
            inner.config.description = Some(description);
        }
        inner.config.categories = categories;
        self.persist(&mut inner)
    }

    /// Append a new category, generating its id when none is given.
    pub async fn create_category(
        &self,
        name: &str,
        id: Option<&str>,
    ) -> Result<Category, ConfigError> {
        let category = Category::new(name, id);
        let mut inner = self.inner.lock().await;
        inner.config.categories.push(category.clone());
        info!(id = category.id(), name, "created category");
        self.persist(&mut inner)?;
        Ok(category)
    }

    /// Change the display name of the category with `id`.
    pub async fn rename_category(&self, id: &str, name: &str) -> Result<Category, ConfigError> {
        let mut inner = self.inner.lock().await;
        let category = inner
            .config
            .categories
            .iter_mut()
            .find(|c| c.matches(id))
            .ok_or_else(|| ConfigError::UnknownCategory(id.to_string()))?;
        category.set_name(name);
        let updated = category.clone();
        self.persist(&mut inner)?;
        Ok(updated)
    }

    /// Remove every category with `id`, returning the first one removed.
    pub async fn delete_category(&self, id: &str) -> Result<Category, ConfigError> {
        let mut inner = self.inner.lock().await;
        let removed = inner
            .config
            .categories
            .iter()
            .find(|c| c.matches(id))
            .cloned()
            .ok_or_else(|| ConfigError::UnknownCategory(id.to_string()))?;
        inner.config.categories.retain(|c| !c.matches(id));
        info!(id = removed.id(), "deleted category");
        self.persist(&mut inner)?;
        Ok(removed)
    }

    /// Retry a persist that previously failed.
    pub async fn flush(&self) -> Result<(), ConfigError> {
        let mut inner = self.inner.lock().await;
        if !inner.dirty {
            return Ok(());
        }
        self.persist(&mut inner)
    }
}

#[async_trait]
impl RenameListener for ConfigurationStore {
    fn name(&self) -> &'static str {
        "configuration"
    }

    async fn on_rename(&self, event: &RenameEvent) -> anyhow::Result<()> {
        if event.kind != EntityKind::Job {
            return Ok(());
        }
        let mut inner = self.inner.lock().await;
        // Job paths are case-sensitive.
        if inner.config.last_categorized_job.as_deref() != Some(event.old_name.as_str()) {
            return Ok(());
        }
        inner.config.last_categorized_job = Some(event.new_name.clone());
        info!(old = %event.old_name, new = %event.new_name, "updated last categorized job");
        self.persist(&mut inner)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryDocuments;

    fn store() -> (Arc<MemoryDocuments>, ConfigurationStore) {
        let docs = Arc::new(MemoryDocuments::new());
        let cfg = ConfigurationStore::load(docs.clone()).unwrap();
        (docs, cfg)
    }

    #[tokio::test]
    async fn test_resolve_is_case_insensitive() {
        let (_, cfg) = store();
        cfg.update(Some(vec![Category::with_id("abc", "Infra")]))
            .await
            .unwrap();

        let upper = cfg.resolve("ABC").await.unwrap();
        let lower = cfg.resolve("abc").await.unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.name(), "Infra");
        assert!(cfg.resolve("missing-id").await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_returns_first_match() {
        let (_, cfg) = store();
        cfg.update(Some(vec![
            Category::with_id("dup", "First"),
            Category::with_id("DUP", "Second"),
        ]))
        .await
        .unwrap();
        assert_eq!(cfg.resolve("dup").await.unwrap().name(), "First");
        assert_eq!(cfg.list_all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_label_keeps_value_and_skips_persist() {
        let (docs, cfg) = store();
        cfg.set_label("Build Farm").await.unwrap();
        let saves = docs.save_count();

        let err = cfg.set_label("Build-Farm 2").await.unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field: "label", .. }));
        assert!(cfg.set_label("").await.is_err());

        assert_eq!(cfg.label().await.as_deref(), Some("Build Farm"));
        assert_eq!(docs.save_count(), saves);
    }

    #[tokio::test]
    async fn test_description_has_no_format() {
        let (docs, cfg) = store();
        cfg.set_description("anything: 1-2-3!").await.unwrap();
        assert_eq!(cfg.description().await.as_deref(), Some("anything: 1-2-3!"));
        assert_eq!(docs.save_count(), 1);
    }

    #[tokio::test]
    async fn test_update_none_clears() {
        let (_, cfg) = store();
        cfg.create_category("Infra", None).await.unwrap();
        cfg.update(None).await.unwrap();
        assert!(cfg.list_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_configure_without_categories_clears_registry() {
        let (_, cfg) = store();
        cfg.create_category("Infra", Some("c1")).await.unwrap();
        cfg.set_label("Old").await.unwrap();

        cfg.configure(ConfigurationForm {
            description: Some("desc".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

        let snap = cfg.snapshot().await;
        assert!(snap.categories.is_empty());
        assert_eq!(snap.label.as_deref(), Some("Old"));
        assert_eq!(snap.description.as_deref(), Some("desc"));
    }

    #[tokio::test]
    async fn test_configure_rejects_bad_label_atomically() {
        let (_, cfg) = store();
        cfg.create_category("Infra", Some("c1")).await.unwrap();

        let result = cfg
            .configure(ConfigurationForm {
                label: Some("bad_label".to_string()),
                description: Some("new".to_string()),
                categories: None,
            })
            .await;
        assert!(result.is_err());
        assert_eq!(cfg.list_all().await.len(), 1);
        assert!(cfg.description().await.is_none());
    }

    #[tokio::test]
    async fn test_configure_generates_missing_ids() {
        let (_, cfg) = store();
        cfg.configure(ConfigurationForm {
            categories: Some(vec![
                CategoryInput {
                    name: "Infra".to_string(),
                    id: Some("c1".to_string()),
                },
                CategoryInput {
                    name: "App".to_string(),
                    id: None,
                },
            ]),
            ..Default::default()
        })
        .await
        .unwrap();

        let all = cfg.list_all().await;
        assert_eq!(all[0].id(), "c1");
        assert!(!all[1].id().is_empty());
    }

    #[tokio::test]
    async fn test_crud_by_id() {
        let (_, cfg) = store();
        let created = cfg.create_category("Infra", None).await.unwrap();
        cfg.create_category("App", Some("c2")).await.unwrap();

        let renamed = cfg.rename_category("C2", "Application").await.unwrap();
        assert_eq!(renamed.name(), "Application");

        let removed = cfg.delete_category(created.id()).await.unwrap();
        assert_eq!(removed.name(), "Infra");

        let options = cfg.options().await;
        assert_eq!(
            options,
            vec![CategoryOption {
                name: "Application".to_string(),
                value: "c2".to_string()
            }]
        );

        assert!(matches!(
            cfg.delete_category("nope").await,
            Err(ConfigError::UnknownCategory(_))
        ));
    }

    #[tokio::test]
    async fn test_reload_restores_state() {
        let docs = Arc::new(MemoryDocuments::new());
        {
            let cfg = ConfigurationStore::load(docs.clone()).unwrap();
            cfg.create_category("Infra", Some("c1")).await.unwrap();
            cfg.set_label("Ops").await.unwrap();
        }
        let cfg = ConfigurationStore::load(docs).unwrap();
        assert_eq!(cfg.label().await.as_deref(), Some("Ops"));
        assert_eq!(cfg.resolve("c1").await.unwrap().name(), "Infra");
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_memory_and_flushes_later() {
        let (docs, cfg) = store();
        docs.set_fail_writes(true);

        let err = cfg.set_description("pending").await.unwrap_err();
        assert!(matches!(err, ConfigError::Persist(_)));
        assert_eq!(cfg.description().await.as_deref(), Some("pending"));
        assert!(cfg.is_dirty().await);

        docs.set_fail_writes(false);
        cfg.flush().await.unwrap();
        assert!(!cfg.is_dirty().await);
        assert!(docs.raw(CONFIGURATION_KEY).unwrap().contains("pending"));
    }

    #[tokio::test]
    async fn test_job_rename_moves_pointer_exact_match_only() {
        let (_, cfg) = store();
        cfg.set_last_categorized_job("infra/deploy").await.unwrap();

        cfg.on_rename(&RenameEvent::job("INFRA/deploy", "x")).await.unwrap();
        assert_eq!(cfg.last_categorized_job().await.as_deref(), Some("infra/deploy"));

        cfg.on_rename(&RenameEvent::job("infra/deploy", "ops/deploy"))
            .await
            .unwrap();
        assert_eq!(cfg.last_categorized_job().await.as_deref(), Some("ops/deploy"));

        // Unknown entity: no-op.
        cfg.on_rename(&RenameEvent::job("ghost", "other")).await.unwrap();
        assert_eq!(cfg.last_categorized_job().await.as_deref(), Some("ops/deploy"));
    }

    #[test]
    fn test_field_checks() {
        assert_eq!(check_label("Build Farm"), FieldCheck::Ok);
        assert!(matches!(check_label(""), FieldCheck::Warning(_)));
        assert!(matches!(check_label("abc1"), FieldCheck::Error(_)));
        assert!(matches!(check_description(""), FieldCheck::Warning(_)));
        assert_eq!(check_description("x"), FieldCheck::Ok);
    }
}
