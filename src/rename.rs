//! Rename propagation.
//!
//! The hosting system announces renames of jobs (and categories) as
//! [`RenameEvent`]s.  Every component holding references that must stay
//! resolvable registers a [`RenameListener`] with the [`RenamePropagator`],
//! which delivers each event to all of them in registration order.
//! Listeners must treat renames of entities they never saw as no-ops.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Kind of entity that was renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Job,
    Category,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Job => f.write_str("job"),
            EntityKind::Category => f.write_str("category"),
        }
    }
}

/// A rename notification from the hosting system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameEvent {
    pub kind: EntityKind,
    pub old_name: String,
    pub new_name: String,
}

impl RenameEvent {
    pub fn job(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Job,
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }

    pub fn category(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Category,
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }

    /// An event that cannot change anything (empty or identical names).
    pub fn is_noop(&self) -> bool {
        self.old_name.is_empty() || self.new_name.is_empty() || self.old_name == self.new_name
    }
}

/// A component that rewrites its stored references on rename.
#[async_trait]
pub trait RenameListener: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn on_rename(&self, event: &RenameEvent) -> anyhow::Result<()>;
}

/// Outcome of delivering one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenameReport {
    pub delivered: usize,
    pub failed: Vec<String>,
}

impl RenameReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Explicit registration list of rename listeners.
#[derive(Clone, Default)]
pub struct RenamePropagator {
    listeners: Vec<Arc<dyn RenameListener>>,
}

impl RenamePropagator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn RenameListener>) {
        debug!(listener = listener.name(), "registered rename listener");
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `event` to every listener.  A failing listener does not stop
    /// delivery to the rest.
    pub async fn dispatch(&self, event: &RenameEvent) -> RenameReport {
        let mut report = RenameReport::default();
        if event.is_noop() {
            debug!(kind = %event.kind, old = %event.old_name, "ignoring no-op rename");
            return report;
        }

        info!(
            kind = %event.kind,
            old = %event.old_name,
            new = %event.new_name,
            listeners = self.listeners.len(),
            "propagating rename"
        );

        for listener in &self.listeners {
            match listener.on_rename(event).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(listener = listener.name(), error = %e, "rename listener failed");
                    report.failed.push(format!("{}: {:#}", listener.name(), e));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<RenameEvent>>,
    }

    #[async_trait]
    impl RenameListener for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn on_rename(&self, event: &RenameEvent) -> anyhow::Result<()> {
            self.seen.lock().await.push(event.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl RenameListener for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn on_rename(&self, _event: &RenameEvent) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[tokio::test]
    async fn test_dispatch_reaches_all_listeners() {
        let a = Arc::new(Recording { seen: Mutex::new(Vec::new()) });
        let b = Arc::new(Recording { seen: Mutex::new(Vec::new()) });
        let mut prop = RenamePropagator::new();
        prop.register(a.clone());
        prop.register(b.clone());
        assert_eq!(prop.len(), 2);

        let report = prop.dispatch(&RenameEvent::job("old", "new")).await;
        assert_eq!(report.delivered, 2);
        assert!(report.is_clean());
        assert_eq!(a.seen.lock().await.len(), 1);
        assert_eq!(b.seen.lock().await[0].new_name, "new");
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_delivery() {
        let rec = Arc::new(Recording { seen: Mutex::new(Vec::new()) });
        let mut prop = RenamePropagator::new();
        prop.register(Arc::new(Failing));
        prop.register(rec.clone());

        let report = prop.dispatch(&RenameEvent::job("a", "b")).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].contains("disk full"));
        assert_eq!(rec.seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_noop_events_are_not_delivered() {
        let rec = Arc::new(Recording { seen: Mutex::new(Vec::new()) });
        let mut prop = RenamePropagator::new();
        prop.register(rec.clone());

        prop.dispatch(&RenameEvent::job("same", "same")).await;
        prop.dispatch(&RenameEvent::job("", "x")).await;
        assert!(rec.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_propagator() {
        let prop = RenamePropagator::new();
        assert!(prop.is_empty());
        let report = prop.dispatch(&RenameEvent::category("a", "b")).await;
        assert_eq!(report, RenameReport::default());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&RenameEvent::job("a", "b")).unwrap();
        assert!(json.contains("\"kind\":\"job\""));
    }
}
