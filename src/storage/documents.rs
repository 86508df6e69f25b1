//! Keyed JSON documents -- the save/load contract behind every persisted store.
//!
//! Each store serializes its whole state as one structured document and
//! reloads it verbatim at startup. Fields missing from an older document fall
//! back to their defaults, so the layout can grow additively.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Pool;

/// Opaque persistence backend for whole-document state.
pub trait DocumentStore: Send + Sync {
    /// Return the stored body for `key`, or `None` if nothing was saved yet.
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Replace the body stored under `key`.
    fn save(&self, key: &str, body: &str) -> Result<()>;
}

/// Load and decode the document under `key`, defaulting when absent.
pub fn load_json<T>(store: &dyn DocumentStore, key: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match store.load(key)? {
        Some(body) => serde_json::from_str(&body)
            .with_context(|| format!("failed to decode stored document '{}'", key)),
        None => Ok(T::default()),
    }
}

/// Encode `value` and save it under `key`.
pub fn save_json<T: Serialize>(store: &dyn DocumentStore, key: &str, value: &T) -> Result<()> {
    let body = serde_json::to_string(value)?;
    store.save(key, &body)
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Documents kept in the `documents` table of the SQLite database.
#[derive(Clone)]
pub struct SqliteDocuments {
    pool: Pool,
}

impl SqliteDocuments {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

impl DocumentStore for SqliteDocuments {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        let body = conn
            .query_row(
                "SELECT body_json FROM documents WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("failed to read document '{}'", key))?;
        Ok(body)
    }

    fn save(&self, key: &str, body: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO documents (key, body_json, updated_at, revision)
             VALUES (?1, ?2, datetime('now'), 1)
             ON CONFLICT(key) DO UPDATE SET
                body_json = excluded.body_json,
                updated_at = excluded.updated_at,
                revision = documents.revision + 1",
            params![key, body],
        )
        .with_context(|| format!("failed to write document '{}'", key))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local documents, used by tests and throwaway runs.
///
/// Writes can be made to fail on demand to exercise the persist-failure path.
#[derive(Default)]
pub struct MemoryDocuments {
    docs: Mutex<HashMap<String, String>>,
    saves: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every subsequent `save` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw body currently stored under `key`.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.docs
            .lock()
            .ok()
            .and_then(|docs| docs.get(key).cloned())
    }
}

impl DocumentStore for MemoryDocuments {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let docs = self
            .docs
            .lock()
            .map_err(|_| anyhow!("document map lock poisoned"))?;
        Ok(docs.get(key).cloned())
    }

    fn save(&self, key: &str, body: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("write to document '{}' rejected", key));
        }
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| anyhow!("document map lock poisoned"))?;
        docs.insert(key.to_string(), body.to_string());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
