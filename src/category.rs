//! Categories -- named, stable-identified tags attached to build steps.
//!
//! A category's `id` is assigned once (a UUID v4 when the caller supplies
//! none) and never regenerated.  The display `name` may change freely.  All
//! identity comparisons go through the id, ASCII-case-insensitively, so two
//! `Category` values describing the same logical category are equal and hash
//! equal regardless of their names.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// A named tag with a stable identifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Category {
    id: String,
    #[serde(default)]
    name: String,
}

impl Category {
    /// Create a category, generating a fresh id when `id` is `None` or empty.
    pub fn new(name: impl Into<String>, id: Option<&str>) -> Self {
        let id = match id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        Category {
            id,
            name: name.into(),
        }
    }

    /// Create a category with an explicit id.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(name, Some(&id))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Whether `identifier` names this category (case-insensitive).
    pub fn matches(&self, identifier: &str) -> bool {
        self.id.eq_ignore_ascii_case(identifier.trim())
    }

    /// Normalized id used as a map key.
    pub fn key(&self) -> String {
        normalize_id(&self.id)
    }
}

/// Lowercase form of a category identifier.
pub fn normalize_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        self.id.eq_ignore_ascii_case(&other.id)
    }
}

impl Eq for Category {}

impl Hash for Category {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

// ---------------------------------------------------------------------------
// CategoryOption
// ---------------------------------------------------------------------------

/// A `(name, value)` pair for populating a selection list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOption {
    pub name: String,
    pub value: String,
}

impl From<&Category> for CategoryOption {
    fn from(c: &Category) -> Self {
        CategoryOption {
            name: c.name.clone(),
            value: c.id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
