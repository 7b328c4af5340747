//! Catalog keys: normalized, case-insensitive lookup names

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name used for anything that arrives without a name
pub const UNKNOWN: &str = "unknown";

/// Normalized lookup key for all three catalog levels.
///
/// A key is trimmed and lower-cased and never empty; names that are
/// empty after trimming map to [`UNKNOWN`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogKey(String);

impl CatalogKey {
    /// Key of a stored, possibly collision-suffixed key read back from a
    /// document. Keys edited by hand are brought back to normalized form.
    pub fn from_normalized(key: &str) -> Self {
        normalize(key)
    }

    /// Derive the key `self$n`
    pub fn with_suffix(&self, n: usize) -> Self {
        Self(format!("{}${}", self.0, n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CatalogKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Map a free-text name to its lookup key
pub fn normalize(name: &str) -> CatalogKey {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        CatalogKey(UNKNOWN.to_string())
    } else {
        CatalogKey(trimmed.to_lowercase())
    }
}

/// Name shown to users for a node: the trimmed original, or [`UNKNOWN`]
pub fn display_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        UNKNOWN.to_string()
    } else {
        trimmed.to_string()
    }
}
