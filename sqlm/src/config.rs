///
/// Handle configuration.
///
/// `DbOptions` can be built in code or read from TOML:
///
/// ```toml
/// trace = true
/// statement_cache_capacity = 128
/// busy_timeout_ms = 500
/// ```
///
/// Missing keys take their defaults.
///

use std::path::Path;

use serde::Deserialize;

use crate::errors::DbError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbOptions {
    /// Log every executed statement on the `sqlm::trace` target.
    pub trace: bool,
    /// Capacity of rusqlite's prepared-statement cache.
    pub statement_cache_capacity: usize,
    /// How long SQLite waits on a locked database; 0 fails immediately.
    pub busy_timeout_ms: u64,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            trace: false,
            statement_cache_capacity: 64,
            busy_timeout_ms: 0,
        }
    }
}

impl DbOptions {
    pub fn from_toml_str(content: &str) -> Result<Self, DbError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, DbError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
