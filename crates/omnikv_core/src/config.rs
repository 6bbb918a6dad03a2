//! Database open configuration.

use crate::error::{EngineError, EngineResult};
use serde::Deserialize;

/// Configuration for opening a database.
///
/// Databases are opened from a JSON document naming the backend and its
/// parameters. The engine itself consumes `engine`, `path` and `cache`;
/// anything else is passed through to the backend untouched.
///
/// ```json
/// { "engine": "memory", "cache": 1048576 }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    /// Name of the backend to instantiate. `"memory"` is built in.
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Filesystem location for persistent backends.
    #[serde(default)]
    pub path: Option<String>,

    /// Cache budget in bytes, advisory.
    #[serde(default)]
    pub cache: Option<u64>,

    /// Backend-specific parameters the engine does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_engine() -> String {
    "memory".to_string()
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            path: None,
            cache: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl DbConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from its JSON form.
    ///
    /// An empty or whitespace-only document selects the defaults.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the document is not valid JSON or has
    /// the wrong shape.
    pub fn from_json(config: &str) -> EngineResult<Self> {
        if config.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(config)
            .map_err(|e| EngineError::usage(format!("invalid open config: {e}")))
    }

    /// Sets the backend engine name.
    #[must_use]
    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    /// Sets the filesystem path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the cache budget in bytes.
    #[must_use]
    pub fn cache(mut self, bytes: u64) -> Self {
        self.cache = Some(bytes);
        self
    }
}
