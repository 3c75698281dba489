//! SCA memory configuration
//!
//! Loaded from a YAML file, with environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::CoreError;

/// Environment variable overriding the database path
pub const ENV_DB_PATH: &str = "SCA_MEMORY_DB";

/// Environment variable overriding the capacity bound
pub const ENV_MAX_ENTRIES: &str = "SCA_MEMORY_MAX_ENTRIES";

/// Memory store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Database file; `<home>/.sca/memory/sca_memory.db` when unset
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Soft bound on stored entries
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// Minimum importance reported by recent insights
    #[serde(default = "default_insight_min_importance")]
    pub insight_min_importance: u8,

    /// Display length of insight content
    #[serde(default = "default_insight_content_chars")]
    pub insight_content_chars: usize,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_insight_min_importance() -> u8 {
    4
}

fn default_insight_content_chars() -> usize {
    200
}

fn default_pool_size() -> u32 {
    8
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            max_entries: default_max_entries(),
            insight_min_importance: default_insight_min_importance(),
            insight_content_chars: default_insight_content_chars(),
            pool_size: default_pool_size(),
        }
    }
}

impl MemoryConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CoreError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Apply `SCA_MEMORY_DB` / `SCA_MEMORY_MAX_ENTRIES` overrides
    pub fn apply_env(self) -> Self {
        self.apply_overrides(
            std::env::var(ENV_DB_PATH).ok(),
            std::env::var(ENV_MAX_ENTRIES).ok(),
        )
    }

    fn apply_overrides(mut self, db_path: Option<String>, max_entries: Option<String>) -> Self {
        if let Some(path) = db_path.filter(|p| !p.trim().is_empty()) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = max_entries {
            match raw.trim().parse::<u64>() {
                Ok(n) if n > 0 => self.max_entries = n,
                _ => warn!("Ignoring invalid {}: {:?}", ENV_MAX_ENTRIES, raw),
            }
        }
        self
    }

    /// Database path, falling back to the per-user default location
    pub fn resolved_db_path(&self) -> Result<PathBuf, CoreError> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => default_db_path(),
        }
    }
}

/// `<home>/.sca/memory/sca_memory.db`
pub fn default_db_path() -> Result<PathBuf, CoreError> {
    let home = dirs::home_dir().ok_or(CoreError::HomeDirUnavailable)?;
    Ok(home.join(".sca").join("memory").join("sca_memory.db"))
}
