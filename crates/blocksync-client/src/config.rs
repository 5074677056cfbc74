//! Synchronization configuration.
//!
//! Every field has a default, so an empty TOML file (or none at all) is a
//! valid configuration:
//!
//! ```toml
//! debounce_ms = 300
//! echo_history = 8
//! delete_policy = "root_only"   # or "cascade"
//!
//! [prop_defaults]
//! textColor = "default"
//! backgroundColor = "default"
//! textAlignment = "left"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use blocksync_core::{DeletePolicy, DiffEngine, DiffOptions};
use blocksync_types::{Props, PropsPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_DEBOUNCE_MS, DEFAULT_ECHO_HISTORY};

/// Errors loading a [`SyncConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Per-document synchronization settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
    /// How many of our own snapshot digests to remember for echo detection.
    pub echo_history: usize,
    pub delete_policy: DeletePolicy,
    /// Prop values treated as absent when comparing.
    pub prop_defaults: Props,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            echo_history: DEFAULT_ECHO_HISTORY,
            delete_policy: DeletePolicy::default(),
            prop_defaults: PropsPolicy::default().defaults,
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn props_policy(&self) -> PropsPolicy {
        PropsPolicy {
            defaults: self.prop_defaults.clone(),
        }
    }

    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            props: self.props_policy(),
            delete_policy: self.delete_policy,
        }
    }

    pub fn diff_engine(&self) -> DiffEngine {
        DiffEngine::new(self.diff_options())
    }
}
