//! TOML-based configuration system.
//!
//! Every section implements `Default`, so a missing or partial config file
//! behaves like the compiled-in settings.
//!
//! ## Config file search order
//!
//! 1. `--config <path>` on the command line
//! 2. `MODALBROWS_CONFIG` environment variable
//! 3. Current working directory (`./config.toml`)
//! 4. No file found → `Config::default()`

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::bindings::{BindingSet, RawBinding, parse_from};
use crate::command::DEFAULT_SEARCH_URL;
use crate::mode::Substate;

pub const CONFIG_ENV: &str = "MODALBROWS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unknown substate `{0}` in [bindings]")]
    UnknownSubstate(String),
    #[error("quickmark `{keys}`: {reason}")]
    Quickmark { keys: String, reason: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Config structs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub input: InputConfig,
    pub adblock: AdblockConfig,
    pub search: SearchConfig,
    /// Substate name → (keys → target).
    pub bindings: BTreeMap<String, BTreeMap<String, String>>,
    /// Keys → URI.
    pub quickmarks: BTreeMap<String, String>,
    pub rc: RcConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub ambiguity_timeout_ms: u64,
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdblockConfig {
    pub enabled: bool,
    /// Relative paths are resolved against the working directory.
    pub filters_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub engine_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RcConfig {
    pub file: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Default impls
// ─────────────────────────────────────────────────────────────────────────────

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            ambiguity_timeout_ms: 500,
            debounce_ms: 10,
        }
    }
}

impl Default for AdblockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filters_dir: Some(PathBuf::from("resources/filters")),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engine_url: DEFAULT_SEARCH_URL.to_string(),
        }
    }
}

impl InputConfig {
    pub fn ambiguity_timeout(&self) -> Duration {
        Duration::from_millis(self.ambiguity_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Loads the first config file found. Never fails: a missing, unreadable
    /// or invalid file yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Self {
        match find_config_path(explicit) {
            Some(path) => match Self::from_path(&path) {
                Ok(config) => {
                    info!(path = %path.display(), "Configuration loaded");
                    config
                }
                Err(e) => {
                    warn!(error = %e, "Invalid config, using defaults");
                    Config::default()
                }
            },
            None => {
                info!("No config file found, using defaults");
                Config::default()
            }
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Adds `[bindings]` and `[quickmarks]` to `set`. Invalid entries are
    /// returned and skipped; bad keys or targets inside `[bindings]` surface
    /// later, when the set is compiled.
    pub fn apply_bindings(&self, set: &mut BindingSet) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for (name, table) in &self.bindings {
            let Some(substate) = Substate::from_name(name) else {
                warn!(substate = %name, "unknown substate in [bindings]");
                errors.push(ConfigError::UnknownSubstate(name.clone()));
                continue;
            };
            for (from, to) in table {
                set.add(RawBinding::new(substate, from.as_str(), to.as_str()));
            }
        }

        for (keys, uri) in &self.quickmarks {
            match parse_from(keys) {
                Ok(sequence) => set.quickmarks_mut().insert(sequence, uri.clone()),
                Err(e) => {
                    warn!(keys = %keys, error = %e, "quickmark skipped");
                    errors.push(ConfigError::Quickmark {
                        keys: keys.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        errors
    }
}

/// Searches for a config file in the standard locations.
fn find_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    // Un chemin explicite est renvoyé même s'il n'existe pas : l'erreur de
    // lecture est journalisée par `load`.
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        let p = PathBuf::from(path);
        if p.is_file() {
            return Some(p);
        }
    }

    let p = PathBuf::from("config.toml");
    if p.is_file() {
        return Some(p);
    }

    None
}
