use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_HISTORY_LIMIT: u32 = 200;
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default, rename = "log_level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tui: Option<TuiConfig>,

    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, toml::Value>,
}

/// `[tui]` table. Zero values fall back to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TuiConfig {
    #[serde(
        rename = "reconnect-max-attempts",
        alias = "reconnect_max_attempts",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reconnect_max_attempts: Option<u32>,

    #[serde(
        rename = "history-limit",
        alias = "history_limit",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub history_limit: Option<u32>,

    #[serde(
        rename = "stats-interval-secs",
        alias = "stats_interval_secs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stats_interval_secs: Option<u64>,

    /// Projects to attach to when none are given on the command line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<String>,

    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, toml::Value>,
}

impl TuiConfig {
    pub fn effective_reconnect_max_attempts(&self) -> u32 {
        self.reconnect_max_attempts
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_RECONNECT_MAX_ATTEMPTS)
    }

    pub fn effective_history_limit(&self) -> u32 {
        self.history_limit
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
    }

    pub fn effective_stats_interval_secs(&self) -> u64 {
        self.stats_interval_secs
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_STATS_INTERVAL_SECS)
    }
}

impl ConfigFile {
    pub fn effective_tui(&self) -> TuiConfig {
        self.tui.clone().unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub fn parse_config(text: &str, path: &Path) -> Result<ConfigFile, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Loads `config.toml`; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_config(&text, path),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(source) => Err(ConfigError::Read {
            path: path.to_owned(),
            source,
        }),
    }
}
