//! Runtime configuration shared by the CLI and the API.
//!
//! Values come from `TILLSYNC_*` environment variables. Parsing goes through
//! a lookup function so tests never touch the process environment.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::db::RemoteConfig;
use crate::models::TableRegistry;
use crate::sync::{ScheduleConfig, DEFAULT_QUEUE_CAPACITY};
use crate::util::normalize_text_option;

pub const DB_PATH_VAR: &str = "TILLSYNC_DB_PATH";
pub const REMOTE_URL_VAR: &str = "TILLSYNC_REMOTE_URL";
pub const REMOTE_AUTH_TOKEN_VAR: &str = "TILLSYNC_REMOTE_AUTH_TOKEN";
pub const SYNC_INTERVAL_VAR: &str = "TILLSYNC_SYNC_INTERVAL_SECS";
pub const SYNC_DEBOUNCE_VAR: &str = "TILLSYNC_SYNC_DEBOUNCE_MS";
pub const TRACKED_TABLES_VAR: &str = "TILLSYNC_TRACKED_TABLES";
pub const QUEUE_CAPACITY_VAR: &str = "TILLSYNC_QUEUE_CAPACITY";

const MAX_INTERVAL_SECS: u64 = 86_400;
const MAX_DEBOUNCE_MS: u64 = 60_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for one terminal's sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Local database path; callers fall back to a platform default
    pub db_path: Option<PathBuf>,
    /// Remote store; `None` runs in local-only mode
    pub remote: Option<RemoteConfig>,
    pub schedule: ScheduleConfig,
    pub registry: TableRegistry,
    pub queue_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            db_path: None,
            remote: None,
            schedule: ScheduleConfig::default(),
            registry: TableRegistry::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = optional_trimmed(&lookup, DB_PATH_VAR).map(PathBuf::from);
        let remote = parse_remote(&lookup)?;

        let interval_secs = parse_bounded(&lookup, SYNC_INTERVAL_VAR, 60, 0, MAX_INTERVAL_SECS)?;
        let debounce_ms = parse_bounded(&lookup, SYNC_DEBOUNCE_VAR, 500, 0, MAX_DEBOUNCE_MS)?;
        let schedule = ScheduleConfig {
            interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            debounce: Duration::from_millis(debounce_ms),
        };

        let registry = match optional_trimmed(&lookup, TRACKED_TABLES_VAR) {
            Some(raw) => TableRegistry::parse_list(&raw).map_err(|error| {
                ConfigError::Invalid(format!("{TRACKED_TABLES_VAR}: {error}"))
            })?,
            None => TableRegistry::default(),
        };

        let queue_capacity = parse_bounded(
            &lookup,
            QUEUE_CAPACITY_VAR,
            DEFAULT_QUEUE_CAPACITY as u64,
            1,
            1_000_000,
        )?;
        let queue_capacity = usize::try_from(queue_capacity)
            .map_err(|_| ConfigError::Invalid(format!("{QUEUE_CAPACITY_VAR} is too large")))?;

        Ok(Self {
            db_path,
            remote,
            schedule,
            registry,
            queue_capacity,
        })
    }

    /// Whether a remote store is configured
    #[must_use]
    pub fn is_sync_enabled(&self) -> bool {
        self.remote.as_ref().is_some_and(RemoteConfig::is_configured)
    }
}

fn parse_remote(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<RemoteConfig>, ConfigError> {
    let url = optional_trimmed(&lookup, REMOTE_URL_VAR);
    let auth_token = optional_trimmed(&lookup, REMOTE_AUTH_TOKEN_VAR);

    let Some(url) = url else {
        if auth_token.is_some() {
            return Err(ConfigError::MissingVar(REMOTE_URL_VAR));
        }
        return Ok(None);
    };

    let config = RemoteConfig {
        url: Some(url),
        auth_token,
    };
    if !config.is_configured() {
        return Err(ConfigError::MissingVar(REMOTE_AUTH_TOKEN_VAR));
    }
    Ok(Some(config))
}

fn parse_bounded(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!("{name} must be an integer in [{min}, {max}]"))
    })?;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{min}, {max}]"
        )));
    }
    Ok(value)
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}
