use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use tillsync_core::config::{ConfigError, SyncSettings, DB_PATH_VAR, REMOTE_URL_VAR};
use tillsync_core::util::normalize_text_option;

pub const BIND_ADDR_VAR: &str = "TILLSYNC_API_BIND_ADDR";
pub const SCHEDULER_VAR: &str = "TILLSYNC_API_SCHEDULER";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Local database of the terminal this API serves
    pub db_path: PathBuf,
    /// Run the background scheduler next to the HTTP triggers
    pub run_scheduler: bool,
    pub sync: SyncSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, BIND_ADDR_VAR, "127.0.0.1:8787");
        if bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "{BIND_ADDR_VAR} must be a socket address such as 127.0.0.1:8787"
            )));
        }

        let run_scheduler = match value_or_default(&lookup, SCHEDULER_VAR, "true")
            .to_ascii_lowercase()
            .as_str()
        {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "{SCHEDULER_VAR} must be true or false"
                )))
            }
        };

        let sync = SyncSettings::from_lookup(&lookup)?;
        if !sync.is_sync_enabled() {
            return Err(ConfigError::MissingVar(REMOTE_URL_VAR));
        }
        let db_path = sync
            .db_path
            .clone()
            .ok_or(ConfigError::MissingVar(DB_PATH_VAR))?;

        Ok(Self {
            bind_addr,
            db_path,
            run_scheduler,
            sync,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    normalize_text_option(lookup(name)).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tillsync_core::config::REMOTE_AUTH_TOKEN_VAR;

    fn parse(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_requires_remote_and_db_path() {
        let err = parse(&[]).unwrap_err();
        assert!(err.to_string().contains(REMOTE_URL_VAR));

        let err = parse(&[(REMOTE_URL_VAR, "/srv/shared/pos.db")]).unwrap_err();
        assert!(err.to_string().contains(DB_PATH_VAR));
    }

    #[test]
    fn config_defaults_bind_addr_and_scheduler() {
        let config = parse(&[
            (REMOTE_URL_VAR, "/srv/shared/pos.db"),
            (DB_PATH_VAR, "/var/lib/tillsync/till.db"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8787");
        assert!(config.run_scheduler);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/tillsync/till.db"));
    }

    #[test]
    fn config_rejects_bad_bind_addr_and_flag() {
        let base = [
            (REMOTE_URL_VAR, "/srv/shared/pos.db"),
            (DB_PATH_VAR, "till.db"),
        ];

        let err = parse(&[base[0], base[1], (BIND_ADDR_VAR, "localhost")]).unwrap_err();
        assert!(err.to_string().contains(BIND_ADDR_VAR));

        let err = parse(&[base[0], base[1], (SCHEDULER_VAR, "sometimes")]).unwrap_err();
        assert!(err.to_string().contains(SCHEDULER_VAR));

        let config = parse(&[base[0], base[1], (SCHEDULER_VAR, "off")]).unwrap();
        assert!(!config.run_scheduler);
    }

    #[test]
    fn config_redacts_remote_token() {
        let config = parse(&[
            (REMOTE_URL_VAR, "libsql://pos.turso.io"),
            (REMOTE_AUTH_TOKEN_VAR, "sensitive-remote-token"),
            (DB_PATH_VAR, "till.db"),
        ])
        .unwrap();

        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("sensitive-remote-token"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
