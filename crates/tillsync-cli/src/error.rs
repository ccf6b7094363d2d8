use std::io;

use thiserror::Error;
use tillsync_core::config::ConfigError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tillsync_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(
        "Sync is not configured. Set TILLSYNC_REMOTE_URL (and TILLSYNC_REMOTE_AUTH_TOKEN for network stores)."
    )]
    SyncNotConfigured,
    #[error("Sync finished with {0} error(s)")]
    SyncFailed(usize),
}
