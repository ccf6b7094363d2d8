//! Shared sync state types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sync::RunReport;

/// Sync state published by the scheduler to the CLI and the API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No scheduler is running, or it has stopped
    #[default]
    Offline,
    Syncing,
    Synced,
    Error,
}

impl SyncState {
    /// State after a finished run
    #[must_use]
    pub const fn after(report: &RunReport) -> Self {
        if report.success {
            Self::Synced
        } else {
            Self::Error
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
