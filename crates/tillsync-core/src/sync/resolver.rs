//! Last-writer-wins conflict resolution
//!
//! The resolver compares whole-row `updated_at` timestamps and never merges
//! individual fields. It is only as trustworthy as the clocks of the
//! terminals that stamped those timestamps.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::TrackedRecord;

/// Which store initiates propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Local changes are propagated to the remote store
    Push,
    /// Remote changes are propagated to the local store
    Pull,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action the table synchronizer takes for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    InsertRemote,
    UpdateRemote,
    InsertLocal,
    UpdateLocal,
    /// The destination already holds a newer copy; propagating would clobber it
    ConflictSkip,
    /// Both copies are already consistent, or there is nothing to propagate
    NoOp,
}

impl Decision {
    /// Whether this decision writes to a store
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            Self::InsertRemote | Self::UpdateRemote | Self::InsertLocal | Self::UpdateLocal
        )
    }
}

/// Decide how to reconcile one record.
///
/// `watermark` is the scan window of the pass: an initiating record older
/// than it is outside the dirty set and yields [`Decision::NoOp`]. Pass
/// `None` to evaluate a record regardless of the window.
#[must_use]
pub fn decide(
    local: Option<&TrackedRecord>,
    remote: Option<&TrackedRecord>,
    watermark: Option<i64>,
    direction: Direction,
) -> Decision {
    let initiating = match direction {
        Direction::Push => local,
        Direction::Pull => remote,
    };
    if let (Some(record), Some(watermark)) = (initiating, watermark) {
        if record.updated_at < watermark {
            return Decision::NoOp;
        }
    }

    match (local, remote) {
        (None, None) => Decision::NoOp,
        (Some(_), None) => Decision::InsertRemote,
        (None, Some(_)) => Decision::InsertLocal,
        (Some(local), Some(remote)) => {
            if local.updated_at == remote.updated_at {
                return Decision::NoOp;
            }
            let local_is_newer = local.is_newer_than(remote);
            match (direction, local_is_newer) {
                (Direction::Push, true) => Decision::UpdateRemote,
                (Direction::Pull, false) => Decision::UpdateLocal,
                (Direction::Push, false) | (Direction::Pull, true) => Decision::ConflictSkip,
            }
        }
    }
}
