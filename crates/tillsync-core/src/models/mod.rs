//! Data models for tillsync

mod queued_change;
mod record;
mod sync_metadata;
mod table;

pub use queued_change::{ChangeOperation, QueuedChange};
pub use record::{RecordId, TrackedRecord};
pub use sync_metadata::{SyncCursors, SyncMetadata, SyncStatus};
pub use table::{TableRegistry, TrackedTable};
