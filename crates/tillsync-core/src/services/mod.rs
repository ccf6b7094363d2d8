//! Application-facing services built on the store and sync layers.

mod engine;
mod records;

pub use engine::SyncEngine;
pub use records::RecordService;
