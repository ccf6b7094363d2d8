//! Database layer for tillsync

mod connection;
mod metadata_repository;
mod migrations;
mod record_repository;

pub use connection::{Database, RemoteConfig};
pub use metadata_repository::{LibSqlSyncMetadataRepository, SyncMetadataRepository};
pub use record_repository::{LibSqlRecordRepository, RecordRepository};
