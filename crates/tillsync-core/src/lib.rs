//! tillsync-core - Core library for tillsync
//!
//! This crate contains the tracked-table models, the libSQL store layer, and
//! the sync engine that reconciles a point-of-sale terminal's local database
//! with the shared remote store. The CLI and the HTTP API are thin shells
//! around it.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{RecordId, TrackedRecord, TrackedTable};
