//! Tracked record model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a tracked record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One row of a tracked table, as seen by the sync engine.
///
/// `id` has the same meaning on the local and the remote store. Rows written
/// by other terminals may use any string key, so the id is kept as text
/// rather than a [`RecordId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedRecord {
    /// Primary key
    pub id: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms); advances on every mutation
    pub updated_at: i64,
    /// Soft delete flag for sync
    pub is_deleted: bool,
    /// Table-specific columns
    pub fields: Map<String, Value>,
}

impl TrackedRecord {
    /// Create a new record with a fresh id and both timestamps set to `now`.
    #[must_use]
    pub fn new(fields: Map<String, Value>, now: i64) -> Self {
        Self {
            id: RecordId::new().as_str(),
            created_at: now,
            updated_at: now,
            is_deleted: false,
            fields,
        }
    }

    /// Whether this copy was modified strictly after `other`
    #[must_use]
    pub const fn is_newer_than(&self, other: &Self) -> bool {
        self.updated_at > other.updated_at
    }

    /// Read a single field
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Full JSON snapshot of the row, including bookkeeping columns.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert("created_at".to_string(), Value::from(self.created_at));
        map.insert("updated_at".to_string(), Value::from(self.updated_at));
        map.insert("is_deleted".to_string(), Value::Bool(self.is_deleted));
        Value::Object(map)
    }
}
