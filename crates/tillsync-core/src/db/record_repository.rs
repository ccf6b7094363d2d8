//! Tracked record storage, shared by the local and the remote store

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use std::future::Future;

use libsql::{params_from_iter, Connection, Row, Value as SqlValue};
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::models::{TrackedRecord, TrackedTable};

/// Row-level access to tracked tables on one store.
///
/// The sync engine reads diffs and writes reconciled rows through this trait,
/// so local and remote stores (and test doubles) are interchangeable.
pub trait RecordRepository: Send + Sync {
    /// Records with `updated_at >= since`, oldest first; every record when `since` is `None`.
    fn changed_since(
        &self,
        table: TrackedTable,
        since: Option<i64>,
    ) -> impl Future<Output = Result<Vec<TrackedRecord>>> + Send;

    /// Fetch one record by id, including soft-deleted rows
    fn get(
        &self,
        table: TrackedTable,
        id: &str,
    ) -> impl Future<Output = Result<Option<TrackedRecord>>> + Send;

    /// Insert a record exactly as given (timestamps are not touched)
    fn insert(
        &self,
        table: TrackedTable,
        record: &TrackedRecord,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Overwrite an existing record exactly as given
    fn update(
        &self,
        table: TrackedTable,
        record: &TrackedRecord,
    ) -> impl Future<Output = Result<()>> + Send;

    /// List live (not deleted) records, most recently updated first
    fn list(
        &self,
        table: TrackedTable,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Vec<TrackedRecord>>> + Send;
}

/// libSQL implementation of `RecordRepository`
#[derive(Clone)]
pub struct LibSqlRecordRepository {
    conn: Connection,
}

impl LibSqlRecordRepository {
    /// Create a new repository over the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    fn select_clause(table: TrackedTable) -> String {
        let columns = table.columns().collect::<Vec<_>>().join(", ");
        format!("SELECT {columns} FROM {table}")
    }

    async fn query_records(
        &self,
        table: TrackedTable,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<Vec<TrackedRecord>> {
        let mut rows = self.conn.query(sql, params_from_iter(params)).await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(table, &row)?);
        }
        Ok(records)
    }

    /// Parse a record from a row selected with [`Self::select_clause`]
    fn parse_record(table: TrackedTable, row: &Row) -> Result<TrackedRecord> {
        let id = match row.get_value(0)? {
            SqlValue::Text(id) => id,
            SqlValue::Integer(id) => id.to_string(),
            other => {
                return Err(Error::Database(format!(
                    "{table}: unsupported id value {other:?}"
                )))
            }
        };
        let created_at = integer_column(table, "created_at", row.get_value(1)?)?;
        let updated_at = integer_column(table, "updated_at", row.get_value(2)?)?;
        let is_deleted = integer_column(table, "is_deleted", row.get_value(3)?)? != 0;

        let mut fields = Map::new();
        for (offset, column) in table.field_columns().iter().enumerate() {
            let index = i32::try_from(offset + 4)
                .map_err(|_| Error::Database(format!("{table}: too many columns")))?;
            fields.insert((*column).to_string(), sql_to_json(row.get_value(index)?));
        }

        Ok(TrackedRecord {
            id,
            created_at,
            updated_at,
            is_deleted,
            fields,
        })
    }

    /// Values for every column of `table`, in [`TrackedTable::columns`] order
    fn column_values(table: TrackedTable, record: &TrackedRecord) -> Vec<SqlValue> {
        let mut values = vec![
            SqlValue::Text(record.id.clone()),
            SqlValue::Integer(record.created_at),
            SqlValue::Integer(record.updated_at),
            SqlValue::Integer(i64::from(record.is_deleted)),
        ];
        values.extend(
            table
                .field_columns()
                .iter()
                .map(|column| record.field(column).map_or(SqlValue::Null, json_to_sql)),
        );
        values
    }
}

impl RecordRepository for LibSqlRecordRepository {
    async fn changed_since(
        &self,
        table: TrackedTable,
        since: Option<i64>,
    ) -> Result<Vec<TrackedRecord>> {
        let select = Self::select_clause(table);
        match since {
            Some(watermark) => {
                let sql = format!("{select} WHERE updated_at >= ? ORDER BY updated_at, id");
                self.query_records(table, &sql, vec![SqlValue::Integer(watermark)])
                    .await
            }
            None => {
                let sql = format!("{select} ORDER BY updated_at, id");
                self.query_records(table, &sql, Vec::new()).await
            }
        }
    }

    async fn get(&self, table: TrackedTable, id: &str) -> Result<Option<TrackedRecord>> {
        let sql = format!("{} WHERE id = ?", Self::select_clause(table));
        let mut records = self
            .query_records(table, &sql, vec![SqlValue::Text(id.to_string())])
            .await?;
        Ok(records.pop())
    }

    async fn insert(&self, table: TrackedTable, record: &TrackedRecord) -> Result<()> {
        let columns = table.columns().collect::<Vec<_>>();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );

        self.conn
            .execute(&sql, params_from_iter(Self::column_values(table, record)))
            .await?;
        Ok(())
    }

    async fn update(&self, table: TrackedTable, record: &TrackedRecord) -> Result<()> {
        let assignments = table
            .columns()
            .skip(1)
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {table} SET {assignments} WHERE id = ?");

        let mut values = Self::column_values(table, record);
        let id = values.remove(0);
        values.push(id);

        let rows = self.conn.execute(&sql, params_from_iter(values)).await?;
        if rows == 0 {
            return Err(Error::NotFound(format!("{table}/{}", record.id)));
        }
        Ok(())
    }

    async fn list(
        &self,
        table: TrackedTable,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TrackedRecord>> {
        let sql = format!(
            "{} WHERE is_deleted = 0 ORDER BY updated_at DESC LIMIT ? OFFSET ?",
            Self::select_clause(table)
        );
        self.query_records(
            table,
            &sql,
            vec![
                SqlValue::Integer(limit as i64),
                SqlValue::Integer(offset as i64),
            ],
        )
        .await
    }
}

fn integer_column(table: TrackedTable, column: &str, value: SqlValue) -> Result<i64> {
    match value {
        SqlValue::Integer(value) => Ok(value),
        SqlValue::Null => Ok(0),
        other => Err(Error::Database(format!(
            "{table}.{column}: expected integer, found {other:?}"
        ))),
    }
}

/// Convert a JSON field value to a SQL parameter.
///
/// Booleans become 0/1 and nested structures are stored as JSON text.
pub(crate) fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => number.as_i64().map_or_else(
            || number.as_f64().map_or(SqlValue::Null, SqlValue::Real),
            SqlValue::Integer,
        ),
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Convert a SQL column value to JSON.
pub(crate) fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => Value::from(value),
        SqlValue::Real(value) => Number::from_f64(value).map_or(Value::Null, Value::Number),
        SqlValue::Text(text) => Value::String(text),
        SqlValue::Blob(bytes) => Value::from(bytes),
    }
}
