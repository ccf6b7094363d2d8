//! Write path for tracked tables used by the point-of-sale application.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::db::RecordRepository;
use crate::error::{Error, Result};
use crate::models::{ChangeOperation, QueuedChange, TrackedRecord, TrackedTable};
use crate::sync::WriteHook;
use crate::util::now_millis;

/// CRUD over the local store that reports every committed write to a hook.
///
/// Timestamps are stamped here and nowhere else on the write path, so
/// `updated_at` is guaranteed to move forward on each mutation of a row.
#[derive(Clone)]
pub struct RecordService<R> {
    repo: R,
    hook: Arc<dyn WriteHook>,
}

impl<R: RecordRepository> RecordService<R> {
    pub fn new(repo: R, hook: Arc<dyn WriteHook>) -> Self {
        Self { repo, hook }
    }

    /// Insert a new row with a fresh id
    pub async fn create(
        &self,
        table: TrackedTable,
        fields: Map<String, Value>,
    ) -> Result<TrackedRecord> {
        validate_fields(table, &fields)?;
        let record = TrackedRecord::new(fields, now_millis());
        self.repo.insert(table, &record).await?;
        self.notify(ChangeOperation::Create, table, &record);
        Ok(record)
    }

    /// Merge `fields` into an existing live row
    pub async fn update(
        &self,
        table: TrackedTable,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<TrackedRecord> {
        validate_fields(table, &fields)?;
        let mut record = self.live(table, id).await?;
        record.fields.extend(fields);
        record.updated_at = next_updated_at(record.updated_at);
        self.repo.update(table, &record).await?;
        self.notify(ChangeOperation::Update, table, &record);
        Ok(record)
    }

    /// Soft-delete a live row so the deletion propagates like any other change
    pub async fn delete(&self, table: TrackedTable, id: &str) -> Result<()> {
        let mut record = self.live(table, id).await?;
        record.is_deleted = true;
        record.updated_at = next_updated_at(record.updated_at);
        self.repo.update(table, &record).await?;
        self.notify(ChangeOperation::Delete, table, &record);
        Ok(())
    }

    /// Fetch a live row
    pub async fn get(&self, table: TrackedTable, id: &str) -> Result<Option<TrackedRecord>> {
        Ok(self
            .repo
            .get(table, id)
            .await?
            .filter(|record| !record.is_deleted))
    }

    /// List live rows, most recently updated first
    pub async fn list(
        &self,
        table: TrackedTable,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TrackedRecord>> {
        self.repo.list(table, limit, offset).await
    }

    async fn live(&self, table: TrackedTable, id: &str) -> Result<TrackedRecord> {
        self.get(table, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{table}/{id}")))
    }

    fn notify(&self, operation: ChangeOperation, table: TrackedTable, record: &TrackedRecord) {
        let snapshot = match operation {
            ChangeOperation::Delete => None,
            ChangeOperation::Create | ChangeOperation::Update => Some(record.snapshot()),
        };
        self.hook.after_write(QueuedChange::new(
            operation,
            table,
            record.id.clone(),
            snapshot,
            now_millis(),
        ));
    }
}

/// Strictly later than `previous`, even if the wall clock has not moved.
fn next_updated_at(previous: i64) -> i64 {
    now_millis().max(previous.saturating_add(1))
}

fn validate_fields(table: TrackedTable, fields: &Map<String, Value>) -> Result<()> {
    if let Some(column) = fields.keys().find(|column| !table.has_field(column)) {
        return Err(Error::InvalidInput(format!(
            "{table} has no writable column '{column}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, LibSqlRecordRepository};
    use crate::sync::ChangeQueue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> (Database, Arc<ChangeQueue>, RecordService<LibSqlRecordRepository>) {
        let db = Database::open_in_memory().await.unwrap();
        let queue = Arc::new(ChangeQueue::new());
        let service = RecordService::new(
            LibSqlRecordRepository::new(db.connection().clone()),
            Arc::clone(&queue) as Arc<dyn WriteHook>,
        );
        (db, queue, service)
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_stamps_and_queues() {
        let (_db, queue, service) = setup().await;

        let record = service
            .create(
                TrackedTable::Categories,
                fields(json!({"name": "Drinks", "sort_order": 1})),
            )
            .await
            .unwrap();

        assert_eq!(record.created_at, record.updated_at);
        assert!(!record.is_deleted);
        let pending = queue.pending(TrackedTable::Categories);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record_id, record.id);
        assert_eq!(pending[0].operation, ChangeOperation::Create);
        assert_eq!(pending[0].snapshot.as_ref().unwrap()["name"], json!("Drinks"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_merges_fields_and_advances_timestamp() {
        let (_db, queue, service) = setup().await;
        let created = service
            .create(
                TrackedTable::Products,
                fields(json!({"name": "Bagel", "price_cents": 300})),
            )
            .await
            .unwrap();

        let updated = service
            .update(
                TrackedTable::Products,
                &created.id,
                fields(json!({"price_cents": 350})),
            )
            .await
            .unwrap();

        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.field("name"), Some(&json!("Bagel")));
        assert_eq!(updated.field("price_cents"), Some(&json!(350)));
        assert_eq!(queue.pending(TrackedTable::Products)[0].operation, ChangeOperation::Update);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_is_soft_and_hides_row() {
        let (_db, queue, service) = setup().await;
        let created = service
            .create(TrackedTable::Users, fields(json!({"username": "sam"})))
            .await
            .unwrap();

        service.delete(TrackedTable::Users, &created.id).await.unwrap();

        assert!(service.get(TrackedTable::Users, &created.id).await.unwrap().is_none());
        let pending = queue.pending(TrackedTable::Users);
        assert!(pending[0].is_delete());
        assert!(matches!(
            service.delete(TrackedTable::Users, &created.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_column_is_rejected_without_queueing() {
        let (_db, queue, service) = setup().await;

        let err = service
            .create(TrackedTable::Products, fields(json!({"colour": "red"})))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_missing_row_is_not_found() {
        let (_db, _queue, service) = setup().await;
        let err = service
            .update(TrackedTable::Products, "missing", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_next_updated_at_is_strictly_later() {
        let future = now_millis() + 60_000;
        assert_eq!(next_updated_at(future), future + 1);
        assert!(next_updated_at(0) > 0);
    }
}
