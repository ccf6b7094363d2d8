//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }
    if version < 3 {
        migrate_v3(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Execute `statements` inside one transaction, rolling back on the first failure.
async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: tracked point-of-sale tables
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            username TEXT,
            display_name TEXT,
            role TEXT,
            pin_hash TEXT,
            is_active INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_users_updated ON users(updated_at)",
        "CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            name TEXT,
            description TEXT,
            sort_order INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_categories_updated ON categories(updated_at)",
        "CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            category_id TEXT,
            name TEXT,
            sku TEXT,
            barcode TEXT,
            price_cents INTEGER,
            cost_cents INTEGER,
            tax_rate_bps INTEGER,
            is_active INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_products_updated ON products(updated_at)",
        "CREATE TABLE IF NOT EXISTS product_variants (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            product_id TEXT,
            name TEXT,
            sku TEXT,
            price_cents INTEGER,
            stock_quantity INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_product_variants_updated ON product_variants(updated_at)",
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            user_id TEXT,
            status TEXT,
            subtotal_cents INTEGER,
            tax_cents INTEGER,
            total_cents INTEGER,
            payment_method TEXT,
            completed_at INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_transactions_updated ON transactions(updated_at)",
        "CREATE TABLE IF NOT EXISTS transaction_items (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            transaction_id TEXT,
            product_id TEXT,
            variant_id TEXT,
            quantity INTEGER,
            unit_price_cents INTEGER,
            line_total_cents INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_transaction_items_updated ON transaction_items(updated_at)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    apply(conn, &statements).await?;
    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: per-table sync watermarks
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS sync_metadata (
            table_name TEXT PRIMARY KEY,
            last_sync_at INTEGER,
            sync_version INTEGER NOT NULL DEFAULT 0,
            conflict_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "INSERT INTO schema_version (version) VALUES (2)",
    ];

    apply(conn, &statements).await?;
    tracing::info!("Migrated database to version 2");
    Ok(())
}

/// Migration to version 3: separate push and pull scan cursors
async fn migrate_v3(conn: &Connection) -> Result<()> {
    let statements = [
        "ALTER TABLE sync_metadata ADD COLUMN last_push_at INTEGER",
        "ALTER TABLE sync_metadata ADD COLUMN last_pull_at INTEGER",
        // Existing watermarks seed both directions
        "UPDATE sync_metadata SET last_push_at = last_sync_at, last_pull_at = last_sync_at",
        "INSERT INTO schema_version (version) VALUES (3)",
    ];

    apply(conn, &statements).await?;
    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackedTable;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = ?
                )",
                [name],
            )
            .await
            .unwrap();

        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_every_tracked_table_is_created() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in TrackedTable::ALL {
            assert!(table_exists(&conn, table.as_str()).await, "{table}");
        }
        assert!(table_exists(&conn, "sync_metadata").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_v3_seeds_cursors_from_existing_watermark() {
        let conn = setup().await;
        migrate_v1(&conn).await.unwrap();
        migrate_v2(&conn).await.unwrap();
        conn.execute(
            "INSERT INTO sync_metadata (table_name, last_sync_at, sync_version, created_at, updated_at)
             VALUES ('products', 500, 2, 1, 1)",
            (),
        )
        .await
        .unwrap();

        run(&conn).await.unwrap();

        let mut rows = conn
            .query(
                "SELECT last_push_at, last_pull_at FROM sync_metadata WHERE table_name = 'products'",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 500);
        assert_eq!(row.get::<i64>(1).unwrap(), 500);
        assert_eq!(get_version(&conn).await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tracked_columns_match_schema() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in TrackedTable::ALL {
            let columns = table.columns().collect::<Vec<_>>().join(", ");
            let sql = format!("SELECT {columns} FROM {table} LIMIT 0");
            conn.query(&sql, ()).await.unwrap();
        }
    }
}
