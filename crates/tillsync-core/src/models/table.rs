//! Tracked table registry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Columns every tracked table carries in addition to its own fields.
const BOOKKEEPING_COLUMNS: [&str; 4] = ["id", "created_at", "updated_at", "is_deleted"];

/// A table subject to local/remote reconciliation.
///
/// The logical name of each table is declared here once; nothing derives it
/// at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedTable {
    Users,
    Categories,
    Products,
    ProductVariants,
    Transactions,
    TransactionItems,
}

impl TrackedTable {
    /// Every tracked table in registry order (parents before children).
    pub const ALL: [Self; 6] = [
        Self::Users,
        Self::Categories,
        Self::Products,
        Self::ProductVariants,
        Self::Transactions,
        Self::TransactionItems,
    ];

    /// Logical (and SQL) table name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Categories => "categories",
            Self::Products => "products",
            Self::ProductVariants => "product_variants",
            Self::Transactions => "transactions",
            Self::TransactionItems => "transaction_items",
        }
    }

    /// Table-specific payload columns, excluding the bookkeeping columns.
    #[must_use]
    pub const fn field_columns(self) -> &'static [&'static str] {
        match self {
            Self::Users => &["username", "display_name", "role", "pin_hash", "is_active"],
            Self::Categories => &["name", "description", "sort_order"],
            Self::Products => &[
                "category_id",
                "name",
                "sku",
                "barcode",
                "price_cents",
                "cost_cents",
                "tax_rate_bps",
                "is_active",
            ],
            Self::ProductVariants => &["product_id", "name", "sku", "price_cents", "stock_quantity"],
            Self::Transactions => &[
                "user_id",
                "status",
                "subtotal_cents",
                "tax_cents",
                "total_cents",
                "payment_method",
                "completed_at",
            ],
            Self::TransactionItems => &[
                "transaction_id",
                "product_id",
                "variant_id",
                "quantity",
                "unit_price_cents",
                "line_total_cents",
            ],
        }
    }

    /// All columns in storage order: bookkeeping columns first, then fields.
    pub fn columns(self) -> impl Iterator<Item = &'static str> {
        BOOKKEEPING_COLUMNS
            .into_iter()
            .chain(self.field_columns().iter().copied())
    }

    /// Whether `column` is writable through the record write path.
    #[must_use]
    pub fn has_field(self, column: &str) -> bool {
        self.field_columns().contains(&column)
    }
}

impl fmt::Display for TrackedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TrackedTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|table| table.as_str() == normalized)
            .ok_or_else(|| Error::UnknownTable(s.trim().to_string()))
    }
}

/// Ordered list of tables one orchestrator iterates.
///
/// Membership is restricted to [`TrackedTable`] variants because each one
/// needs a compiled schema and column list; the order and subset are data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRegistry {
    tables: Vec<TrackedTable>,
}

impl TableRegistry {
    /// Build a registry from an explicit ordered list, dropping duplicates.
    #[must_use]
    pub fn new(tables: impl IntoIterator<Item = TrackedTable>) -> Self {
        let mut ordered = Vec::new();
        for table in tables {
            if !ordered.contains(&table) {
                ordered.push(table);
            }
        }
        Self { tables: ordered }
    }

    /// Parse a comma-separated list such as `users,products`.
    pub fn parse_list(raw: &str) -> Result<Self, Error> {
        let tables = raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<TrackedTable>, Error>>()?;
        if tables.is_empty() {
            return Err(Error::InvalidInput(
                "tracked table list must name at least one table".to_string(),
            ));
        }
        Ok(Self::new(tables))
    }

    /// Tables in processing order
    #[must_use]
    pub fn tables(&self) -> &[TrackedTable] {
        &self.tables
    }

    /// Check whether a table is registered
    #[must_use]
    pub fn contains(&self, table: TrackedTable) -> bool {
        self.tables.contains(&table)
    }

    /// Resolve a table name against this registry.
    pub fn resolve(&self, name: &str) -> Result<TrackedTable, Error> {
        let table: TrackedTable = name.parse()?;
        if self.contains(table) {
            Ok(table)
        } else {
            Err(Error::UnknownTable(name.trim().to_string()))
        }
    }

    /// Number of registered tables
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new(TrackedTable::ALL)
    }
}
