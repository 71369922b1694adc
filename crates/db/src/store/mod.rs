pub mod memory;
pub mod pg;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::schema::models::{SchemaChange, TableSchema};
use zohomirror_common::error::MirrorResult;

/// Name of the implicit primary-key column on every mirrored table.
pub const ID_COLUMN: &str = "id";

/// A typed cell as read from or written to a mirrored table.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Text(String),
    /// Serves both integer and bigint columns.
    Integer(i64),
    Float(f64),
    /// Arbitrary-precision numerics travel in their canonical string form.
    Decimal(String),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

/// Column name to value map for one row.
pub type RowMap = BTreeMap<String, ColumnValue>;

/// Storage backend for mirrored tables.
///
/// Schema operations (`describe_table`, `apply_change`) and the watermark
/// query run outside any data transaction; row access goes through a
/// session obtained from `begin`.
#[async_trait]
pub trait TableStore: Send + Sync {
    type Session: TableSession;

    /// Observed shape of `table`, or `None` when it does not exist.
    async fn describe_table(&self, table: &str) -> MirrorResult<Option<TableSchema>>;

    /// Apply one schema change. Commits on its own, never retried.
    async fn apply_change(&self, change: &SchemaChange) -> MirrorResult<()>;

    /// `max(column)` over `table`, `None` when the table holds no rows.
    async fn max_datetime(&self, table: &str, column: &str)
        -> MirrorResult<Option<DateTime<Utc>>>;

    /// Open a write session backed by a single transaction.
    async fn begin(&self) -> MirrorResult<Self::Session>;
}

/// One transaction over a table store.
///
/// Reads inside a session see the session's own uncommitted writes. Nothing
/// is visible elsewhere until `commit`; dropping a session without
/// committing discards its writes.
#[async_trait]
pub trait TableSession: Send {
    /// Fetch the non-id columns of the row with the given id.
    async fn find_row(&mut self, schema: &TableSchema, id: &str) -> MirrorResult<Option<RowMap>>;

    /// Insert a new row. `row` holds the non-id columns.
    async fn insert_row(
        &mut self,
        schema: &TableSchema,
        id: &str,
        row: &RowMap,
    ) -> MirrorResult<()>;

    /// Overwrite the non-id columns of an existing row.
    async fn update_row(
        &mut self,
        schema: &TableSchema,
        id: &str,
        row: &RowMap,
    ) -> MirrorResult<()>;

    async fn commit(self) -> MirrorResult<()>;

    async fn rollback(self) -> MirrorResult<()>;
}
