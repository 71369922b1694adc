use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::schema::models::{AlterOp, SchemaChange, TableSchema};
use crate::store::{ColumnValue, RowMap, TableSession, TableStore};
use zohomirror_common::error::{MirrorError, MirrorResult};

/// In-memory twin of the Postgres store for exercising sync logic
/// without a database. Sessions stage their writes and only fold them
/// into the shared state on commit, so rollback really discards.
#[derive(Clone, Default)]
pub struct MemoryTableStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    changes_applied: usize,
    commits: usize,
    rollbacks: usize,
    fail_writes_after: Option<usize>,
    writes_seen: usize,
}

struct MemoryTable {
    schema: TableSchema,
    rows: BTreeMap<String, RowMap>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write past the first `writes` fail, emulating a
    /// database error mid-run.
    pub async fn fail_writes_after(&self, writes: usize) {
        self.inner.lock().await.fail_writes_after = Some(writes);
    }

    pub async fn changes_applied(&self) -> usize {
        self.inner.lock().await.changes_applied
    }

    pub async fn commit_count(&self) -> usize {
        self.inner.lock().await.commits
    }

    pub async fn rollback_count(&self) -> usize {
        self.inner.lock().await.rollbacks
    }

    pub async fn table_schema(&self, table: &str) -> Option<TableSchema> {
        self.inner
            .lock()
            .await
            .tables
            .get(table)
            .map(|t| t.schema.clone())
    }

    /// Committed rows of a table ordered by id.
    pub async fn committed_rows(&self, table: &str) -> Vec<(String, RowMap)> {
        self.inner
            .lock()
            .await
            .tables
            .get(table)
            .map(|t| {
                t.rows
                    .iter()
                    .map(|(id, row)| (id.clone(), row.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    type Session = MemoryTableSession;

    async fn describe_table(&self, table: &str) -> MirrorResult<Option<TableSchema>> {
        Ok(self
            .inner
            .lock()
            .await
            .tables
            .get(table)
            .map(|t| t.schema.clone()))
    }

    async fn apply_change(&self, change: &SchemaChange) -> MirrorResult<()> {
        let mut state = self.inner.lock().await;
        match change {
            SchemaChange::CreateTable(schema) => {
                if state.tables.contains_key(&schema.name) {
                    return Err(schema_error(&schema.name, "table already exists".to_string()));
                }
                state.tables.insert(
                    schema.name.clone(),
                    MemoryTable {
                        schema: schema.clone(),
                        rows: BTreeMap::new(),
                    },
                );
            }
            SchemaChange::AlterTable { table, ops } => {
                let entry = state
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| schema_error(table, "no such table".to_string()))?;
                for op in ops {
                    apply_alter(entry, table, op)?;
                }
            }
        }
        state.changes_applied += 1;
        Ok(())
    }

    async fn max_datetime(
        &self,
        table: &str,
        column: &str,
    ) -> MirrorResult<Option<DateTime<Utc>>> {
        let state = self.inner.lock().await;
        let entry = state
            .tables
            .get(table)
            .ok_or_else(|| MirrorError::Database(format!("no such table {table}")))?;
        let mut max = None;
        for row in entry.rows.values() {
            if let Some(ColumnValue::DateTime(ts)) = row.get(column) {
                if max.map_or(true, |seen| *ts > seen) {
                    max = Some(*ts);
                }
            }
        }
        Ok(max)
    }

    async fn begin(&self) -> MirrorResult<MemoryTableSession> {
        Ok(MemoryTableSession {
            inner: self.inner.clone(),
            staged: Vec::new(),
        })
    }
}

fn apply_alter(entry: &mut MemoryTable, table: &str, op: &AlterOp) -> MirrorResult<()> {
    match op {
        AlterOp::AddColumn(column) => {
            if entry.schema.column(&column.name).is_some() {
                return Err(schema_error(
                    table,
                    format!("column {} already exists", column.name),
                ));
            }
            entry.schema.columns.push(column.clone());
        }
        AlterOp::DropColumn(name) => {
            let position = entry
                .schema
                .columns
                .iter()
                .position(|c| c.name == *name)
                .ok_or_else(|| schema_error(table, format!("no column {name}")))?;
            entry.schema.columns.remove(position);
            for row in entry.rows.values_mut() {
                row.remove(name.as_str());
            }
        }
        AlterOp::ChangeType {
            column,
            column_type,
        } => {
            let spec = entry
                .schema
                .columns
                .iter_mut()
                .find(|c| c.name == *column)
                .ok_or_else(|| schema_error(table, format!("no column {column}")))?;
            // Stored values keep their old shape; only the declared type moves.
            spec.column_type = *column_type;
        }
        AlterOp::CreateIndex { column } => {
            let spec = entry
                .schema
                .columns
                .iter_mut()
                .find(|c| c.name == *column)
                .ok_or_else(|| schema_error(table, format!("no column {column}")))?;
            spec.indexed = true;
        }
        AlterOp::DropIndex { column } => {
            let spec = entry
                .schema
                .columns
                .iter_mut()
                .find(|c| c.name == *column)
                .ok_or_else(|| schema_error(table, format!("no column {column}")))?;
            spec.indexed = false;
        }
    }
    Ok(())
}

fn schema_error(table: &str, message: String) -> MirrorError {
    MirrorError::SchemaApplication {
        table: table.to_string(),
        message,
    }
}

// Every schema column present, missing ones as null; the shape a select
// returns and an update writes.
fn full_row(schema: &TableSchema, row: &RowMap) -> RowMap {
    schema
        .columns
        .iter()
        .map(|column| {
            let value = row
                .get(column.name.as_str())
                .cloned()
                .unwrap_or(ColumnValue::Null);
            (column.name.clone(), value)
        })
        .collect()
}

enum StagedWrite {
    Insert {
        table: String,
        id: String,
        row: RowMap,
    },
    Update {
        table: String,
        id: String,
        row: RowMap,
    },
}

pub struct MemoryTableSession {
    inner: Arc<Mutex<MemoryState>>,
    staged: Vec<StagedWrite>,
}

impl MemoryTableSession {
    fn staged_for(&self, table: &str, id: &str) -> Option<RowMap> {
        let mut current: Option<RowMap> = None;
        for write in &self.staged {
            match write {
                StagedWrite::Insert {
                    table: t,
                    id: i,
                    row,
                } if t == table && i == id => {
                    current = Some(row.clone());
                }
                StagedWrite::Update {
                    table: t,
                    id: i,
                    row,
                } if t == table && i == id => {
                    if let Some(base) = &mut current {
                        for (key, value) in row {
                            base.insert(key.clone(), value.clone());
                        }
                    } else {
                        current = Some(row.clone());
                    }
                }
                _ => {}
            }
        }
        current
    }
}

#[async_trait]
impl TableSession for MemoryTableSession {
    async fn find_row(&mut self, schema: &TableSchema, id: &str) -> MirrorResult<Option<RowMap>> {
        let state = self.inner.lock().await;
        let entry = state
            .tables
            .get(&schema.name)
            .ok_or_else(|| MirrorError::Database(format!("no such table {}", schema.name)))?;
        let mut base = entry.rows.get(id).cloned();
        drop(state);

        if let Some(staged) = self.staged_for(&schema.name, id) {
            match &mut base {
                Some(row) => {
                    for (key, value) in staged {
                        row.insert(key, value);
                    }
                }
                None => base = Some(staged),
            }
        }

        Ok(base.map(|row| full_row(schema, &row)))
    }

    async fn insert_row(
        &mut self,
        schema: &TableSchema,
        id: &str,
        row: &RowMap,
    ) -> MirrorResult<()> {
        let mut state = self.inner.lock().await;
        state.writes_seen += 1;
        if let Some(limit) = state.fail_writes_after {
            if state.writes_seen > limit {
                return Err(MirrorError::RecordWrite {
                    table: schema.name.clone(),
                    message: "injected write failure".to_string(),
                });
            }
        }
        let entry = state
            .tables
            .get(&schema.name)
            .ok_or_else(|| MirrorError::Database(format!("no such table {}", schema.name)))?;
        for key in row.keys() {
            if entry.schema.column(key).is_none() {
                return Err(MirrorError::RecordWrite {
                    table: schema.name.clone(),
                    message: format!("unknown column {key}"),
                });
            }
        }
        let committed = entry.rows.contains_key(id);
        drop(state);

        if committed || self.staged_for(&schema.name, id).is_some() {
            return Err(MirrorError::RecordWrite {
                table: schema.name.clone(),
                message: format!("duplicate key {id}"),
            });
        }
        self.staged.push(StagedWrite::Insert {
            table: schema.name.clone(),
            id: id.to_string(),
            row: row.clone(),
        });
        Ok(())
    }

    async fn update_row(
        &mut self,
        schema: &TableSchema,
        id: &str,
        row: &RowMap,
    ) -> MirrorResult<()> {
        let mut state = self.inner.lock().await;
        state.writes_seen += 1;
        if let Some(limit) = state.fail_writes_after {
            if state.writes_seen > limit {
                return Err(MirrorError::RecordWrite {
                    table: schema.name.clone(),
                    message: "injected write failure".to_string(),
                });
            }
        }
        let entry = state
            .tables
            .get(&schema.name)
            .ok_or_else(|| MirrorError::Database(format!("no such table {}", schema.name)))?;
        for key in row.keys() {
            if entry.schema.column(key).is_none() {
                return Err(MirrorError::RecordWrite {
                    table: schema.name.clone(),
                    message: format!("unknown column {key}"),
                });
            }
        }
        let committed = entry.rows.contains_key(id);
        drop(state);

        if !committed && self.staged_for(&schema.name, id).is_none() {
            return Err(MirrorError::RecordWrite {
                table: schema.name.clone(),
                message: format!("no row with id {id}"),
            });
        }
        // The SQL update sets every schema column; keys absent from the
        // map become null rather than surviving.
        self.staged.push(StagedWrite::Update {
            table: schema.name.clone(),
            id: id.to_string(),
            row: full_row(schema, row),
        });
        Ok(())
    }

    async fn commit(self) -> MirrorResult<()> {
        let mut state = self.inner.lock().await;
        for write in self.staged {
            match write {
                StagedWrite::Insert { table, id, row } => {
                    if let Some(entry) = state.tables.get_mut(&table) {
                        entry.rows.insert(id, row);
                    }
                }
                StagedWrite::Update { table, id, row } => {
                    if let Some(entry) = state.tables.get_mut(&table) {
                        let target = entry.rows.entry(id).or_default();
                        for (key, value) in row {
                            target.insert(key, value);
                        }
                    }
                }
            }
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self) -> MirrorResult<()> {
        self.inner.lock().await.rollbacks += 1;
        Ok(())
    }
}
