use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use zohomirror_common::error::MirrorResult;
use zohomirror_db::schema::models::ColumnType;
use zohomirror_db::store::{ColumnValue, RowMap, TableSession, TableStore, ID_COLUMN};

use crate::fields::AccessorMap;
use crate::listener::ChangeListener;
use crate::reconcile::ReconciledTable;
use crate::remote::{PageQuery, Record, RemoteModule};

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Counters for one copy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyReport {
    pub table: String,
    /// Non-empty pages consumed.
    pub pages: usize,
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
}

/// Copies a module's records into its mirror table: one transaction
/// per run, insert-or-update decided by an in-transaction lookup,
/// listeners fired once per written record.
pub struct IncrementalCopier<S>
where
    S: TableStore,
{
    store: S,
    page_size: usize,
    watermark_field: String,
    listeners: Vec<Arc<dyn ChangeListener>>,
}

impl<S> IncrementalCopier<S>
where
    S: TableStore,
{
    pub fn new(
        store: S,
        page_size: usize,
        watermark_field: impl Into<String>,
        listeners: Vec<Arc<dyn ChangeListener>>,
    ) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            watermark_field: watermark_field.into(),
            listeners,
        }
    }

    /// Run one copy. Any failure rolls the whole transaction back and
    /// surfaces the original error; nothing is retried here.
    pub async fn copy_data<M>(
        &self,
        module: &M,
        target: &ReconciledTable,
        incremental: bool,
    ) -> MirrorResult<CopyReport>
    where
        M: RemoteModule,
    {
        let watermark = if incremental {
            self.watermark(target).await?
        } else {
            None
        };

        let accessors = AccessorMap::new(&target.descriptors);
        let mut report = CopyReport {
            table: target.table().to_string(),
            pages: 0,
            processed: 0,
            inserted: 0,
            updated: 0,
        };

        let mut session = self.store.begin().await?;
        match self
            .copy_pages(module, target, &accessors, watermark, &mut session, &mut report)
            .await
        {
            Ok(()) => {
                session.commit().await?;
                tracing::info!(
                    table = %report.table,
                    pages = report.pages,
                    inserted = report.inserted,
                    updated = report.updated,
                    "copy committed"
                );
                Ok(report)
            }
            Err(e) => {
                if let Err(rollback_err) = session.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Resume point for an incremental run: the newest mirrored
    /// activity timestamp plus one second. `None` means full fetch.
    async fn watermark(&self, target: &ReconciledTable) -> MirrorResult<Option<DateTime<Utc>>> {
        let descriptor = target
            .descriptors
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(&self.watermark_field));
        let descriptor = match descriptor {
            Some(d) if d.category.column_type() == ColumnType::DateTime => d,
            Some(d) => {
                tracing::warn!(
                    table = %target.table(),
                    field = %d.name,
                    category = ?d.category,
                    "watermark field is not a datetime, falling back to a full fetch"
                );
                return Ok(None);
            }
            None => {
                tracing::warn!(
                    table = %target.table(),
                    field = %self.watermark_field,
                    "module has no watermark field, falling back to a full fetch"
                );
                return Ok(None);
            }
        };

        let newest = self
            .store
            .max_datetime(target.table(), &descriptor.name)
            .await?;
        Ok(newest.map(|ts| ts + Duration::seconds(1)))
    }

    async fn copy_pages<M>(
        &self,
        module: &M,
        target: &ReconciledTable,
        accessors: &AccessorMap,
        watermark: Option<DateTime<Utc>>,
        session: &mut S::Session,
        report: &mut CopyReport,
    ) -> MirrorResult<()>
    where
        M: RemoteModule,
    {
        let mut offset = 0usize;
        loop {
            let query = PageQuery {
                modified_since: watermark,
                page_size: self.page_size,
                offset,
                ..PageQuery::default()
            };
            let records = module.paginated_records(&query).await?;
            // An empty page is the only terminator; a short page still
            // gets a follow-up fetch.
            if records.is_empty() {
                break;
            }
            report.pages += 1;
            for record in &records {
                self.copy_record(target, accessors, record, session, report)
                    .await?;
                tracing::debug!(
                    table = %report.table,
                    id = %record.id,
                    n = report.processed,
                    "processed record"
                );
            }
            offset += self.page_size;
        }
        Ok(())
    }

    async fn copy_record(
        &self,
        target: &ReconciledTable,
        accessors: &AccessorMap,
        record: &Record,
        session: &mut S::Session,
        report: &mut CopyReport,
    ) -> MirrorResult<()> {
        let row = accessors.row_for(record)?;
        match session.find_row(&target.schema, &record.id).await? {
            None => {
                session.insert_row(&target.schema, &record.id, &row).await?;
                report.inserted += 1;
                let written = with_id(&record.id, &row);
                for listener in &self.listeners {
                    listener.on_insert(&target.module, &written);
                }
            }
            Some(previous) => {
                session.update_row(&target.schema, &record.id, &row).await?;
                report.updated += 1;
                let new_row = with_id(&record.id, &row);
                let previous = with_id(&record.id, &previous);
                for listener in &self.listeners {
                    listener.on_update(&target.module, &new_row, &previous);
                }
            }
        }
        report.processed += 1;
        Ok(())
    }
}

fn with_id(id: &str, row: &RowMap) -> RowMap {
    let mut out = row.clone();
    out.insert(ID_COLUMN.to_string(), ColumnValue::Text(id.to_string()));
    out
}
