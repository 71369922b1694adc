use zohomirror_db::store::{ColumnValue, RowMap, ID_COLUMN};

use crate::remote::ModuleDescriptor;

/// Observer for mirrored row changes. Listeners run synchronously in
/// registration order, at most once per record per run, after the
/// write has landed in the (still open) transaction.
pub trait ChangeListener: Send + Sync {
    fn on_insert(&self, module: &ModuleDescriptor, row: &RowMap);

    /// `previous` is the row as it stood before the write, id included.
    fn on_update(&self, module: &ModuleDescriptor, new_row: &RowMap, previous: &RowMap);
}

/// Narrates changes through tracing; the default listener wired by the
/// binary.
pub struct LogChangeListener;

impl ChangeListener for LogChangeListener {
    fn on_insert(&self, module: &ModuleDescriptor, row: &RowMap) {
        tracing::info!(
            module = %module.api_name,
            id = %row_id(row),
            columns = row.len(),
            "row inserted"
        );
    }

    fn on_update(&self, module: &ModuleDescriptor, new_row: &RowMap, previous: &RowMap) {
        let changed = new_row
            .iter()
            .filter(|(name, value)| {
                name.as_str() != ID_COLUMN && previous.get(name.as_str()) != Some(*value)
            })
            .count();
        tracing::info!(
            module = %module.api_name,
            id = %row_id(new_row),
            changed,
            "row updated"
        );
    }
}

fn row_id(row: &RowMap) -> &str {
    match row.get(ID_COLUMN) {
        Some(ColumnValue::Text(id)) => id,
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_id_reads_the_id_column() {
        let mut row = RowMap::new();
        row.insert(ID_COLUMN.to_string(), ColumnValue::Text("lead-7".to_string()));
        assert_eq!(row_id(&row), "lead-7");
    }

    #[test]
    fn row_without_id_prints_placeholder() {
        assert_eq!(row_id(&RowMap::new()), "?");
    }
}
