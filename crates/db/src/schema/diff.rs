use super::models::{AlterOp, SchemaChange, TableSchema};

/// Compute the change needed to bring `actual` in line with `desired`.
///
/// `None` means the table already matches. An absent table becomes one
/// `CreateTable`; any set of column or index differences becomes one
/// `AlterTable` covering them all. Column names compare ignoring ASCII
/// case; the implicit `id` column never participates.
pub fn diff_schema(desired: &TableSchema, actual: Option<&TableSchema>) -> Option<SchemaChange> {
    let actual = match actual {
        Some(actual) => actual,
        None => return Some(SchemaChange::CreateTable(desired.clone())),
    };

    let mut ops = Vec::new();

    for want in &desired.columns {
        match actual.column(&want.name) {
            None => {
                ops.push(AlterOp::AddColumn(want.clone()));
                if want.indexed {
                    ops.push(AlterOp::CreateIndex {
                        column: want.name.clone(),
                    });
                }
            }
            Some(have) => {
                if have.column_type != want.column_type {
                    ops.push(AlterOp::ChangeType {
                        column: want.name.clone(),
                        column_type: want.column_type,
                    });
                }
                if want.indexed && !have.indexed {
                    ops.push(AlterOp::CreateIndex {
                        column: want.name.clone(),
                    });
                } else if !want.indexed && have.indexed {
                    ops.push(AlterOp::DropIndex {
                        column: want.name.clone(),
                    });
                }
            }
        }
    }

    for have in &actual.columns {
        if desired.column(&have.name).is_none() {
            ops.push(AlterOp::DropColumn(have.name.clone()));
        }
    }

    if ops.is_empty() {
        None
    } else {
        Some(SchemaChange::AlterTable {
            table: desired.name.clone(),
            ops,
        })
    }
}
