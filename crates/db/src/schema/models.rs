/// Storage type of a mirrored column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Text,
    Integer,
    BigInt,
    Float,
    Decimal,
    Boolean,
    Date,
    DateTime,
}

/// One non-id column of a mirrored table. All such columns are nullable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub indexed: bool,
}

/// Shape of a mirrored table, desired or as observed.
///
/// Every mirrored table carries an implicit `id` text primary-key column;
/// it never appears in `columns` and never takes part in diffing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Find a column by name, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// DDL produced by the schema diff. At most one change per reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    CreateTable(TableSchema),
    AlterTable { table: String, ops: Vec<AlterOp> },
}

impl SchemaChange {
    pub fn table(&self) -> &str {
        match self {
            SchemaChange::CreateTable(schema) => &schema.name,
            SchemaChange::AlterTable { table, .. } => table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterOp {
    AddColumn(ColumnSpec),
    /// Dropping a column takes any index on it along.
    DropColumn(String),
    ChangeType {
        column: String,
        column_type: ColumnType,
    },
    CreateIndex {
        column: String,
    },
    DropIndex {
        column: String,
    },
}
