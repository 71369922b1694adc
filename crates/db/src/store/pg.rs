use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::schema::models::{AlterOp, ColumnSpec, ColumnType, SchemaChange, TableSchema};
use crate::store::{ColumnValue, RowMap, TableSession, TableStore, ID_COLUMN};
use zohomirror_common::error::{MirrorError, MirrorResult};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>;

/// Postgres-backed table store. All generated SQL quotes identifiers, so
/// mirrored names keep their exact casing and never clash with keywords.
#[derive(Clone)]
pub struct PgTableStore {
    pool: PgPool,
}

impl PgTableStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TableStore for PgTableStore {
    type Session = PgTableSession;

    async fn describe_table(&self, table: &str) -> MirrorResult<Option<TableSchema>> {
        let rows = sqlx::query(
            "select column_name, data_type
             from information_schema.columns
             where table_schema = current_schema() and table_name = $1
             order by ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MirrorError::Database(e.to_string()))?;

        if rows.is_empty() {
            return Ok(None);
        }

        let index_rows = sqlx::query(
            "select indexname from pg_indexes
             where schemaname = current_schema() and tablename = $1",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MirrorError::Database(e.to_string()))?;
        let indexes: HashSet<String> = index_rows
            .iter()
            .map(|row| row.get::<String, _>("indexname"))
            .collect();

        let mut columns = Vec::new();
        for row in &rows {
            let name: String = row.get("column_name");
            if name.eq_ignore_ascii_case(ID_COLUMN) {
                continue;
            }
            let data_type: String = row.get("data_type");
            // The table is mirror-owned; a type outside the closed set is
            // surfaced rather than guessed at.
            let column_type = column_type_from_pg(&data_type).ok_or_else(|| {
                MirrorError::Database(format!(
                    "table {table} column {name} has unsupported type {data_type}"
                ))
            })?;
            let indexed = indexes.contains(&index_name(table, &name));
            columns.push(ColumnSpec {
                name,
                column_type,
                indexed,
            });
        }

        Ok(Some(TableSchema {
            name: table.to_string(),
            columns,
        }))
    }

    async fn apply_change(&self, change: &SchemaChange) -> MirrorResult<()> {
        let table = change.table().to_string();
        for statement in change_statements(change) {
            tracing::info!(table = %table, statement = %statement, "applying ddl");
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(|e| MirrorError::SchemaApplication {
                    table: table.clone(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }

    async fn max_datetime(
        &self,
        table: &str,
        column: &str,
    ) -> MirrorResult<Option<DateTime<Utc>>> {
        let sql = format!(
            "select max({}) from {}",
            quote_ident(column),
            quote_ident(table)
        );
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MirrorError::Database(e.to_string()))?;
        row.try_get::<Option<DateTime<Utc>>, _>(0)
            .map_err(|e| MirrorError::Database(e.to_string()))
    }

    async fn begin(&self) -> MirrorResult<PgTableSession> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MirrorError::Database(e.to_string()))?;
        Ok(PgTableSession { tx })
    }
}

pub struct PgTableSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TableSession for PgTableSession {
    async fn find_row(&mut self, schema: &TableSchema, id: &str) -> MirrorResult<Option<RowMap>> {
        let sql = select_row_sql(schema);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| MirrorError::Database(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(decode_row(schema, &row)?)),
            None => Ok(None),
        }
    }

    async fn insert_row(
        &mut self,
        schema: &TableSchema,
        id: &str,
        row: &RowMap,
    ) -> MirrorResult<()> {
        let sql = insert_row_sql(schema);
        let mut query = sqlx::query(&sql).bind(id.to_string());
        for column in &schema.columns {
            let value = row.get(column.name.as_str()).unwrap_or(&ColumnValue::Null);
            query = bind_value(query, column, value)?;
        }
        query
            .execute(&mut *self.tx)
            .await
            .map_err(|e| MirrorError::RecordWrite {
                table: schema.name.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn update_row(
        &mut self,
        schema: &TableSchema,
        id: &str,
        row: &RowMap,
    ) -> MirrorResult<()> {
        let sql = match update_row_sql(schema) {
            Some(sql) => sql,
            // Table with only the id column: nothing to set.
            None => return Ok(()),
        };
        let mut query = sqlx::query(&sql);
        for column in &schema.columns {
            let value = row.get(column.name.as_str()).unwrap_or(&ColumnValue::Null);
            query = bind_value(query, column, value)?;
        }
        let result = query
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| MirrorError::RecordWrite {
                table: schema.name.clone(),
                message: e.to_string(),
            })?;
        if result.rows_affected() == 0 {
            return Err(MirrorError::RecordWrite {
                table: schema.name.clone(),
                message: format!("no row with id {id}"),
            });
        }
        Ok(())
    }

    async fn commit(self) -> MirrorResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| MirrorError::Database(e.to_string()))
    }

    async fn rollback(self) -> MirrorResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| MirrorError::Database(e.to_string()))
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn index_name(table: &str, column: &str) -> String {
    format!(
        "idx_{}_{}",
        table.to_ascii_lowercase(),
        column.to_ascii_lowercase()
    )
}

fn pg_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Text => "text",
        ColumnType::Integer => "integer",
        ColumnType::BigInt => "bigint",
        ColumnType::Float => "double precision",
        ColumnType::Decimal => "numeric",
        ColumnType::Boolean => "boolean",
        ColumnType::Date => "date",
        ColumnType::DateTime => "timestamptz",
    }
}

fn column_type_from_pg(data_type: &str) -> Option<ColumnType> {
    match data_type {
        "text" => Some(ColumnType::Text),
        "integer" => Some(ColumnType::Integer),
        "bigint" => Some(ColumnType::BigInt),
        "double precision" => Some(ColumnType::Float),
        "numeric" => Some(ColumnType::Decimal),
        "boolean" => Some(ColumnType::Boolean),
        "date" => Some(ColumnType::Date),
        "timestamp with time zone" => Some(ColumnType::DateTime),
        _ => None,
    }
}

pub(crate) fn create_table_sql(schema: &TableSchema) -> String {
    let mut columns = Vec::with_capacity(schema.columns.len() + 1);
    columns.push(format!("{} text primary key", quote_ident(ID_COLUMN)));
    for column in &schema.columns {
        columns.push(format!(
            "{} {}",
            quote_ident(&column.name),
            pg_type(column.column_type)
        ));
    }
    format!(
        "create table {} ({})",
        quote_ident(&schema.name),
        columns.join(", ")
    )
}

fn create_index_sql(table: &str, column: &str) -> String {
    format!(
        "create index {} on {} ({})",
        quote_ident(&index_name(table, column)),
        quote_ident(table),
        quote_ident(column)
    )
}

fn drop_index_sql(table: &str, column: &str) -> String {
    format!("drop index {}", quote_ident(&index_name(table, column)))
}

/// Render one schema change as its DDL statements: at most one
/// `alter table` carrying every column action, plus standalone index
/// statements.
pub(crate) fn change_statements(change: &SchemaChange) -> Vec<String> {
    match change {
        SchemaChange::CreateTable(schema) => {
            let mut statements = vec![create_table_sql(schema)];
            for column in &schema.columns {
                if column.indexed {
                    statements.push(create_index_sql(&schema.name, &column.name));
                }
            }
            statements
        }
        SchemaChange::AlterTable { table, ops } => {
            let mut actions = Vec::new();
            let mut index_statements = Vec::new();
            for op in ops {
                match op {
                    AlterOp::AddColumn(column) => actions.push(format!(
                        "add column {} {}",
                        quote_ident(&column.name),
                        pg_type(column.column_type)
                    )),
                    AlterOp::DropColumn(column) => {
                        actions.push(format!("drop column {}", quote_ident(column)));
                    }
                    AlterOp::ChangeType {
                        column,
                        column_type,
                    } => {
                        let ty = pg_type(*column_type);
                        actions.push(format!(
                            "alter column {q} type {ty} using {q}::{ty}",
                            q = quote_ident(column)
                        ));
                    }
                    AlterOp::CreateIndex { column } => {
                        index_statements.push(create_index_sql(table, column));
                    }
                    AlterOp::DropIndex { column } => {
                        index_statements.push(drop_index_sql(table, column));
                    }
                }
            }

            let mut statements = Vec::new();
            if !actions.is_empty() {
                statements.push(format!(
                    "alter table {} {}",
                    quote_ident(table),
                    actions.join(", ")
                ));
            }
            statements.extend(index_statements);
            statements
        }
    }
}

pub(crate) fn select_row_sql(schema: &TableSchema) -> String {
    let mut items = Vec::with_capacity(schema.columns.len() + 1);
    items.push(quote_ident(ID_COLUMN));
    for column in &schema.columns {
        let q = quote_ident(&column.name);
        if column.column_type == ColumnType::Decimal {
            // numeric travels as text
            items.push(format!("{q}::text as {q}"));
        } else {
            items.push(q);
        }
    }
    format!(
        "select {} from {} where {} = $1",
        items.join(", "),
        quote_ident(&schema.name),
        quote_ident(ID_COLUMN)
    )
}

pub(crate) fn insert_row_sql(schema: &TableSchema) -> String {
    let mut columns = vec![quote_ident(ID_COLUMN)];
    let mut values = vec!["$1".to_string()];
    for (i, column) in schema.columns.iter().enumerate() {
        columns.push(quote_ident(&column.name));
        values.push(placeholder(i + 2, column.column_type));
    }
    format!(
        "insert into {} ({}) values ({})",
        quote_ident(&schema.name),
        columns.join(", "),
        values.join(", ")
    )
}

pub(crate) fn update_row_sql(schema: &TableSchema) -> Option<String> {
    if schema.columns.is_empty() {
        return None;
    }
    let assignments: Vec<String> = schema
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            format!(
                "{} = {}",
                quote_ident(&column.name),
                placeholder(i + 1, column.column_type)
            )
        })
        .collect();
    Some(format!(
        "update {} set {} where {} = ${}",
        quote_ident(&schema.name),
        assignments.join(", "),
        quote_ident(ID_COLUMN),
        schema.columns.len() + 1
    ))
}

/// Decimal parameters are sent as text and cast server-side; everything
/// else binds directly.
fn placeholder(position: usize, column_type: ColumnType) -> String {
    match column_type {
        ColumnType::Decimal => format!("${position}::numeric"),
        _ => format!("${position}"),
    }
}

fn bind_value<'q>(
    query: PgQuery<'q>,
    column: &ColumnSpec,
    value: &ColumnValue,
) -> MirrorResult<PgQuery<'q>> {
    let bound = match (column.column_type, value) {
        (ColumnType::Text, ColumnValue::Text(v)) => query.bind(v.clone()),
        (ColumnType::Text, ColumnValue::Null) => query.bind(Option::<String>::None),
        // Integer columns take int8 parameters; Postgres applies the
        // assignment cast.
        (ColumnType::Integer, ColumnValue::Integer(v)) => query.bind(*v),
        (ColumnType::Integer, ColumnValue::Null) => query.bind(Option::<i64>::None),
        (ColumnType::BigInt, ColumnValue::Integer(v)) => query.bind(*v),
        (ColumnType::BigInt, ColumnValue::Null) => query.bind(Option::<i64>::None),
        (ColumnType::Float, ColumnValue::Float(v)) => query.bind(*v),
        (ColumnType::Float, ColumnValue::Null) => query.bind(Option::<f64>::None),
        (ColumnType::Decimal, ColumnValue::Decimal(v)) => query.bind(v.clone()),
        (ColumnType::Decimal, ColumnValue::Null) => query.bind(Option::<String>::None),
        (ColumnType::Boolean, ColumnValue::Boolean(v)) => query.bind(*v),
        (ColumnType::Boolean, ColumnValue::Null) => query.bind(Option::<bool>::None),
        (ColumnType::Date, ColumnValue::Date(v)) => query.bind(*v),
        (ColumnType::Date, ColumnValue::Null) => query.bind(Option::<NaiveDate>::None),
        (ColumnType::DateTime, ColumnValue::DateTime(v)) => query.bind(*v),
        (ColumnType::DateTime, ColumnValue::Null) => {
            query.bind(Option::<DateTime<Utc>>::None)
        }
        (column_type, value) => {
            return Err(MirrorError::Validation(format!(
                "column `{}` ({column_type:?}) cannot take value {value:?}",
                column.name
            )))
        }
    };
    Ok(bound)
}

fn decode_row(schema: &TableSchema, row: &PgRow) -> MirrorResult<RowMap> {
    let mut out = RowMap::new();
    for (i, column) in schema.columns.iter().enumerate() {
        // id occupies position 0
        let idx = i + 1;
        let value = match column.column_type {
            ColumnType::Text => row
                .try_get::<Option<String>, _>(idx)
                .map(|v| v.map_or(ColumnValue::Null, ColumnValue::Text)),
            ColumnType::Integer => row
                .try_get::<Option<i32>, _>(idx)
                .map(|v| v.map_or(ColumnValue::Null, |n| ColumnValue::Integer(i64::from(n)))),
            ColumnType::BigInt => row
                .try_get::<Option<i64>, _>(idx)
                .map(|v| v.map_or(ColumnValue::Null, ColumnValue::Integer)),
            ColumnType::Float => row
                .try_get::<Option<f64>, _>(idx)
                .map(|v| v.map_or(ColumnValue::Null, ColumnValue::Float)),
            ColumnType::Decimal => row
                .try_get::<Option<String>, _>(idx)
                .map(|v| v.map_or(ColumnValue::Null, ColumnValue::Decimal)),
            ColumnType::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .map(|v| v.map_or(ColumnValue::Null, ColumnValue::Boolean)),
            ColumnType::Date => row
                .try_get::<Option<NaiveDate>, _>(idx)
                .map(|v| v.map_or(ColumnValue::Null, ColumnValue::Date)),
            ColumnType::DateTime => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)
                .map(|v| v.map_or(ColumnValue::Null, ColumnValue::DateTime)),
        }
        .map_err(|e| MirrorError::Database(e.to_string()))?;
        out.insert(column.name.clone(), value);
    }
    Ok(out)
}
