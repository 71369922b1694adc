use zohomirror_common::error::MirrorResult;
use zohomirror_db::schema::diff::diff_schema;
use zohomirror_db::schema::models::TableSchema;
use zohomirror_db::store::TableStore;

use crate::fields::{flatten_fields, CollisionPolicy, FieldDescriptor};
use crate::naming;
use crate::remote::{ModuleDescriptor, RemoteModule};

/// Outcome of reconciling one module: the table the copier writes to
/// and the descriptors that feed it.
#[derive(Debug, Clone)]
pub struct ReconciledTable {
    pub module: ModuleDescriptor,
    pub schema: TableSchema,
    pub descriptors: Vec<FieldDescriptor>,
}

impl ReconciledTable {
    pub fn table(&self) -> &str {
        &self.schema.name
    }
}

/// Brings the mirror table's columns in line with the remote module's
/// field metadata. Idempotent; all DDL runs outside any data
/// transaction, and nothing executes when the field set cannot be
/// mapped.
pub struct SchemaReconciler<S> {
    store: S,
    table_prefix: String,
    collision_policy: CollisionPolicy,
}

impl<S> SchemaReconciler<S>
where
    S: TableStore,
{
    pub fn new(
        store: S,
        table_prefix: impl Into<String>,
        collision_policy: CollisionPolicy,
    ) -> Self {
        Self {
            store,
            table_prefix: table_prefix.into(),
            collision_policy,
        }
    }

    pub async fn reconcile<M>(&self, module: &M) -> MirrorResult<ReconciledTable>
    where
        M: RemoteModule,
    {
        let module_name = module.plural_module_name().to_string();
        let table = naming::table_name(&self.table_prefix, &module_name);

        let sections = module.fields().await?;
        let descriptors = flatten_fields(&sections, self.collision_policy)?;
        let desired = TableSchema {
            name: table.clone(),
            columns: descriptors.iter().map(|d| d.column_spec()).collect(),
        };

        let actual = self.store.describe_table(&table).await?;
        match diff_schema(&desired, actual.as_ref()) {
            Some(change) => {
                tracing::info!(module = %module_name, table = %table, "applying schema change");
                self.store.apply_change(&change).await?;
            }
            None => {
                tracing::debug!(module = %module_name, table = %table, "schema already up to date");
            }
        }

        Ok(ReconciledTable {
            module: ModuleDescriptor::new(module_name),
            schema: desired,
            descriptors,
        })
    }
}
