use std::sync::Arc;

use zohomirror_common::error::MirrorResult;
use zohomirror_db::store::TableStore;

use crate::copier::{CopyReport, IncrementalCopier};
use crate::listener::ChangeListener;
use crate::reconcile::SchemaReconciler;
use crate::remote::RemoteModule;
use crate::settings::MirrorSettings;

/// Ties schema reconciliation and record copy together: one call per
/// module per run, DDL settled before the copy transaction opens.
pub struct ModuleMirror<S>
where
    S: TableStore + Clone,
{
    reconciler: SchemaReconciler<S>,
    copier: IncrementalCopier<S>,
}

impl<S> ModuleMirror<S>
where
    S: TableStore + Clone,
{
    pub fn new(
        store: S,
        settings: &MirrorSettings,
        listeners: Vec<Arc<dyn ChangeListener>>,
    ) -> Self {
        let reconciler = SchemaReconciler::new(
            store.clone(),
            settings.table_prefix.clone(),
            settings.collision_policy,
        );
        let copier = IncrementalCopier::new(
            store,
            settings.page_size,
            settings.watermark_field.clone(),
            listeners,
        );
        Self { reconciler, copier }
    }

    pub async fn reconcile_and_copy<M>(
        &self,
        module: &M,
        incremental: bool,
    ) -> MirrorResult<CopyReport>
    where
        M: RemoteModule,
    {
        let target = self.reconciler.reconcile(module).await?;
        self.copier.copy_data(module, &target, incremental).await
    }
}
