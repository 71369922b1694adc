mod copier;
mod fields;
mod listener;
mod mirror;
mod naming;
mod reconcile;
mod remote;
mod settings;
#[cfg(test)]
mod test_support;
mod zoho;

use std::sync::Arc;

use zohomirror_config::{init_tracing, AppConfig};
use zohomirror_db::store::pg::PgTableStore;

use crate::listener::{ChangeListener, LogChangeListener};
use crate::mirror::ModuleMirror;
use crate::settings::MirrorSettings;
use crate::zoho::client::{ZohoClient, ZohoClientConfig};
use crate::zoho::dao::ZohoModuleDao;

#[tokio::main]
async fn main() {
    init_tracing("info");
    let _ = dotenvy::dotenv();

    tracing::info!(service = "zohomirror-sync", "starting");

    let config = AppConfig::from_env().expect("failed to load config");
    let settings = MirrorSettings::from_env().expect("failed to load mirror settings");

    let zoho_config = match ZohoClientConfig::from_env() {
        Some(c) => c,
        None => {
            tracing::info!("no zoho credentials found, nothing to sync");
            return;
        }
    };

    let pool = zohomirror_db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");
    let store = PgTableStore::new(pool);

    let client = ZohoClient::new(zoho_config).expect("failed to create zoho client");
    let listeners: Vec<Arc<dyn ChangeListener>> = vec![Arc::new(LogChangeListener)];
    let mirror = ModuleMirror::new(store, &settings, listeners);

    for module in &settings.modules {
        let dao = ZohoModuleDao::new(client.clone(), module.clone());
        match mirror.reconcile_and_copy(&dao, settings.incremental).await {
            Ok(report) => {
                tracing::info!(
                    module = %module.api_name,
                    table = %report.table,
                    pages = report.pages,
                    inserted = report.inserted,
                    updated = report.updated,
                    "module sync completed"
                );
            }
            Err(e) => {
                tracing::error!(module = %module.api_name, error = %e, "module sync failed");
            }
        }
    }

    tracing::info!("sync service finished");
}
