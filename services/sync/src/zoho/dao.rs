use async_trait::async_trait;

use zohomirror_common::error::{MirrorError, MirrorResult};

use super::client::ZohoClient;
use super::models::ZohoFieldMeta;
use crate::remote::{FieldSection, ModuleDescriptor, PageQuery, Record, RemoteField, RemoteModule};

/// One Zoho CRM module behind the [RemoteModule] trait.
pub struct ZohoModuleDao {
    client: ZohoClient,
    module: ModuleDescriptor,
}

impl ZohoModuleDao {
    pub fn new(client: ZohoClient, module: ModuleDescriptor) -> Self {
        Self { client, module }
    }
}

/// Group a flat field list into sections, keeping first-seen section
/// order. Fields without a section land in one named after the module.
fn group_into_sections(module: &str, fields: Vec<ZohoFieldMeta>) -> Vec<FieldSection> {
    let mut sections: Vec<FieldSection> = Vec::new();

    for meta in fields {
        let section_name = meta
            .section_name
            .clone()
            .unwrap_or_else(|| module.to_string());
        let field = RemoteField {
            api_name: meta.api_name,
            field_label: meta.field_label,
            data_type: meta.data_type,
        };

        match sections.iter_mut().find(|s| s.name == section_name) {
            Some(section) => section.fields.push(field),
            None => sections.push(FieldSection {
                name: section_name,
                fields: vec![field],
            }),
        }
    }

    sections
}

#[async_trait]
impl RemoteModule for ZohoModuleDao {
    fn plural_module_name(&self) -> &str {
        &self.module.api_name
    }

    async fn fields(&self) -> MirrorResult<Vec<FieldSection>> {
        let fields = self
            .client
            .fetch_fields(&self.module.api_name)
            .await
            .map_err(|e| MirrorError::RemoteFetch(e.to_string()))?;
        Ok(group_into_sections(&self.module.api_name, fields))
    }

    async fn paginated_records(&self, query: &PageQuery) -> MirrorResult<Vec<Record>> {
        self.client
            .fetch_records(&self.module.api_name, query)
            .await
            .map_err(|e| MirrorError::RemoteFetch(e.to_string()))
    }
}
