use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use zohomirror_common::error::MirrorResult;

/// A remote module selected for mirroring, addressed by its plural API
/// name (`Leads`, `Contacts`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub api_name: String,
}

impl ModuleDescriptor {
    pub fn new(api_name: impl Into<String>) -> Self {
        Self {
            api_name: api_name.into(),
        }
    }
}

/// One page worth of fetch criteria. The copier only sets
/// `modified_since`, `page_size` and `offset`; the filter bounds and
/// extra criteria are pass-through for other callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub filter_start: Option<String>,
    pub filter_end: Option<String>,
    pub modified_since: Option<DateTime<Utc>>,
    pub extra_criteria: Option<String>,
    pub page_size: usize,
    pub offset: usize,
}

/// Group of field definitions as the remote reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSection {
    pub name: String,
    pub fields: Vec<RemoteField>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RemoteField {
    pub api_name: String,
    pub field_label: String,
    pub data_type: String,
}

/// One remote record: its id plus the raw field payload, kept as JSON
/// until the accessors convert it column by column.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub values: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    pub fn value(&self, field: &str) -> Option<&serde_json::Value> {
        self.values.get(field)
    }
}

/// Read surface of one remote module. The sync engine needs nothing
/// beyond field metadata and time-filtered record pages.
#[async_trait]
pub trait RemoteModule: Send + Sync {
    fn plural_module_name(&self) -> &str;

    async fn fields(&self) -> MirrorResult<Vec<FieldSection>>;

    async fn paginated_records(&self, query: &PageQuery) -> MirrorResult<Vec<Record>>;
}
