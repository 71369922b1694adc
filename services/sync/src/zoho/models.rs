use serde::Deserialize;

use crate::remote::Record;

/// Field metadata from the Zoho CRM settings API
/// (`GET /settings/fields?module=...`).
#[derive(Debug, Clone, Deserialize)]
pub struct ZohoFieldMeta {
    pub api_name: String,
    #[serde(default)]
    pub field_label: String,
    pub data_type: String,
    #[serde(default)]
    pub section_name: Option<String>,
}

/// Envelope around the field list.
#[derive(Debug, Deserialize)]
pub struct FieldsResponse {
    #[serde(default)]
    pub fields: Vec<ZohoFieldMeta>,
}

/// Envelope around one record page (`GET /{module}`).
#[derive(Debug, Deserialize)]
pub struct RecordsResponse {
    #[serde(default)]
    pub data: Vec<Record>,
    #[serde(default)]
    pub info: Option<PageInfo>,
}

/// Paging block Zoho attaches to record pages.
#[derive(Debug, Clone, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub per_page: u32,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub more_records: bool,
}
