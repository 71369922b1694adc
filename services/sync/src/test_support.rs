use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use zohomirror_common::error::{MirrorError, MirrorResult};
use zohomirror_db::store::RowMap;

use crate::listener::ChangeListener;
use crate::remote::{FieldSection, ModuleDescriptor, PageQuery, Record, RemoteField, RemoteModule};

/// In-memory [RemoteModule] with canned fields and records. Applies
/// the same `modified_since` and paging semantics the live API does,
/// and keeps every query it was asked for inspection.
pub struct FakeModule {
    name: String,
    sections: Vec<FieldSection>,
    records: Vec<Record>,
    queries: Mutex<Vec<PageQuery>>,
    fail_records: bool,
}

impl FakeModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sections: vec![FieldSection {
                name: "Details".to_string(),
                fields: Vec::new(),
            }],
            records: Vec::new(),
            queries: Mutex::new(Vec::new()),
            fail_records: false,
        }
    }

    /// A Leads module with the field mix most tests need: plain text,
    /// an indexed lookup, an integer and a datetime watermark.
    pub fn leads() -> Self {
        Self::new("Leads")
            .with_field("Email", "email")
            .with_field("Owner", "ownerlookup")
            .with_field("Score", "integer")
            .with_field("Modified_Time", "datetime")
    }

    pub fn with_field(mut self, api_name: &str, data_type: &str) -> Self {
        let field = RemoteField {
            api_name: api_name.to_string(),
            field_label: api_name.replace('_', " "),
            data_type: data_type.to_string(),
        };
        self.sections
            .last_mut()
            .expect("at least one section")
            .fields
            .push(field);
        self
    }

    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    /// Make record fetches fail while field metadata stays readable.
    pub fn failing_records(mut self) -> Self {
        self.fail_records = true;
        self
    }

    pub fn queries(&self) -> Vec<PageQuery> {
        self.queries.lock().expect("queries lock").clone()
    }
}

fn record_modified_at(record: &Record) -> Option<DateTime<Utc>> {
    record
        .value("Modified_Time")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
}

#[async_trait]
impl RemoteModule for FakeModule {
    fn plural_module_name(&self) -> &str {
        &self.name
    }

    async fn fields(&self) -> MirrorResult<Vec<FieldSection>> {
        Ok(self.sections.clone())
    }

    async fn paginated_records(&self, query: &PageQuery) -> MirrorResult<Vec<Record>> {
        self.queries
            .lock()
            .expect("queries lock")
            .push(query.clone());
        if self.fail_records {
            return Err(MirrorError::RemoteFetch("records unavailable".to_string()));
        }

        let matching: Vec<Record> = self
            .records
            .iter()
            .filter(|r| match (query.modified_since, record_modified_at(r)) {
                (Some(since), Some(at)) => at >= since,
                _ => true,
            })
            .cloned()
            .collect();

        let start = query.offset.min(matching.len());
        let end = (query.offset + query.page_size).min(matching.len());
        Ok(matching[start..end].to_vec())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Insert {
        module: String,
        row: RowMap,
    },
    Update {
        module: String,
        new_row: RowMap,
        previous: RowMap,
    },
}

/// Listener that stores every notification it receives.
#[derive(Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<ListenerEvent>>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().expect("events lock").clone()
    }
}

impl ChangeListener for RecordingListener {
    fn on_insert(&self, module: &ModuleDescriptor, row: &RowMap) {
        self.events
            .lock()
            .expect("events lock")
            .push(ListenerEvent::Insert {
                module: module.api_name.clone(),
                row: row.clone(),
            });
    }

    fn on_update(&self, module: &ModuleDescriptor, new_row: &RowMap, previous: &RowMap) {
        self.events
            .lock()
            .expect("events lock")
            .push(ListenerEvent::Update {
                module: module.api_name.clone(),
                new_row: new_row.clone(),
                previous: previous.clone(),
            });
    }
}

pub fn lead_record(id: &str, email: &str, score: i64, modified: &str) -> Record {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "Email": email,
        "Owner": {"name": "Ada Lovelace", "id": "owner-1"},
        "Score": score,
        "Modified_Time": modified,
    }))
    .expect("lead record")
}
