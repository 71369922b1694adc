use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use zohomirror_common::error::{MirrorError, MirrorResult};
use zohomirror_db::schema::models::{ColumnSpec, ColumnType};
use zohomirror_db::store::{ColumnValue, RowMap, ID_COLUMN};

use crate::remote::{FieldSection, Record};

/// Remote field categories, closed. Everything the remote can report
/// either lands here or the sync refuses to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldCategory {
    Text,
    TextArea,
    Email,
    Phone,
    Website,
    Url,
    Picklist,
    MultiselectPicklist,
    AutoNumber,
    Integer,
    BigInt,
    Double,
    Percent,
    Currency,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Lookup,
    OwnerLookup,
    LookupId,
    Formula,
}

impl FieldCategory {
    /// Parse the remote `data_type` string. Matching folds case and
    /// ignores `_`/`-`, so `ownerlookup` and `Owner_Lookup` land on the
    /// same category.
    pub fn parse(data_type: &str) -> Option<Self> {
        let folded: String = data_type
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(|c| c.to_lowercase())
            .collect();
        let category = match folded.as_str() {
            "text" => Self::Text,
            "textarea" => Self::TextArea,
            "email" => Self::Email,
            "phone" => Self::Phone,
            "website" => Self::Website,
            "url" => Self::Url,
            "picklist" => Self::Picklist,
            "multiselectpicklist" => Self::MultiselectPicklist,
            "autonumber" => Self::AutoNumber,
            "integer" => Self::Integer,
            "bigint" => Self::BigInt,
            "double" => Self::Double,
            "percent" => Self::Percent,
            "currency" => Self::Currency,
            "decimal" => Self::Decimal,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "lookup" => Self::Lookup,
            "ownerlookup" => Self::OwnerLookup,
            "lookupid" => Self::LookupId,
            "formula" => Self::Formula,
            _ => return None,
        };
        Some(category)
    }

    pub fn column_type(self) -> ColumnType {
        match self {
            Self::Text
            | Self::TextArea
            | Self::Email
            | Self::Phone
            | Self::Website
            | Self::Url
            | Self::Picklist
            | Self::MultiselectPicklist
            | Self::AutoNumber
            | Self::Formula
            | Self::Lookup
            | Self::OwnerLookup
            | Self::LookupId => ColumnType::Text,
            Self::Integer => ColumnType::Integer,
            Self::BigInt => ColumnType::BigInt,
            Self::Double | Self::Percent => ColumnType::Float,
            Self::Currency | Self::Decimal => ColumnType::Decimal,
            Self::Boolean => ColumnType::Boolean,
            Self::Date => ColumnType::Date,
            Self::DateTime => ColumnType::DateTime,
        }
    }

    /// Lookup-class fields get an index on their mirror column.
    pub fn indexed(self) -> bool {
        matches!(self, Self::Lookup | Self::OwnerLookup | Self::LookupId)
    }
}

/// One mirrored field: the column it lands in, how values convert, and
/// which payload key feeds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub category: FieldCategory,
    pub getter: String,
}

impl FieldDescriptor {
    pub fn column_spec(&self) -> ColumnSpec {
        ColumnSpec {
            name: self.name.clone(),
            column_type: self.category.column_type(),
            indexed: self.category.indexed(),
        }
    }
}

/// What to do when two remote fields map to the same column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Refuse to sync the module.
    #[default]
    Fail,
    /// The later field wins; the earlier one is dropped with a warning.
    LastWins,
}

impl CollisionPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail" => Some(Self::Fail),
            "last-wins" | "last_wins" | "lastwins" => Some(Self::LastWins),
            _ => None,
        }
    }
}

/// Flatten the remote sections into one ordered descriptor list.
/// Unknown categories abort before any DDL is planned; a field named
/// like the primary key column always collides, whatever the policy.
pub fn flatten_fields(
    sections: &[FieldSection],
    policy: CollisionPolicy,
) -> MirrorResult<Vec<FieldDescriptor>> {
    let mut descriptors: Vec<FieldDescriptor> = Vec::new();
    for section in sections {
        for field in &section.fields {
            let category = FieldCategory::parse(&field.data_type).ok_or_else(|| {
                MirrorError::UnknownFieldType {
                    field: field.api_name.clone(),
                    field_type: field.data_type.clone(),
                }
            })?;
            if field.api_name.eq_ignore_ascii_case(ID_COLUMN) {
                return Err(MirrorError::FieldCollision {
                    name: field.api_name.clone(),
                });
            }
            let descriptor = FieldDescriptor {
                name: field.api_name.clone(),
                category,
                getter: field.api_name.clone(),
            };
            let existing = descriptors
                .iter()
                .position(|d| d.name.eq_ignore_ascii_case(&descriptor.name));
            match existing {
                Some(position) => match policy {
                    CollisionPolicy::Fail => {
                        return Err(MirrorError::FieldCollision {
                            name: descriptor.name,
                        });
                    }
                    CollisionPolicy::LastWins => {
                        tracing::warn!(
                            field = %descriptor.name,
                            section = %section.name,
                            "field name collision, keeping the later definition"
                        );
                        descriptors[position] = descriptor;
                    }
                },
                None => descriptors.push(descriptor),
            }
        }
    }
    Ok(descriptors)
}

/// Converts remote records into column values, one accessor per
/// descriptor. Built once per run.
pub struct AccessorMap {
    descriptors: Vec<FieldDescriptor>,
}

impl AccessorMap {
    pub fn new(descriptors: &[FieldDescriptor]) -> Self {
        Self {
            descriptors: descriptors.to_vec(),
        }
    }

    /// Column values for one record. Missing payload keys become nulls;
    /// an unconvertible value fails the run.
    pub fn row_for(&self, record: &Record) -> MirrorResult<RowMap> {
        let mut row = RowMap::new();
        for descriptor in &self.descriptors {
            let value = match record.value(&descriptor.getter) {
                Some(value) => convert_value(descriptor, value)?,
                None => ColumnValue::Null,
            };
            row.insert(descriptor.name.clone(), value);
        }
        Ok(row)
    }
}

fn convert_value(descriptor: &FieldDescriptor, value: &Value) -> MirrorResult<ColumnValue> {
    if value.is_null() {
        return Ok(ColumnValue::Null);
    }
    let converted = match descriptor.category.column_type() {
        ColumnType::Text => Some(ColumnValue::Text(text_form(value))),
        ColumnType::Integer | ColumnType::BigInt => {
            integer_form(value).map(ColumnValue::Integer)
        }
        ColumnType::Float => float_form(value).map(ColumnValue::Float),
        ColumnType::Decimal => decimal_form(value),
        ColumnType::Boolean => boolean_form(value).map(ColumnValue::Boolean),
        ColumnType::Date => date_form(value).map(ColumnValue::Date),
        ColumnType::DateTime => datetime_form(value).map(ColumnValue::DateTime),
    };
    converted.ok_or_else(|| {
        MirrorError::Validation(format!(
            "field `{}` ({:?}) cannot take value {}",
            descriptor.name, descriptor.category, value
        ))
    })
}

fn text_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        // Composite values keep their JSON shape, so the stored text
        // parses back to the original structure.
        other => other.to_string(),
    }
}

// 2^53, the bound below which every whole f64 maps to exactly one i64.
const MAX_EXACT_WHOLE_FLOAT: f64 = 9_007_199_254_740_992.0;

fn integer_form(value: &Value) -> Option<i64> {
    match value {
        // Integers that only fit u64 reach the float branch; the bound
        // rejects them instead of letting the cast saturate.
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= MAX_EXACT_WHOLE_FLOAT)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float_form(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn decimal_form(value: &Value) -> Option<ColumnValue> {
    match value {
        Value::Number(n) => Some(ColumnValue::Decimal(n.to_string())),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Some(ColumnValue::Null);
            }
            // Kept verbatim, but must read as a number so the cast
            // cannot fail mid-transaction.
            trimmed.parse::<f64>().ok()?;
            Some(ColumnValue::Decimal(trimmed.to_string()))
        }
        _ => None,
    }
}

fn boolean_form(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn date_form(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?;
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn datetime_form(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Offset-free timestamps show up occasionally; read them as UTC.
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteField;
    use chrono::TimeZone;

    fn field(api_name: &str, data_type: &str) -> RemoteField {
        RemoteField {
            api_name: api_name.to_string(),
            field_label: api_name.replace('_', " "),
            data_type: data_type.to_string(),
        }
    }

    fn section(name: &str, fields: Vec<RemoteField>) -> FieldSection {
        FieldSection {
            name: name.to_string(),
            fields,
        }
    }

    fn descriptor(name: &str, category: FieldCategory) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            category,
            getter: name.to_string(),
        }
    }

    // ── Category mapping ────────────────────────────────────────

    #[test]
    fn parse_folds_case_and_separators() {
        assert_eq!(FieldCategory::parse("ownerlookup"), Some(FieldCategory::OwnerLookup));
        assert_eq!(FieldCategory::parse("Owner_Lookup"), Some(FieldCategory::OwnerLookup));
        assert_eq!(
            FieldCategory::parse("multiselect-picklist"),
            Some(FieldCategory::MultiselectPicklist)
        );
        assert_eq!(FieldCategory::parse("DateTime"), Some(FieldCategory::DateTime));
        assert_eq!(FieldCategory::parse("subform"), None);
    }

    #[test]
    fn categories_map_to_storage_types() {
        let text_like = [
            FieldCategory::Text,
            FieldCategory::TextArea,
            FieldCategory::Email,
            FieldCategory::Phone,
            FieldCategory::Website,
            FieldCategory::Url,
            FieldCategory::Picklist,
            FieldCategory::MultiselectPicklist,
            FieldCategory::AutoNumber,
            FieldCategory::Formula,
            FieldCategory::Lookup,
            FieldCategory::OwnerLookup,
            FieldCategory::LookupId,
        ];
        for category in text_like {
            assert_eq!(category.column_type(), ColumnType::Text, "{category:?}");
        }
        assert_eq!(FieldCategory::Integer.column_type(), ColumnType::Integer);
        assert_eq!(FieldCategory::BigInt.column_type(), ColumnType::BigInt);
        assert_eq!(FieldCategory::Double.column_type(), ColumnType::Float);
        assert_eq!(FieldCategory::Percent.column_type(), ColumnType::Float);
        assert_eq!(FieldCategory::Currency.column_type(), ColumnType::Decimal);
        assert_eq!(FieldCategory::Decimal.column_type(), ColumnType::Decimal);
        assert_eq!(FieldCategory::Boolean.column_type(), ColumnType::Boolean);
        assert_eq!(FieldCategory::Date.column_type(), ColumnType::Date);
        assert_eq!(FieldCategory::DateTime.column_type(), ColumnType::DateTime);
    }

    #[test]
    fn only_lookup_categories_are_indexed() {
        assert!(FieldCategory::Lookup.indexed());
        assert!(FieldCategory::OwnerLookup.indexed());
        assert!(FieldCategory::LookupId.indexed());
        assert!(!FieldCategory::Email.indexed());
        assert!(!FieldCategory::Formula.indexed());
    }

    #[test]
    fn lookup_descriptor_yields_indexed_text_column() {
        let spec = descriptor("Owner", FieldCategory::OwnerLookup).column_spec();
        assert_eq!(spec.column_type, ColumnType::Text);
        assert!(spec.indexed);
        assert_eq!(spec.name, "Owner");
    }

    // ── Flattening ──────────────────────────────────────────────

    #[test]
    fn flatten_preserves_section_order() {
        let sections = vec![
            section("Lead Information", vec![field("Email", "email"), field("Score", "integer")]),
            section("Extras", vec![field("Notes", "textarea")]),
        ];
        let descriptors = flatten_fields(&sections, CollisionPolicy::Fail).expect("flatten");
        let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Email", "Score", "Notes"]);
    }

    #[test]
    fn unknown_category_fails_before_anything_else() {
        let sections = vec![section(
            "Lead Information",
            vec![field("Email", "email"), field("Layout", "subform")],
        )];
        let err = flatten_fields(&sections, CollisionPolicy::Fail).expect_err("should fail");
        match err {
            MirrorError::UnknownFieldType { field, field_type } => {
                assert_eq!(field, "Layout");
                assert_eq!(field_type, "subform");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn id_named_field_always_collides() {
        let sections = vec![section("Lead Information", vec![field("Id", "text")])];
        for policy in [CollisionPolicy::Fail, CollisionPolicy::LastWins] {
            let err = flatten_fields(&sections, policy).expect_err("should fail");
            assert!(matches!(err, MirrorError::FieldCollision { .. }));
        }
    }

    #[test]
    fn duplicate_name_fails_by_default() {
        let sections = vec![
            section("One", vec![field("Email", "email")]),
            section("Two", vec![field("EMAIL", "text")]),
        ];
        let err = flatten_fields(&sections, CollisionPolicy::Fail).expect_err("should fail");
        assert!(matches!(err, MirrorError::FieldCollision { .. }));
    }

    #[test]
    fn last_wins_replaces_in_place() {
        let sections = vec![
            section("One", vec![field("Email", "email"), field("Score", "integer")]),
            section("Two", vec![field("EMAIL", "textarea")]),
        ];
        let descriptors =
            flatten_fields(&sections, CollisionPolicy::LastWins).expect("flatten");
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].name, "EMAIL");
        assert_eq!(descriptors[0].category, FieldCategory::TextArea);
        assert_eq!(descriptors[1].name, "Score");
    }

    #[test]
    fn collision_policy_parses_both_spellings() {
        assert_eq!(CollisionPolicy::parse("fail"), Some(CollisionPolicy::Fail));
        assert_eq!(CollisionPolicy::parse("last-wins"), Some(CollisionPolicy::LastWins));
        assert_eq!(CollisionPolicy::parse("LAST_WINS"), Some(CollisionPolicy::LastWins));
        assert_eq!(CollisionPolicy::parse("shrug"), None);
    }

    // ── Value conversion ────────────────────────────────────────

    fn record(json: serde_json::Value) -> Record {
        serde_json::from_value(json).expect("record json")
    }

    #[test]
    fn text_values_pass_through_raw() {
        let accessors = AccessorMap::new(&[descriptor("Email", FieldCategory::Email)]);
        let row = accessors
            .row_for(&record(serde_json::json!({ "id": "1", "Email": "ada@lovelace.test" })))
            .expect("row");
        assert_eq!(
            row.get("Email"),
            Some(&ColumnValue::Text("ada@lovelace.test".to_string()))
        );
    }

    #[test]
    fn composite_values_become_json_text_that_parses_back() {
        let accessors = AccessorMap::new(&[descriptor("Owner", FieldCategory::Lookup)]);
        let original = serde_json::json!({ "name": "Ada", "id": "554" });
        let row = accessors
            .row_for(&record(serde_json::json!({ "id": "1", "Owner": original.clone() })))
            .expect("row");

        let stored = match row.get("Owner") {
            Some(ColumnValue::Text(s)) => s.clone(),
            other => panic!("unexpected value: {other:?}"),
        };
        let reparsed: serde_json::Value = serde_json::from_str(&stored).expect("parses back");
        assert_eq!(reparsed, original);
    }

    #[test]
    fn scalar_values_in_text_fields_stringify() {
        let accessors = AccessorMap::new(&[
            descriptor("Tags", FieldCategory::MultiselectPicklist),
            descriptor("Flagged", FieldCategory::Formula),
        ]);
        let row = accessors
            .row_for(&record(serde_json::json!({
                "id": "1",
                "Tags": ["a", "b"],
                "Flagged": true
            })))
            .expect("row");
        assert_eq!(
            row.get("Tags"),
            Some(&ColumnValue::Text("[\"a\",\"b\"]".to_string()))
        );
        assert_eq!(row.get("Flagged"), Some(&ColumnValue::Text("true".to_string())));
    }

    #[test]
    fn integer_accepts_number_whole_float_and_string() {
        let accessors = AccessorMap::new(&[descriptor("Score", FieldCategory::Integer)]);
        for (value, expected) in [
            (serde_json::json!(12), 12),
            (serde_json::json!(12.0), 12),
            (serde_json::json!("12"), 12),
        ] {
            let row = accessors
                .row_for(&record(serde_json::json!({ "id": "1", "Score": value })))
                .expect("row");
            assert_eq!(row.get("Score"), Some(&ColumnValue::Integer(expected)));
        }
    }

    #[test]
    fn fractional_value_in_integer_field_fails() {
        let accessors = AccessorMap::new(&[descriptor("Score", FieldCategory::Integer)]);
        let err = accessors
            .row_for(&record(serde_json::json!({ "id": "1", "Score": 12.5 })))
            .expect_err("should fail");
        match err {
            MirrorError::Validation(message) => assert!(message.contains("Score")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn oversized_integer_fails_instead_of_saturating() {
        let accessors = AccessorMap::new(&[descriptor("Serial_Number", FieldCategory::BigInt)]);
        // Past i64::MAX as a u64 number, as a float, and as a string.
        for value in [
            serde_json::json!(10_000_000_000_000_000_000_u64),
            serde_json::json!(1.0e19),
            serde_json::json!("10000000000000000000"),
        ] {
            let err = accessors
                .row_for(&record(serde_json::json!({ "id": "1", "Serial_Number": value })))
                .expect_err("should fail");
            match err {
                MirrorError::Validation(message) => assert!(message.contains("Serial_Number")),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn decimal_keeps_digits_verbatim() {
        let accessors = AccessorMap::new(&[descriptor("Amount", FieldCategory::Currency)]);
        let row = accessors
            .row_for(&record(serde_json::json!({ "id": "1", "Amount": "10.500" })))
            .expect("row");
        assert_eq!(
            row.get("Amount"),
            Some(&ColumnValue::Decimal("10.500".to_string()))
        );

        let row = accessors
            .row_for(&record(serde_json::json!({ "id": "1", "Amount": 19.99 })))
            .expect("row");
        assert_eq!(
            row.get("Amount"),
            Some(&ColumnValue::Decimal("19.99".to_string()))
        );

        let row = accessors
            .row_for(&record(serde_json::json!({ "id": "1", "Amount": "  " })))
            .expect("row");
        assert_eq!(row.get("Amount"), Some(&ColumnValue::Null));
    }

    #[test]
    fn boolean_accepts_bool_and_true_false_strings() {
        let accessors = AccessorMap::new(&[descriptor("Converted", FieldCategory::Boolean)]);
        for (value, expected) in [
            (serde_json::json!(true), true),
            (serde_json::json!("True"), true),
            (serde_json::json!("false"), false),
        ] {
            let row = accessors
                .row_for(&record(serde_json::json!({ "id": "1", "Converted": value })))
                .expect("row");
            assert_eq!(row.get("Converted"), Some(&ColumnValue::Boolean(expected)));
        }
    }

    #[test]
    fn datetime_normalizes_offsets_to_utc() {
        let accessors = AccessorMap::new(&[descriptor("Modified_Time", FieldCategory::DateTime)]);
        let row = accessors
            .row_for(&record(serde_json::json!({
                "id": "1",
                "Modified_Time": "2026-03-01T12:30:00+05:30"
            })))
            .expect("row");
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 7, 0, 0).single().expect("ts");
        assert_eq!(row.get("Modified_Time"), Some(&ColumnValue::DateTime(expected)));
    }

    #[test]
    fn offset_free_datetime_reads_as_utc() {
        let accessors = AccessorMap::new(&[descriptor("Modified_Time", FieldCategory::DateTime)]);
        let row = accessors
            .row_for(&record(serde_json::json!({
                "id": "1",
                "Modified_Time": "2026-03-01 12:30:00"
            })))
            .expect("row");
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).single().expect("ts");
        assert_eq!(row.get("Modified_Time"), Some(&ColumnValue::DateTime(expected)));
    }

    #[test]
    fn date_parses_iso_days() {
        let accessors = AccessorMap::new(&[descriptor("Signed", FieldCategory::Date)]);
        let row = accessors
            .row_for(&record(serde_json::json!({ "id": "1", "Signed": "2026-02-14" })))
            .expect("row");
        assert_eq!(
            row.get("Signed"),
            Some(&ColumnValue::Date(
                NaiveDate::from_ymd_opt(2026, 2, 14).expect("date")
            ))
        );
    }

    #[test]
    fn null_and_missing_values_become_null_columns() {
        let accessors = AccessorMap::new(&[
            descriptor("Email", FieldCategory::Email),
            descriptor("Score", FieldCategory::Integer),
        ]);
        let row = accessors
            .row_for(&record(serde_json::json!({ "id": "1", "Email": null })))
            .expect("row");
        assert_eq!(row.get("Email"), Some(&ColumnValue::Null));
        assert_eq!(row.get("Score"), Some(&ColumnValue::Null));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn garbage_datetime_fails_validation() {
        let accessors = AccessorMap::new(&[descriptor("Modified_Time", FieldCategory::DateTime)]);
        let err = accessors
            .row_for(&record(serde_json::json!({
                "id": "1",
                "Modified_Time": "next tuesday"
            })))
            .expect_err("should fail");
        assert!(matches!(err, MirrorError::Validation(_)));
    }
}
