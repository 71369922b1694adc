use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("unknown field type `{field_type}` on field `{field}`")]
    UnknownFieldType { field: String, field_type: String },

    #[error("field name collision: `{name}`")]
    FieldCollision { name: String },

    #[error("schema change failed for table `{table}`: {message}")]
    SchemaApplication { table: String, message: String },

    #[error("record write failed in table `{table}`: {message}")]
    RecordWrite { table: String, message: String },

    #[error("remote fetch failed: {0}")]
    RemoteFetch(String),

    #[error("validation error: {0}")]
    Validation(String),
}

pub type MirrorResult<T> = Result<T, MirrorError>;
