use thiserror::Error;

/// Problems with the run configuration. Raised before any file or store is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATABASE_URL is required")]
    MissingDatabaseUrl,

    #[error("Unsupported database URL '{0}': expected sqlite:<path>, sqlite::memory: or a file path")]
    UnsupportedDatabaseUrl(String),

    #[error("Invalid schema name '{0}': use letters, digits and underscores, not an SQL keyword")]
    InvalidNamespace(String),
}

/// Problems reading or decoding the report payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to read report {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{path}: expected {expected}, found {found}")]
    WrongType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{path}: {value} does not fit a fixed-point decimal")]
    OutOfRange { path: String, value: String },

    #[error("{path}: unknown runway risk '{value}'")]
    UnknownRisk { path: String, value: String },
}

/// A DDL step failed while evolving the namespace.
#[derive(Debug, Error)]
#[error("Schema evolution failed ({step}): {source}")]
pub struct SchemaError {
    pub step: String,
    #[source]
    pub source: rusqlite::Error,
}

impl SchemaError {
    pub fn at(step: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Self {
        let step = step.into();
        move |source| Self { step, source }
    }
}

/// The snapshot write failed; the transaction has been rolled back.
#[derive(Debug, Error)]
#[error("Snapshot write failed: {0}")]
pub struct PersistError(#[from] pub rusqlite::Error);

/// Every way an ingestion run can fail, one variant per class.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input error: {0}")]
    Input(#[from] DecodeError),

    #[error("{0}")]
    Schema(#[from] SchemaError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

pub type IngestResult<T> = Result<T, IngestError>;
