pub mod commands;
pub mod error;
pub mod models;
pub mod report;

pub use commands::config::{IngestConfig, Namespace, StoreLocation, DEFAULT_NAMESPACE};
pub use commands::db::{load_recent_months, load_snapshot_history, open_store, persist_snapshot};
pub use commands::ingest::{ingest_file, ingest_value, store_report};
pub use commands::schema::ensure_schema;
pub use error::{IngestError, IngestResult};
pub use report::{decode_report, load_report};
