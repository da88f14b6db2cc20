use crate::commands::config::{IngestConfig, Namespace};
use crate::commands::db::{open_store, persist_snapshot};
use crate::commands::schema::ensure_schema;
use crate::error::IngestResult;
use crate::models::snapshot::DecodedReport;
use crate::report::{decode_report, load_report};
use log::info;
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;
use uuid::Uuid;

/// Load, decode and persist one report file.
///
/// Input errors surface before the store is opened; schema errors before
/// anything is written.
pub fn ingest_file(config: &IngestConfig, path: &Path) -> IngestResult<Uuid> {
    let raw = load_report(path)?;
    let report = decode_report(&raw)?;
    info!(
        "Decoded {} (generation {:?}, {} child row(s))",
        path.display(),
        report.generation,
        report.child_row_count()
    );

    let conn = open_store(&config.store)?;
    store_report(&conn, &config.namespace, &report)
}

/// Decode and persist an in-memory report tree on an open connection.
pub fn ingest_value(conn: &Connection, namespace: &Namespace, raw: &Value) -> IngestResult<Uuid> {
    let report = decode_report(raw)?;
    store_report(conn, namespace, &report)
}

pub fn store_report(
    conn: &Connection,
    namespace: &Namespace,
    report: &DecodedReport,
) -> IngestResult<Uuid> {
    ensure_schema(conn, namespace)?;
    Ok(persist_snapshot(conn, namespace, report)?)
}
