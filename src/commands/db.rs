use crate::commands::config::{Namespace, StoreLocation};
use crate::error::{PersistError, SchemaError};
use crate::models::columns::{decimal_column, ColumnKind, ReportRecord};
use crate::models::snapshot::{
    DecodedReport, RecentMonth, SnapshotSummary, RECENT_MONTHS_TABLE, SNAPSHOTS_TABLE,
};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::time::Duration;
use uuid::Uuid;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn open_store(location: &StoreLocation) -> Result<Connection, SchemaError> {
    let conn = match location {
        StoreLocation::Memory => Connection::open_in_memory(),
        StoreLocation::File(path) => Connection::open(path),
    }
    .map_err(SchemaError::at("open store"))?;

    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(SchemaError::at("open store"))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(SchemaError::at("open store"))?;

    Ok(conn)
}

/// Write the snapshot row and all of its child rows in one transaction.
/// Any failing row rolls back the whole set.
pub fn persist_snapshot(
    conn: &Connection,
    namespace: &Namespace,
    report: &DecodedReport,
) -> Result<Uuid, PersistError> {
    let schema = namespace.as_str();
    let snapshot = &report.snapshot;
    let id = snapshot.id.to_string();

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let mut values = vec![
        SqlValue::Text(id.clone()),
        SqlValue::Text(timestamp_text(snapshot.created_at)),
    ];
    values.extend(snapshot.metrics.values());
    tx.execute(&SNAPSHOTS_TABLE.insert_sql(schema), params_from_iter(values))?;

    let children = insert_children(&tx, schema, &id, &report.recent_months)?
        + insert_children(&tx, schema, &id, &report.outflow_categories)?
        + insert_children(&tx, schema, &id, &report.inflow_categories)?
        + insert_children(&tx, schema, &id, &report.scenarios)?;

    tx.commit()?;
    info!("Persisted snapshot {id} into {schema} with {children} child row(s)");

    Ok(snapshot.id)
}

fn insert_children<R: ReportRecord>(
    tx: &Transaction<'_>,
    schema: &str,
    snapshot_id: &str,
    rows: &[R],
) -> rusqlite::Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    let table = R::spec();
    let mut stmt = tx.prepare(&table.insert_sql(schema))?;
    for (ordinal, row) in rows.iter().enumerate() {
        let mut values = vec![
            SqlValue::Text(snapshot_id.to_string()),
            SqlValue::Integer(ordinal as i64),
        ];
        values.extend(row.values());
        stmt.execute(params_from_iter(values))?;
    }

    debug!("Inserted {} row(s) into {schema}.{}", rows.len(), table.name);
    Ok(rows.len())
}

/// Sortable UTC timestamp; lexical order matches time order.
pub fn timestamp_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn text_column<T, E>(
    row: &Row<'_>,
    idx: usize,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> rusqlite::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    parse(&text).map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

/// The snapshot time series, oldest first.
pub fn load_snapshot_history(
    conn: &Connection,
    namespace: &Namespace,
) -> rusqlite::Result<Vec<SnapshotSummary>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, created_at, as_of, net, available_cash, runway_months, runway_risk
         FROM {namespace}.{} ORDER BY created_at ASC, rowid ASC",
        SNAPSHOTS_TABLE.name
    ))?;

    let rows = stmt.query_map([], |row| {
        Ok(SnapshotSummary {
            id: text_column(row, 0, Uuid::parse_str)?,
            created_at: text_column(row, 1, |text| {
                DateTime::parse_from_rfc3339(text).map(|at| at.with_timezone(&Utc))
            })?,
            as_of: row.get(2)?,
            net: decimal_column(row, 3, ColumnKind::Money)?,
            available_cash: decimal_column(row, 4, ColumnKind::Money)?,
            runway_months: decimal_column(row, 5, ColumnKind::Months)?,
            runway_risk: row.get(6)?,
        })
    })?;
    rows.collect()
}

/// Recent months of one snapshot, in report order.
pub fn load_recent_months(
    conn: &Connection,
    namespace: &Namespace,
    snapshot_id: &Uuid,
) -> rusqlite::Result<Vec<RecentMonth>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT month, inflow, outflow, net FROM {namespace}.{}
         WHERE snapshot_id = ?1 ORDER BY ordinal ASC",
        RECENT_MONTHS_TABLE.name
    ))?;

    let rows = stmt.query_map(params![snapshot_id.to_string()], |row| {
        Ok(RecentMonth {
            month: row.get(0)?,
            inflow: decimal_column(row, 1, ColumnKind::Money)?,
            outflow: decimal_column(row, 2, ColumnKind::Money)?,
            net: decimal_column(row, 3, ColumnKind::Money)?,
        })
    })?;
    rows.collect()
}
