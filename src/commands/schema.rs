use crate::commands::config::Namespace;
use crate::error::SchemaError;
use crate::models::columns::{Generation, TableRole, TableSpec};
use crate::models::snapshot::REPORT_TABLES;
use log::{debug, info};
use rusqlite::{params, Connection, DatabaseName, Transaction, TransactionBehavior};
use std::path::Path;

/// Bring `namespace` up to the current report generation.
///
/// Attaches the namespace, then in one transaction creates missing tables,
/// adds columns introduced after each table's first generation, creates the
/// lookup indexes and records the generation in `user_version`. Nothing is
/// ever dropped, renamed or retyped, so every step is a no-op once applied.
pub fn ensure_schema(conn: &Connection, namespace: &Namespace) -> Result<(), SchemaError> {
    attach_namespace(conn, namespace)?;
    let schema = namespace.as_str();

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(SchemaError::at("begin"))?;

    for table in REPORT_TABLES.iter() {
        tx.execute_batch(&table.create_sql(schema, Generation::CURRENT))
            .map_err(SchemaError::at(format!("create {}", table.name)))?;
    }

    let mut added = 0;
    for table in REPORT_TABLES.iter() {
        added += add_missing_columns(&tx, schema, table)?;
    }

    for table in REPORT_TABLES.iter() {
        tx.execute_batch(&index_sql(schema, table))
            .map_err(SchemaError::at(format!("index {}", table.name)))?;
    }

    let version: i64 = tx
        .pragma_query_value(Some(database_name(namespace)), "user_version", |row| row.get(0))
        .map_err(SchemaError::at("read user_version"))?;
    if version < Generation::CURRENT.number() {
        tx.pragma_update(
            Some(database_name(namespace)),
            "user_version",
            Generation::CURRENT.number(),
        )
        .map_err(SchemaError::at("write user_version"))?;
    }

    tx.commit().map_err(SchemaError::at("commit"))?;

    if added > 0 || version < Generation::CURRENT.number() {
        info!("Schema {schema} evolved from generation {version}: {added} column(s) added");
    } else {
        debug!("Schema {schema} already at generation {version}");
    }

    Ok(())
}

/// Attach the namespace database unless it is `main` or already attached.
/// File-backed stores get a sibling `<namespace>.db`; in-memory stores get a
/// private in-memory database.
pub fn attach_namespace(conn: &Connection, namespace: &Namespace) -> Result<(), SchemaError> {
    if namespace.is_main() {
        return Ok(());
    }

    let attached = attached_databases(conn).map_err(SchemaError::at("list databases"))?;
    if attached
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case(namespace.as_str()))
    {
        return Ok(());
    }

    let main_file = attached
        .iter()
        .find(|(name, _)| name == "main")
        .map(|(_, file)| file.as_str())
        .unwrap_or("");
    let target = if main_file.is_empty() {
        ":memory:".to_string()
    } else {
        let dir = Path::new(main_file).parent().unwrap_or(Path::new("."));
        dir.join(format!("{namespace}.db")).to_string_lossy().to_string()
    };

    conn.execute(&format!("ATTACH DATABASE ?1 AS {namespace}"), params![target])
        .map_err(SchemaError::at(format!("attach {namespace}")))?;
    if target != ":memory:" {
        conn.execute_batch(&format!("PRAGMA {namespace}.journal_mode = WAL;"))
            .map_err(SchemaError::at(format!("configure {namespace}")))?;
    }

    debug!("Attached schema {namespace} at {target}");
    Ok(())
}

/// `(name, file)` for every database on the connection.
pub fn attached_databases(conn: &Connection) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("PRAGMA database_list")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(1)?, row.get::<_, Option<String>>(2)?.unwrap_or_default()))
    })?;
    rows.collect()
}

pub fn table_columns(conn: &Connection, schema: &str, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA {schema}.table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    names.collect()
}

fn add_missing_columns(conn: &Connection, schema: &str, table: &TableSpec) -> Result<usize, SchemaError> {
    let existing = table_columns(conn, schema, table.name)
        .map_err(SchemaError::at(format!("inspect {}", table.name)))?;

    let mut added = 0;
    for column in table.evolved_columns() {
        if existing.iter().any(|name| name == column.name) {
            continue;
        }

        conn.execute(
            &format!("ALTER TABLE {schema}.{} ADD COLUMN {}", table.name, column.definition()),
            [],
        )
        .map_err(SchemaError::at(format!("add {}.{}", table.name, column.name)))?;
        debug!("Added {}.{} ({:?})", table.name, column.name, column.since);
        added += 1;
    }

    Ok(added)
}

fn index_sql(schema: &str, table: &TableSpec) -> String {
    let column = match table.role {
        TableRole::Snapshot => "created_at",
        TableRole::Child => "snapshot_id",
    };
    format!(
        "CREATE INDEX IF NOT EXISTS {schema}.idx_{table}_{column} ON {table}({column});",
        table = table.name
    )
}

fn database_name(namespace: &Namespace) -> DatabaseName<'_> {
    if namespace.is_main() {
        DatabaseName::Main
    } else {
        DatabaseName::Attached(namespace.as_str())
    }
}
