//! Column layout shared by the schema manager, the decoder and the persister.
//!
//! Each table is declared once with `define_report_table!`: a list of
//! `(field, kind, JSON path, generation)` entries. The typed record, its decoder,
//! its bind values, `CREATE TABLE` for any generation and the additive
//! `ALTER TABLE` statements are all derived from that declaration.

use crate::error::DecodeError;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Row;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// One of the cumulative field sets emitted by the runway tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    /// Totals, cash, burn, recent months and top outflow categories.
    Initial = 1,
    /// Risk label, flow statistics, cash-flow projection, trend and extremes.
    CashFlow = 2,
    /// Breakeven, targets, concentration and scenarios.
    Planning = 3,
}

impl Generation {
    pub const CURRENT: Generation = Generation::Planning;

    pub fn number(self) -> i64 {
        self as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Count,
    Money,
    Months,
    Percent,
    /// Herfindahl concentration index, 0..=1.
    Index,
    Risk,
}

impl ColumnKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Text | ColumnKind::Risk => "TEXT",
            ColumnKind::Count => "INTEGER",
            ColumnKind::Money => "NUMERIC(14,2)",
            ColumnKind::Months => "NUMERIC(10,2)",
            ColumnKind::Percent => "NUMERIC(7,2)",
            ColumnKind::Index => "NUMERIC(9,6)",
        }
    }

    /// SQL literal used both as the column default and for rows written
    /// before the column existed.
    pub fn default_sql(self) -> &'static str {
        match self {
            ColumnKind::Text => "''",
            ColumnKind::Risk => "'not_at_risk'",
            _ => "0",
        }
    }

    /// Decimal places kept when binding a value.
    pub fn scale(self) -> Option<u32> {
        match self {
            ColumnKind::Money | ColumnKind::Months | ColumnKind::Percent => Some(2),
            ColumnKind::Index => Some(6),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub path: &'static [&'static str],
    pub kind: ColumnKind,
    pub since: Generation,
}

impl ColumnSpec {
    pub fn definition(&self) -> String {
        format!(
            "{} {} NOT NULL DEFAULT {}",
            self.name,
            self.kind.sql_type(),
            self.kind.default_sql()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRole {
    /// The wide snapshot row, keyed by the generated id.
    Snapshot,
    /// Rows decoded from a JSON array and tagged with the snapshot id.
    Child,
}

#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    /// JSON key of the array a child table is decoded from; empty for the snapshot.
    pub source: &'static str,
    pub role: TableRole,
    pub since: Generation,
    pub columns: &'static [ColumnSpec],
}

impl TableSpec {
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self.role {
            TableRole::Snapshot => &["id", "created_at"],
            TableRole::Child => &["snapshot_id", "ordinal"],
        }
    }

    fn key_definitions(&self) -> &'static [&'static str] {
        match self.role {
            TableRole::Snapshot => &["id TEXT PRIMARY KEY", "created_at TEXT NOT NULL"],
            TableRole::Child => &["snapshot_id TEXT NOT NULL", "ordinal INTEGER NOT NULL"],
        }
    }

    pub fn columns_at(&self, generation: Generation) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(move |c| c.since <= generation)
    }

    /// Columns that arrived after the table was first defined.
    pub fn evolved_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        let since = self.since;
        self.columns.iter().filter(move |c| c.since > since)
    }

    pub fn create_sql(&self, schema: &str, generation: Generation) -> String {
        let definitions: Vec<String> = self
            .key_definitions()
            .iter()
            .map(|d| d.to_string())
            .chain(self.columns_at(generation).map(ColumnSpec::definition))
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.{} (\n    {}\n)",
            self.name,
            definitions.join(",\n    ")
        )
    }

    pub fn insert_sql(&self, schema: &str) -> String {
        let names: Vec<&str> = self
            .key_columns()
            .iter()
            .copied()
            .chain(self.columns.iter().map(|c| c.name))
            .collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();

        format!(
            "INSERT INTO {schema}.{} ({}) VALUES ({})",
            self.name,
            names.join(", "),
            placeholders.join(", ")
        )
    }
}

/// A typed row of one report table.
pub trait ReportRecord: Sized {
    fn spec() -> &'static TableSpec;

    /// Decode from a JSON object; `at` is the dotted location of `object`
    /// in the report, used in error messages.
    fn decode(object: &Map<String, Value>, at: &str) -> Result<Self, DecodeError>;

    /// Bind values in `spec().columns` order, rounded to column scale.
    fn values(&self) -> Vec<SqlValue>;
}

/// Conversion between a JSON leaf, the Rust field type and the bound SQL value.
pub trait FieldValue: Sized + Default {
    fn from_json(value: &Value, path: &str) -> Result<Self, DecodeError>;

    fn to_sql(&self, kind: ColumnKind) -> SqlValue;
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn wrong_type(path: &str, expected: &'static str, value: &Value) -> DecodeError {
    DecodeError::WrongType {
        path: path.to_string(),
        expected,
        found: json_type_name(value),
    }
}

/// Half-way values round away from zero, as `NUMERIC(p,s)` does.
pub fn round_to_scale(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

fn parse_decimal(text: &str) -> Result<Decimal, rust_decimal::Error> {
    Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text))
}

/// Read a fixed-point column back, whatever storage class SQLite chose for it.
pub fn decimal_column(row: &Row<'_>, idx: usize, kind: ColumnKind) -> rusqlite::Result<Decimal> {
    let value = row.get_ref(idx)?;
    let parsed = match value {
        ValueRef::Integer(n) => Ok(Decimal::from(n)),
        ValueRef::Real(real) => parse_decimal(&real.to_string()),
        ValueRef::Text(text) => parse_decimal(&String::from_utf8_lossy(text)),
        ValueRef::Null | ValueRef::Blob(_) => Err(rust_decimal::Error::ErrorString(
            "not a numeric value".to_string(),
        )),
    }
    .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, value.data_type(), Box::new(err)))?;

    Ok(match kind.scale() {
        Some(scale) => round_to_scale(parsed, scale),
        None => parsed,
    })
}

impl FieldValue for String {
    fn from_json(value: &Value, path: &str) -> Result<Self, DecodeError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| wrong_type(path, "string", value))
    }

    fn to_sql(&self, _kind: ColumnKind) -> SqlValue {
        SqlValue::Text(self.clone())
    }
}

impl FieldValue for i64 {
    fn from_json(value: &Value, path: &str) -> Result<Self, DecodeError> {
        if let Some(n) = value.as_i64() {
            return Ok(n);
        }
        // The report tool prints some counts through a float formatter.
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
            .ok_or_else(|| wrong_type(path, "integer", value))
    }

    fn to_sql(&self, _kind: ColumnKind) -> SqlValue {
        SqlValue::Integer(*self)
    }
}

impl FieldValue for Decimal {
    /// Parsed from the number's JSON text so `1.005` stays exactly `1.005`.
    fn from_json(value: &Value, path: &str) -> Result<Self, DecodeError> {
        let Value::Number(number) = value else {
            return Err(wrong_type(path, "number", value));
        };
        let text = number.to_string();
        parse_decimal(&text).map_err(|_| DecodeError::OutOfRange {
            path: path.to_string(),
            value: text,
        })
    }

    fn to_sql(&self, kind: ColumnKind) -> SqlValue {
        let rounded = match kind.scale() {
            Some(scale) => round_to_scale(*self, scale),
            None => *self,
        };
        // NUMERIC affinity stores well-formed decimal text as REAL anyway;
        // parsing the text picks the double nearest the rounded value.
        let text = rounded.to_string();
        match text.parse::<f64>() {
            Ok(real) => SqlValue::Real(real),
            Err(_) => SqlValue::Text(text),
        }
    }
}

/// Declares one report table: the typed record plus its `TableSpec`.
#[macro_export]
macro_rules! define_report_table {
    (
        $(#[$meta:meta])*
        pub struct $Name:ident => $SPEC:ident {
            table: $table:literal,
            source: $source:literal,
            role: $role:ident,
            since: $since:ident,
            fields: {
                $( $field:ident : $kind:ident @ [ $($seg:literal),+ ] since $fsince:ident ),* $(,)?
            }
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $Name {
            $( pub $field: $crate::__field_type!($kind), )*
        }

        pub static $SPEC: $crate::models::columns::TableSpec = $crate::models::columns::TableSpec {
            name: $table,
            source: $source,
            role: $crate::models::columns::TableRole::$role,
            since: $crate::models::columns::Generation::$since,
            columns: &[
                $(
                    $crate::models::columns::ColumnSpec {
                        name: stringify!($field),
                        path: &[$($seg),+],
                        kind: $crate::models::columns::ColumnKind::$kind,
                        since: $crate::models::columns::Generation::$fsince,
                    },
                )*
            ],
        };

        impl $crate::models::columns::ReportRecord for $Name {
            fn spec() -> &'static $crate::models::columns::TableSpec {
                &$SPEC
            }

            fn decode(
                object: &::serde_json::Map<String, ::serde_json::Value>,
                at: &str,
            ) -> Result<Self, $crate::error::DecodeError> {
                Ok(Self {
                    $( $field: $crate::report::decode::read_field(object, &[$($seg),+], at)?, )*
                })
            }

            fn values(&self) -> Vec<::rusqlite::types::Value> {
                use $crate::models::columns::FieldValue;
                vec![
                    $( self.$field.to_sql($crate::models::columns::ColumnKind::$kind), )*
                ]
            }
        }
    };
}

/// Map a column kind token to the Rust field type.
#[doc(hidden)]
#[macro_export]
macro_rules! __field_type {
    (Text) => { String };
    (Count) => { i64 };
    (Money) => { ::rust_decimal::Decimal };
    (Months) => { ::rust_decimal::Decimal };
    (Percent) => { ::rust_decimal::Decimal };
    (Index) => { ::rust_decimal::Decimal };
    (Risk) => { $crate::models::snapshot::RunwayRisk };
}
