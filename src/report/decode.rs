use crate::error::DecodeError;
use crate::models::columns::{wrong_type, FieldValue, Generation, ReportRecord, TableRole};
use crate::models::snapshot::{
    DecodedReport, InflowCategory, OutflowCategory, RecentMonth, Scenario, Snapshot,
    SnapshotMetrics, REPORT_TABLES, SNAPSHOTS_TABLE,
};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Read a report file into an untyped JSON tree.
pub fn load_report(path: &Path) -> Result<Value, DecodeError> {
    let raw = fs::read_to_string(path).map_err(|source| DecodeError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Decode a report tree into typed rows. Mints the snapshot id and stamps
/// `created_at` with the current time.
pub fn decode_report(raw: &Value) -> Result<DecodedReport, DecodeError> {
    let root = raw.as_object().ok_or_else(|| wrong_type("$", "object", raw))?;

    let metrics = SnapshotMetrics::decode(root, "")?;
    let snapshot = Snapshot {
        id: Uuid::new_v4(),
        created_at: chrono::Utc::now(),
        metrics,
    };

    Ok(DecodedReport {
        snapshot,
        recent_months: decode_rows::<RecentMonth>(root)?,
        outflow_categories: decode_rows::<OutflowCategory>(root)?,
        inflow_categories: decode_rows::<InflowCategory>(root)?,
        scenarios: decode_rows::<Scenario>(root)?,
        generation: infer_generation(root),
    })
}

fn decode_rows<R: ReportRecord>(root: &Map<String, Value>) -> Result<Vec<R>, DecodeError> {
    let source = R::spec().source;
    let items = match root.get(source) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(wrong_type(source, "array", other)),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let at = format!("{source}[{index}]");
            let object = item
                .as_object()
                .ok_or_else(|| wrong_type(&at, "object", item))?;
            R::decode(object, &at)
        })
        .collect()
}

/// Resolve `path` under `object` and decode the leaf. Missing keys, missing
/// parents and `null` all yield the field default.
pub fn read_field<T: FieldValue>(
    object: &Map<String, Value>,
    path: &[&str],
    at: &str,
) -> Result<T, DecodeError> {
    let mut current = object;
    let mut walked = at.to_string();

    for (depth, key) in path.iter().enumerate() {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(key);

        let value = match current.get(*key) {
            None | Some(Value::Null) => return Ok(T::default()),
            Some(value) => value,
        };

        if depth + 1 == path.len() {
            return T::from_json(value, &walked);
        }

        current = value
            .as_object()
            .ok_or_else(|| wrong_type(&walked, "object", value))?;
    }

    Ok(T::default())
}

fn is_present(object: &Map<String, Value>, path: &[&str]) -> bool {
    let mut current = object;
    for (depth, key) in path.iter().enumerate() {
        match current.get(*key) {
            None | Some(Value::Null) => return false,
            Some(_) if depth + 1 == path.len() => return true,
            Some(Value::Object(next)) => current = next,
            Some(_) => return false,
        }
    }
    false
}

/// Newest generation whose keys appear in the payload.
pub fn infer_generation(root: &Map<String, Value>) -> Generation {
    let from_fields = SNAPSHOTS_TABLE
        .columns
        .iter()
        .filter(|column| is_present(root, column.path))
        .map(|column| column.since);

    let from_lists = REPORT_TABLES
        .iter()
        .filter(|table| table.role == TableRole::Child)
        .filter(|table| root.get(table.source).is_some_and(|v| !v.is_null()))
        .map(|table| table.since);

    from_fields
        .chain(from_lists)
        .max()
        .unwrap_or(Generation::Initial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::snapshot::RunwayRisk;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn sample_initial() -> Value {
        json!({
            "records": 120,
            "months": 9,
            "skipped": 2,
            "totals": { "inflow": 500000.0, "outflow": 420000.0, "net": 80000.0 },
            "cash": { "starting": 450000.0, "reserved": 60000.0, "available": 390000.0 },
            "as_of": "2024-05",
            "window_months": 6,
            "burn": { "average_monthly": 52000.0, "months_used": 4, "estimated_runway_months": 7.5 },
            "recent_months": [
                { "month": "2024-04", "inflow": 60000.0, "outflow": 75000.0, "net": -15000.0 },
                { "month": "2024-05", "inflow": 80000.0, "outflow": 70000.0, "net": 10000.0 }
            ],
            "top_categories": [
                { "category": "Payroll", "outflow": 250000.0, "count": 9 },
                { "category": "Rent", "outflow": 54000.0, "count": 9 }
            ]
        })
    }

    #[test]
    fn decodes_initial_generation_report() {
        let report = decode_report(&sample_initial()).expect("decode");
        let metrics = &report.snapshot.metrics;

        assert_eq!(metrics.records, 120);
        assert_eq!(metrics.total_inflow, dec!(500000));
        assert_eq!(metrics.available_cash, dec!(390000));
        assert_eq!(metrics.runway_months, dec!(7.5));
        assert_eq!(metrics.as_of, "2024-05");
        assert_eq!(report.recent_months.len(), 2);
        assert_eq!(report.outflow_categories[0].category, "Payroll");
        assert_eq!(report.generation, Generation::Initial);
    }

    #[test]
    fn net_summary_belongs_to_the_initial_generation() {
        let mut raw = sample_initial();
        raw["net"] = json!({ "average_monthly": 13333.33, "months_used": 9 });

        let report = decode_report(&raw).expect("decode");
        assert_eq!(report.snapshot.metrics.avg_net, dec!(13333.33));
        assert_eq!(report.snapshot.metrics.net_months, 9);
        assert_eq!(report.generation, Generation::Initial);

        raw["net"]["volatility"] = json!(1200.5);
        assert_eq!(decode_report(&raw).expect("decode").generation, Generation::CashFlow);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let report = decode_report(&sample_initial()).expect("decode");
        let metrics = &report.snapshot.metrics;

        assert_eq!(metrics.runway_risk, RunwayRisk::NotAtRisk);
        assert_eq!(metrics.inflow_hhi, Decimal::ZERO);
        assert_eq!(metrics.top_outflow_share_pct, Decimal::ZERO);
        assert_eq!(metrics.depletion_month, "");
        assert_eq!(metrics.deficit_streak_months, 0);
        assert!(report.scenarios.is_empty());
        assert!(report.inflow_categories.is_empty());
    }

    #[test]
    fn empty_object_decodes_to_all_defaults() {
        let report = decode_report(&json!({})).expect("decode");
        assert_eq!(report.snapshot.metrics, SnapshotMetrics::default());
        assert_eq!(report.child_row_count(), 0);
    }

    #[test]
    fn null_values_are_treated_as_absent() {
        let report = decode_report(&json!({
            "cash_flow": { "depletion_month": null, "depletion_balance": null },
            "concentration": null,
            "scenarios": null
        }))
        .expect("decode");

        assert_eq!(report.snapshot.metrics.depletion_month, "");
        assert_eq!(report.snapshot.metrics.depletion_balance, Decimal::ZERO);
        assert!(report.scenarios.is_empty());
    }

    #[test]
    fn wrong_typed_field_is_rejected_with_its_path() {
        let err = decode_report(&json!({ "totals": { "inflow": "500000" } }))
            .expect_err("string inflow must fail");
        assert_eq!(err.to_string(), "totals.inflow: expected number, found string");
    }

    #[test]
    fn scalar_in_place_of_section_is_rejected() {
        let err = decode_report(&json!({ "burn": 12 })).expect_err("burn must be an object");
        assert!(matches!(err, DecodeError::WrongType { ref path, .. } if path == "burn"));
    }

    #[test]
    fn list_elements_report_their_index() {
        let err = decode_report(&json!({
            "scenarios": [
                { "name": "base" },
                { "name": "cut", "runway_months": [] }
            ]
        }))
        .expect_err("array runway must fail");
        assert_eq!(
            err.to_string(),
            "scenarios[1].runway_months: expected number, found array"
        );

        let err = decode_report(&json!({ "recent_months": ["2024-05"] })).expect_err("string row");
        assert!(err.to_string().starts_with("recent_months[0]"));

        let err = decode_report(&json!({ "top_categories": {} })).expect_err("object list");
        assert_eq!(err.to_string(), "top_categories: expected array, found object");
    }

    #[test]
    fn unknown_risk_label_is_rejected() {
        let err = decode_report(&json!({ "runway_risk": "doomed" })).expect_err("unknown risk");
        assert!(matches!(err, DecodeError::UnknownRisk { ref value, .. } if value == "doomed"));
    }

    #[test]
    fn non_object_root_is_rejected() {
        assert!(decode_report(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn list_order_is_preserved() {
        let report = decode_report(&json!({
            "top_inflow_categories": [
                { "category": "Grants", "inflow": 10.0, "count": 1 },
                { "category": "Donations", "inflow": 900.0, "count": 40 },
                { "category": "Grants", "inflow": 5.0, "count": 1 }
            ]
        }))
        .expect("decode");

        let labels: Vec<&str> = report
            .inflow_categories
            .iter()
            .map(|c| c.category.as_str())
            .collect();
        assert_eq!(labels, vec!["Grants", "Donations", "Grants"]);
        assert_eq!(report.generation, Generation::CashFlow);
    }

    #[test]
    fn planning_generation_fields_are_decoded() {
        let report = decode_report(&json!({
            "runway_risk": "at_risk",
            "concentration": { "inflow_hhi": 0.4123456, "top_outflow_share_pct": 61.5 },
            "scenarios": [{
                "name": "hiring freeze",
                "inflow_change_pct": 0.0,
                "outflow_change_pct": -15.0,
                "projected_net": -12000.0,
                "runway_months": 11.25,
                "runway_risk": "watch"
            }]
        }))
        .expect("decode");

        assert_eq!(report.snapshot.metrics.runway_risk, RunwayRisk::AtRisk);
        assert_eq!(report.snapshot.metrics.inflow_hhi, dec!(0.4123456));
        assert_eq!(report.scenarios[0].runway_risk, RunwayRisk::Watch);
        assert_eq!(report.scenarios[0].outflow_change_pct, dec!(-15));
        assert_eq!(report.generation, Generation::Planning);
    }

    #[test]
    fn each_decode_mints_a_new_identity() {
        let raw = sample_initial();
        let first = decode_report(&raw).expect("decode");
        let second = decode_report(&raw).expect("decode");
        assert_ne!(first.snapshot.id, second.snapshot.id);
    }

    #[test]
    fn load_report_surfaces_syntax_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("report.json");
        fs::write(&path, "{ \"totals\": ").expect("write");

        assert!(matches!(load_report(&path), Err(DecodeError::Json(_))));
        assert!(matches!(
            load_report(&dir.path().join("missing.json")),
            Err(DecodeError::Read { .. })
        ));
    }
}
