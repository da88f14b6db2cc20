use crate::define_report_table;
use crate::error::DecodeError;
use crate::models::columns::{wrong_type, ColumnKind, FieldValue, Generation, TableSpec};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, Value as SqlValue, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunwayRisk {
    #[default]
    NotAtRisk,
    Watch,
    AtRisk,
    Critical,
}

impl RunwayRisk {
    pub fn as_str(self) -> &'static str {
        match self {
            RunwayRisk::NotAtRisk => "not_at_risk",
            RunwayRisk::Watch => "watch",
            RunwayRisk::AtRisk => "at_risk",
            RunwayRisk::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_at_risk" => Some(RunwayRisk::NotAtRisk),
            "watch" => Some(RunwayRisk::Watch),
            "at_risk" => Some(RunwayRisk::AtRisk),
            "critical" => Some(RunwayRisk::Critical),
            _ => None,
        }
    }
}

impl FieldValue for RunwayRisk {
    fn from_json(value: &Value, path: &str) -> Result<Self, DecodeError> {
        let label = value
            .as_str()
            .ok_or_else(|| wrong_type(path, "runway risk string", value))?;
        RunwayRisk::parse(label).ok_or_else(|| DecodeError::UnknownRisk {
            path: path.to_string(),
            value: label.to_string(),
        })
    }

    fn to_sql(&self, _kind: ColumnKind) -> SqlValue {
        SqlValue::Text(self.as_str().to_string())
    }
}

impl FromSql for RunwayRisk {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let label = value.as_str()?;
        RunwayRisk::parse(label).ok_or_else(|| {
            FromSqlError::Other(Box::new(DecodeError::UnknownRisk {
                path: "runway_risk".to_string(),
                value: label.to_string(),
            }))
        })
    }
}

define_report_table! {
    /// Every report figure stored on the snapshot row.
    pub struct SnapshotMetrics => SNAPSHOTS_TABLE {
        table: "runway_snapshots",
        source: "",
        role: Snapshot,
        since: Initial,
        fields: {
            as_of: Text @ ["as_of"] since Initial,
            records: Count @ ["records"] since Initial,
            months: Count @ ["months"] since Initial,
            skipped: Count @ ["skipped"] since Initial,
            window_months: Count @ ["window_months"] since Initial,
            total_inflow: Money @ ["totals", "inflow"] since Initial,
            total_outflow: Money @ ["totals", "outflow"] since Initial,
            net: Money @ ["totals", "net"] since Initial,
            starting_cash: Money @ ["cash", "starting"] since Initial,
            reserved_cash: Money @ ["cash", "reserved"] since Initial,
            available_cash: Money @ ["cash", "available"] since Initial,
            avg_burn: Money @ ["burn", "average_monthly"] since Initial,
            burn_months: Count @ ["burn", "months_used"] since Initial,
            runway_months: Months @ ["burn", "estimated_runway_months"] since Initial,
            avg_net: Money @ ["net", "average_monthly"] since Initial,
            net_months: Count @ ["net", "months_used"] since Initial,

            runway_risk: Risk @ ["runway_risk"] since CashFlow,
            net_volatility: Money @ ["net", "volatility"] since CashFlow,
            restricted_outflow: Money @ ["restricted", "outflow_total"] since CashFlow,
            avg_inflow: Money @ ["flows", "average_inflow"] since CashFlow,
            avg_outflow: Money @ ["flows", "average_outflow"] since CashFlow,
            coverage_months: Months @ ["flows", "coverage_months"] since CashFlow,
            ending_cash: Money @ ["cash_flow", "ending_balance"] since CashFlow,
            lowest_cash: Money @ ["cash_flow", "lowest_balance"] since CashFlow,
            lowest_cash_month: Text @ ["cash_flow", "lowest_balance_month"] since CashFlow,
            depletion_month: Text @ ["cash_flow", "depletion_month"] since CashFlow,
            depletion_balance: Money @ ["cash_flow", "depletion_balance"] since CashFlow,
            depletion_month_index: Count @ ["cash_flow", "depletion_month_index"] since CashFlow,
            recent_avg_net: Money @ ["net_trend", "recent_average"] since CashFlow,
            prior_avg_net: Money @ ["net_trend", "prior_average"] since CashFlow,
            net_trend_delta: Money @ ["net_trend", "delta"] since CashFlow,
            best_net: Money @ ["net_extremes", "best_net"] since CashFlow,
            best_net_month: Text @ ["net_extremes", "best_month"] since CashFlow,
            worst_net: Money @ ["net_extremes", "worst_net"] since CashFlow,
            worst_net_month: Text @ ["net_extremes", "worst_month"] since CashFlow,
            deficit_streak_months: Count @ ["deficit_streak", "longest_months"] since CashFlow,
            deficit_streak_start: Text @ ["deficit_streak", "start_month"] since CashFlow,
            deficit_streak_end: Text @ ["deficit_streak", "end_month"] since CashFlow,
            largest_net_swing: Money @ ["net_swing", "largest_abs"] since CashFlow,
            net_swing_month: Text @ ["net_swing", "month"] since CashFlow,

            breakeven_gap: Money @ ["breakeven", "monthly_gap"] since Planning,
            breakeven_inflow_lift_pct: Percent @ ["breakeven", "inflow_lift_pct"] since Planning,
            breakeven_outflow_cut_pct: Percent @ ["breakeven", "outflow_cut_pct"] since Planning,
            target_runway_months: Months @ ["targets", "runway_months"] since Planning,
            target_cash: Money @ ["targets", "target_cash"] since Planning,
            funding_gap: Money @ ["targets", "funding_gap"] since Planning,
            inflow_hhi: Index @ ["concentration", "inflow_hhi"] since Planning,
            outflow_hhi: Index @ ["concentration", "outflow_hhi"] since Planning,
            top_inflow_share_pct: Percent @ ["concentration", "top_inflow_share_pct"] since Planning,
            top_outflow_share_pct: Percent @ ["concentration", "top_outflow_share_pct"] since Planning,
        }
    }
}

define_report_table! {
    pub struct RecentMonth => RECENT_MONTHS_TABLE {
        table: "runway_recent_months",
        source: "recent_months",
        role: Child,
        since: Initial,
        fields: {
            month: Text @ ["month"] since Initial,
            inflow: Money @ ["inflow"] since Initial,
            outflow: Money @ ["outflow"] since Initial,
            net: Money @ ["net"] since Initial,
        }
    }
}

define_report_table! {
    /// Spending category breakdown.
    pub struct OutflowCategory => OUTFLOW_CATEGORIES_TABLE {
        table: "runway_top_categories",
        source: "top_categories",
        role: Child,
        since: Initial,
        fields: {
            category: Text @ ["category"] since Initial,
            outflow: Money @ ["outflow"] since Initial,
            count: Count @ ["count"] since Initial,
        }
    }
}

define_report_table! {
    /// Income category breakdown.
    pub struct InflowCategory => INFLOW_CATEGORIES_TABLE {
        table: "runway_top_inflow_categories",
        source: "top_inflow_categories",
        role: Child,
        since: CashFlow,
        fields: {
            category: Text @ ["category"] since CashFlow,
            inflow: Money @ ["inflow"] since CashFlow,
            count: Count @ ["count"] since CashFlow,
        }
    }
}

define_report_table! {
    pub struct Scenario => SCENARIOS_TABLE {
        table: "runway_scenarios",
        source: "scenarios",
        role: Child,
        since: Planning,
        fields: {
            name: Text @ ["name"] since Planning,
            inflow_change_pct: Percent @ ["inflow_change_pct"] since Planning,
            outflow_change_pct: Percent @ ["outflow_change_pct"] since Planning,
            projected_net: Money @ ["projected_net"] since Planning,
            runway_months: Months @ ["runway_months"] since Planning,
            runway_risk: Risk @ ["runway_risk"] since Planning,
        }
    }
}

/// Tables in creation and write order.
pub static REPORT_TABLES: [&TableSpec; 5] = [
    &SNAPSHOTS_TABLE,
    &RECENT_MONTHS_TABLE,
    &OUTFLOW_CATEGORIES_TABLE,
    &INFLOW_CATEGORIES_TABLE,
    &SCENARIOS_TABLE,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub metrics: SnapshotMetrics,
}

/// One decoded report: the snapshot row and its child rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedReport {
    pub snapshot: Snapshot,
    pub recent_months: Vec<RecentMonth>,
    pub outflow_categories: Vec<OutflowCategory>,
    pub inflow_categories: Vec<InflowCategory>,
    pub scenarios: Vec<Scenario>,
    /// Newest generation any recognised key belongs to.
    pub generation: Generation,
}

impl DecodedReport {
    pub fn child_row_count(&self) -> usize {
        self.recent_months.len()
            + self.outflow_categories.len()
            + self.inflow_categories.len()
            + self.scenarios.len()
    }
}

/// A row of the snapshot time series, for trend reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub as_of: String,
    pub net: Decimal,
    pub available_cash: Decimal,
    pub runway_months: Decimal,
    pub runway_risk: RunwayRisk,
}
