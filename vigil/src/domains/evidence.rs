//! Shared evidence extraction over warehouse rows and tool results.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::state::InvestigationState;

/// Distinct non-empty string values of `field` across the warehouse rows.
pub fn distinct_strings(state: &InvestigationState, field: &str) -> BTreeSet<String> {
    state
        .warehouse_rows()
        .iter()
        .filter_map(|row| row.get(field).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Number of rows where `field` is truthy (boolean true or numeric > 0).
pub fn count_truthy(state: &InvestigationState, field: &str) -> usize {
    state
        .warehouse_rows()
        .iter()
        .filter(|row| match row.get(field) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v > 0.0),
            _ => false,
        })
        .count()
}

/// Sum of a numeric field across the warehouse rows.
pub fn sum_field(state: &InvestigationState, field: &str) -> f64 {
    state
        .warehouse_rows()
        .iter()
        .filter_map(|row| row.get(field).and_then(Value::as_f64))
        .sum()
}

/// Numeric values of a field across the warehouse rows.
pub fn field_values(state: &InvestigationState, field: &str) -> Vec<f64> {
    state
        .warehouse_rows()
        .iter()
        .filter_map(|row| row.get(field).and_then(Value::as_f64))
        .collect()
}

/// The share of rows satisfying `pred`, 0.0 when there are no rows.
pub fn row_share(state: &InvestigationState, pred: impl Fn(&Value) -> bool) -> f64 {
    let rows = state.warehouse_rows();
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().filter(|r| pred(r)).count() as f64 / rows.len() as f64
}

/// A tool's latest parsed result, if recorded.
pub fn tool_result<'a>(state: &'a InvestigationState, name: &str) -> Option<&'a Value> {
    state.tool_results.get(name)
}

/// A numeric risk reading from a tool result, wherever the tool put it.
pub fn tool_risk(state: &InvestigationState, name: &str) -> Option<f64> {
    let result = tool_result(state, name)?;
    for key in ["risk_score", "score", "risk"] {
        if let Some(v) = result.get(key).and_then(Value::as_f64) {
            return Some(v.clamp(0.0, 1.0));
        }
    }
    None
}

/// Baseline confidence from evidence volume: thin data earns a low floor,
/// a full result set earns a solid baseline.
pub fn data_confidence(state: &InvestigationState) -> f64 {
    let rows = state.warehouse_rows().len();
    if rows == 0 {
        0.2
    } else {
        (0.5 + 0.04 * rows as f64).min(0.9)
    }
}
