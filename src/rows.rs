//! Row field access with loose numeric coercion
//!
//! Upstream report exports deliver rows as JSON objects whose metric fields
//! may be numbers, numeric strings, or missing entirely depending on which
//! endpoint produced them. Several fields also go by two names (older and
//! newer export formats). These helpers centralize the coercion rules:
//! first present field wins, anything unparseable counts as zero.

use serde_json::Value;

/// A single report row as delivered by the data source.
pub type Row = Value;

/// Read the first present field among `names` as an f64.
///
/// Numeric strings are coerced; missing or unparseable values yield 0.0.
pub fn num_field(row: &Row, names: &[&str]) -> f64 {
    names
        .iter()
        .find_map(|name| row.get(name).and_then(coerce_f64))
        .unwrap_or(0.0)
}

/// Read the first present field among `names` as an i64, truncating floats.
pub fn int_field(row: &Row, names: &[&str]) -> i64 {
    names
        .iter()
        .find_map(|name| row.get(name).and_then(coerce_i64))
        .unwrap_or(0)
}

/// Read the first present field among `names` as text.
///
/// Numbers are stringified so numeric date columns still group correctly.
pub fn text_field(row: &Row, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match row.get(name) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}
