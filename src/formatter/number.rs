use serde_json::Value;

use super::Formatters;
use crate::value;

pub(super) fn register(formatters: &mut Formatters) {
    formatters.register("int", |d, _| int(d));
    formatters.register("toFixed", to_fixed);
    formatters.register("toEN", |d, _| to_en(d));
    formatters.register("toFR", |d, _| to_fr(d));
}

/// Truncate toward zero.
pub fn int(d: &Value) -> Value {
    match value::as_number(d) {
        Some(n) if n.is_finite() => Value::from(n.trunc() as i64),
        _ => d.clone(),
    }
}

/// Text with exactly `args[0]` decimals (0 when omitted).
pub fn to_fixed(d: &Value, args: &[Value]) -> Value {
    let decimals = args
        .first()
        .and_then(value::as_number)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map_or(0, |n| n.min(100.0) as usize);
    match value::as_number(d) {
        Some(n) => Value::String(format!("{:.*}", decimals, n)),
        None => d.clone(),
    }
}

/// Decimal separator becomes `.`.
pub fn to_en(d: &Value) -> Value {
    match d {
        Value::Null | Value::Array(_) | Value::Object(_) => d.clone(),
        other => Value::String(value::to_text(other).replace(',', ".")),
    }
}

/// Decimal separator becomes `,`.
pub fn to_fr(d: &Value) -> Value {
    match d {
        Value::Null | Value::Array(_) | Value::Object(_) => d.clone(),
        other => Value::String(value::to_text(other).replace('.', ",")),
    }
}
