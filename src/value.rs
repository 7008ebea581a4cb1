//! Runtime value access.
//!
//! Payloads are `serde_json::Value` trees. The builder never indexes them
//! directly; it goes through the lookups below, which turn every shape
//! mismatch into "absent" instead of an error.

use std::borrow::Cow;

use serde_json::Value;

/// Look up `name` on `value`. An empty name designates the value itself.
pub fn field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    if name.is_empty() {
        return Some(value);
    }
    match value {
        Value::Object(map) => map.get(name),
        _ => None,
    }
}

/// Elements to iterate for a repeated section. Anything but an array yields
/// zero iterations.
pub fn elements(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

/// Whether a value counts as "empty" for substitution purposes.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(f64::is_nan),
        Value::Bool(_) => false,
    }
}

/// Render a value as the text inserted into the document.
pub fn to_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return Cow::Owned(n.to_string());
            }
            match n.as_f64() {
                Some(f) => Cow::Owned(format_float(f)),
                None => Cow::Owned(n.to_string()),
            }
        }
        Value::Array(_) | Value::Object(_) => Cow::Owned(value.to_string()),
    }
}

/// Integral floats print without a fractional part (`3.0` -> `3`).
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

/// Numeric view of a value, parsing strings the way a lenient reader would.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Escape text for insertion into XML character data.
pub fn escape_xml(text: &str) -> Cow<'_, str> {
    let needs_escape = text
        .chars()
        .any(|c| matches!(c, '&' | '<' | '>') || is_stripped_control(c));
    if !needs_escape {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c if is_stripped_control(c) => {}
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

// Tab, LF and CR are legal in XML 1.0; the rest of C0 is not.
fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}')
}
