use serde_json::Value;

use super::Formatters;
use crate::value;

pub(super) fn register(formatters: &mut Formatters) {
    formatters.register("arrayJoin", array_join);
    formatters.register("arrayMap", array_map);
}

fn text_arg(args: &[Value], index: usize, default: &str) -> String {
    match args.get(index) {
        Some(Value::Null) | None => default.to_string(),
        Some(v) => value::to_text(v).into_owned(),
    }
}

/// Join scalar items with `args[0]` (default `", "`).
pub fn array_join(d: &Value, args: &[Value]) -> Value {
    let Value::Array(items) = d else {
        return d.clone();
    };
    let separator = text_arg(args, 0, ", ");
    let parts: Vec<_> = items.iter().map(value::to_text).collect();
    Value::String(parts.join(separator.as_str()))
}

/// Flatten an array of objects.
///
/// Objects are joined with `args[0]` (default `", "`), attributes with
/// `args[1]` (default `":"`). Further arguments select which attributes to
/// print; without them every non-nested attribute is printed in order.
pub fn array_map(d: &Value, args: &[Value]) -> Value {
    let Value::Array(items) = d else {
        return d.clone();
    };
    let object_separator = text_arg(args, 0, ", ");
    let attribute_separator = text_arg(args, 1, ":");
    let selected: Vec<String> = args
        .iter()
        .skip(2)
        .map(|a| value::to_text(a).into_owned())
        .collect();

    let rows: Vec<String> = items
        .iter()
        .map(|item| {
            let attributes: Vec<String> = match item {
                Value::Object(map) if !selected.is_empty() => selected
                    .iter()
                    .map(|name| map.get(name).map(value::to_text).unwrap_or_default().into_owned())
                    .collect(),
                Value::Object(map) => map
                    .values()
                    .filter(|v| !matches!(v, Value::Array(_) | Value::Object(_)))
                    .map(|v| value::to_text(v).into_owned())
                    .collect(),
                scalar => vec![value::to_text(scalar).into_owned()],
            };
            attributes.join(attribute_separator.as_str())
        })
        .collect();
    Value::String(rows.join(object_separator.as_str()))
}
