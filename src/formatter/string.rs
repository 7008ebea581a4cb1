//! String formatters. Non-string input passes through unchanged.

use serde_json::Value;

use super::Formatters;
use crate::value;

pub(super) fn register(formatters: &mut Formatters) {
    formatters.register("lowerCase", |d, _| map_str(d, str::to_lowercase));
    formatters.register("upperCase", |d, _| map_str(d, str::to_uppercase));
    formatters.register("ucFirst", |d, _| map_str(d, uc_first));
    formatters.register("ucWords", |d, _| map_str(d, uc_words));
    formatters.register("print", print);
    formatters.register("ifEmpty", if_empty);
}

fn map_str(d: &Value, f: impl Fn(&str) -> String) -> Value {
    match d {
        Value::String(s) => Value::String(f(s)),
        other => other.clone(),
    }
}

pub fn uc_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Upper-case the first character of every whitespace-separated word.
pub fn uc_words(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && !c.is_whitespace() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

/// Always yields its message.
pub fn print(_d: &Value, args: &[Value]) -> Value {
    args.first().cloned().unwrap_or(Value::Null)
}

/// Yields the message when the value is null, `""`, `[]` or `{}`.
pub fn if_empty(d: &Value, args: &[Value]) -> Value {
    if value::is_empty(d) {
        args.first().cloned().unwrap_or(Value::Null)
    } else {
        d.clone()
    }
}
