//! Formatter chains.
//!
//! A marker like `d.price:int:toFixed(2)` carries the chain `int:toFixed(2)`.
//! The chain is parsed once into [`FormatterCall`]s and compiled into a
//! [`FormatterExpr`], the nested call `toFixed(int(d.price), 2)`, which is
//! evaluated against a [`Formatters`] registry at render time.

use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};

pub mod array;
pub mod number;
pub mod registry;
pub mod string;

pub use registry::{FormatterFn, Formatters};

/// One formatter argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// A number or a string, fixed at compile time
    Literal(Value),
    /// `.attr` reads `attr` off the value the leaf is bound to; every extra
    /// leading dot climbs one enclosing scope
    Field { up: usize, name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatterCall {
    pub name: String,
    pub args: Vec<Argument>,
}

impl FormatterCall {
    pub fn new(name: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

// Curly and low single quotes typed by word processors.
const TYPOGRAPHIC_QUOTES: [char; 4] = ['\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}'];

fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| if TYPOGRAPHIC_QUOTES.contains(&c) { '\'' } else { c })
        .collect()
}

/// Split `text` on `sep` where it is outside quotes and parentheses.
pub(crate) fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                c if c == sep && depth == 0 => {
                    parts.push(&text[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse_argument(raw: &str) -> std::result::Result<Argument, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty argument".to_string());
    }

    for q in ['\'', '"'] {
        if let Some(inner) = raw.strip_prefix(q) {
            return inner
                .strip_suffix(q)
                .map(|s| Argument::Literal(Value::String(s.to_string())))
                .ok_or_else(|| format!("unterminated string argument `{}`", raw));
        }
    }

    if raw.starts_with('.') {
        let name = raw.trim_start_matches('.');
        let dots = raw.len() - name.len();
        if name.is_empty() {
            return Err(format!("field argument `{}` has no name", raw));
        }
        return Ok(Argument::Field {
            up: dots - 1,
            name: name.to_string(),
        });
    }

    if let Ok(n) = raw.parse::<i64>() {
        return Ok(Argument::Literal(Value::from(n)));
    }
    if let Ok(f) = raw.parse::<f64>()
        && f.is_finite()
    {
        return Ok(Argument::Literal(Value::from(f)));
    }
    Ok(Argument::Literal(Value::String(raw.to_string())))
}

fn parse_call(raw: &str) -> std::result::Result<FormatterCall, String> {
    let raw = raw.trim();
    let (name, args) = match raw.find('(') {
        Some(open) => {
            let inner = raw[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| format!("missing `)` in `{}`", raw))?;
            let args = if inner.trim().is_empty() {
                Vec::new()
            } else {
                split_top_level(inner, ',')
                    .into_iter()
                    .map(parse_argument)
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };
            (raw[..open].trim(), args)
        }
        None => (raw, Vec::new()),
    };

    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(format!("invalid formatter name `{}`", name));
    }
    Ok(FormatterCall::new(name, args))
}

/// Parse a raw chain such as `int:toFixed(2)` into formatter calls.
pub(crate) fn parse_chain(chain: &str, path: &str, offset: usize) -> Result<Vec<FormatterCall>> {
    let chain = normalize_quotes(chain);
    split_top_level(&chain, ':')
        .into_iter()
        .map(|raw| {
            parse_call(raw).map_err(|message| Error::InvalidMarker {
                path: path.to_string(),
                offset,
                message,
            })
        })
        .collect()
}

/// A compiled formatter chain: `calls` applied innermost first to `base`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatterExpr {
    base: String,
    calls: Vec<FormatterCall>,
}

impl FormatterExpr {
    pub fn compile(base: impl Into<String>, calls: Vec<FormatterCall>) -> Self {
        Self {
            base: base.into(),
            calls,
        }
    }

    /// Compile from textual calls, e.g. `["int", "toFixed(2)"]`.
    pub fn from_strs(base: &str, calls: &[&str]) -> Result<Self> {
        let calls = calls
            .iter()
            .map(|raw| {
                parse_call(&normalize_quotes(raw)).map_err(|message| Error::InvalidMarker {
                    path: base.to_string(),
                    offset: 0,
                    message,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::compile(base, calls))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn calls(&self) -> &[FormatterCall] {
        &self.calls
    }

    pub fn is_identity(&self) -> bool {
        self.calls.is_empty()
    }

    /// Check that every formatter named in the chain is registered.
    pub fn validate(&self, formatters: &Formatters) -> Result<()> {
        match self.calls.iter().find(|c| !formatters.contains(&c.name)) {
            Some(call) => Err(Error::MissingFormatter {
                name: call.name.clone(),
                path: self.base.clone(),
                suggestion: formatters.suggest(&call.name),
            }),
            None => Ok(()),
        }
    }

    /// Run the chain on `value`. `field` resolves dynamic arguments.
    pub fn apply<F>(&self, value: &Value, formatters: &Formatters, field: F) -> Result<Value>
    where
        F: Fn(usize, &str) -> Option<Value>,
    {
        let mut acc = value.clone();
        for call in &self.calls {
            let f = formatters
                .get(&call.name)
                .ok_or_else(|| Error::MissingFormatter {
                    name: call.name.clone(),
                    path: self.base.clone(),
                    suggestion: formatters.suggest(&call.name),
                })?;
            let args: Vec<Value> = call
                .args
                .iter()
                .map(|arg| match arg {
                    Argument::Literal(v) => v.clone(),
                    Argument::Field { up, name } => field(*up, name).unwrap_or(Value::Null),
                })
                .collect();
            acc = f(&acc, &args);
        }
        Ok(acc)
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(Value::String(s)) => write!(f, "'{}'", s),
            Self::Literal(v) => write!(f, "{}", v),
            Self::Field { up, name } => write!(f, "{}{}", ".".repeat(up + 1), name),
        }
    }
}

impl fmt::Display for FormatterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for call in self.calls.iter().rev() {
            write!(f, "{}(", call.name)?;
        }
        f.write_str(&self.base)?;
        for call in &self.calls {
            for arg in &call.args {
                write!(f, ", {}", arg)?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_call_rendering() {
        let expr = FormatterExpr::from_strs("d.number", &["int", "toFixed(2)"]).unwrap();
        assert_eq!(expr.to_string(), "toFixed(int(d.number), 2)");
    }

    #[test]
    fn no_calls_is_the_base() {
        let expr = FormatterExpr::compile("d.name", Vec::new());
        assert!(expr.is_identity());
        assert_eq!(expr.to_string(), "d.name");
    }

    #[test]
    fn chain_arguments() {
        let calls = parse_chain("print('a, b: c'):arrayMap(\" | \", 2.5, .id, ..name)", "p", 0)
            .unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args, vec![Argument::Literal(json!("a, b: c"))]);
        assert_eq!(
            calls[1].args,
            vec![
                Argument::Literal(json!(" | ")),
                Argument::Literal(json!(2.5)),
                Argument::Field {
                    up: 0,
                    name: "id".to_string()
                },
                Argument::Field {
                    up: 1,
                    name: "name".to_string()
                },
            ]
        );
    }

    #[test]
    fn typographic_quotes_are_normalized() {
        let calls = parse_chain("ifEmpty(\u{2018}none\u{2019})", "p", 0).unwrap();
        assert_eq!(calls[0].args, vec![Argument::Literal(json!("none"))]);
    }

    #[test]
    fn malformed_calls_are_invalid_markers() {
        for bad in ["toFixed(2", "(2)", "print('x)", "a b"] {
            let err = parse_chain(bad, "d.x", 7).unwrap_err();
            assert!(matches!(err, Error::InvalidMarker { offset: 7, .. }), "{bad}");
        }
    }

    #[test]
    fn apply_composes_in_order() {
        let formatters = Formatters::with_builtins();
        let expr = FormatterExpr::from_strs("d.number", &["int", "toFixed(2)"]).unwrap();
        let out = expr.apply(&json!(42.987), &formatters, |_, _| None).unwrap();
        assert_eq!(out, json!("42.00"));
    }

    #[test]
    fn apply_reports_missing_formatter() {
        let formatters = Formatters::with_builtins();
        let expr = FormatterExpr::from_strs("d.name", &["upercase"]).unwrap();
        let err = expr.apply(&json!("x"), &formatters, |_, _| None).unwrap_err();
        assert_eq!(
            err,
            Error::MissingFormatter {
                name: "upercase".to_string(),
                path: "d.name".to_string(),
                suggestion: Some("upperCase".to_string()),
            }
        );
        assert!(expr.validate(&formatters).is_err());
    }
}
