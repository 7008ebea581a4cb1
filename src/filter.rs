//! Conditions written inside index brackets.
//!
//! `d.cars[i, speed>10].brand` repeats only the cars faster than 10, and
//! `d.cars[id=3].brand` binds the first car whose `id` is 3.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
}

impl Operator {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
        }
    }

    fn holds(self, ordering: Option<Ordering>) -> bool {
        match self {
            Self::Eq => ordering == Some(Ordering::Equal),
            Self::Ne => ordering != Some(Ordering::Equal),
            Self::Gt => ordering == Some(Ordering::Greater),
            Self::Lt => ordering == Some(Ordering::Less),
        }
    }
}

/// Left-hand side of a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Position of the element, named by the group's iterator token.
    /// Negative literals count from the end of the array.
    Index(String),
    /// Dotted attribute path read off the element
    Field(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub left: Operand,
    pub operator: Operator,
    pub right: Value,
}

static CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)(!=|=|>|<)(.+)$")
        .expect("condition pattern is valid")
});

impl Filter {
    /// Parse `attr<op>value`. When `attr` is the group's `iterator`, the
    /// condition applies to the element position instead.
    pub(crate) fn parse(token: &str, iterator: Option<&str>) -> Option<Self> {
        let caps = CONDITION.captures(token)?;
        let attr = &caps[1];
        let left = if iterator == Some(attr) {
            Operand::Index(attr.to_string())
        } else {
            Operand::Field(attr.split('.').map(str::to_string).collect())
        };
        Some(Self {
            left,
            operator: Operator::parse(&caps[2])?,
            right: literal(&caps[3]),
        })
    }

    /// Whether `element`, the `index`-th of `len` elements, passes.
    pub fn matches(&self, element: &Value, index: usize, len: usize) -> bool {
        match &self.left {
            Operand::Index(_) => {
                let Some(mut wanted) = self.right.as_f64() else {
                    return false;
                };
                if wanted < 0.0 {
                    wanted += len as f64;
                }
                self.operator.holds((index as f64).partial_cmp(&wanted))
            }
            Operand::Field(path) => {
                let found = path
                    .iter()
                    .try_fold(element, |v, name| value::field(v, name));
                match found {
                    None | Some(Value::Null) => self.operator == Operator::Ne,
                    Some(found) => self.operator.holds(compare(found, &self.right)),
                }
            }
        }
    }
}

/// Whether `element` passes every filter.
pub fn accepts(filters: &[Filter], element: &Value, index: usize, len: usize) -> bool {
    filters.iter().all(|f| f.matches(element, index, len))
}

/// Canonical text of a filter list, e.g. `speed>10,id='a'`.
pub fn describe(filters: &[Filter]) -> String {
    filters
        .iter()
        .map(Filter::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn literal(raw: &str) -> Value {
    for q in ['\'', '"'] {
        if let Some(inner) = raw.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return Value::String(inner.to_string());
        }
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>()
        && f.is_finite()
    {
        return Value::from(f);
    }
    Value::String(raw.to_string())
}

// Numbers compare numerically, everything else as text.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if right.is_number()
        && let Some(l) = value::as_number(left)
    {
        return l.partial_cmp(&right.as_f64()?);
    }
    Some(value::to_text(left).as_ref().cmp(value::to_text(right).as_ref()))
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(name) => f.write_str(name),
            Self::Field(path) => f.write_str(&path.join(".")),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.left, self.operator.as_str())?;
        match &self.right {
            Value::String(s) => write!(f, "'{}'", s),
            other => write!(f, "{}", other),
        }
    }
}
