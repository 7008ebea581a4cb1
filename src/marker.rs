//! Markers and the marker path grammar.
//!
//! A marker path looks like `d.menu[i].items[j].price:int:toFixed(2)`:
//! dot-separated segments, optional bracketed index groups on any segment,
//! and an optional `:`-separated formatter chain after the last segment.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::formatter::split_top_level;

/// One templating reference at a known position of the source text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Marker {
    pub offset: usize,
    pub path: String,
}

impl Marker {
    pub fn new(offset: usize, path: impl Into<String>) -> Self {
        Self {
            offset,
            path: path.into(),
        }
    }
}

/// A document body with its markers already extracted.
///
/// `text` no longer contains the marker text itself; each `Marker::offset`
/// is the byte offset in `text` where the marker used to be.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TemplateSource {
    pub text: String,
    pub markers: Vec<Marker>,
}

impl TemplateSource {
    pub fn new(text: impl Into<String>, markers: Vec<Marker>) -> Self {
        Self {
            text: text.into(),
            markers,
        }
    }
}

/// `[i]` opens a repeated section, `[i+1]` terminates it.
///
/// Conditions may follow the iterator (`[i, speed>10]`) to skip elements.
/// A group holding only conditions (`[id=3]`) searches the array for one
/// element instead of repeating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexGroup {
    pub iterator: Option<String>,
    pub terminator: bool,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub name: String,
    pub groups: Vec<IndexGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MarkerPath {
    pub segments: Vec<Segment>,
    /// Raw formatter chain, e.g. `toFixed(2)` in `d.price:toFixed(2)`
    pub formatters: Option<String>,
}

impl MarkerPath {
    pub fn is_terminator(&self) -> bool {
        self.segments
            .iter()
            .flat_map(|s| &s.groups)
            .any(|g| g.terminator)
    }
}

static INDEX_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(\+1)?$").expect("index token pattern is valid")
});

fn invalid(path: &str, offset: usize, message: impl Into<String>) -> Error {
    Error::InvalidMarker {
        path: path.to_string(),
        offset,
        message: message.into(),
    }
}

/// Bracket depth and quote state while scanning a path.
#[derive(Default)]
struct Scan {
    depth: usize,
    quote: Option<char>,
}

impl Scan {
    /// Feed one character. Returns true when it sits outside brackets.
    fn step(&mut self, c: char) -> bool {
        if let Some(q) = self.quote {
            if c == q {
                self.quote = None;
            }
            return false;
        }
        match c {
            '\'' | '"' if self.depth > 0 => {
                self.quote = Some(c);
                false
            }
            '[' => {
                self.depth += 1;
                false
            }
            ']' => {
                self.depth = self.depth.saturating_sub(1);
                false
            }
            _ => self.depth == 0,
        }
    }
}

/// Split `path` at the first `:` outside brackets.
fn split_formatters(path: &str) -> (&str, Option<&str>) {
    let mut scan = Scan::default();
    for (i, ch) in path.char_indices() {
        if scan.step(ch) && ch == ':' {
            return (&path[..i], Some(&path[i + 1..]));
        }
    }
    (path, None)
}

/// Drop whitespace, except inside quoted condition values.
fn strip_whitespace(structural: &str) -> String {
    let mut scan = Scan::default();
    structural
        .chars()
        .filter(|&c| {
            let quoted = scan.quote.is_some();
            scan.step(c);
            quoted || !c.is_whitespace()
        })
        .collect()
}

fn split_segments(path: &str) -> Vec<&str> {
    let mut scan = Scan::default();
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, ch) in path.char_indices() {
        if scan.step(ch) && ch == '.' {
            parts.push(&path[start..i]);
            start = i + 1;
        }
    }
    parts.push(&path[start..]);
    parts
}

/// Byte index of the `]` closing a group whose content starts `inner`.
fn group_end(inner: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in inner.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == ']' => return Some(i),
            None => {}
        }
    }
    None
}

fn parse_group(content: &str, path: &str, offset: usize) -> Result<IndexGroup> {
    let unsupported = || {
        invalid(
            path,
            offset,
            format!("unsupported array index `[{}]`", content),
        )
    };

    let mut iterator = None;
    let mut terminator = false;
    let mut conditions = Vec::new();
    for token in split_top_level(content, ',') {
        match INDEX_TOKEN.captures(token) {
            Some(_) if iterator.is_some() => return Err(unsupported()),
            Some(caps) => {
                iterator = Some(caps[1].to_string());
                terminator = caps.get(2).is_some();
            }
            None => conditions.push(token),
        }
    }

    let filters = conditions
        .into_iter()
        .map(|token| Filter::parse(token, iterator.as_deref()).ok_or_else(unsupported))
        .collect::<Result<Vec<_>>>()?;

    Ok(IndexGroup {
        iterator,
        terminator,
        filters,
    })
}

fn parse_segment(raw: &str, path: &str, offset: usize) -> Result<Segment> {
    let name_end = raw.find(['[', ']']).unwrap_or(raw.len());
    let name = &raw[..name_end];
    if name.is_empty() {
        return Err(invalid(path, offset, format!("segment `{}` has no name", raw)));
    }

    let mut groups = Vec::new();
    let mut rest = &raw[name_end..];
    while !rest.is_empty() {
        let Some(inner) = rest.strip_prefix('[') else {
            return Err(invalid(
                path,
                offset,
                format!("unexpected `{}` after index group in `{}`", rest, raw),
            ));
        };
        let Some(close) = group_end(inner) else {
            return Err(invalid(path, offset, format!("unbalanced `[` in `{}`", raw)));
        };
        groups.push(parse_group(&inner[..close], path, offset)?);
        rest = &inner[close + 1..];
    }

    Ok(Segment {
        name: name.to_string(),
        groups,
    })
}

/// Parse a marker path into segments and its raw formatter chain.
pub(crate) fn parse_path(path: &str, offset: usize) -> Result<MarkerPath> {
    let (structural, formatters) = split_formatters(path);
    let compact = strip_whitespace(structural);
    if compact.is_empty() {
        return Err(invalid(path, offset, "empty marker"));
    }

    let segments = split_segments(&compact)
        .into_iter()
        .map(|raw| {
            if raw.is_empty() {
                Err(invalid(path, offset, "empty path segment"))
            } else {
                parse_segment(raw, path, offset)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let formatters = formatters
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string);

    Ok(MarkerPath {
        segments,
        formatters,
    })
}
