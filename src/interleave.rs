//! Literal interleaving.
//!
//! Splits the marker-stripped document text into the static pieces the
//! builder emits around substitutions: the text before each leaf, the text
//! that opens each repeated section, and the separator between two rows.
//!
//! A repeated section is written as a first row holding `[i]` markers
//! followed by a second row holding `[i+1]` markers:
//!
//! ```text
//! <ul><li>{d.items[i].name}</li><li>{d.items[i+1].name}</li></ul>
//! ```
//!
//! The first row is the template for every element. The text between the
//! first row and the `[i+1]` marker becomes the row separator, and the
//! second row itself is skipped: only its trailing text survives, as the
//! end of the last row.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::scope::{LeafId, Occurrence, ScopeGraph, ScopeId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrayLayout {
    /// Text between the previous cursor position and the first row
    pub open: String,
    /// Text emitted between two consecutive rows
    pub separator: String,
}

/// Static text of a template, keyed by leaf and array scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    pub(crate) before: String,
    pub(crate) after: String,
    leaf_before: Vec<String>,
    emission: Vec<Option<ScopeId>>,
    dropped: Vec<bool>,
    arrays: HashMap<ScopeId, ArrayLayout>,
}

impl Layout {
    /// Only template-level text; leaves and arrays carry none.
    pub fn bare(before: impl Into<String>, after: impl Into<String>) -> Self {
        Self {
            before: before.into(),
            after: after.into(),
            ..Default::default()
        }
    }

    pub fn before(&self) -> &str {
        &self.before
    }

    pub fn after(&self) -> &str {
        &self.after
    }

    pub fn leaf_before(&self, leaf: LeafId) -> &str {
        self.leaf_before.get(leaf).map_or("", String::as_str)
    }

    /// Whether the leaf sits in a skipped `[i+1]` row.
    pub fn is_dropped(&self, leaf: LeafId) -> bool {
        self.dropped.get(leaf).copied().unwrap_or(false)
    }

    pub fn array(&self, scope: ScopeId) -> Option<&ArrayLayout> {
        self.arrays.get(&scope)
    }

    /// Array body a leaf is emitted from, `None` for the top level.
    pub fn emission(&self, graph: &ScopeGraph, leaf: LeafId) -> Option<ScopeId> {
        match self.emission.get(leaf) {
            Some(&scope) => scope,
            None => graph.leaf(leaf).and_then(|l| graph.enclosing_array(l.scope)),
        }
    }

    /// Split `text` around the markers recorded in `graph`.
    pub fn interleave(graph: &ScopeGraph, text: &str) -> Result<Self> {
        check_offsets(graph, text)?;
        let mut walk = Walk::new(graph, text);
        for occurrence in graph.occurrences() {
            walk.visit(occurrence)?;
        }
        walk.finish()
    }
}

fn check_offsets(graph: &ScopeGraph, text: &str) -> Result<()> {
    for o in graph.occurrences() {
        let message = if o.offset > text.len() {
            format!("offset is past the end of the text ({} bytes)", text.len())
        } else if !text.is_char_boundary(o.offset) {
            "offset is not on a character boundary".to_string()
        } else {
            continue;
        };
        return Err(Error::InvalidMarker {
            path: o.path.clone(),
            offset: o.offset,
            message,
        });
    }
    Ok(())
}

struct OpenArray {
    scope: ScopeId,
    start: usize,
    last_terminator: usize,
    /// Offset of the last leaf emitted from this row
    row_tail: usize,
}

struct Walk<'a> {
    graph: &'a ScopeGraph,
    text: &'a str,
    pos: usize,
    /// Where the skipped row would repeat the last leaf of the row just
    /// closed, when that lies past its last terminator
    mirror: Option<usize>,
    stack: Vec<OpenArray>,
    layout: Layout,
}

impl<'a> Walk<'a> {
    fn new(graph: &'a ScopeGraph, text: &'a str) -> Self {
        let leaves = graph.leaves().len();
        Self {
            graph,
            text,
            pos: 0,
            mirror: None,
            stack: Vec::new(),
            layout: Layout {
                leaf_before: vec![String::new(); leaves],
                emission: vec![None; leaves],
                dropped: vec![false; leaves],
                ..Default::default()
            },
        }
    }

    fn open_scopes(&self) -> Vec<ScopeId> {
        self.stack.iter().map(|a| a.scope).collect()
    }

    fn path_of(&self, scope: ScopeId) -> Option<(String, usize)> {
        self.graph.opening(scope).map(|o| (o.path.clone(), o.offset))
    }

    fn mis_nested(
        &self,
        occurrence: &Occurrence,
        message: String,
        counterpart: Option<ScopeId>,
    ) -> Error {
        Error::UnterminatedRepetition {
            path: occurrence.path.clone(),
            offset: occurrence.offset,
            message,
            counterpart: counterpart.and_then(|s| self.path_of(s)),
        }
    }

    fn name(&self, scope: ScopeId) -> &str {
        self.graph
            .node(scope)
            .map_or("?", |n| n.display_name.as_str())
    }

    fn visit(&mut self, occurrence: &Occurrence) -> Result<()> {
        let o = occurrence.offset;
        if o < self.pos {
            return self.skip(occurrence);
        }
        if self.mirror == Some(o) {
            self.pos = o;
            return self.skip(occurrence);
        }
        for &scope in occurrence.closes.iter().rev() {
            self.close(occurrence, scope)?;
        }
        for &scope in &occurrence.opens {
            self.open(occurrence, scope)?;
        }
        if let Some(leaf) = occurrence.leaf {
            self.leaf(occurrence, leaf)?;
        }
        Ok(())
    }

    /// A marker inside a skipped `[i+1]` row.
    fn skip(&mut self, occurrence: &Occurrence) -> Result<()> {
        if let Some(leaf) = occurrence.leaf {
            self.layout.dropped[leaf] = true;
        }
        if let Some(&scope) = occurrence.closes.first() {
            return Err(self.mis_nested(
                occurrence,
                format!(
                    "`{}` is closed inside the terminating row of an enclosing repetition",
                    self.name(scope)
                ),
                Some(scope),
            ));
        }
        let bounded = occurrence
            .opens
            .iter()
            .find(|&&s| self.graph.node(s).is_some_and(|n| n.is_bounded()));
        if let Some(&scope) = bounded {
            return Err(self.mis_nested(
                occurrence,
                format!(
                    "`{}` starts inside the terminating row of an enclosing repetition",
                    self.name(scope)
                ),
                None,
            ));
        }
        log::trace!("skipping `{}` at {}", occurrence.path, occurrence.offset);
        Ok(())
    }

    fn close(&mut self, occurrence: &Occurrence, scope: ScopeId) -> Result<()> {
        let o = occurrence.offset;
        let top = self.stack.last().map(|a| a.scope);
        if top != Some(scope) {
            let message = match top {
                Some(inner) if self.stack.iter().any(|a| a.scope == scope) => format!(
                    "`{}` is closed while the inner repetition `{}` is still open",
                    self.name(scope),
                    self.name(inner)
                ),
                _ => format!("`{}` is closed outside its repetition", self.name(scope)),
            };
            return Err(self.mis_nested(occurrence, message, top.or(Some(scope))));
        }
        let Some(array) = self.stack.pop() else {
            return Err(self.mis_nested(occurrence, "no open repetition".to_string(), Some(scope)));
        };

        let separator = &self.text[self.pos.min(o)..o];
        self.layout.arrays.entry(scope).or_default().separator = separator.to_string();

        let resume = array.last_terminator.max(o);
        let mirror = o + (array.row_tail - array.start);
        self.mirror = (mirror > resume).then_some(mirror);
        self.pos = resume;
        log::trace!(
            "closed `{}`: separator {:?}, resuming at {}",
            self.name(scope),
            separator,
            resume
        );
        Ok(())
    }

    fn open(&mut self, occurrence: &Occurrence, scope: ScopeId) -> Result<()> {
        let graph = self.graph;
        let Some(node) = graph.node(scope) else {
            return Err(Error::UnresolvedScopeReference {
                scope,
                message: format!("opened by `{}` but missing from the graph", occurrence.path),
            });
        };
        let enclosing = node
            .parent
            .map(|p| graph.bounded_chain(p))
            .unwrap_or_default();
        if enclosing != self.open_scopes() {
            let message = match self.stack.last() {
                Some(top) => format!(
                    "`{}` starts inside the repetition of `{}`",
                    node.display_name,
                    self.name(top.scope)
                ),
                None => format!("`{}` starts outside its enclosing repetition", node.display_name),
            };
            let counterpart = self.stack.last().map(|a| a.scope);
            return Err(self.mis_nested(occurrence, message, counterpart));
        }

        let o = occurrence.offset;
        let open = self.text[self.pos..o].to_string();
        self.layout.arrays.insert(
            scope,
            ArrayLayout {
                open,
                separator: String::new(),
            },
        );
        self.pos = o;
        self.mirror = None;

        if let Some(range) = node.range
            && let Some(end) = range.end
        {
            self.stack.push(OpenArray {
                scope,
                start: range.start,
                last_terminator: node.last_terminator.unwrap_or(end),
                row_tail: o,
            });
        }
        Ok(())
    }

    fn leaf(&mut self, occurrence: &Occurrence, leaf: LeafId) -> Result<()> {
        let Some(scope) = self.graph.leaf(leaf).map(|l| l.scope) else {
            return Err(Error::UnresolvedScopeReference {
                scope: leaf,
                message: format!("leaf of `{}` is missing from the graph", occurrence.path),
            });
        };
        let chain = self.graph.array_chain(scope);
        let bounded = self.graph.bounded_chain(scope);
        let open = self.open_scopes();

        let emission = if bounded == open {
            chain.last().copied()
        } else if chain.len() < open.len() && chain[..] == open[..chain.len()] {
            open.last().copied()
        } else {
            let outside = bounded.iter().find(|s| !open.contains(s)).copied();
            let message = match outside {
                Some(s) => format!(
                    "`{}` is used outside the repetition of `{}`",
                    occurrence.path,
                    self.name(s)
                ),
                None => format!(
                    "`{}` does not belong to the enclosing repetition",
                    occurrence.path
                ),
            };
            return Err(self.mis_nested(occurrence, message, outside.or(open.last().copied())));
        };

        let o = occurrence.offset;
        self.layout.leaf_before[leaf] = self.text[self.pos..o].to_string();
        self.layout.emission[leaf] = emission;
        self.pos = o;
        self.mirror = None;
        if let Some(top) = self.stack.last_mut() {
            top.row_tail = top.row_tail.max(o);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Layout> {
        if let Some(array) = self.stack.last() {
            return Err(Error::UnterminatedRepetition {
                path: self.name(array.scope).to_string(),
                offset: array.start,
                message: "repetition is still open at the end of the text".to_string(),
                counterpart: self.path_of(array.scope),
            });
        }
        if self.graph.occurrences().is_empty() {
            self.layout.before = self.text.to_string();
        } else {
            self.layout.after = self.text[self.pos..].to_string();
        }
        log::debug!(
            "interleaved {} leaves and {} arrays",
            self.layout.leaf_before.len(),
            self.layout.arrays.len()
        );
        Ok(self.layout)
    }
}
