//! The scope graph: an arena of object and array scopes plus the leaves
//! attached to them.
//!
//! Besides byte offsets, every marker gets a document *point*: its 1-based
//! rank once markers are sorted by offset. Two markers may share an offset
//! but never a point, so points order output fragments.

use serde_json::Value;

use crate::filter::{self, Filter};
use crate::formatter::FormatterCall;
use crate::value;

pub type ScopeId = usize;
pub type LeafId = usize;

/// The root scope `d0`, bound to the payload.
pub const ROOT: ScopeId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Object,
    Array,
}

/// How a scope's runtime value is reached from its parent's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// `parent[name]`
    Field(String),
    /// The parent value itself: root arrays and inner dimensions of
    /// multi-dimensional arrays
    Element,
    /// First element of `parent[field]` (or of the parent itself) passing
    /// every filter
    Search {
        field: Option<String>,
        filters: Vec<Filter>,
    },
}

impl Access {
    /// Resolve this access against the parent's value.
    pub fn resolve<'v>(&self, parent: Option<&'v Value>) -> Option<&'v Value> {
        match self {
            Self::Field(name) => parent.and_then(|v| value::field(v, name)),
            Self::Element => parent,
            Self::Search { field, filters } => {
                let base = match field {
                    Some(name) => parent.and_then(|v| value::field(v, name)),
                    None => parent,
                };
                let items = value::elements(base);
                items
                    .iter()
                    .enumerate()
                    .find(|&(i, item)| filter::accepts(filters, item, i, items.len()))
                    .map(|(_, item)| item)
            }
        }
    }
}

/// Source extent of a repeated section: first `[i]` marker to first `[i+1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayRange {
    pub start: usize,
    pub end: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeNode {
    pub id: ScopeId,
    pub display_name: String,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub access: Access,
    /// Array nesting depth, used for traversal ordering only
    pub depth: usize,
    /// Offset of the first marker that opened this dimension
    pub anchor: usize,
    /// Point of the marker that opened this scope
    pub point: usize,
    /// `None` for objects, and for arrays whose range was dropped
    pub range: Option<ArrayRange>,
    /// Point of the marker that set `range.end`
    pub close_point: Option<usize>,
    /// Iterator token of the opening group (`i` in `[i]`)
    pub iterator: Option<String>,
    /// Greatest offset among the `[i+1]` markers of this dimension
    pub last_terminator: Option<usize>,
    /// Elements failing any of these are skipped
    pub filters: Vec<Filter>,
    pub leaves: Vec<LeafId>,
}

impl ScopeNode {
    pub fn is_array(&self) -> bool {
        self.kind == ScopeKind::Array
    }

    /// An array with both ends of its repeated section known.
    pub fn is_bounded(&self) -> bool {
        self.range.is_some_and(|r| r.end.is_some())
    }
}

/// One data-insertion point.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub id: LeafId,
    pub scope: ScopeId,
    /// Field read off the scope's value; empty means the value itself
    pub attribute: String,
    pub formatters: Vec<FormatterCall>,
    pub offset: usize,
    pub point: usize,
    pub path: String,
}

/// What one marker contributed to the graph, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Occurrence {
    pub offset: usize,
    pub path: String,
    /// Array scopes first opened by this marker, outermost first
    pub opens: Vec<ScopeId>,
    /// Array scopes whose `end` this marker set, outermost first
    pub closes: Vec<ScopeId>,
    pub leaf: Option<LeafId>,
    pub terminator: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeGraph {
    pub(crate) nodes: Vec<ScopeNode>,
    pub(crate) leaves: Vec<Leaf>,
    pub(crate) occurrences: Vec<Occurrence>,
}

impl Default for ScopeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeGraph {
    /// A graph holding only the root object scope.
    pub fn new() -> Self {
        Self {
            nodes: vec![ScopeNode {
                id: ROOT,
                display_name: "d0".to_string(),
                kind: ScopeKind::Object,
                parent: None,
                access: Access::Element,
                depth: 0,
                anchor: 0,
                point: 0,
                range: None,
                close_point: None,
                iterator: None,
                last_terminator: None,
                filters: Vec::new(),
                leaves: Vec::new(),
            }],
            leaves: Vec::new(),
            occurrences: Vec::new(),
        }
    }

    pub fn node(&self, id: ScopeId) -> Option<&ScopeNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[ScopeNode] {
        &self.nodes
    }

    pub fn leaf(&self, id: LeafId) -> Option<&Leaf> {
        self.leaves.get(id)
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    /// The marker that first opened array scope `scope`.
    pub fn opening(&self, scope: ScopeId) -> Option<&Occurrence> {
        self.occurrences.iter().find(|o| o.opens.contains(&scope))
    }

    /// Ancestors of `id` (itself included), outermost first.
    pub fn ancestry(&self, id: ScopeId) -> Vec<ScopeId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current
            && let Some(node) = self.nodes.get(id)
        {
            chain.push(id);
            current = node.parent;
        }
        chain.reverse();
        chain
    }

    /// Array scopes among the ancestry of `id`, outermost first.
    pub fn array_chain(&self, id: ScopeId) -> Vec<ScopeId> {
        self.ancestry(id)
            .into_iter()
            .filter(|&s| self.nodes[s].is_array())
            .collect()
    }

    /// Bounded array scopes among the ancestry of `id`, outermost first.
    pub fn bounded_chain(&self, id: ScopeId) -> Vec<ScopeId> {
        self.ancestry(id)
            .into_iter()
            .filter(|&s| self.nodes[s].is_bounded())
            .collect()
    }

    /// Innermost array enclosing `id` (itself included).
    pub fn enclosing_array(&self, id: ScopeId) -> Option<ScopeId> {
        self.array_chain(id).last().copied()
    }

    /// Point of the last marker; 0 without markers.
    pub fn max_point(&self) -> usize {
        self.occurrences.len()
    }
}
