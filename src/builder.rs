//! Builder compilation.
//!
//! The scope graph is turned into one body per array scope (plus the top
//! level), walked in sequencer order, and the nested bodies are flattened
//! into a flat list of [`Op`]s with jump targets. The interpreter in
//! `exec` runs that list once per render.

use std::collections::HashMap;
use std::fmt;

use crate::config::{Config, Escape};
use crate::error::{Error, Result};
use crate::formatter::{FormatterExpr, Formatters};
use crate::interleave::Layout;
use crate::scope::{LeafId, ROOT, ScopeGraph, ScopeId, ScopeKind};

mod exec;
mod ops;

pub use ops::{LeafOp, Op};

/// A compiled template: data-independent, reusable across renders and
/// threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Builder {
    ops: Vec<Op>,
    leaves: Vec<LeafOp>,
    parents: Vec<Option<ScopeId>>,
    before: String,
    after: String,
    after_point: usize,
    escape: Escape,
}

enum Node {
    Bind(ScopeId),
    Text { text: String, point: usize },
    Loop(ScopeId),
    Leaf(LeafId),
}

/// Per-body nodes. Binds run first so that every loop and leaf of the body
/// sees its objects already resolved.
#[derive(Default)]
struct Body {
    binds: Vec<Node>,
    loops: Vec<Node>,
    leaves: Vec<Node>,
}

fn unresolved(scope: ScopeId, message: impl Into<String>) -> Error {
    Error::UnresolvedScopeReference {
        scope,
        message: message.into(),
    }
}

impl Builder {
    /// Compile `graph`, walked in `order`, with the static text of `layout`.
    pub fn compile(
        graph: &ScopeGraph,
        order: &[ScopeId],
        layout: &Layout,
        config: &Config,
    ) -> Result<Self> {
        let mut placed = vec![false; graph.nodes().len()];
        let mut bodies: HashMap<Option<ScopeId>, Body> = HashMap::new();

        for &id in order {
            let node = graph
                .node(id)
                .ok_or_else(|| unresolved(id, "sequenced scope is not in the graph"))?;
            if id == ROOT {
                placed[ROOT] = true;
                continue;
            }
            let parent = node
                .parent
                .ok_or_else(|| unresolved(id, format!("`{}` has no parent", node.display_name)))?;
            if !placed.get(parent).copied().unwrap_or(false) {
                return Err(unresolved(
                    id,
                    format!("`{}` is sequenced before its parent #{}", node.display_name, parent),
                ));
            }

            let body = bodies.entry(graph.enclosing_array(parent)).or_default();
            match node.kind {
                ScopeKind::Object => body.binds.push(Node::Bind(id)),
                ScopeKind::Array => {
                    if let Some(array) = layout.array(id)
                        && !array.open.is_empty()
                    {
                        body.loops.push(Node::Text {
                            text: array.open.clone(),
                            point: node.point,
                        });
                    }
                    body.loops.push(Node::Loop(id));
                }
            }
            placed[id] = true;
        }

        if let Some(missing) = placed.iter().position(|p| !p) {
            return Err(unresolved(missing, "scope is never sequenced"));
        }

        let mut leaves = Vec::with_capacity(graph.leaves().len());
        for leaf in graph.leaves() {
            if layout.is_dropped(leaf.id) {
                continue;
            }
            if graph.node(leaf.scope).is_none() {
                return Err(unresolved(
                    leaf.scope,
                    format!("leaf `{}` points to an unknown scope", leaf.path),
                ));
            }
            let emission = layout.emission(graph, leaf.id);
            if let Some(array) = emission
                && graph.node(array).is_none_or(|n| n.kind != ScopeKind::Array)
            {
                return Err(unresolved(
                    array,
                    format!(
                        "leaf `{}` is emitted from a scope that is not an array",
                        leaf.path
                    ),
                ));
            }

            let base = match leaf.path.split_once(':') {
                Some((path, _)) => path.trim(),
                None => leaf.path.trim(),
            };
            bodies
                .entry(emission)
                .or_default()
                .leaves
                .push(Node::Leaf(leaves.len()));
            leaves.push(LeafOp {
                scope: leaf.scope,
                attribute: leaf.attribute.clone(),
                before: layout.leaf_before(leaf.id).to_string(),
                expr: FormatterExpr::compile(base, leaf.formatters.clone()),
                point: leaf.point,
            });
        }

        let mut ops = Vec::new();
        flatten(graph, layout, None, &mut bodies, &mut ops)?;

        let builder = Self {
            ops,
            leaves,
            parents: graph.nodes().iter().map(|n| n.parent).collect(),
            before: layout.before().to_string(),
            after: layout.after().to_string(),
            after_point: graph.max_point() + 1,
            escape: config.escape,
        };
        log::debug!(
            "compiled builder: {} ops, {} leaves",
            builder.ops.len(),
            builder.leaves.len()
        );
        Ok(builder)
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn leaves(&self) -> &[LeafOp] {
        &self.leaves
    }

    /// Check that every formatter the builder uses is registered.
    pub fn validate(&self, formatters: &Formatters) -> Result<()> {
        self.leaves
            .iter()
            .try_for_each(|leaf| leaf.expr.validate(formatters))
    }
}

fn flatten(
    graph: &ScopeGraph,
    layout: &Layout,
    key: Option<ScopeId>,
    bodies: &mut HashMap<Option<ScopeId>, Body>,
    ops: &mut Vec<Op>,
) -> Result<()> {
    let body = bodies.remove(&key).unwrap_or_default();
    let nodes = body.binds.into_iter().chain(body.loops).chain(body.leaves);

    for node in nodes {
        match node {
            Node::Bind(scope) | Node::Loop(scope) if graph.node(scope).is_none() => {
                return Err(unresolved(scope, "scope disappeared from the graph"));
            }
            Node::Bind(scope) => {
                let n = &graph.nodes()[scope];
                ops.push(Op::Bind {
                    scope,
                    parent: n.parent.unwrap_or(ROOT),
                    access: n.access.clone(),
                });
            }
            Node::Text { text, point } => ops.push(Op::EmitText { text, point }),
            Node::Leaf(leaf) => ops.push(Op::EmitLeaf { leaf }),
            Node::Loop(scope) => {
                let n = &graph.nodes()[scope];
                let open = ops.len();
                ops.push(Op::OpenLoop {
                    scope,
                    parent: n.parent.unwrap_or(ROOT),
                    access: n.access.clone(),
                    filters: n.filters.clone(),
                    anchor: n.point,
                    close: 0,
                });
                flatten(graph, layout, Some(scope), bodies, ops)?;

                if n.is_bounded()
                    && let Some(point) = n.close_point
                    && let Some(array) = layout.array(scope)
                    && !array.separator.is_empty()
                {
                    ops.push(Op::EmitSeparator {
                        text: array.separator.clone(),
                        point,
                    });
                }
                let close = ops.len();
                ops.push(Op::CloseLoop { open });
                if let Some(Op::OpenLoop { close: target, .. }) = ops.get_mut(open) {
                    *target = close;
                }
            }
        }
    }
    Ok(())
}

impl fmt::Display for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            match op {
                Op::EmitLeaf { leaf } => match self.leaves.get(*leaf) {
                    Some(l) => writeln!(f, "{} {} @{} {}", i, op, l.point, l.expr)?,
                    None => writeln!(f, "{} {}", i, op)?,
                },
                _ => writeln!(f, "{} {}", i, op)?,
            }
        }
        Ok(())
    }
}
