use std::fmt;

use crate::filter::{self, Filter};
use crate::formatter::FormatterExpr;
use crate::scope::{Access, ScopeId};

/// One instruction of a compiled builder.
///
/// `anchor` and `point` fields are document points: marker ranks that
/// order the emitted fragments.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Bind an object scope to `parent`'s value through `access`
    Bind {
        scope: ScopeId,
        parent: ScopeId,
        access: Access,
    },
    /// Start iterating the elements of an array scope that pass `filters`;
    /// jumps past `close` when none does
    OpenLoop {
        scope: ScopeId,
        parent: ScopeId,
        access: Access,
        filters: Vec<Filter>,
        anchor: usize,
        close: usize,
    },
    /// Advance the innermost loop, jumping back after `open` while elements remain
    CloseLoop { open: usize },
    EmitLeaf { leaf: usize },
    EmitText { text: String, point: usize },
    /// Emitted after every iterated element but the last
    EmitSeparator { text: String, point: usize },
}

/// A leaf as the interpreter sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafOp {
    pub scope: ScopeId,
    pub attribute: String,
    pub before: String,
    pub expr: FormatterExpr,
    pub point: usize,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Field(name) => write!(f, ".{}", name),
            Access::Element => write!(f, "[]"),
            Access::Search { field, filters } => {
                if let Some(name) = field {
                    write!(f, ".{}", name)?;
                }
                write!(f, "[{}]", filter::describe(filters))
            }
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Bind {
                scope,
                parent,
                access,
            } => write!(f, "bind #{} = #{}{}", scope, parent, access),
            Op::OpenLoop {
                scope,
                parent,
                access,
                filters,
                anchor,
                close,
            } => {
                write!(f, "loop #{} over #{}{}", scope, parent, access)?;
                if !filters.is_empty() {
                    write!(f, " if {}", filter::describe(filters))?;
                }
                write!(f, " @{} (exit {})", anchor, close)
            }
            Op::CloseLoop { open } => write!(f, "next {}", open),
            Op::EmitLeaf { leaf } => write!(f, "leaf {}", leaf),
            Op::EmitText { text, point } => write!(f, "text @{} {:?}", point, text),
            Op::EmitSeparator { text, point } => write!(f, "separator @{} {:?}", point, text),
        }
    }
}
