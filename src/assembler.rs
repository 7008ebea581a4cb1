//! Fragment assembly: restore document order from traversal order.

use std::fmt;

/// `[anchor, index, anchor, index, ..., point]` of one emitted fragment.
///
/// Anchors and the final component are document points (marker ranks), so
/// markers that touch in the source still order strictly.
///
/// Ordering is lexicographic; a vector sorts before every vector it is a
/// strict prefix of.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PositionVector(pub Vec<usize>);

impl PositionVector {
    pub fn new(components: Vec<usize>) -> Self {
        Self(components)
    }

    /// `prefix` followed by `point`.
    pub fn at(prefix: &[usize], point: usize) -> Self {
        let mut components = Vec::with_capacity(prefix.len() + 1);
        components.extend_from_slice(prefix);
        components.push(point);
        Self(components)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for PositionVector {
    fn from(components: Vec<usize>) -> Self {
        Self(components)
    }
}

impl fmt::Display for PositionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub position: PositionVector,
    pub text: String,
}

impl Fragment {
    pub fn new(position: PositionVector, text: impl Into<String>) -> Self {
        Self {
            position,
            text: text.into(),
        }
    }
}

/// Stable-sort fragments by position and concatenate their text.
pub fn assemble(mut fragments: Vec<Fragment>) -> String {
    fragments.sort_by(|a, b| a.position.cmp(&b.position));
    let len = fragments.iter().map(|f| f.text.len()).sum();
    let mut out = String::with_capacity(len);
    for fragment in &fragments {
        out.push_str(&fragment.text);
    }
    log::trace!("assembled {} fragments into {} bytes", fragments.len(), out.len());
    out
}
