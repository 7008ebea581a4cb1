//! Errors raised while compiling or rendering a template.

use std::fmt;

/// Errors that can occur while turning markers into a builder, or while
/// running a builder against a formatter registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The marker path does not follow the marker grammar.
    InvalidMarker {
        path: String,
        offset: usize,
        message: String,
    },
    /// The same attribute is used both as an object and as an array.
    StructuralConflict { path: String, name: String },
    /// An `[i]` occurrence has no matching `[i+1]`, or the pair is mis-nested
    /// relative to an enclosing repetition.
    UnterminatedRepetition {
        path: String,
        offset: usize,
        message: String,
        /// Nearest marker that could have been the intended counterpart.
        counterpart: Option<(String, usize)>,
    },
    /// Internal consistency failure between descriptors.
    UnresolvedScopeReference { scope: usize, message: String },
    /// A formatter name is absent from the registry.
    MissingFormatter {
        name: String,
        path: String,
        suggestion: Option<String>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMarker {
                path,
                offset,
                message,
            } => write!(f, "invalid marker `{}` at offset {}: {}", path, offset, message),
            Self::StructuralConflict { path, name } => write!(
                f,
                "`{}` is used both as an object and as an array (in `{}`)",
                name, path
            ),
            Self::UnterminatedRepetition {
                path,
                offset,
                message,
                counterpart,
            } => {
                write!(f, "repetition error at `{}` (offset {}): {}", path, offset, message)?;
                if let Some((other, other_offset)) = counterpart {
                    write!(f, "; nearest counterpart is `{}` at offset {}", other, other_offset)?;
                }
                Ok(())
            }
            Self::UnresolvedScopeReference { scope, message } => {
                write!(f, "unresolved scope reference #{}: {}", scope, message)
            }
            Self::MissingFormatter {
                name,
                path,
                suggestion,
            } => {
                write!(f, "formatter \"{}\" used in `{}` does not exist", name, path)?;
                if let Some(s) = suggestion {
                    write!(f, ". Did you mean \"{}\"?", s)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {}
