//! Compile positioned template markers into reusable document builders.
//!
//! A template is a document body whose markers (`{d.menu[i].name}` and
//! friends) were already extracted into [`Marker`]s. Compilation happens
//! once; rendering runs the compiled [`Builder`] against one data payload,
//! producing position-tagged [`Fragment`]s that [`assemble`] sorts back into
//! document order.
//!
//! ```no_run
//! use serde_json::json;
//! use tessera::{Config, Formatters, Marker, Template, TemplateSource};
//!
//! let source = TemplateSource::new(
//!     "<ul><li></li><li></li></ul>",
//!     vec![
//!         Marker::new(8, "d.items[i].name:upperCase"),
//!         Marker::new(17, "d.items[i+1].name"),
//!     ],
//! );
//! let template = Template::compile(&source, &Config::default()).unwrap();
//! let data = json!({"items": [{"name": "tea"}, {"name": "jam"}]});
//! let out = template.render(&data, &Formatters::with_builtins()).unwrap();
//! assert_eq!(out, "<ul><li>TEA</li><li>JAM</li></ul>");
//! ```

pub mod assembler;
pub mod builder;
pub mod config;
pub mod decomposer;
pub mod error;
pub mod filter;
pub mod formatter;
pub mod interleave;
pub mod marker;
pub mod scope;
pub mod sequencer;
pub mod template;
pub mod value;

pub use assembler::{Fragment, PositionVector, assemble};
pub use builder::Builder;
pub use config::{Config, ConfigBuilder, Escape, Unterminated};
pub use error::{Error, Result};
pub use filter::Filter;
pub use formatter::{FormatterCall, FormatterExpr, Formatters};
pub use interleave::Layout;
pub use marker::{Marker, TemplateSource};
pub use scope::{ScopeGraph, ScopeId};
pub use template::Template;

#[cfg(test)]
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Compile bare markers with only template-level static text.
///
/// Leaves carry no literal text of their own; use [`Template::compile`] to
/// interleave a full document body.
pub fn compile(
    markers: &[Marker],
    literal_before: &str,
    literal_after: &str,
    config: &Config,
) -> Result<Builder> {
    let graph = decomposer::decompose(markers, config.unterminated)?;
    let order = sequencer::sequence(&graph);
    Builder::compile(&graph, &order, &Layout::bare(literal_before, literal_after), config)
}
