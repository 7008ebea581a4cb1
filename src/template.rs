//! One-call compile and render.

use serde_json::Value;

use crate::assembler::{Fragment, assemble};
use crate::builder::Builder;
use crate::config::Config;
use crate::decomposer::decompose;
use crate::error::Result;
use crate::formatter::Formatters;
use crate::interleave::Layout;
use crate::marker::TemplateSource;
use crate::scope::{ScopeGraph, ScopeId};
use crate::sequencer::sequence;

/// A compiled template, immutable after [`Template::compile`].
#[derive(Debug, Clone)]
pub struct Template {
    graph: ScopeGraph,
    order: Vec<ScopeId>,
    layout: Layout,
    builder: Builder,
}

impl Template {
    /// Decompose, sequence, interleave and compile `source`.
    pub fn compile(source: &TemplateSource, config: &Config) -> Result<Self> {
        let graph = decompose(&source.markers, config.unterminated)?;
        let order = sequence(&graph);
        let layout = Layout::interleave(&graph, &source.text)?;
        let builder = Builder::compile(&graph, &order, &layout, config)?;
        log::info!(
            "compiled template: {} markers, {} scopes",
            source.markers.len(),
            graph.nodes().len()
        );
        Ok(Self {
            graph,
            order,
            layout,
            builder,
        })
    }

    /// Like [`Template::compile`], also checking every formatter against
    /// `formatters` up front.
    pub fn compile_with(
        source: &TemplateSource,
        config: &Config,
        formatters: &Formatters,
    ) -> Result<Self> {
        let template = Self::compile(source, config)?;
        template.validate(formatters)?;
        Ok(template)
    }

    pub fn validate(&self, formatters: &Formatters) -> Result<()> {
        self.builder.validate(formatters)
    }

    /// Unsorted fragments of one render.
    pub fn fragments(&self, data: &Value, formatters: &Formatters) -> Result<Vec<Fragment>> {
        self.builder.run(data, formatters)
    }

    pub fn render(&self, data: &Value, formatters: &Formatters) -> Result<String> {
        Ok(assemble(self.fragments(data, formatters)?))
    }

    pub fn graph(&self) -> &ScopeGraph {
        &self.graph
    }

    pub fn order(&self) -> &[ScopeId] {
        &self.order
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn builder(&self) -> &Builder {
        &self.builder
    }
}
