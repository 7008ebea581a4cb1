//! Test helpers: a minimal `{d...}` marker extractor.

use std::sync::LazyLock;

use regex::Regex;
use tessera::{Marker, TemplateSource};

static MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(d[^{}]*)\}").unwrap());

/// Strip `{d...}` markers out of `template`, recording where each one was.
pub fn source(template: &str) -> TemplateSource {
    let mut text = String::with_capacity(template.len());
    let mut markers = Vec::new();
    let mut last = 0;

    for caps in MARKER.captures_iter(template) {
        let whole = caps.get(0).unwrap();
        text.push_str(&template[last..whole.start()]);
        markers.push(Marker::new(text.len(), &caps[1]));
        last = whole.end();
    }
    text.push_str(&template[last..]);

    TemplateSource::new(text, markers)
}
