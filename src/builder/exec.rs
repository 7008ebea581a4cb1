//! The builder interpreter.

use serde_json::{Map, Value};

use super::{Builder, LeafOp, Op};
use crate::assembler::{Fragment, PositionVector};
use crate::config::Escape;
use crate::error::{Error, Result};
use crate::filter::{self, Filter};
use crate::formatter::Formatters;
use crate::scope::{ROOT, ScopeId};
use crate::value;

struct Frame<'v> {
    scope: ScopeId,
    /// Elements that passed the loop's filters
    items: Vec<&'v Value>,
    index: usize,
}

fn select<'v>(items: &'v [Value], filters: &[Filter]) -> Vec<&'v Value> {
    items
        .iter()
        .enumerate()
        .filter(|&(i, item)| filter::accepts(filters, item, i, items.len()))
        .map(|(_, item)| item)
        .collect()
}

impl Builder {
    /// Run the builder on one payload. `Value::Null` stands for "no data".
    pub fn run(&self, data: &Value, formatters: &Formatters) -> Result<Vec<Fragment>> {
        self.validate(formatters)?;

        let empty = Value::Object(Map::new());
        let root = if data.is_null() { &empty } else { data };

        let mut values: Vec<Option<&Value>> = vec![None; self.parents.len()];
        if let Some(slot) = values.get_mut(ROOT) {
            *slot = Some(root);
        }
        let mut frames: Vec<Frame<'_>> = Vec::new();
        let mut prefix: Vec<usize> = Vec::new();
        let mut fragments = Vec::with_capacity(self.leaves.len() + 2);

        if !self.before.is_empty() {
            fragments.push(Fragment::new(PositionVector::new(vec![0]), self.before.as_str()));
        }

        let mut pc = 0;
        while let Some(op) = self.ops.get(pc) {
            match op {
                Op::Bind {
                    scope,
                    parent,
                    access,
                } => {
                    values[*scope] = access.resolve(values[*parent]);
                }
                Op::OpenLoop {
                    scope,
                    parent,
                    access,
                    filters,
                    anchor,
                    close,
                } => {
                    let items = select(value::elements(access.resolve(values[*parent])), filters);
                    let Some(&first) = items.first() else {
                        pc = close + 1;
                        continue;
                    };
                    values[*scope] = Some(first);
                    prefix.push(*anchor);
                    prefix.push(0);
                    frames.push(Frame {
                        scope: *scope,
                        items,
                        index: 0,
                    });
                }
                Op::CloseLoop { open } => {
                    let Some(frame) = frames.last_mut() else {
                        return Err(Error::UnresolvedScopeReference {
                            scope: ROOT,
                            message: format!("loop end at {} without an open loop", pc),
                        });
                    };
                    frame.index += 1;
                    if let Some(&item) = frame.items.get(frame.index) {
                        values[frame.scope] = Some(item);
                        if let Some(index) = prefix.last_mut() {
                            *index = frame.index;
                        }
                        pc = open + 1;
                        continue;
                    }
                    frames.pop();
                    prefix.truncate(prefix.len().saturating_sub(2));
                }
                Op::EmitSeparator { text, point } => {
                    if let Some(frame) = frames.last()
                        && frame.index + 1 < frame.items.len()
                    {
                        let position = PositionVector::at(&prefix, *point);
                        fragments.push(Fragment::new(position, text.as_str()));
                    }
                }
                Op::EmitText { text, point } => {
                    let position = PositionVector::at(&prefix, *point);
                    fragments.push(Fragment::new(position, text.as_str()));
                }
                Op::EmitLeaf { leaf } => {
                    let Some(leaf) = self.leaves.get(*leaf) else {
                        return Err(Error::UnresolvedScopeReference {
                            scope: ROOT,
                            message: format!("op {} refers to unknown leaf {}", pc, leaf),
                        });
                    };
                    let value = self.substitute(leaf, &values, formatters)?;
                    let mut text = String::with_capacity(leaf.before.len() + value.len());
                    text.push_str(&leaf.before);
                    text.push_str(&value);
                    fragments.push(Fragment::new(PositionVector::at(&prefix, leaf.point), text));
                }
            }
            pc += 1;
        }

        if !self.after.is_empty() {
            fragments.push(Fragment::new(
                PositionVector::new(vec![self.after_point]),
                self.after.as_str(),
            ));
        }
        log::trace!("builder emitted {} fragments", fragments.len());
        Ok(fragments)
    }

    fn substitute(
        &self,
        leaf: &LeafOp,
        values: &[Option<&Value>],
        formatters: &Formatters,
    ) -> Result<String> {
        let bound = values.get(leaf.scope).copied().flatten();
        let Some(found) = bound.and_then(|v| value::field(v, &leaf.attribute)) else {
            return Ok(String::new());
        };
        if found.is_null() {
            return Ok(String::new());
        }

        let text = if leaf.expr.is_identity() {
            value::to_text(found).into_owned()
        } else {
            let lookup = |up: usize, name: &str| {
                let mut scope = leaf.scope;
                for _ in 0..up {
                    scope = self.parents.get(scope).copied().flatten()?;
                }
                values
                    .get(scope)
                    .copied()
                    .flatten()
                    .and_then(|v| value::field(v, name))
                    .cloned()
            };
            let formatted = leaf.expr.apply(found, formatters, lookup)?;
            value::to_text(&formatted).into_owned()
        };

        Ok(match self.escape {
            Escape::None => text,
            Escape::Xml => value::escape_xml(&text).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::assembler::assemble;
    use crate::config::{Config, ConfigBuilder, Unterminated};
    use crate::decomposer::decompose;
    use crate::interleave::Layout;
    use crate::marker::Marker;
    use crate::sequencer::sequence;

    fn builder(markers: &[(usize, &str)], layout: &Layout, config: &Config) -> Builder {
        let markers: Vec<Marker> = markers.iter().map(|&(o, p)| Marker::new(o, p)).collect();
        let graph = decompose(&markers, Unterminated::Permissive).unwrap();
        Builder::compile(&graph, &sequence(&graph), layout, config).unwrap()
    }

    #[test]
    fn positions_follow_loop_nesting() {
        let b = builder(
            &[
                (0, "d[i].name"),
                (3, "d[i].skills[j]"),
                (5, "d[i].skills[j+1]"),
                (9, "d[i+1].name"),
            ],
            &Layout::bare("", ""),
            &Config::default(),
        );
        let data = json!([
            {"name": "A", "skills": ["x", "y"]},
            {"name": "B", "skills": []}
        ]);
        let fragments = b.run(&data, &Formatters::new()).unwrap();
        let positions: Vec<(Vec<usize>, &str)> = fragments
            .iter()
            .map(|f| (f.position.0.clone(), f.text.as_str()))
            .collect();
        assert_eq!(
            positions,
            vec![
                (vec![1, 0, 2, 0, 2], "x"),
                (vec![1, 0, 2, 1, 2], "y"),
                (vec![1, 0, 1], "A"),
                (vec![1, 1, 1], "B"),
            ]
        );
        assert_eq!(assemble(fragments), "AxyB");
    }

    #[test]
    fn missing_data_is_empty() {
        let b = builder(
            &[
                (0, "d.a.b"),
                (1, "d.list[i].x:upperCase"),
                (2, "d.list[i+1].x"),
                (3, "d.n:print('z')"),
            ],
            &Layout::bare("<", ">"),
            &Config::default(),
        );
        let formatters = Formatters::with_builtins();
        assert_eq!(assemble(b.run(&Value::Null, &formatters).unwrap()), "<>");
        assert_eq!(
            assemble(b.run(&json!({"a": 3, "list": "nope", "n": null}), &formatters).unwrap()),
            "<>"
        );
    }

    #[test]
    fn dynamic_arguments_read_bound_values() {
        let b = builder(
            &[
                (0, "d.items[i].qty:print(.unit)"),
                (1, "d.items[i].qty:print(..currency)"),
                (2, "d.items[i+1].qty"),
            ],
            &Layout::bare("", ""),
            &Config::default(),
        );
        let data = json!({"currency": "EUR", "items": [{"qty": 1, "unit": "kg"}]});
        let out = assemble(b.run(&data, &Formatters::with_builtins()).unwrap());
        assert_eq!(out, "kgEUR");
    }

    #[test]
    fn xml_escape_applies_to_values_only() {
        let config = ConfigBuilder::default().escape(Escape::Xml).build();
        let b = builder(&[(0, "d.name")], &Layout::bare("<p>", "</p>"), &config);
        let out = assemble(b.run(&json!({"name": "Tom & <Jerry>"}), &Formatters::new()).unwrap());
        assert_eq!(out, "<p>Tom &amp; &lt;Jerry&gt;</p>");
    }

    #[test]
    fn missing_formatter_is_reported_before_running() {
        let b = builder(&[(0, "d.name:nope")], &Layout::bare("", ""), &Config::default());
        let err = b.run(&json!({}), &Formatters::with_builtins()).unwrap_err();
        assert!(matches!(err, Error::MissingFormatter { ref name, .. } if name == "nope"));
    }

    #[test]
    fn filtered_elements_emit_nothing() {
        let layout = Layout::bare("", "");
        let b = builder(
            &[
                (0, "d.cars[i, speed>10].brand"),
                (0, "d.cars[i+1, speed>10].brand"),
                (0, "d.cars[brand='Fiat'].speed"),
            ],
            &layout,
            &Config::default(),
        );
        let data = json!({"cars": [
            {"brand": "Tesla", "speed": 12},
            {"brand": "Fiat", "speed": 8},
            {"brand": "BMW", "speed": 11}
        ]});
        let fragments = b.run(&data, &Formatters::new()).unwrap();
        let positions: Vec<(Vec<usize>, &str)> = fragments
            .iter()
            .map(|f| (f.position.0.clone(), f.text.as_str()))
            .collect();
        assert_eq!(
            positions,
            vec![
                (vec![1, 0, 1], "Tesla"),
                (vec![1, 1, 1], "BMW"),
                (vec![3], "8"),
            ]
        );
    }
}
