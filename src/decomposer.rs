//! Tag decomposition: flat markers in, scope graph out.

use std::collections::{HashMap, HashSet};

use crate::config::Unterminated;
use crate::error::{Error, Result};
use crate::filter::{self, Filter};
use crate::formatter;
use crate::marker::{self, IndexGroup, Marker, Segment};
use crate::scope::{
    Access, ArrayRange, Leaf, Occurrence, ROOT, ScopeGraph, ScopeId, ScopeKind, ScopeNode,
};

/// Decompose `markers` into a scope graph.
///
/// Markers are processed in ascending offset order; markers sharing an
/// offset keep their relative input order.
pub fn decompose(markers: &[Marker], policy: Unterminated) -> Result<ScopeGraph> {
    let mut sorted: Vec<&Marker> = markers.iter().collect();
    sorted.sort_by_key(|m| m.offset);

    let mut decomposer = Decomposer::new();
    for m in sorted {
        decomposer.add(m)?;
    }
    decomposer.finish(policy)
}

struct Decomposer {
    graph: ScopeGraph,
    /// Cumulative structural path -> scope, e.g. `.menu[].items`
    keys: HashMap<String, ScopeId>,
    /// Object keys already indexed as arrays, e.g. `.menu`
    array_bases: HashSet<String>,
}

/// Where the walk of one marker path stands.
struct Cursor<'m> {
    marker: &'m Marker,
    point: usize,
    scope: ScopeId,
    key: String,
    /// A terminator group was passed; later groups only look scopes up
    closing: bool,
    occurrence: Occurrence,
}

impl Cursor<'_> {
    fn conflict(&self, segment: &Segment) -> Error {
        Error::StructuralConflict {
            path: self.marker.path.clone(),
            name: segment.name.clone(),
        }
    }
}

impl Decomposer {
    fn new() -> Self {
        Self {
            graph: ScopeGraph::new(),
            keys: HashMap::new(),
            array_bases: HashSet::new(),
        }
    }

    fn add(&mut self, m: &Marker) -> Result<()> {
        let parsed = marker::parse_path(&m.path, m.offset)?;
        let formatters = match &parsed.formatters {
            Some(chain) => formatter::parse_chain(chain, &m.path, m.offset)?,
            None => Vec::new(),
        };

        let mut cursor = Cursor {
            marker: m,
            point: self.graph.occurrences.len() + 1,
            scope: ROOT,
            key: String::new(),
            closing: false,
            occurrence: Occurrence {
                offset: m.offset,
                path: m.path.clone(),
                terminator: parsed.is_terminator(),
                ..Default::default()
            },
        };
        let mut attribute = String::new();
        let last = parsed.segments.len() - 1;

        for (idx, segment) in parsed.segments.iter().enumerate() {
            let is_root = idx == 0;
            if !is_root && segment.groups.is_empty() {
                if idx == last {
                    attribute = segment.name.clone();
                    break;
                }
                let object_key = format!("{}.{}", cursor.key, segment.name);
                let resolved = if cursor.closing {
                    self.keys.get(&object_key).copied()
                } else {
                    Some(self.object(&cursor, &object_key, segment)?)
                };
                let Some(scope) = resolved else {
                    break;
                };
                cursor.scope = scope;
                cursor.key = object_key;
                continue;
            }

            if !is_root {
                cursor.key = format!("{}.{}", cursor.key, segment.name);
            }
            if !self.dimensions(&mut cursor, segment, is_root)? {
                break;
            }
        }

        let Cursor {
            point,
            scope,
            mut occurrence,
            ..
        } = cursor;
        if !occurrence.terminator {
            let id = self.graph.leaves.len();
            self.graph.leaves.push(Leaf {
                id,
                scope,
                attribute,
                formatters,
                offset: m.offset,
                point,
                path: m.path.clone(),
            });
            self.graph.nodes[scope].leaves.push(id);
            occurrence.leaf = Some(id);
        }

        self.graph.occurrences.push(occurrence);
        Ok(())
    }

    fn object(&mut self, cursor: &Cursor, key: &str, segment: &Segment) -> Result<ScopeId> {
        if let Some(&id) = self.keys.get(key) {
            return Ok(id);
        }
        if self.array_bases.contains(key) {
            return Err(cursor.conflict(segment));
        }

        let parent = cursor.scope;
        let id = self.push_node(ScopeNode {
            id: 0,
            display_name: segment.name.clone(),
            kind: ScopeKind::Object,
            parent: Some(parent),
            access: Access::Field(segment.name.clone()),
            depth: self.graph.nodes[parent].depth,
            anchor: cursor.marker.offset,
            point: cursor.point,
            range: None,
            close_point: None,
            iterator: None,
            last_terminator: None,
            filters: Vec::new(),
            leaves: Vec::new(),
        });
        self.keys.insert(key.to_string(), id);
        log::trace!("object scope #{} `{}`", id, key);
        Ok(id)
    }

    /// Walk the bracket groups of one segment. Returns `false` when a scope
    /// referenced after a terminator does not exist.
    fn dimensions(
        &mut self,
        cursor: &mut Cursor,
        segment: &Segment,
        is_root: bool,
    ) -> Result<bool> {
        for (gi, group) in segment.groups.iter().enumerate() {
            let first = gi == 0 && !is_root;
            let object_key = cursor.key.clone();

            let Some(iterator) = group.iterator.as_deref() else {
                match self.search(cursor, segment, group, first)? {
                    Some(scope) => {
                        cursor.scope = scope;
                        continue;
                    }
                    None => return Ok(false),
                }
            };

            cursor.key.push_str("[]");
            if group.terminator {
                let scope = self.terminate(&cursor.key, iterator, cursor.marker)?;
                let offset = cursor.marker.offset;
                let node = &mut self.graph.nodes[scope];
                if let Some(range) = node.range.as_mut()
                    && range.end.is_none()
                {
                    range.end = Some(offset);
                    node.close_point = Some(cursor.point);
                    cursor.occurrence.closes.push(scope);
                }
                node.last_terminator = node.last_terminator.max(Some(offset));
                cursor.closing = true;
                cursor.scope = scope;
                continue;
            }

            if let Some(&id) = self.keys.get(cursor.key.as_str()) {
                if !cursor.closing {
                    merge_filters(&mut self.graph.nodes[id].filters, &group.filters);
                }
                cursor.scope = id;
                continue;
            }
            if cursor.closing {
                return Ok(false);
            }
            if first && self.keys.contains_key(&object_key) {
                return Err(cursor.conflict(segment));
            }

            let access = if first {
                Access::Field(segment.name.clone())
            } else {
                Access::Element
            };
            let parent = cursor.scope;
            let offset = cursor.marker.offset;
            let id = self.push_node(ScopeNode {
                id: 0,
                display_name: segment.name.clone(),
                kind: ScopeKind::Array,
                parent: Some(parent),
                access,
                depth: self.graph.nodes[parent].depth + 1,
                anchor: offset,
                point: cursor.point,
                range: Some(ArrayRange {
                    start: offset,
                    end: None,
                }),
                close_point: None,
                iterator: Some(iterator.to_string()),
                last_terminator: None,
                filters: group.filters.clone(),
                leaves: Vec::new(),
            });
            self.keys.insert(cursor.key.clone(), id);
            if first {
                self.array_bases.insert(object_key);
            }
            cursor.occurrence.opens.push(id);
            log::trace!("array scope #{} `{}` starts at {}", id, cursor.key, offset);
            cursor.scope = id;
        }
        Ok(true)
    }

    /// A condition-only group: bind the first matching element as an object.
    fn search(
        &mut self,
        cursor: &mut Cursor,
        segment: &Segment,
        group: &IndexGroup,
        first: bool,
    ) -> Result<Option<ScopeId>> {
        let object_key = cursor.key.clone();
        cursor.key = format!("{}[{}]", object_key, filter::describe(&group.filters));
        if let Some(&id) = self.keys.get(&cursor.key) {
            return Ok(Some(id));
        }
        if cursor.closing {
            return Ok(None);
        }
        if first && self.keys.contains_key(&object_key) {
            return Err(cursor.conflict(segment));
        }

        let parent = cursor.scope;
        let id = self.push_node(ScopeNode {
            id: 0,
            display_name: segment.name.clone(),
            kind: ScopeKind::Object,
            parent: Some(parent),
            access: Access::Search {
                field: first.then(|| segment.name.clone()),
                filters: group.filters.clone(),
            },
            depth: self.graph.nodes[parent].depth,
            anchor: cursor.marker.offset,
            point: cursor.point,
            range: None,
            close_point: None,
            iterator: None,
            last_terminator: None,
            filters: Vec::new(),
            leaves: Vec::new(),
        });
        self.keys.insert(cursor.key.clone(), id);
        if first {
            self.array_bases.insert(object_key);
        }
        log::trace!("search scope #{} `{}`", id, cursor.key);
        Ok(Some(id))
    }

    fn terminate(&self, key: &str, iterator: &str, m: &Marker) -> Result<ScopeId> {
        let Some(&scope) = self.keys.get(key) else {
            return Err(Error::UnterminatedRepetition {
                path: m.path.clone(),
                offset: m.offset,
                message: format!("`[{}+1]` has no opening `[{}]` before it", iterator, iterator),
                counterpart: None,
            });
        };
        let node = &self.graph.nodes[scope];
        match node.iterator.as_deref() {
            Some(open) if open == iterator => Ok(scope),
            open => Err(Error::UnterminatedRepetition {
                path: m.path.clone(),
                offset: m.offset,
                message: format!(
                    "`[{}+1]` does not match the opening `[{}]` of this dimension",
                    iterator,
                    open.unwrap_or_default()
                ),
                counterpart: self.opening_marker(scope),
            }),
        }
    }

    fn opening_marker(&self, scope: ScopeId) -> Option<(String, usize)> {
        self.graph
            .opening(scope)
            .map(|o| (o.path.clone(), o.offset))
    }

    fn push_node(&mut self, mut node: ScopeNode) -> ScopeId {
        let id = self.graph.nodes.len();
        node.id = id;
        self.graph.nodes.push(node);
        id
    }

    fn finish(mut self, policy: Unterminated) -> Result<ScopeGraph> {
        let open: Vec<ScopeId> = self
            .graph
            .nodes
            .iter()
            .filter(|n| n.range.is_some_and(|r| r.end.is_none()))
            .map(|n| n.id)
            .collect();

        for scope in open {
            let start = self.graph.nodes[scope].anchor;
            match policy {
                Unterminated::Permissive => {
                    log::debug!("array scope #{} has no terminator, dropping its range", scope);
                    self.graph.nodes[scope].range = None;
                }
                Unterminated::Strict => {
                    let (path, offset) = self
                        .opening_marker(scope)
                        .unwrap_or_else(|| (self.graph.nodes[scope].display_name.clone(), start));
                    let iterator = self.graph.nodes[scope].iterator.clone().unwrap_or_default();
                    let counterpart = self
                        .graph
                        .occurrences
                        .iter()
                        .find(|o| o.terminator && o.offset > start)
                        .map(|o| (o.path.clone(), o.offset));
                    return Err(Error::UnterminatedRepetition {
                        path,
                        offset,
                        message: format!("`[{}]` is never closed by `[{}+1]`", iterator, iterator),
                        counterpart,
                    });
                }
            }
        }

        log::debug!(
            "decomposed {} markers into {} scopes and {} leaves",
            self.graph.occurrences.len(),
            self.graph.nodes.len(),
            self.graph.leaves.len()
        );
        Ok(self.graph)
    }
}

/// A row is kept only when every condition written on its markers holds.
fn merge_filters(into: &mut Vec<Filter>, filters: &[Filter]) {
    for f in filters {
        if !into.contains(f) {
            into.push(f.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::Argument;

    fn markers(list: &[(usize, &str)]) -> Vec<Marker> {
        list.iter().map(|&(o, p)| Marker::new(o, p)).collect()
    }

    fn permissive(list: &[(usize, &str)]) -> Result<ScopeGraph> {
        decompose(&markers(list), Unterminated::Permissive)
    }

    #[test]
    fn same_path_same_scope() {
        let graph = permissive(&[(0, "d.site.name"), (5, "d.site.url"), (9, "d.title")]).unwrap();
        assert_eq!(graph.nodes().len(), 2);
        let site = &graph.nodes()[1];
        assert_eq!(site.display_name, "site");
        assert_eq!(site.kind, ScopeKind::Object);
        assert_eq!(site.leaves, vec![0, 1]);
        assert_eq!(graph.leaves()[2].scope, ROOT);
        assert_eq!(graph.leaves()[2].attribute, "title");
    }

    #[test]
    fn array_range_and_terminator() {
        let graph = permissive(&[
            (6, "d.movies[i].title"),
            (9, "d.movies[i].year:int"),
            (14, "d.movies[i+1].title"),
            (17, "d.movies[i+1].year"),
        ])
        .unwrap();
        let movies = &graph.nodes()[1];
        assert!(movies.is_bounded());
        assert_eq!(movies.range, Some(ArrayRange { start: 6, end: Some(14) }));
        assert_eq!(movies.last_terminator, Some(17));
        assert_eq!(movies.depth, 1);
        assert_eq!(graph.leaves().len(), 2);
        assert_eq!(graph.leaves()[1].formatters[0].name, "int");
        assert_eq!(graph.occurrences()[0].opens, vec![1]);
        assert_eq!(graph.occurrences()[2].closes, vec![1]);
        assert!(graph.occurrences()[3].closes.is_empty());
    }

    #[test]
    fn multi_dimensional_segments_chain_arrays() {
        let graph = permissive(&[(0, "d.matrix[i][j].v"), (3, "d.matrix[i][j+1].v")]).unwrap();
        let outer = &graph.nodes()[1];
        let inner = &graph.nodes()[2];
        assert_eq!(outer.access, Access::Field("matrix".to_string()));
        assert_eq!(inner.access, Access::Element);
        assert_eq!(inner.parent, Some(1));
        assert_eq!(inner.depth, 2);
        assert!(inner.is_bounded());
        assert!(outer.range.is_none());
    }

    #[test]
    fn root_array_and_element_leaf() {
        let graph = permissive(&[(0, "d[i]"), (2, "d[i+1]")]).unwrap();
        let root_dim = &graph.nodes()[1];
        assert_eq!(root_dim.parent, Some(ROOT));
        assert_eq!(root_dim.access, Access::Element);
        assert_eq!(graph.leaves()[0].attribute, "");
        assert_eq!(graph.leaves()[0].scope, 1);
    }

    #[test]
    fn object_and_array_conflict() {
        let err = permissive(&[(0, "d.car.brand"), (5, "d.car[i].brand")]).unwrap_err();
        assert!(matches!(err, Error::StructuralConflict { ref name, .. } if name == "car"));

        let err = permissive(&[(0, "d.car[i].brand"), (5, "d.car.brand")]).unwrap_err();
        assert!(matches!(err, Error::StructuralConflict { .. }));
    }

    #[test]
    fn terminator_with_wrong_token() {
        let err = permissive(&[(0, "d.rows[i].id"), (5, "d.rows[j+1].id")]).unwrap_err();
        match err {
            Error::UnterminatedRepetition { counterpart, .. } => {
                assert_eq!(counterpart, Some(("d.rows[i].id".to_string(), 0)));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = permissive(&[(0, "d.rows[i+1].id")]).unwrap_err();
        assert!(matches!(err, Error::UnterminatedRepetition { .. }));
    }

    #[test]
    fn unterminated_policy() {
        let list = [(0, "d.rows[i].id"), (4, "d.cols[k].id"), (8, "d.cols[k+1].id")];
        let graph = permissive(&list).unwrap();
        assert_eq!(graph.nodes()[1].range, None);
        assert_eq!(graph.nodes()[1].anchor, 0);
        assert!(graph.nodes()[2].is_bounded());

        let err = decompose(&markers(&list), Unterminated::Strict).unwrap_err();
        assert_eq!(
            err,
            Error::UnterminatedRepetition {
                path: "d.rows[i].id".to_string(),
                offset: 0,
                message: "`[i]` is never closed by `[i+1]`".to_string(),
                counterpart: Some(("d.cols[k+1].id".to_string(), 8)),
            }
        );
    }

    #[test]
    fn nested_terminators_close_inner_dimensions() {
        let graph = permissive(&[
            (0, "d[i].name"),
            (2, "d[i].skills[j].label"),
            (4, "d[i].skills[j+1].label"),
            (8, "d[i+1].name"),
            (9, "d[i+1].skills[j].label"),
        ])
        .unwrap();
        assert_eq!(graph.nodes().len(), 3);
        assert_eq!(graph.nodes()[2].range, Some(ArrayRange { start: 2, end: Some(4) }));
        assert_eq!(graph.nodes()[1].range, Some(ArrayRange { start: 0, end: Some(8) }));
        assert_eq!(graph.leaves().len(), 2);
        assert!(graph.occurrences()[4].leaf.is_none());
    }

    #[test]
    fn decomposition_ignores_input_order() {
        let list = [
            (0, "d.a[i].x"),
            (3, "d.a[i].y:print('z')"),
            (6, "d.a[i+1].x"),
            (9, "d.total"),
        ];
        let mut reversed = list;
        reversed.reverse();
        assert_eq!(permissive(&list).unwrap(), permissive(&reversed).unwrap());
        let graph = permissive(&list).unwrap();
        assert_eq!(
            graph.leaves()[1].formatters[0].args,
            vec![Argument::Literal(serde_json::json!("z"))]
        );
    }

    #[test]
    fn shared_offsets_get_distinct_points() {
        let graph = permissive(&[
            (1, "d.items[i].x"),
            (1, "d.items[i+1].x"),
            (1, "d.total"),
        ])
        .unwrap();
        let items = &graph.nodes()[1];
        assert_eq!(items.point, 1);
        assert_eq!(items.close_point, Some(2));
        assert_eq!(items.range, Some(ArrayRange { start: 1, end: Some(1) }));
        let points: Vec<usize> = graph.leaves().iter().map(|l| l.point).collect();
        assert_eq!(points, [1, 3]);
        assert_eq!(graph.max_point(), 3);
    }

    #[test]
    fn row_filters_attach_to_the_dimension() {
        let graph = permissive(&[
            (0, "d.cars[i, speed>10].brand"),
            (2, "d.cars[i, color!=red].speed"),
            (4, "d.cars[i+1, speed>10].brand"),
        ])
        .unwrap();
        assert_eq!(graph.nodes().len(), 2);
        let described = filter::describe(&graph.nodes()[1].filters);
        assert_eq!(described, "speed>10,color!='red'");
        assert!(graph.nodes()[1].is_bounded());
    }

    #[test]
    fn condition_only_group_is_an_object_search() {
        let graph = permissive(&[
            (0, "d.cars[id=3].brand"),
            (2, "d.cars[id=3].owner.name"),
            (4, "d.cars[id=4].brand"),
        ])
        .unwrap();
        let found = &graph.nodes()[1];
        assert_eq!(found.kind, ScopeKind::Object);
        assert_eq!(found.depth, 0);
        assert!(matches!(
            &found.access,
            Access::Search { field: Some(name), filters } if name == "cars" && filters.len() == 1
        ));
        assert_eq!(graph.nodes()[2].parent, Some(1));
        assert_eq!(graph.nodes().len(), 4);
        assert_eq!(graph.leaves()[2].scope, 3);
    }

    #[test]
    fn search_and_object_use_conflict() {
        let err = permissive(&[(0, "d.car.brand"), (5, "d.car[id=1].brand")]).unwrap_err();
        assert!(matches!(err, Error::StructuralConflict { ref name, .. } if name == "car"));

        let err = permissive(&[(0, "d.car[id=1].brand"), (5, "d.car.brand")]).unwrap_err();
        assert!(matches!(err, Error::StructuralConflict { .. }));

        let graph = permissive(&[(0, "d.car[id=1].brand"), (5, "d.car[i].brand")]).unwrap();
        assert_eq!(graph.nodes().len(), 3);
    }
}
