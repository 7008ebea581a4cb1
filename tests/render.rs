//! End-to-end rendering behavior.

use serde_json::{Value, json};
use tessera::{
    Config, ConfigBuilder, Error, Escape, FormatterExpr, Formatters, Marker, Template,
    TemplateSource, Unterminated, assemble,
};

mod common;

fn render(template: &str, data: &Value) -> String {
    let source = common::source(template);
    Template::compile(&source, &Config::default())
        .unwrap()
        .render(data, &Formatters::with_builtins())
        .unwrap()
}

fn compile_err(template: &str, config: &Config) -> Error {
    Template::compile(&common::source(template), config).unwrap_err()
}

#[test]
fn single_substitution() {
    let source = TemplateSource::new("<xml><p></p></xml>", vec![Marker::new(8, "d0.firstname")]);
    let template = Template::compile(&source, &Config::default()).unwrap();
    let out = template
        .render(&json!({"firstname": "Thomas"}), &Formatters::new())
        .unwrap();
    assert_eq!(out, "<xml><p>Thomas</p></xml>");
}

#[test]
fn plain_markers_are_sequential_substitution() {
    let out = render(
        "Dear {d.title} {d.name.last},{d.name.first}{d.name.last}!",
        &json!({"title": "Dr", "name": {"first": "Ada", "last": "Byron"}}),
    );
    assert_eq!(out, "Dear Dr Byron,AdaByron!");
}

const SIBLINGS: &str = concat!(
    "Films:{d.movies[i].title},{d.movies[i+1].title};",
    "Automobiles:{d.cars[i].brand},{d.cars[i+1].brand}."
);

#[test]
fn sibling_arrays_keep_document_order() {
    let source = common::source(SIBLINGS);
    assert_eq!(source.markers[0].offset, 6);
    assert_eq!(source.markers[2].offset, 20);
    // Arrays are anchored at the rank of their opening marker.

    let template = Template::compile(&source, &Config::default()).unwrap();
    let data = json!({
        "movies": [{"title": "Matrix"}, {"title": "Alien"}],
        "cars": [{"brand": "Tesla"}, {"brand": "Fiat"}]
    });
    let mut fragments = template.fragments(&data, &Formatters::new()).unwrap();

    let anchors: Vec<(usize, &str)> = fragments
        .iter()
        .filter(|f| f.position.0.len() == 3)
        .map(|f| (f.position.0[0], f.text.as_str()))
        .collect();
    assert!(anchors.contains(&(1, "Alien")));
    assert!(anchors.contains(&(3, "Fiat")));

    fragments.reverse();
    assert_eq!(assemble(fragments), "Films:Matrix,Alien;Automobiles:Tesla,Fiat.");
}

const NESTED: &str = concat!(
    "<p>{d[i].name}:<s>{d[i].skills[i].label}</s><s>{d[i].skills[i+1].label}</s></p>",
    "<p>{d[i+1].name}:<s>{d[i+1].skills[i].label}</s></p>"
);

#[test]
fn nested_arrays_interleave_per_element() {
    let data = json!([
        {"name": "Ann", "skills": [{"label": "rust"}, {"label": "sql"}]},
        {"name": "Bob", "skills": [{"label": "go"}]}
    ]);
    let template = Template::compile(&common::source(NESTED), &Config::default()).unwrap();
    let fragments = template.fragments(&data, &Formatters::new()).unwrap();

    let sql = fragments.iter().find(|f| f.text == "sql").unwrap();
    assert_eq!(sql.position.0, vec![1, 0, 2, 1, 2]);

    similar_asserts::assert_eq!(
        assemble(fragments),
        "<p>Ann:<s>rust</s><s>sql</s></p><p>Bob:<s>go</s></p>"
    );
}

#[test]
fn touching_markers_keep_document_order() {
    let out = render(
        "A{d.items[i].x}{d.items[i+1].x}{d.total}B",
        &json!({"items": [{"x": "1"}, {"x": "2"}], "total": "T"}),
    );
    assert_eq!(out, "A12TB");

    let out = render(
        "{d[i].tags[j]}{d[i].tags[j+1]}{d[i].name};{d[i+1].name}",
        &json!([
            {"name": "n1", "tags": ["a", "b"]},
            {"name": "n2", "tags": ["c"]}
        ]),
    );
    assert_eq!(out, "abn1;cn2");
}

const CARS: &str = concat!(
    "<ul><li>{d.cars[i, speed>10].brand}</li><li>{d.cars[i+1, speed>10].brand}</li></ul>",
    "slow:{d.cars[speed<10].brand}/{d.cars[brand='BMW'].speed}"
);

#[test]
fn filtered_rows_and_object_search() {
    let data = json!({"cars": [
        {"brand": "Tesla", "speed": 12},
        {"brand": "Fiat", "speed": 8},
        {"brand": "BMW", "speed": 11}
    ]});
    similar_asserts::assert_eq!(
        render(CARS, &data),
        "<ul><li>Tesla</li><li>BMW</li></ul>slow:Fiat/11"
    );
}

#[test]
fn index_conditions_limit_rows() {
    let data = json!({"pets": [{"name": "a"}, {"name": "b"}, {"name": "c"}, {"name": "d"}]});
    let first_two = "{d.pets[i, i<2].name} {d.pets[i+1, i<2].name}|";
    assert_eq!(render(first_two, &data), "a b|");
    let all_but_last = "{d.pets[i, i<-1].name} {d.pets[i+1, i<-1].name}|";
    assert_eq!(render(all_but_last, &data), "a b c|");
}

#[test]
fn filters_that_match_nothing() {
    let template = "[{d.rows[i, kind!=draft].id},{d.rows[i+1, kind!=draft].id}]{d.rows[id=9].id}";
    let data = json!({"rows": [{"id": 1, "kind": "draft"}, {"id": 2, "kind": "draft"}]});
    assert_eq!(render(template, &data), "[]");

    let data = json!({"rows": [{"id": 1, "kind": "draft"}, {"id": 2}, {"id": 3}]});
    assert_eq!(render(template, &data), "[2,3]");
}

#[test]
fn search_and_object_use_is_a_conflict() {
    let err = compile_err("{d.car.brand} {d.car[id=2].brand}", &Config::default());
    assert!(matches!(err, Error::StructuralConflict { ref name, .. } if name == "car"));
}

#[test]
fn formatter_chain() {
    let expr = FormatterExpr::from_strs("d.number", &["int", "toFixed(2)"]).unwrap();
    assert_eq!(expr.to_string(), "toFixed(int(d.number), 2)");

    let out = render("Total: {d.number:int:toFixed(2)} EUR", &json!({"number": 42.987}));
    assert_eq!(out, "Total: 42.00 EUR");
}

#[test]
fn absent_data_keeps_only_static_text() {
    assert_eq!(render(SIBLINGS, &Value::Null), "Films:;Automobiles:.");
    assert_eq!(render(NESTED, &json!({})), "<p></s></p>");
    assert_eq!(
        render("a{d.x:ifEmpty('none')}b", &json!({"y": 1})),
        "ab",
        "absent values skip their formatters"
    );
}

#[test]
fn leaf_count_matches_array_length() {
    let template = "<ul><li>{d.items[i].name}</li><li>{d.items[i+1].name}</li></ul>";
    for n in [0usize, 1, 2, 5] {
        let items: Vec<Value> = (0..n).map(|k| json!({"name": format!("item{k}")})).collect();
        let out = render(template, &json!({ "items": items }));
        assert_eq!(out.matches("item").count(), n, "{out}");
        assert_eq!(out.matches("<li>").count(), n.max(1));
    }
}

#[test]
fn unterminated_array_is_permissive_by_default() {
    let template = "<ul>{d.items[i].name};</ul>";
    let out = render(template, &json!({"items": [{"name": "a"}, {"name": "b"}]}));
    assert_eq!(out, "<ul>ab;</ul>");

    let strict = ConfigBuilder::default()
        .unterminated(Unterminated::Strict)
        .build();
    let err = compile_err(template, &strict);
    assert!(matches!(err, Error::UnterminatedRepetition { offset: 4, .. }), "{err}");
}

#[test]
fn terminator_for_the_wrong_level_is_rejected() {
    let template = "{d[i].name}{d[i].skills[j].label}|{d[i+1].name}|{d[i].skills[j+1].label}";
    let err = compile_err(template, &Config::default());
    match err {
        Error::UnterminatedRepetition { path, counterpart, .. } => {
            assert_eq!(path, "d[i+1].name");
            assert_eq!(counterpart, Some(("d[i].skills[j].label".to_string(), 0)));
        }
        other => panic!("expected UnterminatedRepetition, got {other:?}"),
    }

    let err = compile_err("{d.rows[i].a}-{d.rows[k+1].a}", &Config::default());
    assert!(matches!(err, Error::UnterminatedRepetition { .. }));
}

#[test]
fn object_and_array_use_is_a_conflict() {
    let err = compile_err(
        "{d.car.brand} {d.car[i].brand}{d.car[i+1].brand}",
        &Config::default(),
    );
    assert_eq!(
        err,
        Error::StructuralConflict {
            path: "d.car[i].brand".to_string(),
            name: "car".to_string(),
        }
    );
}

#[test]
fn missing_formatter_is_reported() {
    let source = common::source("{d.name:upercase}");
    let err = Template::compile_with(&source, &Config::default(), &Formatters::with_builtins())
        .unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @r#"formatter "upercase" used in `d.name` does not exist. Did you mean "upperCase"?"#
    );
}

#[test]
fn rendering_is_deterministic() {
    let data = json!({
        "movies": [{"title": "Matrix"}, {"title": "Alien"}, {"title": "Heat"}],
        "cars": [{"brand": "Tesla"}]
    });
    let first = render(SIBLINGS, &data);
    let second = render(SIBLINGS, &data);
    assert_eq!(first, second);

    let template = Template::compile(&common::source(SIBLINGS), &Config::default()).unwrap();
    let formatters = Formatters::new();
    assert_eq!(
        template.fragments(&data, &formatters).unwrap(),
        template.fragments(&data, &formatters).unwrap()
    );
}

#[test]
fn xml_escaping_is_configurable() {
    let config = ConfigBuilder::default().escape(Escape::Xml).build();
    let template = Template::compile(&common::source("<b>{d.name}</b>"), &config).unwrap();
    let out = template
        .render(&json!({"name": "R&D <lab>"}), &Formatters::new())
        .unwrap();
    assert_eq!(out, "<b>R&amp;D &lt;lab&gt;</b>");
}

#[test]
fn one_template_many_threads() {
    let template = Template::compile(&common::source(NESTED), &Config::default()).unwrap();
    let formatters = Formatters::with_builtins();

    let outputs: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let template = &template;
                let formatters = &formatters;
                scope.spawn(move || {
                    let data = json!([{"name": format!("p{n}"), "skills": [{"label": "x"}]}]);
                    template.render(&data, formatters).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (n, out) in outputs.iter().enumerate() {
        assert_eq!(out, &format!("<p>p{n}:<s>x</s></p>"));
    }
}
