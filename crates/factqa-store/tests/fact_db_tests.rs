use std::collections::BTreeSet;
use std::io::Write;

use factqa_store::{parse_query, render_query, FactDb, FactStore, PredicateKind, StoreError, Value};
use proptest::prelude::*;

const SCENARIO: &str = r#"{
    "entities": ["ana", "bob", "cleo"],
    "relations": { "parent": [["ana", "bob"], ["ana", "cleo"]] },
    "attributes": { "job": [["ana", "baker"]] }
}"#;

#[test]
fn loads_fact_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(SCENARIO.as_bytes()).expect("write");

    let db = FactDb::load_json(file.path()).expect("load");
    assert_eq!(db.entities(), vec!["ana", "bob", "cleo"]);
    assert_eq!(db.predicate_kind("job"), Some(PredicateKind::Attribute));
    assert_eq!(db.predicate_values("job").expect("values"), vec!["baker"]);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = FactDb::load_json(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));
}

#[test]
fn parents_of_ana() {
    let db = FactDb::from_json_str(SCENARIO).expect("load");
    let rows = db.query(&parse_query("parent(\"ana\", Y_3)").expect("parse")).expect("query");
    let answers: BTreeSet<String> = rows.iter().map(|b| b["Y_3"].to_answer_string()).collect();
    assert_eq!(answers, ["bob", "cleo"].iter().map(|s| s.to_string()).collect());
}

#[test]
fn has_solution_matches_query() {
    let db = FactDb::from_json_str(SCENARIO).expect("load");
    let hit = parse_query("job(Y_1, \"baker\")").expect("parse");
    let miss = parse_query("job(Y_1, \"pilot\")").expect("parse");
    assert!(db.has_solution(&hit).expect("query"));
    assert!(!db.has_solution(&miss).expect("query"));
}

#[test]
fn count_over_nothing_is_zero() {
    let db = FactDb::from_json_str(SCENARIO).expect("load");
    let goals = parse_query("aggregate_all(count, Y_2, parent(\"bob\", Y_2), Count_2)").expect("parse");
    let rows = db.query(&goals).expect("query");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Count_2"], Value::Count(0));
    assert_eq!(rows[0]["Y_2"], Value::Set(BTreeSet::new()));
}

fn arb_edges() -> impl Strategy<Value = Vec<(u8, u8)>> {
    prop::collection::vec((0u8..6, 0u8..6), 0..24)
}

fn build(edges: &[(u8, u8)]) -> FactDb {
    let mut db = FactDb::new();
    db.declare("r", PredicateKind::Relation).expect("declare");
    for (s, o) in edges {
        db.add_relation("r", &format!("e{s}"), &format!("e{o}")).expect("insert");
    }
    db
}

proptest! {
    #[test]
    fn forward_and_backward_lookups_agree(edges in arb_edges()) {
        let db = build(&edges);
        let all = db.query(&parse_query("r(X, Y)").expect("parse")).expect("query");
        let expected: BTreeSet<(u8, u8)> = edges.iter().copied().collect();
        prop_assert_eq!(all.len(), expected.len());

        for (s, o) in &expected {
            let fwd = db.query(&parse_query(&format!("r(e{s}, Y)")).expect("parse")).expect("query");
            let expected_o = Value::Atom(format!("e{o}"));
            prop_assert!(fwd.iter().any(|b| b["Y"] == expected_o));
            let bwd = db.query(&parse_query(&format!("r(X, e{o})")).expect("parse")).expect("query");
            let expected_s = Value::Atom(format!("e{s}"));
            prop_assert!(bwd.iter().any(|b| b["X"] == expected_s));
        }
    }

    #[test]
    fn count_matches_row_count(edges in arb_edges(), subject in 0u8..6) {
        let db = build(&edges);
        let plain = parse_query(&format!("r(e{subject}, Y)")).expect("parse");
        let rows = db.query(&plain).expect("query").len();
        let counted = parse_query(&format!("aggregate_all(count, Y, r(e{subject}, Y), N)")).expect("parse");
        let out = db.query(&counted).expect("query");
        prop_assert_eq!(&out[0]["N"], &Value::Count(rows));
    }

    #[test]
    fn rendered_queries_reparse(edges in arb_edges()) {
        let db = build(&edges);
        let goals = parse_query("r(X, Y), r(Y, Z)").expect("parse");
        let again = parse_query(&render_query(&goals)).expect("reparse");
        prop_assert_eq!(db.query(&goals).expect("query"), db.query(&again).expect("query"));
    }
}
