//! Integration tests for the complete factqa pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Grammar → Template generator → Template pairs
//! - Template pairs + Fact file → Instantiation → Execution
//! - Batch generation → QA records → JSON
//!
//! Run with: cargo test --test integration_tests

use std::collections::BTreeSet;
use std::io::Write;

use factqa_grammar::{parse_grammar, TemplateCache, TemplateGenerator, TemplatePair};
use factqa_sampler::{
    execute, execute_batch, generate_records, instantiate, DifficultyTier, QaRecord,
    SamplerConfig,
};
use factqa_store::{parse_goal, parse_query, FactDb, FactStore, Goal, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;

const FAMILY: &str = r#"{
    "entities": ["ana", "bob", "cleo", "dora", "eli", "finn"],
    "relations": {
        "parent": [["ana", "bob"], ["ana", "cleo"], ["bob", "dora"], ["bob", "eli"], ["cleo", "finn"]],
        "sibling": [["dora", "eli"], ["eli", "dora"]],
        "spouse": [["bob", "cleo"], ["cleo", "bob"]]
    },
    "attributes": {
        "job": [["ana", "baker"], ["bob", "pilot"], ["cleo", "nurse"]],
        "dob": [["ana", "2001-04-02"], ["bob", "1970-11-23"]],
        "gender": [["ana", "female"], ["bob", "male"], ["cleo", "female"]]
    },
    "derived": [
        { "kind": "inverse", "name": "child", "of": "parent" },
        { "kind": "compose", "name": "grandparent", "first": "parent", "second": "parent" },
        { "kind": "compose", "name": "grandchild", "first": "child", "second": "child" }
    ]
}"#;

fn family() -> FactDb {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(FAMILY.as_bytes()).expect("write");
    FactDb::load_json(file.path()).expect("load facts")
}

fn config(store: &dyn FactStore, tier: DifficultyTier) -> SamplerConfig {
    let mut config = SamplerConfig::default().with_tier(tier);
    config.retain_known(store);
    config
}

fn find<'a>(templates: &'a [TemplatePair], canonical: &str) -> &'a TemplatePair {
    templates
        .iter()
        .find(|t| t.canonical() == canonical)
        .unwrap_or_else(|| panic!("missing `{canonical}`"))
}

// ============================================================================
// Generation → instantiation → execution
// ============================================================================

#[test]
fn test_nested_attribute_question_end_to_end() {
    let db = family();
    let cache = TemplateCache::new(TemplateGenerator::v1().expect("grammar"));
    let templates = cache.get(6).expect("templates");
    let pair = find(&templates, "What is the <attribute_name> of the <relation> of <name>?");
    let config = config(&db, DifficultyTier::Easy);

    let mut checked = 0;
    for seed in 0..64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let Ok(inst) = instantiate(pair, &db, &mut rng, true, &config) else {
            continue;
        };
        let run = execute(&db, &inst.query, true).expect("execute");
        assert!(!run.answer.is_empty(), "{}", inst.question);

        // The inner fragment runs first, so the trace opens with the
        // intermediate person and ends with the answer binding.
        let trace = run.trace.expect("trace");
        let first = trace.first().expect("non-empty trace");
        assert_eq!(first.keys().collect::<Vec<_>>(), vec!["Y_2"]);
        let last = trace.last().expect("non-empty trace");
        assert!(last.contains_key(&inst.query.answer));
        checked += 1;
    }
    assert!(checked > 0);
}

#[test]
fn test_date_of_birth_alias_in_questions() {
    let db = family();
    let templates = TemplateGenerator::v1().expect("grammar").generate(5).expect("generate");
    let pair = find(&templates, "What is the <attribute_name> of <name>?");
    let mut config = config(&db, DifficultyTier::Easy);
    config.attributes = vec!["dob".to_string()];

    let mut rng = StdRng::seed_from_u64(1);
    let inst = instantiate(pair, &db, &mut rng, false, &config).expect("instantiate");
    assert!(inst.question.starts_with("What is the date of birth of "), "{}", inst.question);
    assert!(inst.query.text().starts_with("dob("));
}

#[test]
fn test_count_of_grandchildren() {
    let db = family();
    let goals = parse_query("aggregate_all(count, Y_4, grandchild(\"dora\", Y_4), Count_4)").expect("parse");
    let rows = db.query(&goals).expect("query");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Count_4"], Value::Count(0));

    let goals = parse_query("aggregate_all(count, Y, grandparent(\"ana\", Y), N)").expect("parse");
    let rows = db.query(&goals).expect("query");
    assert_eq!(rows[0]["N"], Value::Count(3));
}

#[test]
fn test_batch_execution_matches_single() {
    let db = family();
    let templates = TemplateGenerator::v1().expect("grammar").generate(7).expect("generate");
    let config = config(&db, DifficultyTier::Hard);

    let queries: Vec<_> = templates
        .iter()
        .enumerate()
        .map(|(i, pair)| {
            let mut rng = StdRng::seed_from_u64(i as u64);
            instantiate(pair, &db, &mut rng, false, &config).expect("instantiate").query
        })
        .collect();

    let batch = execute_batch(&db, &queries, true).expect("batch");
    assert_eq!(batch.len(), queries.len());
    for (query, run) in queries.iter().zip(&batch) {
        assert_eq!(run, &execute(&db, query, true).expect("single"));
    }
}

// ============================================================================
// Records
// ============================================================================

#[test]
fn test_records_serialize_to_json_lines() {
    let db = family();
    let templates = TemplateGenerator::v1().expect("grammar").generate(6).expect("generate");
    let config = SamplerConfig {
        questions_per_template: 3,
        ..config(&db, DifficultyTier::Hard)
    }
    .with_valid_only(true);

    let records = generate_records(&db, &templates, &config, 2024, true).expect("records");
    assert!(!records.is_empty());

    let canonical: BTreeSet<String> = templates.iter().map(|t| t.question.to_string()).collect();
    for record in &records {
        assert!(canonical.contains(&record.template));
        assert!(!record.answer.is_empty());
        assert_eq!(record.assignment.len(), record.template.matches('<').count());

        let line = serde_json::to_string(record).expect("serialize");
        assert!(!line.contains('\n'));
        let back: QaRecord = serde_json::from_str(&line).expect("deserialize");
        assert_eq!(&back, record);
    }
}

#[test]
fn test_record_query_is_an_ordered_clause_list() {
    let db = family();
    let templates = TemplateGenerator::v1().expect("grammar").generate(8).expect("generate");
    let pair = find(&templates, "How many <relation_plural> does the <relation> of <name> have?");
    let config = SamplerConfig {
        questions_per_template: 4,
        max_attempts: 64,
        ..config(&db, DifficultyTier::Easy)
    }
    .with_valid_only(true);

    let records = generate_records(&db, std::slice::from_ref(pair), &config, 7, false).expect("records");
    assert!(!records.is_empty());
    for record in &records {
        let json = serde_json::to_value(record).expect("serialize");
        let clauses: Vec<String> = json["query"]
            .as_array()
            .expect("query is a JSON array")
            .iter()
            .map(|c| c.as_str().expect("clause is a string").to_string())
            .collect();
        assert_eq!(clauses, record.query);
        assert_eq!(clauses.len(), record.difficulty);

        // Outer clause first: the count, whose own commas stay inside it.
        assert!(clauses[0].starts_with("aggregate_all(count, "), "{}", clauses[0]);
        let goals: Vec<_> = clauses
            .iter()
            .map(|c| parse_goal(c).unwrap_or_else(|e| panic!("{c}: {e}")))
            .collect();
        assert!(matches!(goals[0], Goal::Count { .. }));
        assert!(matches!(goals[1], Goal::Atom(_)));
    }
}

// ============================================================================
// Custom grammars
// ============================================================================

#[test]
fn test_custom_grammar_file() {
    let grammar = parse_grammar(
        r#"
        grammar v1
        # A reduced grammar with different surface text.
        start Q
        Q      -> "Name the" Rel "of" Entity "?"
        Rel    -> <relation>
        Entity -> <name>
        "#,
    )
    .expect("grammar");
    let templates = TemplateGenerator::new(grammar).generate(3).expect("generate");
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].canonical(), "Name the <relation> of <name>?");

    let db = family();
    let config = config(&db, DifficultyTier::Easy);
    let mut rng = StdRng::seed_from_u64(3);
    let inst = instantiate(&templates[0], &db, &mut rng, true, &config);
    if let Ok(inst) = inst {
        assert!(inst.question.starts_with("Name the "));
        assert!(!execute(&db, &inst.query, false).expect("execute").answer.is_empty());
    }
}
