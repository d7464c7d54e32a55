use std::collections::BTreeSet;

use factqa_grammar::{TemplateGenerator, TemplatePair};
use factqa_sampler::{
    execute, generate_records, instantiate, sample_with_retries, DifficultyTier, SamplerConfig,
    SamplerError,
};
use factqa_store::{FactDb, FactStore, Value};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

const FAMILY: &str = r#"{
    "entities": ["ana", "bob", "cleo", "dora", "eli"],
    "relations": {
        "parent": [["ana", "bob"], ["ana", "cleo"], ["bob", "dora"], ["cleo", "eli"]],
        "sibling": [["bob", "cleo"], ["cleo", "bob"]],
        "spouse": [["dora", "eli"], ["eli", "dora"]]
    },
    "attributes": {
        "job": [["ana", "baker"], ["bob", "pilot"], ["cleo", "pilot"], ["dora", "nurse"]],
        "hobby": [["ana", "chess"], ["eli", "rowing"]]
    },
    "derived": [
        { "kind": "inverse", "name": "child", "of": "parent" },
        { "kind": "compose", "name": "grandparent", "first": "parent", "second": "parent" }
    ]
}"#;

fn family() -> FactDb {
    FactDb::from_json_str(FAMILY).expect("fact file")
}

fn scenario() -> FactDb {
    FactDb::from_json_str(
        r#"{
            "entities": ["ana", "bob", "cleo"],
            "relations": { "parent": [["ana", "bob"], ["ana", "cleo"]] },
            "attributes": { "job": [["ana", "baker"]] }
        }"#,
    )
    .expect("fact file")
}

fn templates(depth: usize) -> Vec<TemplatePair> {
    TemplateGenerator::v1()
        .expect("grammar")
        .generate(depth)
        .expect("generate")
}

fn template(depth: usize, canonical: &str) -> TemplatePair {
    templates(depth)
        .into_iter()
        .find(|t| t.canonical() == canonical)
        .unwrap_or_else(|| panic!("missing `{canonical}`"))
}

fn known_config(store: &dyn FactStore, tier: DifficultyTier) -> SamplerConfig {
    let mut config = SamplerConfig::default().with_tier(tier);
    config.retain_known(store);
    config
}

fn answers(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[test]
fn who_is_the_parent_of_ana() {
    let db = scenario();
    let pair = template(5, "Who is the <relation> of <name>?");
    let config = known_config(&db, DifficultyTier::Easy);

    let mut found = false;
    for seed in 0..64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let Ok(inst) = instantiate(&pair, &db, &mut rng, true, &config) else {
            continue;
        };
        assert_eq!(inst.question, "Who is the parent of ana?");
        assert_eq!(inst.query.text(), "parent(\"ana\", Y_3)");
        let run = execute(&db, &inst.query, true).expect("execute");
        assert_eq!(run.answer, answers(&["bob", "cleo"]));
        found = true;
    }
    assert!(found);
}

#[test]
fn how_many_parents_does_ana_have() {
    let db = scenario();
    let pair = template(5, "How many <relation_plural> does <name> have?");
    let config = SamplerConfig {
        max_attempts: 64,
        ..known_config(&db, DifficultyTier::Easy)
    }
    .with_valid_only(true);

    let mut rng = StdRng::seed_from_u64(5);
    let record = sample_with_retries(&pair, &db, &mut rng, &config, true)
        .expect("sample")
        .expect("ana is the only entity with parents");
    assert_eq!(record.question, "How many parents does ana have?");
    assert_eq!(record.answer, vec!["2"]);
    assert_eq!(
        record.query,
        vec!["aggregate_all(count, Y_4, parent(\"ana\", Y_4), Count_4)".to_string()]
    );

    let last = record
        .solution_traces
        .as_ref()
        .and_then(|t| t.last())
        .expect("trace");
    assert_eq!(last["Y_4"], Value::Set(answers(&["bob", "cleo"])));
    assert_eq!(last["Count_4"], Value::Count(2));
}

#[test]
fn hard_tier_reaches_derived_relations() {
    let db = family();
    let pair = template(5, "Who is the <relation> of <name>?");
    let config = known_config(&db, DifficultyTier::Hard);
    assert!(config.relations().contains(&"grandparent"));

    let used: BTreeSet<String> = (0..200)
        .filter_map(|seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            instantiate(&pair, &db, &mut rng, false, &config).ok()
        })
        .filter_map(|inst| inst.query.goals.first().map(|g| g.predicate().to_string()))
        .collect();
    assert!(used.contains("grandparent"), "{used:?}");
}

#[test]
fn unknown_vocabulary_is_a_store_error() {
    let db = scenario();
    let pair = template(5, "Who is the <relation> of <name>?");
    let config = SamplerConfig {
        easy_relations: vec!["cousin".to_string()],
        ..SamplerConfig::default()
    }
    .with_valid_only(true);
    let mut rng = StdRng::seed_from_u64(0);
    let err = sample_with_retries(&pair, &db, &mut rng, &config, false).unwrap_err();
    assert!(matches!(err, SamplerError::Store(_)));
}

#[test]
fn batches_are_reproducible() {
    let db = family();
    let config = SamplerConfig {
        questions_per_template: 2,
        ..known_config(&db, DifficultyTier::Hard)
    };
    let pool = templates(7);
    let a = generate_records(&db, &pool, &config, 42, true).expect("records");
    let b = generate_records(&db, &pool, &config, 42, true).expect("records");
    assert_eq!(a, b);
    assert_eq!(a.len(), pool.len() * 2);
}

#[test]
fn valid_only_batches_only_have_answers() {
    let db = family();
    let config = known_config(&db, DifficultyTier::Easy).with_valid_only(true);
    let records = generate_records(&db, &templates(7), &config, 7, false).expect("records");
    assert!(!records.is_empty());
    for record in records {
        assert!(!record.answer.is_empty(), "{}", record.question);
        assert!(!record.question.contains('<'), "{}", record.question);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn unrestricted_sampling_always_instantiates(seed in any::<u64>(), index in 0usize..64) {
        let db = family();
        let pool = templates(7);
        let pair = &pool[index % pool.len()];
        let config = known_config(&db, DifficultyTier::Hard);
        let mut rng = StdRng::seed_from_u64(seed);
        let inst = instantiate(pair, &db, &mut rng, false, &config)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(inst.assignment.len(), pair.question.tags().len());
    }

    #[test]
    fn valid_only_successes_have_answers(seed in any::<u64>(), index in 0usize..64) {
        let db = family();
        let pool = templates(7);
        let pair = &pool[index % pool.len()];
        let config = known_config(&db, DifficultyTier::Hard);
        let mut rng = StdRng::seed_from_u64(seed);
        if let Ok(inst) = instantiate(pair, &db, &mut rng, true, &config) {
            let run = execute(&db, &inst.query, false).expect("execute");
            prop_assert!(!run.answer.is_empty(), "{}", inst.question);
        }
    }

    #[test]
    fn execution_is_idempotent(seed in any::<u64>(), index in 0usize..64) {
        let db = family();
        let pool = templates(7);
        let pair = &pool[index % pool.len()];
        let config = known_config(&db, DifficultyTier::Easy);
        let mut rng = StdRng::seed_from_u64(seed);
        let inst = instantiate(pair, &db, &mut rng, false, &config).expect("instantiate");
        let first = execute(&db, &inst.query, true).expect("execute");
        let second = execute(&db, &inst.query, true).expect("execute");
        prop_assert_eq!(first, second);
    }
}
