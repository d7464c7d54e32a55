//! Sampler configuration.
//!
//! Defaults describe a family-tree vocabulary. Everything is serde-loadable so
//! a run can be pinned to a JSON file; missing fields fall back to the
//! defaults.

use std::collections::BTreeMap;

use factqa_grammar::PlaceholderKind;
use factqa_store::FactStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    /// Base relations only.
    #[default]
    Easy,
    /// Base relations plus derived ones (grandparent, cousin, ...).
    Hard,
}

impl std::str::FromStr for DifficultyTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(DifficultyTier::Easy),
            "hard" => Ok(DifficultyTier::Hard),
            other => Err(format!("unknown difficulty tier `{other}` (expected easy or hard)")),
        }
    }
}

/// Surface forms of a predicate in question text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationAlias {
    pub singular: Option<String>,
    pub plural: Option<String>,
}

impl RelationAlias {
    pub fn singular(s: &str) -> Self {
        Self {
            singular: Some(s.to_string()),
            plural: None,
        }
    }

    pub fn plural(p: &str) -> Self {
        Self {
            singular: None,
            plural: Some(p.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub tier: DifficultyTier,
    pub easy_relations: Vec<String>,
    pub hard_relations: Vec<String>,
    pub attributes: Vec<String>,
    pub aliases: BTreeMap<String, RelationAlias>,
    pub valid_only: bool,
    pub max_attempts: usize,
    pub questions_per_template: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let aliases = [
            ("dob", RelationAlias::singular("date of birth")),
            ("child", RelationAlias::plural("children")),
            ("grandchild", RelationAlias::plural("grandchildren")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            tier: DifficultyTier::Easy,
            easy_relations: strings(&["parent", "child", "sibling", "spouse"]),
            hard_relations: strings(&[
                "grandparent",
                "grandchild",
                "aunt",
                "uncle",
                "niece",
                "nephew",
                "cousin",
            ]),
            attributes: strings(&["job", "hobby", "dob", "gender"]),
            aliases,
            valid_only: false,
            max_attempts: 10,
            questions_per_template: 1,
        }
    }
}

impl SamplerConfig {
    pub fn with_tier(mut self, tier: DifficultyTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_valid_only(mut self, valid_only: bool) -> Self {
        self.valid_only = valid_only;
        self
    }

    /// Relations available at the configured tier.
    pub fn relations(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.easy_relations.iter().map(String::as_str).collect();
        if self.tier == DifficultyTier::Hard {
            out.extend(self.hard_relations.iter().map(String::as_str));
        }
        out
    }

    /// Candidate predicate names for a predicate placeholder kind.
    ///
    /// Argument kinds have no configured pool.
    pub fn pool_for(&self, kind: PlaceholderKind) -> Vec<&str> {
        match kind {
            PlaceholderKind::Relation | PlaceholderKind::RelationPlural => self.relations(),
            PlaceholderKind::AttributeName => self.attributes.iter().map(String::as_str).collect(),
            PlaceholderKind::AttributeValue | PlaceholderKind::EntityName => Vec::new(),
        }
    }

    /// How `value` reads in a question at a `kind` slot.
    pub fn surface_form(&self, kind: PlaceholderKind, value: &str) -> String {
        let alias = self.aliases.get(value);
        match kind {
            PlaceholderKind::Relation | PlaceholderKind::AttributeName => alias
                .and_then(|a| a.singular.clone())
                .unwrap_or_else(|| value.to_string()),
            PlaceholderKind::RelationPlural => match alias {
                Some(RelationAlias {
                    plural: Some(plural),
                    ..
                }) => plural.clone(),
                Some(RelationAlias {
                    singular: Some(singular),
                    ..
                }) => format!("{singular}s"),
                _ => format!("{value}s"),
            },
            PlaceholderKind::AttributeValue | PlaceholderKind::EntityName => value.to_string(),
        }
    }

    /// Drop vocabulary the store does not declare.
    pub fn retain_known(&mut self, store: &dyn FactStore) {
        let known = store.predicates();
        let mut dropped: Vec<String> = Vec::new();
        for list in [&mut self.easy_relations, &mut self.hard_relations, &mut self.attributes] {
            list.retain(|p| {
                let keep = known.binary_search(p).is_ok();
                if !keep {
                    dropped.push(p.clone());
                }
                keep
            });
        }
        if !dropped.is_empty() {
            debug!(?dropped, "vocabulary not declared by the fact store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factqa_store::FactDb;

    #[test]
    fn tiers_extend_the_relation_pool() {
        let easy = SamplerConfig::default();
        let hard = SamplerConfig::default().with_tier(DifficultyTier::Hard);
        assert_eq!(easy.pool_for(PlaceholderKind::Relation).len(), 4);
        assert!(hard.pool_for(PlaceholderKind::RelationPlural).contains(&"cousin"));
        assert!(easy.pool_for(PlaceholderKind::EntityName).is_empty());
    }

    #[test]
    fn surface_forms_use_aliases() {
        let config = SamplerConfig::default();
        assert_eq!(config.surface_form(PlaceholderKind::AttributeName, "dob"), "date of birth");
        assert_eq!(config.surface_form(PlaceholderKind::RelationPlural, "child"), "children");
        assert_eq!(config.surface_form(PlaceholderKind::RelationPlural, "parent"), "parents");
        assert_eq!(config.surface_form(PlaceholderKind::Relation, "child"), "child");
        assert_eq!(config.surface_form(PlaceholderKind::EntityName, "dob"), "dob");
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: SamplerConfig =
            serde_json::from_str(r#"{ "tier": "hard", "attributes": ["job"] }"#).unwrap();
        assert_eq!(config.tier, DifficultyTier::Hard);
        assert_eq!(config.attributes, vec!["job"]);
        assert_eq!(config.easy_relations, SamplerConfig::default().easy_relations);
    }

    #[test]
    fn retain_known_filters_by_store() {
        let mut db = FactDb::new();
        db.add_relation("parent", "ana", "bob").unwrap();
        db.add_attribute("job", "ana", "baker").unwrap();

        let mut config = SamplerConfig::default().with_tier(DifficultyTier::Hard);
        config.retain_known(&db);
        assert_eq!(config.relations(), vec!["parent"]);
        assert_eq!(config.attributes, vec!["job"]);
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("HARD".parse::<DifficultyTier>(), Ok(DifficultyTier::Hard));
        assert!("medium".parse::<DifficultyTier>().is_err());
    }
}
