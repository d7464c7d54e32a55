//! JSON fact files.
//!
//! ```json
//! {
//!   "entities": ["ana", "bob", "cleo"],
//!   "relations": { "parent": [["ana", "bob"], ["ana", "cleo"]] },
//!   "attributes": { "job": [["ana", "baker"]] },
//!   "derived": [
//!     { "kind": "compose", "name": "grandparent", "first": "parent", "second": "parent" },
//!     { "kind": "inverse", "name": "child", "of": "parent" }
//!   ]
//! }
//! ```
//!
//! Pairs are `[subject, object]`: `parent: [["ana", "bob"]]` reads "bob is
//! the parent of ana". Derived relations are materialized in file order, so
//! later entries may build on earlier ones.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{FactDb, PredicateKind};
use crate::error::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FactFile {
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub relations: BTreeMap<String, Vec<(String, String)>>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<(String, String)>>,
    #[serde(default)]
    pub derived: Vec<DerivedRelation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivedRelation {
    /// `name(X, Z) :- first(X, Y), second(Y, Z)`
    Compose {
        name: String,
        first: String,
        second: String,
    },
    /// `name(X, Y) :- of(Y, X)`
    Inverse { name: String, of: String },
}

impl DerivedRelation {
    pub fn name(&self) -> &str {
        match self {
            DerivedRelation::Compose { name, .. } | DerivedRelation::Inverse { name, .. } => name,
        }
    }
}

impl FactDb {
    pub fn from_fact_file(file: &FactFile) -> Result<Self, StoreError> {
        let mut db = FactDb::new();
        for name in &file.entities {
            db.add_entity(name);
        }
        for (predicate, pairs) in &file.relations {
            db.declare(predicate, PredicateKind::Relation)?;
            for (subject, object) in pairs {
                db.add_relation(predicate, subject, object)?;
            }
        }
        for (predicate, pairs) in &file.attributes {
            db.declare(predicate, PredicateKind::Attribute)
                .map_err(|e| StoreError::FactFile(format!("attribute `{predicate}`: {e}")))?;
            for (subject, value) in pairs {
                db.add_attribute(predicate, subject, value)?;
            }
        }
        for rule in &file.derived {
            let result = match rule {
                DerivedRelation::Compose { name, first, second } => db.derive_composition(name, first, second),
                DerivedRelation::Inverse { name, of } => db.derive_inverse(name, of),
            };
            result.map_err(|e| StoreError::FactFile(format!("derived relation `{}`: {e}", rule.name())))?;
        }
        Ok(db)
    }

    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        let file: FactFile = serde_json::from_str(json)?;
        Self::from_fact_file(&file)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let db = Self::from_json_str(&text)?;
        info!(
            path = %path.display(),
            facts = db.fact_count(),
            "loaded fact file"
        );
        Ok(db)
    }
}
