//! In-memory fact database.
//!
//! Every name and value is interned once; a predicate table keeps its pairs
//! twice, indexed by subject (forward) and by object (backward), so a goal
//! with either side bound is a single bitmap lookup.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use rayon::prelude::*;
use roaring::RoaringBitmap;
use tracing::debug;

use crate::error::StoreError;
use crate::goal::{Atom, Binding, Goal, Term, Value};
use crate::interner::{StrId, StringInterner};
use crate::FactStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateKind {
    /// Entity → entity.
    Relation,
    /// Entity → literal value.
    Attribute,
}

impl PredicateKind {
    fn as_str(self) -> &'static str {
        match self {
            PredicateKind::Relation => "relation",
            PredicateKind::Attribute => "attribute",
        }
    }
}

#[derive(Debug, Clone)]
struct PredicateTable {
    kind: PredicateKind,
    forward: BTreeMap<u32, RoaringBitmap>,
    backward: BTreeMap<u32, RoaringBitmap>,
    len: u64,
}

impl PredicateTable {
    fn new(kind: PredicateKind) -> Self {
        Self {
            kind,
            forward: BTreeMap::new(),
            backward: BTreeMap::new(),
            len: 0,
        }
    }

    fn insert(&mut self, subject: u32, object: u32) -> bool {
        let fresh = self.forward.entry(subject).or_default().insert(object);
        if fresh {
            self.backward.entry(object).or_default().insert(subject);
            self.len += 1;
        }
        fresh
    }

    fn objects_of(&self, subject: u32) -> Option<&RoaringBitmap> {
        self.forward.get(&subject)
    }

    fn subjects_of(&self, object: u32) -> Option<&RoaringBitmap> {
        self.backward.get(&object)
    }

    fn contains(&self, subject: u32, object: u32) -> bool {
        self.forward
            .get(&subject)
            .is_some_and(|objects| objects.contains(object))
    }

    fn pairs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.forward
            .iter()
            .flat_map(|(&s, objects)| objects.iter().map(move |o| (s, o)))
    }
}

/// A binary-predicate fact database.
#[derive(Debug, Default)]
pub struct FactDb {
    interner: StringInterner,
    entities: RoaringBitmap,
    predicates: AHashMap<StrId, PredicateTable>,
}

impl FactDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, name: &str) -> StrId {
        let id = self.interner.intern(name);
        self.entities.insert(id.raw());
        id
    }

    /// Declare `name` with `kind`. Re-declaring with the same kind is a no-op.
    pub fn declare(&mut self, name: &str, kind: PredicateKind) -> Result<(), StoreError> {
        let id = self.interner.intern(name);
        let table = self
            .predicates
            .entry(id)
            .or_insert_with(|| PredicateTable::new(kind));
        if table.kind != kind {
            return Err(StoreError::KindMismatch {
                predicate: name.to_string(),
                declared: table.kind.as_str(),
                requested: kind.as_str(),
            });
        }
        Ok(())
    }

    /// Record `predicate(subject, object)`: `object` is the `predicate` of
    /// `subject`. Both sides become entities.
    pub fn add_relation(&mut self, predicate: &str, subject: &str, object: &str) -> Result<(), StoreError> {
        let s = self.add_entity(subject);
        let o = self.add_entity(object);
        self.insert(predicate, PredicateKind::Relation, s, o)
    }

    /// Record `predicate(subject, value)` for a literal value.
    pub fn add_attribute(&mut self, predicate: &str, subject: &str, value: &str) -> Result<(), StoreError> {
        let s = self.add_entity(subject);
        let v = self.interner.intern(value);
        self.insert(predicate, PredicateKind::Attribute, s, v)
    }

    fn insert(
        &mut self,
        predicate: &str,
        kind: PredicateKind,
        subject: StrId,
        object: StrId,
    ) -> Result<(), StoreError> {
        self.declare(predicate, kind)?;
        let id = self.interner.intern(predicate);
        if let Some(table) = self.predicates.get_mut(&id) {
            table.insert(subject.raw(), object.raw());
        }
        Ok(())
    }

    fn table(&self, predicate: &str) -> Result<&PredicateTable, StoreError> {
        self.interner
            .id_of(predicate)
            .and_then(|id| self.predicates.get(&id))
            .ok_or_else(|| StoreError::UnknownPredicate(predicate.to_string()))
    }

    fn relation_table(&self, predicate: &str) -> Result<&PredicateTable, StoreError> {
        let table = self.table(predicate)?;
        if table.kind != PredicateKind::Relation {
            return Err(StoreError::KindMismatch {
                predicate: predicate.to_string(),
                declared: table.kind.as_str(),
                requested: PredicateKind::Relation.as_str(),
            });
        }
        Ok(table)
    }

    /// Materialize `name(X, Z) :- first(X, Y), second(Y, Z)`.
    ///
    /// Returns the number of new pairs.
    pub fn derive_composition(&mut self, name: &str, first: &str, second: &str) -> Result<u64, StoreError> {
        let first_table = self.relation_table(first)?;
        let second_table = self.relation_table(second)?;

        let mut derived: Vec<(u32, u32)> = Vec::new();
        for (x, y) in first_table.pairs() {
            if let Some(zs) = second_table.objects_of(y) {
                // A composition never relates an entity to itself (a sibling's
                // sibling is not yourself).
                derived.extend(zs.iter().filter(|&z| z != x).map(|z| (x, z)));
            }
        }
        self.extend_derived(name, derived)
    }

    /// Materialize `name(X, Y) :- base(Y, X)`.
    pub fn derive_inverse(&mut self, name: &str, base: &str) -> Result<u64, StoreError> {
        let derived: Vec<(u32, u32)> = self.relation_table(base)?.pairs().map(|(s, o)| (o, s)).collect();
        self.extend_derived(name, derived)
    }

    fn extend_derived(&mut self, name: &str, pairs: Vec<(u32, u32)>) -> Result<u64, StoreError> {
        self.declare(name, PredicateKind::Relation)?;
        let id = self.interner.intern(name);
        let mut added = 0;
        if let Some(table) = self.predicates.get_mut(&id) {
            for (s, o) in pairs {
                if table.insert(s, o) {
                    added += 1;
                }
            }
        }
        debug!(predicate = name, added, "derived relation");
        Ok(added)
    }

    pub fn predicate_kind(&self, predicate: &str) -> Option<PredicateKind> {
        self.table(predicate).ok().map(|t| t.kind)
    }

    /// Declared predicates of `kind`, sorted.
    pub fn predicates_of_kind(&self, kind: PredicateKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .predicates
            .iter()
            .filter(|(_, table)| table.kind == kind)
            .filter_map(|(id, _)| self.interner.resolve(*id))
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    /// Number of stored pairs across all predicates.
    pub fn fact_count(&self) -> u64 {
        self.predicates.values().map(|t| t.len).sum()
    }

    fn name(&self, id: u32) -> String {
        self.interner
            .resolve(StrId::new(id))
            .unwrap_or_default()
            .to_string()
    }

    // ------------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------------

    fn check_goals(&self, goals: &[Goal]) -> Result<(), StoreError> {
        for goal in goals {
            self.table(goal.predicate())?;
            if let Goal::Count { counted, atom, result } = goal {
                let mentions = |v: &str| atom.subject.as_var() == Some(v) || atom.object.as_var() == Some(v);
                if !mentions(counted) {
                    return Err(StoreError::MalformedGoal {
                        goal: goal.to_string(),
                        reason: format!("counted variable `{counted}` does not occur in the counted goal"),
                    });
                }
                if counted == result || mentions(result) {
                    return Err(StoreError::MalformedGoal {
                        goal: goal.to_string(),
                        reason: format!("result variable `{result}` must be fresh"),
                    });
                }
            }
        }
        Ok(())
    }

    fn solve(&self, goals: &[Goal], binding: Binding, out: &mut Vec<Binding>) -> Result<(), StoreError> {
        let Some((goal, rest)) = goals.split_first() else {
            out.push(binding);
            return Ok(());
        };

        match goal {
            Goal::Atom(atom) => {
                for next in self.match_atom(atom, &binding)? {
                    self.solve(rest, next, out)?;
                }
            }
            Goal::Count { counted, atom, result } => {
                if binding.contains_key(counted) {
                    return Err(StoreError::MalformedGoal {
                        goal: goal.to_string(),
                        reason: format!("counted variable `{counted}` is already bound"),
                    });
                }
                let counted_values: BTreeSet<String> = self
                    .match_atom(atom, &binding)?
                    .into_iter()
                    .filter_map(|b| match b.get(counted) {
                        Some(Value::Atom(s)) => Some(s.clone()),
                        _ => None,
                    })
                    .collect();
                let count = Value::Count(counted_values.len());
                if let Some(existing) = binding.get(result) {
                    if *existing != count {
                        return Ok(());
                    }
                }
                let mut next = binding;
                next.insert(counted.clone(), Value::Set(counted_values));
                next.insert(result.clone(), count);
                self.solve(rest, next, out)?;
            }
        }
        Ok(())
    }

    /// Every extension of `binding` that satisfies `atom`.
    fn match_atom(&self, atom: &Atom, binding: &Binding) -> Result<Vec<Binding>, StoreError> {
        let table = self.table(&atom.predicate)?;

        // `None` means the term is bound to something that cannot occur in
        // this table, so the atom has no matches.
        let resolve = |term: &Term| -> Option<Option<u32>> {
            match term {
                Term::Const(c) => self.interner.id_of(c).map(|id| Some(id.raw())),
                Term::Var(v) => match binding.get(v) {
                    None => Some(None),
                    Some(Value::Atom(s)) => self.interner.id_of(s).map(|id| Some(id.raw())),
                    Some(_) => None,
                },
            }
        };
        let (Some(subject), Some(object)) = (resolve(&atom.subject), resolve(&atom.object)) else {
            return Ok(Vec::new());
        };

        let bind = |s: u32, o: u32| -> Option<Binding> {
            let mut next = binding.clone();
            for (term, id) in [(&atom.subject, s), (&atom.object, o)] {
                if let Term::Var(v) = term {
                    let value = Value::Atom(self.name(id));
                    match next.get(v) {
                        Some(existing) if *existing != value => return None,
                        Some(_) => {}
                        None => {
                            next.insert(v.clone(), value);
                        }
                    }
                }
            }
            Some(next)
        };

        let matches: Vec<Binding> = match (subject, object) {
            (Some(s), Some(o)) => {
                if table.contains(s, o) {
                    vec![binding.clone()]
                } else {
                    Vec::new()
                }
            }
            (Some(s), None) => table
                .objects_of(s)
                .into_iter()
                .flat_map(|objects| objects.iter())
                .filter_map(|o| bind(s, o))
                .collect(),
            (None, Some(o)) => table
                .subjects_of(o)
                .into_iter()
                .flat_map(|subjects| subjects.iter())
                .filter_map(|s| bind(s, o))
                .collect(),
            (None, None) => table.pairs().filter_map(|(s, o)| bind(s, o)).collect(),
        };
        Ok(matches)
    }
}

impl FactStore for FactDb {
    fn entities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.iter().map(|id| self.name(id)).collect();
        names.sort();
        names
    }

    fn predicates(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .predicates
            .keys()
            .filter_map(|id| self.interner.resolve(*id))
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    fn predicate_values(&self, predicate: &str) -> Result<Vec<String>, StoreError> {
        let table = self.table(predicate)?;
        let mut values: Vec<String> = table.backward.keys().map(|&id| self.name(id)).collect();
        values.sort();
        Ok(values)
    }

    fn query(&self, goals: &[Goal]) -> Result<Vec<Binding>, StoreError> {
        self.check_goals(goals)?;
        let mut out = Vec::new();
        self.solve(goals, Binding::new(), &mut out)?;
        Ok(out)
    }

    fn query_batch(&self, queries: &[Vec<Goal>]) -> Result<Vec<Vec<Binding>>, StoreError> {
        queries.par_iter().map(|goals| self.query(goals)).collect()
    }
}
