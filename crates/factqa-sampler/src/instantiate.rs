//! Placeholder instantiation.
//!
//! Fragments are resolved innermost first, so every choice can be checked
//! against the part of the query that is already concrete:
//!
//! 1. entity arguments are drawn uniformly from the store's entities,
//! 2. the predicate is drawn from the configured vocabulary,
//! 3. attribute values are drawn from the values of the chosen attribute.
//!
//! In `valid_only` mode steps 2 and 3 only keep candidates for which the
//! suffix query (this fragment through the innermost one) still has a
//! solution. Slots of the current fragment that are not chosen yet stand in
//! as bookkeeping variables during that check.

use std::collections::BTreeMap;

use factqa_grammar::{
    Arg, PlaceholderKind, PlaceholderTag, PredicateSlot, QueryFragment, TemplatePair,
};
use factqa_store::{render_query, Atom, FactStore, Goal, Term};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::SamplerConfig;
use crate::error::{InstantiationError, SamplerError};

/// A fully instantiated query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantiatedQuery {
    /// Outer → inner, in generation order.
    pub goals: Vec<Goal>,
    pub answer: String,
}

impl InstantiatedQuery {
    /// Goals innermost first: the order they are executed in.
    pub fn execution_order(&self) -> Vec<Goal> {
        self.goals.iter().rev().cloned().collect()
    }

    /// One literal clause per goal, in generation order.
    pub fn clauses(&self) -> Vec<String> {
        self.goals.iter().map(Goal::to_string).collect()
    }

    pub fn text(&self) -> String {
        render_query(&self.goals)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instantiation {
    pub assignment: BTreeMap<PlaceholderTag, String>,
    pub question: String,
    pub query: InstantiatedQuery,
}

impl Instantiation {
    /// Assignment keyed by the tag's text form (`<name>_2`).
    pub fn assignment_strings(&self) -> BTreeMap<String, String> {
        self.assignment
            .iter()
            .map(|(tag, value)| (tag.to_string(), value.clone()))
            .collect()
    }
}

/// Resolve every placeholder of `pair` against `store`.
pub fn instantiate<R: Rng + ?Sized>(
    pair: &TemplatePair,
    store: &dyn FactStore,
    rng: &mut R,
    valid_only: bool,
    config: &SamplerConfig,
) -> Result<Instantiation, SamplerError> {
    pair.query.check_dependency_order(&pair.question.to_string())?;

    let mut sweep = Sweep {
        store,
        valid_only,
        fragments: pair.query.fragments.clone(),
        assignment: BTreeMap::new(),
        entities: None,
    };

    for index in (0..sweep.fragments.len()).rev() {
        let original = &pair.query.fragments[index];

        for tag in original.arg_placeholders() {
            if tag.kind == PlaceholderKind::EntityName {
                let value = sweep.draw_entity(rng)?;
                sweep.assign(tag, value);
            }
        }

        if let Some(tag) = original.predicate_placeholder() {
            if !tag.kind.is_predicate() {
                return Err(InstantiationError::UnsupportedPlaceholder { tag }.into());
            }
            let pool = config.pool_for(tag.kind);
            if pool.is_empty() {
                return Err(InstantiationError::EmptyVocabulary { kind: tag.kind }.into());
            }
            let pool = pool.into_iter().map(str::to_string).collect();
            let value = sweep.draw_checked(index, tag, pool, rng)?;
            sweep.assign(tag, value);
        }

        for tag in original.arg_placeholders() {
            match tag.kind {
                PlaceholderKind::EntityName => {}
                PlaceholderKind::AttributeValue => {
                    let attribute = match original.predicate_placeholder() {
                        Some(p) if p.kind == PlaceholderKind::AttributeName => {
                            sweep.fragments[index].predicate_name().map(str::to_string)
                        }
                        _ => None,
                    };
                    let Some(attribute) = attribute else {
                        return Err(InstantiationError::UnsupportedPlaceholder { tag }.into());
                    };
                    let values = store.predicate_values(&attribute)?;
                    let value = sweep.draw_checked(index, tag, values, rng)?;
                    sweep.assign(tag, value);
                }
                _ => return Err(InstantiationError::UnsupportedPlaceholder { tag }.into()),
            }
        }
    }

    let goals = sweep
        .fragments
        .iter()
        .map(|f| to_goal(f, false))
        .collect::<Result<Vec<_>, _>>()?;

    let question = pair.question.render_with(|tag| match sweep.assignment.get(tag) {
        Some(value) => config.surface_form(tag.kind, value),
        None => tag.to_string(),
    });
    if let Some(open) = pair.question.tags().into_iter().find(|t| !sweep.assignment.contains_key(t)) {
        return Err(InstantiationError::Unresolved { tag: open }.into());
    }

    Ok(Instantiation {
        assignment: sweep.assignment,
        question,
        query: InstantiatedQuery {
            goals,
            answer: pair.query.answer.clone(),
        },
    })
}

/// State of one backward sweep.
struct Sweep<'a> {
    store: &'a dyn FactStore,
    valid_only: bool,
    fragments: Vec<QueryFragment>,
    assignment: BTreeMap<PlaceholderTag, String>,
    entities: Option<Vec<String>>,
}

impl Sweep<'_> {
    fn assign(&mut self, tag: PlaceholderTag, value: String) {
        trace!(%tag, value = %value, "sampled placeholder");
        for fragment in &mut self.fragments {
            fragment.substitute(&tag, &value);
        }
        // A tag is only ever visited once per sweep.
        self.assignment.entry(tag).or_insert(value);
    }

    fn draw_entity<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<String, SamplerError> {
        let store = self.store;
        let entities = self.entities.get_or_insert_with(|| store.entities());
        pick(entities, rng).ok_or_else(|| InstantiationError::EmptyEntitySet.into())
    }

    /// Uniform draw from `candidates`, filtered by the suffix check in
    /// `valid_only` mode.
    fn draw_checked<R: Rng + ?Sized>(
        &self,
        index: usize,
        tag: PlaceholderTag,
        candidates: Vec<String>,
        rng: &mut R,
    ) -> Result<String, SamplerError> {
        let candidates = if self.valid_only {
            let mut kept = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                if self.suffix_has_solution(index, &tag, &candidate)? {
                    kept.push(candidate);
                }
            }
            kept
        } else {
            candidates
        };
        pick(&candidates, rng).ok_or_else(|| InstantiationError::EmptyCandidatePool { tag }.into())
    }

    fn suffix_has_solution(&self, index: usize, tag: &PlaceholderTag, candidate: &str) -> Result<bool, SamplerError> {
        let mut goals = Vec::with_capacity(self.fragments.len() - index);
        for fragment in self.fragments[index..].iter().rev() {
            let mut fragment = fragment.clone();
            fragment.substitute(tag, candidate);
            goals.push(check_goal(&fragment)?);
        }
        Ok(self.store.has_solution(&goals)?)
    }
}

/// Uniform draw.
fn pick<R: Rng + ?Sized>(items: &[String], rng: &mut R) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    Some(items[rng.gen_range(0..items.len())].clone())
}

fn to_term(arg: &Arg, open: bool) -> Result<Term, InstantiationError> {
    match arg {
        Arg::Var(v) => Ok(Term::Var(v.clone())),
        Arg::Literal(value) => Ok(Term::Const(value.clone())),
        Arg::Placeholder(tag) if open => Ok(Term::Var(tag.open_variable())),
        Arg::Placeholder(tag) => Err(InstantiationError::Unresolved { tag: *tag }),
    }
}

fn predicate_of(fragment: &QueryFragment) -> Result<String, InstantiationError> {
    match fragment.predicate() {
        PredicateSlot::Name(name) => Ok(name.clone()),
        PredicateSlot::Placeholder(tag) => Err(InstantiationError::Unresolved { tag: *tag }),
    }
}

/// Convert a resolved fragment into a store goal. With `open`, argument
/// placeholders become bookkeeping variables.
fn to_goal(fragment: &QueryFragment, open: bool) -> Result<Goal, InstantiationError> {
    let predicate = predicate_of(fragment)?;
    match fragment {
        QueryFragment::Apply { subject, object, .. } => Ok(Goal::Atom(Atom::new(
            predicate,
            to_term(subject, open)?,
            to_term(object, open)?,
        ))),
        QueryFragment::Count {
            subject,
            counted,
            result,
            ..
        } => Ok(Goal::Count {
            counted: counted.clone(),
            atom: Atom::new(predicate, to_term(subject, open)?, Term::Var(counted.clone())),
            result: result.clone(),
        }),
    }
}

/// Goal used by the `valid_only` check. A count always succeeds, so it is
/// checked as the plain goal it counts: a question only counts things that
/// exist.
fn check_goal(fragment: &QueryFragment) -> Result<Goal, InstantiationError> {
    match to_goal(fragment, true)? {
        Goal::Count { atom, .. } => Ok(Goal::Atom(atom)),
        goal => Ok(goal),
    }
}
