//! Query execution and answer extraction.

use std::collections::BTreeSet;

use factqa_store::{is_bookkeeping_var, Binding, FactStore, Goal, StoreError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::instantiate::InstantiatedQuery;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Sorted, deduplicated answer strings. Empty is a valid answer.
    pub answer: BTreeSet<String>,
    /// Intermediate bindings. For each solution in turn, its restriction to
    /// each goal's variables, goals innermost first; repeats are dropped.
    pub trace: Option<Vec<Binding>>,
}

/// Run `query` once against `store`.
pub fn execute(
    store: &dyn FactStore,
    query: &InstantiatedQuery,
    with_trace: bool,
) -> Result<Execution, StoreError> {
    let goals = query.execution_order();
    let bindings = store.query(&goals)?;
    Ok(extract(&goals, &query.answer, &bindings, with_trace))
}

/// Run many queries; each result only depends on its own query.
pub fn execute_batch(
    store: &dyn FactStore,
    queries: &[InstantiatedQuery],
    with_trace: bool,
) -> Result<Vec<Execution>, StoreError> {
    let plans: Vec<Vec<Goal>> = queries.iter().map(InstantiatedQuery::execution_order).collect();
    let results = store.query_batch(&plans)?;
    Ok(plans
        .par_iter()
        .zip(queries.par_iter())
        .zip(results.par_iter())
        .map(|((goals, query), bindings)| extract(goals, &query.answer, bindings, with_trace))
        .collect())
}

fn extract(goals: &[Goal], answer_var: &str, bindings: &[Binding], with_trace: bool) -> Execution {
    let answer = bindings
        .iter()
        .filter_map(|b| b.get(answer_var))
        .map(|v| v.to_answer_string())
        .collect();

    let trace = with_trace.then(|| solution_trace(goals, bindings));
    Execution { answer, trace }
}

/// Every binding restricted to each goal's visible variables, first
/// occurrence kept.
fn solution_trace(goals: &[Goal], bindings: &[Binding]) -> Vec<Binding> {
    let scopes: Vec<Vec<&str>> = goals
        .iter()
        .map(|g| {
            g.variables()
                .into_iter()
                .filter(|v| !is_bookkeeping_var(v))
                .collect()
        })
        .collect();

    let mut trace: Vec<Binding> = Vec::new();
    for binding in bindings {
        for scope in &scopes {
            let restricted: Binding = scope
                .iter()
                .filter_map(|v| binding.get(*v).map(|value| (v.to_string(), value.clone())))
                .collect();
            if !restricted.is_empty() && !trace.contains(&restricted) {
                trace.push(restricted);
            }
        }
    }
    trace
}
