use std::collections::BTreeMap;

use factqa_grammar::TemplatePair;
use factqa_store::Binding;
use serde::{Deserialize, Serialize};

use crate::execute::Execution;
use crate::instantiate::Instantiation;

/// One labeled question-answer item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaRecord {
    /// The question template with tagged placeholders (`<relation>_2`).
    pub template: String,
    pub question: String,
    /// Instantiated clauses, outer to inner.
    pub query: Vec<String>,
    pub answer: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution_traces: Option<Vec<Binding>>,
    /// Number of subquery fragments.
    pub difficulty: usize,
    pub assignment: BTreeMap<String, String>,
}

impl QaRecord {
    pub fn new(pair: &TemplatePair, instantiation: &Instantiation, execution: Execution) -> Self {
        Self {
            template: pair.question.to_string(),
            question: instantiation.question.clone(),
            query: instantiation.query.clauses(),
            answer: execution.answer.into_iter().collect(),
            solution_traces: execution.trace,
            difficulty: pair.difficulty(),
            assignment: instantiation.assignment_strings(),
        }
    }
}
