//! Template generator: a depth-bounded tree-to-tree compiler.
//!
//! Every derivation of the start symbol (with at most `depth` nested
//! nonterminal expansions) yields a question token list and, in lockstep, a
//! query shape. Query shapes are combined pairwise while sequences are
//! concatenated:
//!
//! ```text
//! "the" <relation>_2 "of" <name>_1        (sequence expanded at depth 3)
//!   Pending(<relation>_2) ⊕ Pending(<name>_1)  =>  <relation>_2(<name>_1, Y_3)
//! ```
//!
//! Depth numbering is unique along any nesting chain, so placeholder tags and
//! the `Y_<d>` / `Count_<d>` variables never collide inside one template.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::GrammarError;
use crate::grammar::{Grammar, Symbol};
use crate::template::{
    Arg, PlaceholderKind, PlaceholderTag, PredicateSlot, QueryFragment, QueryTemplate,
    QuestionTemplate, TemplatePair, Token,
};

/// Default bound on nested expansion frames. Far above any depth used in
/// practice; only a grammar-authoring mistake gets near it.
pub const DEFAULT_RECURSION_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub depth: usize,
    pub recursion_limit: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            depth: 10,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

/// Query side of a partial derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum QueryShape {
    /// Literal text, or nothing at all.
    Inert,
    /// A single placeholder with no answer variable yet.
    Pending(PlaceholderTag),
    /// A subquery chain (outer → inner) ending in `answer`.
    Answer {
        answer: String,
        chain: Vec<QueryFragment>,
    },
}

impl QueryShape {
    fn describe(&self) -> String {
        match self {
            QueryShape::Inert => "inert".to_string(),
            QueryShape::Pending(tag) => tag.to_string(),
            QueryShape::Answer { answer, chain } => {
                let text: Vec<String> = chain.iter().map(|f| f.to_string()).collect();
                format!("{} -> {answer}", text.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Derivation {
    tokens: Vec<Token>,
    query: QueryShape,
}

impl Derivation {
    fn empty() -> Self {
        Self {
            tokens: Vec::new(),
            query: QueryShape::Inert,
        }
    }
}

/// Combine a head query shape with the shape of the rest of its sequence.
fn combine(head: &QueryShape, tail: &QueryShape, depth: usize) -> Result<QueryShape, GrammarError> {
    let unsupported = || GrammarError::UnsupportedCombination {
        head: head.describe(),
        tail: tail.describe(),
    };

    let tag = match (head, tail) {
        (QueryShape::Inert, _) => return Ok(tail.clone()),
        (_, QueryShape::Inert) => return Ok(head.clone()),
        (QueryShape::Answer { .. }, _) => return Err(unsupported()),
        (QueryShape::Pending(tag), _) => *tag,
    };

    // Subject (and inner chain) supplied by the tail.
    let subject_of = |tail: &QueryShape| -> Option<(Arg, Vec<QueryFragment>)> {
        match tail {
            QueryShape::Pending(t) if t.kind == PlaceholderKind::EntityName => {
                Some((Arg::Placeholder(*t), Vec::new()))
            }
            QueryShape::Answer { answer, chain } => Some((Arg::Var(answer.clone()), chain.clone())),
            _ => None,
        }
    };

    let var = format!("Y_{depth}");
    match tag.kind {
        PlaceholderKind::RelationPlural => {
            let (subject, chain) = subject_of(tail).ok_or_else(unsupported)?;
            let result = format!("Count_{depth}");
            Ok(QueryShape::Answer {
                answer: result.clone(),
                chain: prepend(
                    QueryFragment::Count {
                        predicate: PredicateSlot::Placeholder(tag),
                        subject,
                        counted: var,
                        result,
                    },
                    chain,
                ),
            })
        }
        PlaceholderKind::Relation => {
            let (subject, chain) = subject_of(tail).ok_or_else(unsupported)?;
            Ok(QueryShape::Answer {
                answer: var.clone(),
                chain: prepend(
                    QueryFragment::Apply {
                        predicate: PredicateSlot::Placeholder(tag),
                        subject,
                        object: Arg::Var(var),
                    },
                    chain,
                ),
            })
        }
        PlaceholderKind::AttributeName => match tail {
            // "whose X is Y"
            QueryShape::Pending(value) if value.kind == PlaceholderKind::AttributeValue => {
                Ok(QueryShape::Answer {
                    answer: var.clone(),
                    chain: vec![QueryFragment::Apply {
                        predicate: PredicateSlot::Placeholder(tag),
                        subject: Arg::Var(var),
                        object: Arg::Placeholder(*value),
                    }],
                })
            }
            // "the X of ..."
            _ => {
                let (subject, chain) = subject_of(tail).ok_or_else(unsupported)?;
                Ok(QueryShape::Answer {
                    answer: var.clone(),
                    chain: prepend(
                        QueryFragment::Apply {
                            predicate: PredicateSlot::Placeholder(tag),
                            subject,
                            object: Arg::Var(var),
                        },
                        chain,
                    ),
                })
            }
        },
        PlaceholderKind::AttributeValue | PlaceholderKind::EntityName => Err(unsupported()),
    }
}

fn prepend(fragment: QueryFragment, chain: Vec<QueryFragment>) -> Vec<QueryFragment> {
    let mut out = Vec::with_capacity(chain.len() + 1);
    out.push(fragment);
    out.extend(chain);
    out
}

/// Expands a grammar into template pairs.
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
    grammar: Arc<Grammar>,
    recursion_limit: usize,
}

impl TemplateGenerator {
    pub fn new(grammar: Grammar) -> Self {
        Self {
            grammar: Arc::new(grammar),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Generator over the canonical `grammar v1`.
    pub fn v1() -> Result<Self, GrammarError> {
        Ok(Self::new(Grammar::v1()?))
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// All distinct template pairs reachable from the start symbol within
    /// `depth` nested expansions, in deterministic derivation order.
    pub fn generate(&self, depth: usize) -> Result<Vec<TemplatePair>, GrammarError> {
        if depth == 0 {
            return Err(GrammarError::ZeroDepth);
        }

        let derivations = self.expand_nonterminal(&self.grammar.start, depth, 0)?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut out: Vec<TemplatePair> = Vec::new();
        for derivation in derivations {
            let question = QuestionTemplate::new(derivation.tokens);
            if !question.is_terminated() {
                tracing::debug!(question = %question, "dropping unterminated derivation");
                continue;
            }
            let QueryShape::Answer { answer, chain } = derivation.query else {
                return Err(GrammarError::UnresolvedQuery {
                    question: question.to_string(),
                });
            };
            let query = QueryTemplate {
                fragments: chain,
                answer,
            };
            query.check_dependency_order(&question.to_string())?;

            let pair = TemplatePair { question, query };
            if seen.insert(pair.canonical()) {
                out.push(pair);
            }
        }

        tracing::debug!(depth, templates = out.len(), "generated templates");
        Ok(out)
    }

    fn expand_nonterminal(
        &self,
        name: &str,
        depth: usize,
        frame: usize,
    ) -> Result<Vec<Derivation>, GrammarError> {
        if depth == 0 {
            return Ok(Vec::new());
        }
        self.guard(frame)?;

        let per_alternative = self
            .grammar
            .alternatives(name)
            .par_iter()
            .map(|rhs| self.expand_sequence(rhs, depth - 1, frame + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(per_alternative.into_iter().flatten().collect())
    }

    fn expand_sequence(
        &self,
        symbols: &[Symbol],
        depth: usize,
        frame: usize,
    ) -> Result<Vec<Derivation>, GrammarError> {
        self.guard(frame)?;
        let Some((first, rest)) = symbols.split_first() else {
            return Ok(vec![Derivation::empty()]);
        };

        let heads = self.expand_symbol(first, depth, frame + 1)?;
        if heads.is_empty() {
            return Ok(Vec::new());
        }
        let tails = self.expand_sequence(rest, depth, frame + 1)?;

        let mut out = Vec::with_capacity(heads.len() * tails.len());
        for head in &heads {
            for tail in &tails {
                let mut tokens = head.tokens.clone();
                tokens.extend(tail.tokens.iter().cloned());
                out.push(Derivation {
                    tokens,
                    query: combine(&head.query, &tail.query, depth)?,
                });
            }
        }
        Ok(out)
    }

    fn expand_symbol(
        &self,
        symbol: &Symbol,
        depth: usize,
        frame: usize,
    ) -> Result<Vec<Derivation>, GrammarError> {
        match symbol {
            Symbol::Nonterminal(name) => self.expand_nonterminal(name, depth, frame),
            Symbol::Marker(kind) => {
                let tag = PlaceholderTag::new(*kind, depth);
                Ok(vec![Derivation {
                    tokens: vec![Token::Placeholder(tag)],
                    query: QueryShape::Pending(tag),
                }])
            }
            Symbol::Text(text) => Ok(vec![Derivation {
                tokens: vec![Token::Literal(text.clone())],
                query: QueryShape::Inert,
            }]),
        }
    }

    fn guard(&self, frame: usize) -> Result<(), GrammarError> {
        if frame > self.recursion_limit {
            return Err(GrammarError::RecursionLimit {
                limit: self.recursion_limit,
            });
        }
        Ok(())
    }
}

/// Templates are generated once per (grammar, depth) and shared afterwards.
///
/// Each cached entry is an immutable slice, so callers can iterate it as many
/// times as they like.
#[derive(Debug)]
pub struct TemplateCache {
    generator: TemplateGenerator,
    by_depth: DashMap<usize, Arc<[TemplatePair]>>,
}

impl TemplateCache {
    pub fn new(generator: TemplateGenerator) -> Self {
        Self {
            generator,
            by_depth: DashMap::new(),
        }
    }

    pub fn generator(&self) -> &TemplateGenerator {
        &self.generator
    }

    pub fn get(&self, depth: usize) -> Result<Arc<[TemplatePair]>, GrammarError> {
        if let Some(hit) = self.by_depth.get(&depth) {
            return Ok(hit.value().clone());
        }
        let templates: Arc<[TemplatePair]> = self.generator.generate(depth)?.into();
        self.by_depth.insert(depth, Arc::clone(&templates));
        Ok(templates)
    }
}
