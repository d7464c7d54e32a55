//! Conjunctive goal language.
//!
//! ```text
//! parent("ana", Y_3)
//! job(Y_1, "baker")
//! aggregate_all(count, Y_4, parent("ana", Y_4), Count_4)
//! ```
//!
//! - variables start with an uppercase letter or `_` (the latter are
//!   bookkeeping variables and never appear in solution traces),
//! - constants are quoted strings or bare lowercase atoms,
//! - predicate names are bare lowercase atoms or quoted strings.
//!
//! `Display` always quotes constants, so rendered goals re-parse to the same
//! value.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use nom::branch::alt;
use nom::character::complete::char as pchar;
use nom::combinator::{all_consuming, map};
use nom::multi::separated_list1;
use nom::IResult;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::syntax::{
    application, bare_atom, count_of, name, quote, render_name, string_lit, variable, ws,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Var(String),
    Const(String),
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(name.into())
    }

    pub fn constant(value: impl Into<String>) -> Self {
        Term::Const(value.into())
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Term::Var(v) => Some(v),
            Term::Const(_) => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(v) => f.write_str(v),
            Term::Const(c) => f.write_str(&quote(c)),
        }
    }
}

/// `predicate(subject, object)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Atom {
    pub predicate: String,
    pub subject: Term,
    pub object: Term,
}

impl Atom {
    pub fn new(predicate: impl Into<String>, subject: Term, object: Term) -> Self {
        Self {
            predicate: predicate.into(),
            subject,
            object,
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, {})",
            render_name(&self.predicate),
            self.subject,
            self.object
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "goal", rename_all = "snake_case")]
pub enum Goal {
    Atom(Atom),
    /// `aggregate_all(count, counted, atom, result)`: binds `counted` to the
    /// distinct set of values the atom produces and `result` to its size.
    Count {
        counted: String,
        atom: Atom,
        result: String,
    },
}

impl Goal {
    pub fn atom(&self) -> &Atom {
        match self {
            Goal::Atom(atom) | Goal::Count { atom, .. } => atom,
        }
    }

    pub fn predicate(&self) -> &str {
        &self.atom().predicate
    }

    /// Variables mentioned by this goal, in first-occurrence order.
    pub fn variables(&self) -> Vec<&str> {
        let atom = self.atom();
        let mut out: Vec<&str> = Vec::new();
        for term in [&atom.subject, &atom.object] {
            if let Some(v) = term.as_var() {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        if let Goal::Count {
            counted, result, ..
        } = self
        {
            for v in [counted.as_str(), result.as_str()] {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::Atom(atom) => write!(f, "{atom}"),
            Goal::Count {
                counted,
                atom,
                result,
            } => write!(f, "aggregate_all(count, {counted}, {atom}, {result})"),
        }
    }
}

/// A bound value in a solution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Atom(String),
    Count(usize),
    Set(BTreeSet<String>),
}

impl Value {
    /// Normalized answer string.
    pub fn to_answer_string(&self) -> String {
        match self {
            Value::Atom(s) => s.clone(),
            Value::Count(n) => n.to_string(),
            Value::Set(items) => items.iter().cloned().collect::<Vec<_>>().join(", "),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Set(items) => {
                let quoted: Vec<String> = items.iter().map(|s| quote(s)).collect();
                write!(f, "{{{}}}", quoted.join(", "))
            }
            other => f.write_str(&other.to_answer_string()),
        }
    }
}

/// One solution: variable name → value.
pub type Binding = BTreeMap<String, Value>;

/// Bookkeeping variables (leading `_`) are internal to the pipeline.
pub fn is_bookkeeping_var(name: &str) -> bool {
    name.starts_with('_')
}

pub fn render_query(goals: &[Goal]) -> String {
    goals
        .iter()
        .map(|g| g.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Parser
// ============================================================================

pub fn parse_goal(text: &str) -> Result<Goal, StoreError> {
    all_consuming(ws(goal))(text)
        .map(|(_, g)| g)
        .map_err(|e| StoreError::Parse {
            text: text.to_string(),
            message: e.to_string(),
        })
}

/// Parse a comma-separated conjunction of goals.
pub fn parse_query(text: &str) -> Result<Vec<Goal>, StoreError> {
    all_consuming(ws(separated_list1(ws(pchar(',')), goal)))(text)
        .map(|(_, goals)| goals)
        .map_err(|e| StoreError::Parse {
            text: text.to_string(),
            message: e.to_string(),
        })
}

fn term(input: &str) -> IResult<&str, Term> {
    alt((
        map(variable, Term::Var),
        map(string_lit, Term::Const),
        map(bare_atom, Term::Const),
    ))(input)
}

fn atom(input: &str) -> IResult<&str, Atom> {
    map(application(name, term), |(predicate, subject, object)| Atom {
        predicate,
        subject,
        object,
    })(input)
}

fn goal(input: &str) -> IResult<&str, Goal> {
    alt((
        map(count_of(atom), |(counted, atom, result)| Goal::Count {
            counted,
            atom,
            result,
        }),
        map(atom, Goal::Atom),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_atoms_with_bare_and_quoted_constants() {
        let g = parse_goal("parent(ana, Y_3)").expect("parse");
        assert_eq!(
            g,
            Goal::Atom(Atom::new("parent", Term::constant("ana"), Term::var("Y_3")))
        );
        assert_eq!(g.to_string(), "parent(\"ana\", Y_3)");

        let g = parse_goal("\"works at\"(\"Ana \\\"A\\\" Smith\", Y)").expect("parse");
        assert_eq!(g.predicate(), "works at");
        assert_eq!(g.atom().subject, Term::constant("Ana \"A\" Smith"));
        assert_eq!(parse_goal(&g.to_string()).expect("reparse"), g);
    }

    #[test]
    fn parses_count_goal() {
        let g = parse_goal("aggregate_all(count, Y_4, parent(\"ana\", Y_4), Count_4)").expect("parse");
        assert_eq!(g.variables(), vec!["Y_4", "Count_4"]);
        assert_eq!(
            g.to_string(),
            "aggregate_all(count, Y_4, parent(\"ana\", Y_4), Count_4)"
        );
    }

    #[test]
    fn parses_conjunctions() {
        let goals = parse_query("parent(ana, Y_2), job(Y_2, Y_4)").expect("parse");
        assert_eq!(goals.len(), 2);
        assert_eq!(goals[1].variables(), vec!["Y_2", "Y_4"]);
        assert_eq!(render_query(&goals), "parent(\"ana\", Y_2), job(Y_2, Y_4)");
    }

    #[test]
    fn empty_string_constants_parse() {
        let g = parse_goal("job(X, \"\")").expect("parse");
        assert_eq!(g.atom().object, Term::constant(""));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_goal("parent(ana)"), Err(StoreError::Parse { .. })));
        assert!(parse_query("").is_err());
    }

    #[test]
    fn bookkeeping_variables_are_underscored() {
        assert!(is_bookkeeping_var("_attribute_value_2"));
        assert!(!is_bookkeeping_var("Y_2"));
    }
}
