//! Question and query templates.
//!
//! A template pair is produced by one grammar derivation:
//!
//! - the **question template** is an ordered token list where each token is
//!   either literal text or a tagged placeholder (`<relation>_3`),
//! - the **query template** is a chain of subquery fragments (outer → inner)
//!   plus the designated answer variable.
//!
//! Text forms (used for serialization and debugging):
//!
//! ```text
//! <relation>_2(<name>_1, Y_3)
//! <attribute_name>_2(Y_3, <attribute_value>_2)
//! aggregate_all(count, Y_4, <relation_plural>_3(<name>_2, Y_4), Count_4)
//! ```
//!
//! Once every placeholder is substituted, a fragment's text form is exactly the
//! goal syntax accepted by `factqa-store`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use factqa_store::syntax::{
    application, bare_atom, count_of, name, quote, render_name, string_lit, variable, ws,
};
use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char as pchar, digit1};
use nom::combinator::{all_consuming, map, map_opt, map_res, verify};
use nom::sequence::delimited;
use nom::IResult;
use serde::{Deserialize, Serialize};

use crate::error::GrammarError;

// ============================================================================
// Placeholders
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    Relation,
    RelationPlural,
    AttributeName,
    AttributeValue,
    EntityName,
}

impl PlaceholderKind {
    pub const ALL: [PlaceholderKind; 5] = [
        PlaceholderKind::Relation,
        PlaceholderKind::RelationPlural,
        PlaceholderKind::AttributeName,
        PlaceholderKind::AttributeValue,
        PlaceholderKind::EntityName,
    ];

    /// Grammar marker text (the part between `<` and `>`).
    pub fn marker(self) -> &'static str {
        match self {
            PlaceholderKind::Relation => "relation",
            PlaceholderKind::RelationPlural => "relation_plural",
            PlaceholderKind::AttributeName => "attribute_name",
            PlaceholderKind::AttributeValue => "attribute_value",
            PlaceholderKind::EntityName => "name",
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.marker() == marker)
    }

    /// Kinds that stand for a predicate name rather than a predicate argument.
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            PlaceholderKind::Relation
                | PlaceholderKind::RelationPlural
                | PlaceholderKind::AttributeName
        )
    }
}

/// A placeholder occurrence: `kind@depth`.
///
/// The depth is the expansion depth the marker was created at; it only keeps
/// same-kind placeholders apart inside one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaceholderTag {
    pub kind: PlaceholderKind,
    pub depth: usize,
}

impl PlaceholderTag {
    pub fn new(kind: PlaceholderKind, depth: usize) -> Self {
        Self { kind, depth }
    }

    /// Bookkeeping variable standing in for this slot while it is still open.
    pub fn open_variable(&self) -> String {
        format!("_{}_{}", self.kind.marker(), self.depth)
    }
}

impl fmt::Display for PlaceholderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>_{}", self.kind.marker(), self.depth)
    }
}

impl FromStr for PlaceholderTag {
    type Err = GrammarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all_consuming(ws(placeholder_tag))(s)
            .map(|(_, tag)| tag)
            .map_err(|e| template_text_error(s, e))
    }
}

// ============================================================================
// Question templates
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Token {
    Literal(String),
    Placeholder(PlaceholderTag),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionTemplate {
    pub tokens: Vec<Token>,
}

impl QuestionTemplate {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn tags(&self) -> BTreeSet<PlaceholderTag> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Placeholder(tag) => Some(*tag),
                Token::Literal(_) => None,
            })
            .collect()
    }

    /// True when the last token is literal text ending in `?` (`?`, `have?`).
    pub fn is_terminated(&self) -> bool {
        matches!(self.tokens.last(), Some(Token::Literal(text)) if text.ends_with('?'))
    }

    /// Depth-free rendering: placeholders print as `<kind>`.
    ///
    /// Two templates with the same shape but generated under different depth
    /// bounds share a canonical string.
    pub fn canonical(&self) -> String {
        join_words(self.tokens.iter().map(|t| match t {
            Token::Literal(text) => text.clone(),
            Token::Placeholder(tag) => format!("<{}>", tag.kind.marker()),
        }))
    }

    /// Render with every placeholder replaced by `resolve(tag)`.
    pub fn render_with<F>(&self, mut resolve: F) -> String
    where
        F: FnMut(&PlaceholderTag) -> String,
    {
        join_words(self.tokens.iter().map(|t| match t {
            Token::Literal(text) => text.clone(),
            Token::Placeholder(tag) => resolve(tag),
        }))
    }
}

impl fmt::Display for QuestionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_with(|tag| tag.to_string()))
    }
}

/// Join question words with single spaces; sentence punctuation attaches to
/// the previous word.
pub fn join_words<I, S>(words: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for word in words {
        let word = word.as_ref().trim();
        if word.is_empty() {
            continue;
        }
        let attaches = word.starts_with(['?', '!', ',', '.']);
        if !out.is_empty() && !attaches {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

// ============================================================================
// Query templates
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arg {
    Var(String),
    Placeholder(PlaceholderTag),
    Literal(String),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Var(name) => f.write_str(name),
            Arg::Placeholder(tag) => write!(f, "{tag}"),
            Arg::Literal(value) => f.write_str(&quote(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateSlot {
    Placeholder(PlaceholderTag),
    Name(String),
}

impl fmt::Display for PredicateSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateSlot::Placeholder(tag) => write!(f, "{tag}"),
            PredicateSlot::Name(name) => f.write_str(&render_name(name)),
        }
    }
}

/// One subquery fragment of a query template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum QueryFragment {
    /// `pred(subject, object)`.
    ///
    /// With a variable object this is the "the X of ..." shape and the object
    /// is the fragment's output. With a value object it is the "whose X is Y"
    /// shape and the subject is the output.
    Apply {
        predicate: PredicateSlot,
        subject: Arg,
        object: Arg,
    },
    /// `aggregate_all(count, counted, pred(subject, counted), result)`.
    Count {
        predicate: PredicateSlot,
        subject: Arg,
        counted: String,
        result: String,
    },
}

impl QueryFragment {
    pub fn predicate(&self) -> &PredicateSlot {
        match self {
            QueryFragment::Apply { predicate, .. } | QueryFragment::Count { predicate, .. } => {
                predicate
            }
        }
    }

    /// Predicate name once resolved.
    pub fn predicate_name(&self) -> Option<&str> {
        match self.predicate() {
            PredicateSlot::Name(name) => Some(name),
            PredicateSlot::Placeholder(_) => None,
        }
    }

    pub fn predicate_placeholder(&self) -> Option<PlaceholderTag> {
        match self.predicate() {
            PredicateSlot::Placeholder(tag) => Some(*tag),
            PredicateSlot::Name(_) => None,
        }
    }

    fn args(&self) -> Vec<&Arg> {
        match self {
            QueryFragment::Apply {
                subject, object, ..
            } => vec![subject, object],
            QueryFragment::Count { subject, .. } => vec![subject],
        }
    }

    fn args_mut(&mut self) -> Vec<&mut Arg> {
        match self {
            QueryFragment::Apply {
                subject, object, ..
            } => vec![subject, object],
            QueryFragment::Count { subject, .. } => vec![subject],
        }
    }

    pub fn arg_placeholders(&self) -> Vec<PlaceholderTag> {
        self.args()
            .into_iter()
            .filter_map(|a| match a {
                Arg::Placeholder(tag) => Some(*tag),
                _ => None,
            })
            .collect()
    }

    /// Every open placeholder, predicate slot first.
    pub fn placeholders(&self) -> Vec<PlaceholderTag> {
        let mut out: Vec<PlaceholderTag> = self.predicate_placeholder().into_iter().collect();
        out.extend(self.arg_placeholders());
        out
    }

    pub fn is_resolved(&self) -> bool {
        self.placeholders().is_empty()
    }

    /// The variable this fragment introduces for shallower fragments.
    pub fn output_variable(&self) -> Option<&str> {
        match self {
            QueryFragment::Apply {
                subject, object, ..
            } => match (subject, object) {
                (_, Arg::Var(v)) => Some(v),
                (Arg::Var(v), _) => Some(v),
                _ => None,
            },
            QueryFragment::Count { result, .. } => Some(result),
        }
    }

    /// Variables this fragment reads; each must be bound by a deeper fragment.
    pub fn input_variables(&self) -> Vec<&str> {
        match self {
            QueryFragment::Apply {
                subject: Arg::Var(s),
                object: Arg::Var(_),
                ..
            } => vec![s.as_str()],
            QueryFragment::Apply { .. } => Vec::new(),
            QueryFragment::Count { subject, .. } => match subject {
                Arg::Var(s) => vec![s.as_str()],
                _ => Vec::new(),
            },
        }
    }

    /// Replace every occurrence of `tag` (predicate slot or argument).
    pub fn substitute(&mut self, tag: &PlaceholderTag, value: &str) {
        match self {
            QueryFragment::Apply { predicate, .. } | QueryFragment::Count { predicate, .. } => {
                if matches!(predicate, PredicateSlot::Placeholder(t) if t == tag) {
                    *predicate = PredicateSlot::Name(value.to_string());
                }
            }
        }
        for arg in self.args_mut() {
            if matches!(arg, Arg::Placeholder(t) if t == tag) {
                *arg = Arg::Literal(value.to_string());
            }
        }
    }
}

impl fmt::Display for QueryFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryFragment::Apply {
                predicate,
                subject,
                object,
            } => write!(f, "{predicate}({subject}, {object})"),
            QueryFragment::Count {
                predicate,
                subject,
                counted,
                result,
            } => write!(
                f,
                "aggregate_all(count, {counted}, {predicate}({subject}, {counted}), {result})"
            ),
        }
    }
}

impl FromStr for QueryFragment {
    type Err = GrammarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all_consuming(ws(fragment))(s)
            .map(|(_, f)| f)
            .map_err(|e| template_text_error(s, e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryTemplate {
    /// Outer → inner; the last fragment is evaluated first.
    pub fragments: Vec<QueryFragment>,
    pub answer: String,
}

impl QueryTemplate {
    pub fn tags(&self) -> BTreeSet<PlaceholderTag> {
        self.fragments
            .iter()
            .flat_map(|f| f.placeholders())
            .collect()
    }

    pub fn text(&self) -> Vec<String> {
        self.fragments.iter().map(|f| f.to_string()).collect()
    }

    pub fn from_text<S: AsRef<str>>(fragments: &[S], answer: &str) -> Result<Self, GrammarError> {
        let fragments = fragments
            .iter()
            .map(|s| s.as_ref().parse::<QueryFragment>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            fragments,
            answer: answer.to_string(),
        })
    }

    /// Check that every variable read by fragment `i` is introduced by some
    /// fragment `j > i`, so a single backward sweep sees bindings before uses.
    pub fn check_dependency_order(&self, question: &str) -> Result<(), GrammarError> {
        for (index, fragment) in self.fragments.iter().enumerate() {
            for variable in fragment.input_variables() {
                let bound_deeper = self.fragments[index + 1..]
                    .iter()
                    .any(|f| f.output_variable() == Some(variable));
                if !bound_deeper {
                    return Err(GrammarError::DependencyOrder {
                        question: question.to_string(),
                        index,
                        variable: variable.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A matched (question template, query template) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplatePair {
    pub question: QuestionTemplate,
    pub query: QueryTemplate,
}

impl TemplatePair {
    pub fn canonical(&self) -> String {
        self.question.canonical()
    }

    /// Number of subquery fragments.
    pub fn difficulty(&self) -> usize {
        self.query.fragments.len()
    }

    pub fn tags_consistent(&self) -> bool {
        self.question.tags() == self.query.tags()
    }
}

// ============================================================================
// Text codec
// ============================================================================

fn template_text_error(text: &str, err: nom::Err<nom::error::Error<&str>>) -> GrammarError {
    GrammarError::TemplateText {
        text: text.to_string(),
        message: err.to_string(),
    }
}

/// `<kind>`, as used by grammar markers.
pub(crate) fn marker(input: &str) -> IResult<&str, PlaceholderKind> {
    map_opt(
        delimited(
            pchar('<'),
            take_while1(|c: char| c.is_ascii_lowercase() || c == '_'),
            pchar('>'),
        ),
        PlaceholderKind::from_marker,
    )(input)
}

pub(crate) fn placeholder_tag(input: &str) -> IResult<&str, PlaceholderTag> {
    let (input, kind) = marker(input)?;
    let (input, _) = pchar('_')(input)?;
    let (input, depth) = map_res(digit1, |s: &str| s.parse::<usize>())(input)?;
    Ok((input, PlaceholderTag::new(kind, depth)))
}

fn arg(input: &str) -> IResult<&str, Arg> {
    alt((
        map(placeholder_tag, Arg::Placeholder),
        map(variable, Arg::Var),
        map(string_lit, Arg::Literal),
        map(bare_atom, Arg::Literal),
    ))(input)
}

fn predicate_slot(input: &str) -> IResult<&str, PredicateSlot> {
    alt((
        map(placeholder_tag, PredicateSlot::Placeholder),
        map(name, PredicateSlot::Name),
    ))(input)
}

/// The counted variable must be the object of the counted application.
fn count_fragment(input: &str) -> IResult<&str, QueryFragment> {
    map(
        verify(
            count_of(application(predicate_slot, arg)),
            |(counted, (_, _, object), _): &(String, (PredicateSlot, Arg, Arg), String)| {
                matches!(object, Arg::Var(v) if v == counted)
            },
        ),
        |(counted, (predicate, subject, _), result)| QueryFragment::Count {
            predicate,
            subject,
            counted,
            result,
        },
    )(input)
}

fn fragment(input: &str) -> IResult<&str, QueryFragment> {
    alt((
        count_fragment,
        map(application(predicate_slot, arg), |(predicate, subject, object)| {
            QueryFragment::Apply {
                predicate,
                subject,
                object,
            }
        }),
    ))(input)
}
