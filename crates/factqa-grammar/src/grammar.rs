//! Question grammar DSL: `grammar v1`.
//!
//! A grammar is a small context-free grammar over question words:
//!
//! ```text
//! grammar v1
//! start Sentence
//! Sentence       -> "Who is" RelationPhrase "?"
//!                 | "What is" AttributePhrase "?"
//! RelationName   -> <relation>
//! ```
//!
//! - quoted text is a literal word sequence,
//! - `<marker>` is a placeholder marker (`relation`, `relation_plural`,
//!   `attribute_name`, `attribute_value`, `name`),
//! - bare identifiers are nonterminals,
//! - a line starting with `|` adds alternatives to the previous rule,
//! - `#` starts a comment (outside quotes).
//!
//! The grammar is part of the template identity: changing it changes every
//! generated template, so the text carries an explicit version header.

use std::collections::{BTreeMap, BTreeSet};

use factqa_store::syntax::ws;
use nom::branch::alt;
use nom::bytes::complete::{is_not, take_while, take_while1};
use nom::character::complete::{char as pchar, multispace0};
use nom::combinator::{all_consuming, map, recognize};
use nom::multi::{many1, separated_list1};
use nom::sequence::{delimited, tuple};
use nom::IResult;
use serde::{Deserialize, Serialize};

use crate::error::GrammarError;
use crate::template::{marker, PlaceholderKind};

/// The canonical question grammar.
pub const GRAMMAR_V1: &str = r#"
grammar v1
start Sentence

Sentence           -> "Who is" RelationPhrase "?"
                    | "What is" AttributePhrase "?"
                    | "How many" RelationNamePlural "does" RelationChain "have?"
RelationPhrase     -> "the" RelationName "of" RelationChain
                    | "the person whose" AttributeName "is" AttributeValue
RelationChain      -> RelationPhrase
                    | EntityName
AttributePhrase    -> "the" AttributeName "of" RelationChain

RelationName       -> <relation>
RelationNamePlural -> <relation_plural>
AttributeName      -> <attribute_name>
AttributeValue     -> <attribute_value>
EntityName         -> <name>
"#;

pub type Name = String;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    Text(String),
    Marker(PlaceholderKind),
    Nonterminal(Name),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grammar {
    pub version: u32,
    pub start: Name,
    /// Nonterminal → alternatives, in declaration order.
    pub rules: BTreeMap<Name, Vec<Vec<Symbol>>>,
}

impl Grammar {
    /// The canonical grammar (`GRAMMAR_V1`).
    pub fn v1() -> Result<Self, GrammarError> {
        parse_grammar(GRAMMAR_V1)
    }

    pub fn alternatives(&self, nonterminal: &str) -> &[Vec<Symbol>] {
        self.rules
            .get(nonterminal)
            .map(|alts| alts.as_slice())
            .unwrap_or(&[])
    }

    /// Structural checks run once at construction.
    ///
    /// - the start symbol has productions
    /// - every referenced nonterminal has productions
    /// - every nonterminal has at least one finite derivation
    pub fn validate(&self) -> Result<(), GrammarError> {
        if self.rules.is_empty() {
            return Err(GrammarError::Empty);
        }
        if !self.rules.contains_key(&self.start) {
            return Err(GrammarError::MissingStart(self.start.clone()));
        }

        for (lhs, alternatives) in &self.rules {
            for symbol in alternatives.iter().flatten() {
                if let Symbol::Nonterminal(name) = symbol {
                    if !self.rules.contains_key(name) {
                        return Err(GrammarError::UndefinedNonterminal {
                            name: name.clone(),
                            referenced_by: lhs.clone(),
                        });
                    }
                }
            }
        }

        // Productive-set fixpoint: a nonterminal is productive once one of its
        // alternatives mentions only productive nonterminals.
        let mut productive: BTreeSet<&str> = BTreeSet::new();
        loop {
            let before = productive.len();
            for (lhs, alternatives) in &self.rules {
                if productive.contains(lhs.as_str()) {
                    continue;
                }
                let any_productive = alternatives.iter().any(|alt| {
                    alt.iter().all(|s| match s {
                        Symbol::Nonterminal(n) => productive.contains(n.as_str()),
                        _ => true,
                    })
                });
                if any_productive {
                    productive.insert(lhs.as_str());
                }
            }
            if productive.len() == before {
                break;
            }
        }
        if let Some(stuck) = self
            .rules
            .keys()
            .find(|name| !productive.contains(name.as_str()))
        {
            return Err(GrammarError::NonTerminating(stuck.clone()));
        }

        Ok(())
    }
}

// ============================================================================
// Parser
// ============================================================================

pub fn parse_grammar(text: &str) -> Result<Grammar, GrammarError> {
    let mut version: Option<u32> = None;
    let mut start: Option<Name> = None;
    let mut first_lhs: Option<Name> = None;
    let mut rules: BTreeMap<Name, Vec<Vec<Symbol>>> = BTreeMap::new();
    let mut current: Option<Name> = None;

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if version.is_none() {
            let Some(rest) = line.strip_prefix("grammar ") else {
                return Err(GrammarError::Parse {
                    line: line_no,
                    message: "expected `grammar v1` header".to_string(),
                });
            };
            let rest = rest.trim();
            if rest != "v1" {
                return Err(GrammarError::UnsupportedVersion(rest.to_string()));
            }
            version = Some(1);
            continue;
        }

        if let Some(rest) = line.strip_prefix("start ") {
            let name = rest.trim();
            if !is_nonterminal_name(name) {
                return Err(GrammarError::Parse {
                    line: line_no,
                    message: format!("invalid start symbol `{name}`"),
                });
            }
            start = Some(name.to_string());
            continue;
        }

        if let Some(rest) = line.strip_prefix('|') {
            let Some(lhs) = current.clone() else {
                return Err(GrammarError::Parse {
                    line: line_no,
                    message: "`|` continuation without a preceding rule".to_string(),
                });
            };
            let alternatives = parse_alternatives(rest, line_no)?;
            rules.entry(lhs).or_default().extend(alternatives);
            continue;
        }

        let Some((lhs, rhs)) = line.split_once("->") else {
            return Err(GrammarError::Parse {
                line: line_no,
                message: "expected `Lhs -> alternatives`".to_string(),
            });
        };
        let lhs = lhs.trim();
        if !is_nonterminal_name(lhs) {
            return Err(GrammarError::Parse {
                line: line_no,
                message: format!("invalid nonterminal name `{lhs}`"),
            });
        }
        let alternatives = parse_alternatives(rhs, line_no)?;
        rules.entry(lhs.to_string()).or_default().extend(alternatives);
        if first_lhs.is_none() {
            first_lhs = Some(lhs.to_string());
        }
        current = Some(lhs.to_string());
    }

    let Some(version) = version else {
        return Err(GrammarError::Empty);
    };
    let start = start.or(first_lhs).ok_or(GrammarError::Empty)?;

    let grammar = Grammar {
        version,
        start,
        rules,
    };
    grammar.validate()?;
    Ok(grammar)
}

fn parse_alternatives(text: &str, line: usize) -> Result<Vec<Vec<Symbol>>, GrammarError> {
    all_consuming(delimited(
        multispace0,
        separated_list1(ws(pchar('|')), many1(ws(symbol))),
        multispace0,
    ))(text)
    .map(|(_, alts)| alts)
    .map_err(|e| GrammarError::Parse {
        line,
        message: format!("invalid alternatives `{}`: {e}", text.trim()),
    })
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (idx, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn is_nonterminal_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn symbol(input: &str) -> IResult<&str, Symbol> {
    alt((text_symbol, marker_symbol, nonterminal_symbol))(input)
}

fn text_symbol(input: &str) -> IResult<&str, Symbol> {
    map(delimited(pchar('"'), is_not("\""), pchar('"')), |s: &str| {
        Symbol::Text(s.trim().to_string())
    })(input)
}

fn marker_symbol(input: &str) -> IResult<&str, Symbol> {
    map(marker, Symbol::Marker)(input)
}

fn nonterminal_symbol(input: &str) -> IResult<&str, Symbol> {
    map(
        recognize(tuple((
            take_while1(|c: char| c.is_ascii_alphabetic()),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        ))),
        |s: &str| Symbol::Nonterminal(s.to_string()),
    )(input)
}
