//! Lexical layer of the goal language.
//!
//! Query templates in `factqa-grammar` parse and render with the same pieces,
//! so a template fragment with every placeholder filled in is a goal.

use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, is_not, tag, take_while, take_while1};
use nom::character::complete::{char as pchar, multispace0};
use nom::combinator::{map, opt, recognize};
use nom::sequence::{delimited, tuple};
use nom::IResult;

/// Double-quote `value`, escaping `\` and `"`.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

pub fn is_bare_atom(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Predicate names print bare when they lex as an atom.
pub fn render_name(name: &str) -> String {
    if is_bare_atom(name) {
        name.to_string()
    } else {
        quote(name)
    }
}

pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

pub fn variable(input: &str) -> IResult<&str, String> {
    map(
        recognize(tuple((
            take_while1(|c: char| c.is_ascii_uppercase() || c == '_'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        ))),
        |s: &str| s.to_string(),
    )(input)
}

pub fn bare_atom(input: &str) -> IResult<&str, String> {
    map(
        recognize(tuple((
            take_while1(|c: char| c.is_ascii_lowercase()),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        ))),
        |s: &str| s.to_string(),
    )(input)
}

pub fn string_lit(input: &str) -> IResult<&str, String> {
    let esc = escaped_transform(
        is_not("\\\""),
        '\\',
        alt((map(tag("\\"), |_| "\\"), map(tag("\""), |_| "\""))),
    );
    delimited(pchar('"'), map(opt(esc), Option::unwrap_or_default), pchar('"'))(input)
}

/// A predicate name: bare atom or quoted string.
pub fn name(input: &str) -> IResult<&str, String> {
    alt((string_lit, bare_atom))(input)
}

pub fn comma(input: &str) -> IResult<&str, ()> {
    map(ws(pchar(',')), |_| ())(input)
}

/// `pred(subject, object)` with caller-supplied predicate and argument parsers.
pub fn application<'a, P, A>(
    predicate: fn(&'a str) -> IResult<&'a str, P>,
    arg: fn(&'a str) -> IResult<&'a str, A>,
) -> impl FnMut(&'a str) -> IResult<&'a str, (P, A, A)> {
    move |input: &'a str| {
        let (input, p) = predicate(input)?;
        let (input, _) = ws(pchar('('))(input)?;
        let (input, subject) = arg(input)?;
        let (input, _) = comma(input)?;
        let (input, object) = arg(input)?;
        let (input, _) = ws(pchar(')'))(input)?;
        Ok((input, (p, subject, object)))
    }
}

/// `aggregate_all(count, Counted, <inner>, Result)`.
pub fn count_of<'a, O, F>(mut inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, (String, O, String)>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    move |input: &'a str| {
        let (input, _) = tag("aggregate_all")(input)?;
        let (input, _) = ws(pchar('('))(input)?;
        let (input, _) = tag("count")(input)?;
        let (input, _) = comma(input)?;
        let (input, counted) = variable(input)?;
        let (input, _) = comma(input)?;
        let (input, body) = inner(input)?;
        let (input, _) = comma(input)?;
        let (input, result) = variable(input)?;
        let (input, _) = ws(pchar(')'))(input)?;
        Ok((input, (counted, body, result)))
    }
}
