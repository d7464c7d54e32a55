//! Question grammar + template generation for factqa.
//!
//! This crate owns the *template universe*:
//!
//! - `grammar`: the versioned question grammar DSL (`grammar v1`) and its parser
//! - `template`: typed question/query templates (placeholders are tagged tokens,
//!   never raw strings)
//! - `generator`: the depth-bounded tree-to-tree compiler that turns grammar
//!   derivations into matched (question template, query template) pairs
//!
//! Instantiation against a fact store lives in `factqa-sampler`.

pub mod error;
pub mod generator;
pub mod grammar;
pub mod template;

pub use error::GrammarError;
pub use generator::{GeneratorConfig, TemplateCache, TemplateGenerator};
pub use grammar::{parse_grammar, Grammar, Symbol, GRAMMAR_V1};
pub use template::{
    Arg, PlaceholderKind, PlaceholderTag, PredicateSlot, QueryFragment, QueryTemplate,
    QuestionTemplate, TemplatePair, Token,
};
