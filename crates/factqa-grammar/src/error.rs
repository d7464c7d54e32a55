use thiserror::Error;

/// Grammar configuration errors.
///
/// These are fatal: they indicate a malformed or non-terminating grammar (or a
/// grammar extension that breaks the query dependency direction), never a
/// transient condition worth retrying.
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("grammar parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("unsupported grammar version `{0}` (expected `grammar v1`)")]
    UnsupportedVersion(String),

    #[error("grammar defines no rules")]
    Empty,

    #[error("start symbol `{0}` has no productions")]
    MissingStart(String),

    #[error("nonterminal `{name}` (used by `{referenced_by}`) has no productions")]
    UndefinedNonterminal { name: String, referenced_by: String },

    #[error("nonterminal `{0}` has no finite derivation")]
    NonTerminating(String),

    #[error("template depth must be positive")]
    ZeroDepth,

    #[error("expansion exceeded the recursion guard of {limit} frames")]
    RecursionLimit { limit: usize },

    #[error("cannot combine query fragment `{head}` with `{tail}`")]
    UnsupportedCombination { head: String, tail: String },

    #[error("derivation `{question}` does not resolve to an answer variable")]
    UnresolvedQuery { question: String },

    #[error("fragment {index} of `{question}` reads `{variable}` before any deeper fragment binds it")]
    DependencyOrder {
        question: String,
        index: usize,
        variable: String,
    },

    #[error("invalid template text `{text}`: {message}")]
    TemplateText { text: String, message: String },
}
