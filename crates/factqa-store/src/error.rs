use thiserror::Error;

/// Store-level query errors.
///
/// These indicate a mismatch between the queries being asked and the store's
/// schema (or a broken fact file). They are surfaced verbatim and never
/// retried.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown predicate `{0}`")]
    UnknownPredicate(String),

    #[error("predicate `{predicate}` is declared as {declared}, not {requested}")]
    KindMismatch {
        predicate: String,
        declared: &'static str,
        requested: &'static str,
    },

    #[error("malformed goal `{goal}`: {reason}")]
    MalformedGoal { goal: String, reason: String },

    #[error("query parse error in `{text}`: {message}")]
    Parse { text: String, message: String },

    #[error("fact file error: {0}")]
    FactFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
