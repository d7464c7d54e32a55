use factqa_grammar::{GrammarError, PlaceholderKind, PlaceholderTag};
use factqa_store::StoreError;
use thiserror::Error;

/// A sampling attempt that did not work out.
///
/// Always recoverable: draw again, or move on to another template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstantiationError {
    #[error("no candidate for {tag} leads to a non-empty answer")]
    EmptyCandidatePool { tag: PlaceholderTag },

    #[error("fact store has no entities")]
    EmptyEntitySet,

    #[error("no {} vocabulary configured", .kind.marker())]
    EmptyVocabulary { kind: PlaceholderKind },

    #[error("placeholder {tag} cannot be instantiated in this position")]
    UnsupportedPlaceholder { tag: PlaceholderTag },

    #[error("placeholder {tag} is still open")]
    Unresolved { tag: PlaceholderTag },
}

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    Instantiation(#[from] InstantiationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SamplerError {
    /// Only instantiation failures are worth another draw.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SamplerError::Instantiation(_))
    }
}
