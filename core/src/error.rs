use serde::Serialize;
use thiserror::Error;

use crate::DocId;

/// Errors raised by the retrieval core.
///
/// Structural problems abort the operation that detected them. Lookup-level
/// problems (a single unknown word, undecodable query text) are not errors:
/// they are reported as [`Warning`]s next to the results.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("word '{0}' not in vocabulary")]
    WordNotFound(String),

    #[error("dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("input is not valid UTF-8: {input}")]
    Decoding { input: String },

    #[error("{what} requested before the topic model was trained")]
    UntrainedModel { what: &'static str },

    #[error("cannot train {requested} topics: at most {max} (min of vocabulary size and document count)")]
    InvalidTopicCount { requested: usize, max: usize },

    #[error("document {doc_id} out of range (corpus has {num_docs} documents)")]
    DocumentOutOfRange { doc_id: DocId, num_docs: usize },

    #[error("unknown tag '{0}'")]
    UnknownTag(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("corrupt bundle: {0}")]
    CorruptBundle(String),

    #[error("bundle format version {found} is not supported (expected {expected})")]
    BundleVersion { found: u32, expected: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;

/// A recovered, lookup-level problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Warning {
    /// Include word absent from the vocabulary; it imposed no constraint.
    UnknownIncludeWord(String),
    /// Exclude word absent from the vocabulary; it could never match anyway.
    UnknownExcludeWord(String),
    /// Query bytes were not valid UTF-8. Carries a lossy rendering of the input.
    UndecodableInput(String),
    /// None of the query's tokens are in the vocabulary.
    NoKnownWords,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnknownIncludeWord(w) => write!(f, "include word '{w}' not in dictionary"),
            Warning::UnknownExcludeWord(w) => write!(f, "exclude word '{w}' not in dictionary"),
            Warning::UndecodableInput(input) => write!(f, "failed to decode input text: {input}"),
            Warning::NoKnownWords => write!(f, "no query words found in dictionary"),
        }
    }
}

/// Results plus the warnings collected while producing them.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub results: T,
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    pub fn new(results: T) -> Self {
        Self { results, warnings: Vec::new() }
    }

    pub fn with_warnings(results: T, warnings: Vec<Warning>) -> Self {
        Self { results, warnings }
    }
}
