use thiserror::Error;

use crate::models::SearchMethod;

/// Errors surfaced by the retrieval core.
///
/// Lexical/vector failures inside a single `retrieve` call are caught at the
/// orchestrator boundary and downgraded to one-method results; only a total
/// failure of both methods reaches the caller as [`RetrieveError::Retrieval`].
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// The lexical index was asked to build from zero chunks. Recoverable:
    /// the caller may proceed with vector-only retrieval.
    #[error("cannot build a lexical index from an empty corpus")]
    EmptyCorpus,

    /// The vector store has not been built or loaded.
    #[error("vector index has not been built or loaded")]
    IndexUnavailable,

    /// An underlying search backend failed (tantivy error, embedding call, ...).
    #[error("{method} search failed: {message}")]
    Backend {
        method: SearchMethod,
        message: String,
    },

    /// Both search methods failed for one query.
    #[error("retrieval failed (lexical: {lexical:?}, vector: {vector:?})")]
    Retrieval {
        lexical: Option<String>,
        vector: Option<String>,
    },
}

impl RetrieveError {
    pub(crate) fn backend(method: SearchMethod, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            method,
            message: err.to_string(),
        }
    }
}
