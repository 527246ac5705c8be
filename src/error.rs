use thiserror::Error;

/// Failures surfaced by the retrieval core.
///
/// Derivation failures never appear here: they degrade to the raw query.
/// Hits without an article id are dropped, and an empty ranking is a
/// successful outcome.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("search backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("search failed for variant {variant}: {source}")]
    Search {
        variant: usize,
        #[source]
        source: Box<RetrievalError>,
    },

    #[error("article {0} not found")]
    NotFound(i64),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;
