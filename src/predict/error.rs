use thiserror::Error;

/// Failure to obtain a usable element set from one source.
///
/// Both variants are handled the same way by the resolver: the next source
/// in the chain is tried.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("source unavailable ({url}): {reason}")]
    SourceUnavailable { url: String, reason: String },
    #[error("malformed element set: {0}")]
    MalformedData(String),
}

#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("invalid elements: {0}")]
    Elements(String),
    #[error("propagation error: {0}")]
    Propagation(String),
    #[error("non-finite state vector at {0}")]
    NonFinite(chrono::DateTime<chrono::Utc>),
}
