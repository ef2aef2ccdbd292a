use thiserror::Error;

/// Errors from message log operations (used by trait definitions in peerchat-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the external country-detection lookup.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("country lookup unavailable: {0}")]
    Unavailable(String),

    #[error("country lookup timed out")]
    Timeout,

    #[error("unexpected country lookup response: {0}")]
    InvalidResponse(String),
}

/// Errors related to roster construction.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("persona '{0}' has an empty reply pool")]
    EmptyReplyPool(String),

    #[error("duplicate persona id '{0}'")]
    DuplicateId(String),
}
