//! Error types for repository analysis

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid repository reference: {0} (expected owner/repo)")]
    InvalidRepo(String),

    #[error("repository not found or not accessible: {0}")]
    NotFound(String),

    #[error("source host request failed: {0}")]
    Source(String),

    #[error("file could not be decoded: {0}")]
    Decode(String),

    #[error("completion request failed: {0}")]
    Completion(String),
}

/// Result alias for analysis operations.
pub type Result<T> = std::result::Result<T, Error>;
