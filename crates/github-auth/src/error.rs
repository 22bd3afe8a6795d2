//! Error types for account linking operations

/// Errors from the state store, the credential store and the OAuth exchange.
///
/// `Io` and `CorruptDocument` are both store failures; callers treat them as
/// fatal for the request. A corrupt document is never replaced with an empty
/// one.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token exchange failed: {0}")]
    ExchangeFailure(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("corrupt store document: {0}")]
    CorruptDocument(String),

    #[error("invalid OAuth configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias for account linking operations.
pub type Result<T> = std::result::Result<T, Error>;
