//! Service-specific error types

use axum::http::StatusCode;
use thiserror::Error;

/// Ways the OAuth callback can fail.
///
/// The `Display` text is for logs. What the browser sees comes from
/// `user_message()`, which never carries provider or store details.
#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("callback is missing the authorization code")]
    MissingCode,

    #[error("state is unknown, consumed or expired")]
    InvalidOrExpiredState,

    #[error("token exchange failed: {0}")]
    ExchangeFailure(String),

    #[error("store failure: {0}")]
    StoreFailure(String),

    /// The flow reached a combination of state and event it has no
    /// transition for, or the OAuth client is misconfigured.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CallbackError {
    /// Store and internal failures are ours, everything else is a bad request.
    pub fn status(&self) -> StatusCode {
        match self {
            CallbackError::StoreFailure(_) | CallbackError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            CallbackError::MissingCode => "Missing authorization code.",
            CallbackError::InvalidOrExpiredState => {
                "This link is invalid or has expired. Run /connect-github again."
            }
            CallbackError::ExchangeFailure(_) => {
                "GitHub did not accept the authorization. Run /connect-github again."
            }
            CallbackError::StoreFailure(_) => "Could not save your GitHub connection. Try again later.",
            CallbackError::Internal(_) => "Something went wrong. Try again later.",
        }
    }

    /// `outcome` label for `oauth_callbacks_total`.
    pub fn outcome(&self) -> &'static str {
        match self {
            CallbackError::MissingCode => "missing_code",
            CallbackError::InvalidOrExpiredState => "invalid_state",
            CallbackError::ExchangeFailure(_) => "exchange_failure",
            CallbackError::StoreFailure(_) => "store_failure",
            CallbackError::Internal(_) => "internal_error",
        }
    }
}

impl From<github_auth::Error> for CallbackError {
    fn from(e: github_auth::Error) -> Self {
        match e {
            github_auth::Error::ExchangeFailure(msg) => CallbackError::ExchangeFailure(msg),
            e @ github_auth::Error::InvalidConfig(_) => CallbackError::Internal(e.to_string()),
            e @ (github_auth::Error::Io(_) | github_auth::Error::CorruptDocument(_)) => {
                CallbackError::StoreFailure(e.to_string())
            }
        }
    }
}

/// Slack gateway failures
#[derive(Error, Debug)]
pub enum SlackError {
    #[error("Slack request failed: {0}")]
    Http(String),

    #[error("Slack API error: {0}")]
    Api(String),
}
