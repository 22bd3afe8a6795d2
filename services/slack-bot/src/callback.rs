//! OAuth callback state machine
//!
//! `handle_event` is pure: it receives an event and returns the new state
//! plus the action the caller must perform. `github_callback` drives it,
//! executing each action against the stores, the exchange client and Slack,
//! and feeding the outcome back as the next event.
//!
//! ```text
//! AwaitingCode -> Validating -> Exchanging -> Persisting -> Notifying -> Done
//!       \              \             \             \
//!        +--------------+-------------+-------------+--> Error
//! ```
//!
//! The credential is written only in `Persisting`, so no `Error` path can
//! leave a credential behind. Notification is best-effort: once the
//! credential is stored the flow ends in `Done` whether or not Slack accepted
//! the message.

use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use common::Secret;
use serde::Deserialize;
use tracing::{Instrument, info, info_span, warn};

use crate::AppState;
use crate::error::CallbackError;
use crate::metrics;

/// Shown in the browser after a successful link.
pub const SUCCESS_PAGE: &str = "GitHub account connected. You can close this window.";

/// Sent to the user's DM after a successful link.
pub const LINKED_MESSAGE: &str =
    "Your GitHub account is now connected! You can use the `/analyze` command.";

#[derive(Debug)]
pub enum CallbackState {
    /// Request received, parameters not yet checked
    AwaitingCode,
    /// Consuming the state nonce
    Validating { code: String },
    /// Trading the code for a token on behalf of `identity`
    Exchanging { identity: String },
    /// Writing the token to the credential store
    Persisting { identity: String },
    /// Telling the user over Slack
    Notifying { identity: String },
    /// Terminal: account linked
    Done { identity: String, notified: bool },
    /// Terminal: nothing was stored
    Error(CallbackError),
}

#[derive(Debug)]
pub enum CallbackEvent {
    /// Query parameters of the redirect
    Received {
        code: Option<String>,
        state: Option<String>,
    },
    /// Result of consuming the nonce; `None` when unknown, used or expired
    StateConsumed(Option<String>),
    /// Exchange returned a token
    Exchanged(Secret<String>),
    /// Credential written
    Persisted,
    /// Notification attempted
    Notified { delivered: bool },
    /// The current step failed
    Failed(CallbackError),
}

#[derive(Debug)]
pub enum CallbackAction {
    ConsumeState { nonce: String },
    Exchange { code: String },
    Persist { identity: String, secret: Secret<String> },
    Notify { identity: String },
    /// Flow finished; respond from the terminal state
    Respond,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: CallbackState, event: CallbackEvent) -> (CallbackState, CallbackAction) {
    match (state, event) {
        // --- AwaitingCode ---
        (CallbackState::AwaitingCode, CallbackEvent::Received { code, state }) => {
            match (non_empty(code), non_empty(state)) {
                (None, _) => (
                    CallbackState::Error(CallbackError::MissingCode),
                    CallbackAction::Respond,
                ),
                (Some(_), None) => (
                    CallbackState::Error(CallbackError::InvalidOrExpiredState),
                    CallbackAction::Respond,
                ),
                (Some(code), Some(nonce)) => (
                    CallbackState::Validating { code },
                    CallbackAction::ConsumeState { nonce },
                ),
            }
        }

        // --- Validating ---
        (CallbackState::Validating { code }, CallbackEvent::StateConsumed(Some(identity))) => (
            CallbackState::Exchanging { identity },
            CallbackAction::Exchange { code },
        ),
        (CallbackState::Validating { .. }, CallbackEvent::StateConsumed(None)) => (
            CallbackState::Error(CallbackError::InvalidOrExpiredState),
            CallbackAction::Respond,
        ),

        // --- Exchanging ---
        (CallbackState::Exchanging { identity }, CallbackEvent::Exchanged(secret)) => (
            CallbackState::Persisting {
                identity: identity.clone(),
            },
            CallbackAction::Persist { identity, secret },
        ),

        // --- Persisting ---
        (CallbackState::Persisting { identity }, CallbackEvent::Persisted) => (
            CallbackState::Notifying {
                identity: identity.clone(),
            },
            CallbackAction::Notify { identity },
        ),

        // --- Notifying ---
        (CallbackState::Notifying { identity }, CallbackEvent::Notified { delivered }) => (
            CallbackState::Done {
                identity,
                notified: delivered,
            },
            CallbackAction::Respond,
        ),

        // --- Failures in any working state ---
        (
            CallbackState::Validating { .. }
            | CallbackState::Exchanging { .. }
            | CallbackState::Persisting { .. },
            CallbackEvent::Failed(e),
        ) => (CallbackState::Error(e), CallbackAction::Respond),

        // --- Terminal and unexpected combinations ---
        (state @ (CallbackState::Done { .. } | CallbackState::Error(_)), _) => {
            (state, CallbackAction::Respond)
        }
        (state, event) => (
            CallbackState::Error(CallbackError::Internal(format!(
                "unexpected {event:?} in {state:?}"
            ))),
            CallbackAction::Respond,
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    /// Set by GitHub when the user declines authorization
    error: Option<String>,
}

/// GET /github/callback: finish linking a GitHub account.
pub async fn github_callback(
    State(app): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let request_id = format!("cb_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!("github_callback", request_id);
    async move {
        if let Some(error) = params.error.as_deref() {
            info!(error, "authorization declined at GitHub");
        }
        let outcome = run(&app, params.code, params.state).await;
        respond(outcome)
    }
    .instrument(span)
    .await
}

/// Drive the state machine to a terminal state.
async fn run(app: &AppState, code: Option<String>, nonce: Option<String>) -> CallbackState {
    let mut state = CallbackState::AwaitingCode;
    let mut event = CallbackEvent::Received { code, state: nonce };

    loop {
        let (next, action) = handle_event(state, event);
        state = next;

        event = match action {
            CallbackAction::ConsumeState { nonce } => match app.states.consume(&nonce).await {
                Ok(identity) => CallbackEvent::StateConsumed(identity),
                Err(e) => CallbackEvent::Failed(e.into()),
            },
            CallbackAction::Exchange { code } => {
                let started = Instant::now();
                let result = app.oauth.exchange(&code).await;
                metrics::record_exchange_duration(started.elapsed().as_secs_f64());
                match result {
                    Ok(secret) => CallbackEvent::Exchanged(secret),
                    Err(e) => CallbackEvent::Failed(e.into()),
                }
            }
            CallbackAction::Persist { identity, secret } => {
                match app.credentials.put(&identity, secret.expose()).await {
                    Ok(()) => CallbackEvent::Persisted,
                    Err(e) => CallbackEvent::Failed(e.into()),
                }
            }
            CallbackAction::Notify { identity } => {
                match app.messenger.post_message(&identity, LINKED_MESSAGE).await {
                    Ok(()) => CallbackEvent::Notified { delivered: true },
                    Err(e) => {
                        warn!(identity, error = %e, "account linked but Slack notification failed");
                        CallbackEvent::Notified { delivered: false }
                    }
                }
            }
            CallbackAction::Respond => return state,
        };
    }
}

fn respond(state: CallbackState) -> Response {
    let text_plain = [(CONTENT_TYPE, "text/plain; charset=utf-8")];
    match state {
        CallbackState::Done { identity, notified } => {
            info!(identity, notified, "GitHub account linked");
            metrics::record_callback("success");
            (StatusCode::OK, text_plain, SUCCESS_PAGE).into_response()
        }
        CallbackState::Error(e) => {
            if e.status().is_server_error() {
                warn!(error = %e, "OAuth callback failed");
            } else {
                info!(error = %e, "OAuth callback rejected");
            }
            metrics::record_callback(e.outcome());
            (e.status(), text_plain, e.user_message()).into_response()
        }
        other => {
            warn!(state = ?other, "callback flow stopped in a non-terminal state");
            metrics::record_callback("internal_error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                text_plain,
                "Something went wrong. Try again later.",
            )
                .into_response()
        }
    }
}
