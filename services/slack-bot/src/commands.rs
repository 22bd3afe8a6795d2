//! Slack events and slash commands
//!
//! Everything Slack sends arrives on `POST /slack/events` after the
//! signature check:
//! - JSON `url_verification`: echo the challenge
//! - JSON `event_callback`: acknowledged, nothing subscribed
//! - form with `payload`: interactive action (the connect button), acknowledged
//! - form with `command`: slash command, dispatched below
//!
//! Slack expects an answer within 3 seconds, so handlers only do local work
//! before replying. `/analyze` replies at once and finishes in a background
//! task that posts to the command's `response_url`.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use repo_analysis::{Analyzer, RepoRef};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::AppState;
use crate::metrics;
use crate::slack::{self, Messenger};

pub const CONNECT_COMMAND: &str = "/connect-github";
pub const ANALYZE_COMMAND: &str = "/analyze";

pub const NOT_LINKED_MESSAGE: &str =
    "Connect your GitHub account first with the `/connect-github` command.";
pub const ANALYZE_USAGE: &str = "Usage: `/analyze owner/repo [feature description]`";
pub const ANALYSIS_UNAVAILABLE: &str = "Repository analysis is not configured on this bot.";
pub const TRY_AGAIN_MESSAGE: &str = "Something went wrong on our side. Please try again.";

/// Slash command form body. Unused fields are omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SlashCommand {
    pub command: String,
    pub text: String,
    pub user_id: String,
    pub response_url: String,
    /// Present instead of `command` on interactive payloads
    pub payload: Option<String>,
}

/// POST /slack/events
pub async fn slack_events(State(app): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if is_json {
        return handle_event_payload(&body);
    }

    let form: SlashCommand = match serde_urlencoded::from_bytes(&body) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "unparseable Slack form body");
            return (StatusCode::BAD_REQUEST, "invalid form body").into_response();
        }
    };

    if form.payload.is_some() {
        // Button clicks open the link client-side; nothing to do here
        return StatusCode::OK.into_response();
    }

    Json(dispatch(&app, form).await).into_response()
}

fn handle_event_payload(body: &[u8]) -> Response {
    let event: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "unparseable Slack event body");
            return (StatusCode::BAD_REQUEST, "invalid JSON body").into_response();
        }
    };

    match event["type"].as_str() {
        Some("url_verification") => {
            Json(json!({ "challenge": event["challenge"].as_str().unwrap_or_default() }))
                .into_response()
        }
        other => {
            info!(event_type = other.unwrap_or("unknown"), "acknowledged Slack event");
            StatusCode::OK.into_response()
        }
    }
}

/// Run a slash command and return the immediate reply payload.
pub async fn dispatch(app: &AppState, cmd: SlashCommand) -> Value {
    metrics::record_command(match cmd.command.as_str() {
        known @ (CONNECT_COMMAND | ANALYZE_COMMAND) => known,
        _ => "unknown",
    });
    info!(command = %cmd.command, user_id = %cmd.user_id, "slash command");

    if cmd.user_id.trim().is_empty() {
        return slack::ephemeral("Slack did not identify the user for this command.");
    }

    match cmd.command.as_str() {
        CONNECT_COMMAND => connect_github(app, &cmd.user_id).await,
        ANALYZE_COMMAND => analyze(app, cmd).await,
        other => slack::ephemeral(&format!("Unknown command: {other}")),
    }
}

/// Issue a state nonce for `user_id` and hand back the authorization link.
///
/// The nonce is durably stored before the link is returned, so the callback
/// can never arrive ahead of it.
async fn connect_github(app: &AppState, user_id: &str) -> Value {
    match app.states.issue(user_id).await {
        Ok(nonce) => slack::connect_prompt(&app.oauth.build_authorization_url(&nonce)),
        Err(e) => {
            error!(user_id, error = %e, "failed to issue state token");
            slack::ephemeral(TRY_AGAIN_MESSAGE)
        }
    }
}

/// Split `/analyze` text into the repository and the feature description.
fn parse_analyze_args(text: &str) -> Option<(RepoRef, String)> {
    let text = text.trim();
    let (repo, feature) = match text.split_once(char::is_whitespace) {
        Some((repo, rest)) => (repo, rest.trim()),
        None => (text, ""),
    };
    let repo = RepoRef::parse(repo).ok()?;
    Some((repo, feature.to_string()))
}

async fn analyze(app: &AppState, cmd: SlashCommand) -> Value {
    let Some((repo, feature)) = parse_analyze_args(&cmd.text) else {
        return slack::ephemeral(ANALYZE_USAGE);
    };

    let token = match app.credentials.get(&cmd.user_id).await {
        Ok(Some(token)) => token,
        Ok(None) => return slack::ephemeral(NOT_LINKED_MESSAGE),
        Err(e) => {
            error!(user_id = %cmd.user_id, error = %e, "failed to read credential");
            return slack::ephemeral(TRY_AGAIN_MESSAGE);
        }
    };

    let Some(analyzer) = app.analyzer.clone() else {
        return slack::ephemeral(ANALYSIS_UNAVAILABLE);
    };

    let reply = slack::ephemeral(&format!("Analyzing `{repo}`..."));
    let messenger = app.messenger.clone();
    tokio::spawn(async move {
        let result = run_analysis(&analyzer, token.expose(), &repo, &feature).await;
        deliver(messenger.as_ref(), &cmd, &result).await;
    });
    reply
}

async fn run_analysis(analyzer: &Analyzer, token: &str, repo: &RepoRef, feature: &str) -> Value {
    match analyzer.analyze(token, repo, feature).await {
        Ok(text) => {
            info!(repo = %repo, "analysis finished");
            slack::in_channel(&format!("Analysis of `{repo}`:\n{text}"))
        }
        Err(repo_analysis::Error::NotFound(_)) => slack::ephemeral(&format!(
            "`{repo}` was not found or your GitHub account cannot access it."
        )),
        Err(e) => {
            warn!(repo = %repo, error = %e, "analysis failed");
            slack::ephemeral(&format!("Analysis of `{repo}` failed. Please try again later."))
        }
    }
}

/// Post a delayed reply, falling back to a DM when there is no
/// `response_url` or it is rejected.
async fn deliver(messenger: &dyn Messenger, cmd: &SlashCommand, payload: &Value) {
    if !cmd.response_url.is_empty() {
        match messenger.respond(&cmd.response_url, payload).await {
            Ok(()) => return,
            Err(e) => warn!(user_id = %cmd.user_id, error = %e, "response_url delivery failed"),
        }
    }
    let text = payload["text"].as_str().unwrap_or_default();
    if let Err(e) = messenger.post_message(&cmd.user_id, text).await {
        warn!(user_id = %cmd.user_id, error = %e, "could not deliver analysis result");
    }
}
