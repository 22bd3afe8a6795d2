//! Slack gateway: request signatures, outbound messages, reply payloads
//!
//! Every request on `/slack/events` must carry a valid
//! `X-Slack-Signature`, computed as `v0=` + hex(HMAC-SHA256(signing_secret,
//! "v0:{timestamp}:{body}")). Requests whose timestamp is more than
//! `SIGNATURE_MAX_AGE_SECS` away from now are rejected as replays.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common::Secret;
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::SlackError;

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Replay window for signed requests.
pub const SIGNATURE_MAX_AGE_SECS: u64 = 300;

/// Upper bound on a buffered Slack request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

type HmacSha256 = Hmac<Sha256>;

/// Check a Slack request signature against `body`.
///
/// `now_secs` is the current unix time; it is a parameter so the replay
/// window can be tested.
pub fn verify_signature(
    signing_secret: &Secret<String>,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now_secs: u64,
) -> bool {
    let Ok(ts) = timestamp.trim().parse::<u64>() else {
        return false;
    };
    if now_secs.abs_diff(ts) > SIGNATURE_MAX_AGE_SECS {
        return false;
    }
    let Some(expected) = signature
        .strip_prefix("v0=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
    else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(signing_secret.expose().as_bytes()) else {
        return false;
    };
    mac.update(b"v0:");
    mac.update(timestamp.trim().as_bytes());
    mac.update(b":");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Middleware for Slack routes: buffer the body, verify the signature, and
/// pass the rebuilt request on. Unsigned or stale requests get 401.
pub async fn require_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "failed to read Slack request body");
            return (StatusCode::BAD_REQUEST, "invalid request body").into_response();
        }
    };

    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    };
    let timestamp = header(TIMESTAMP_HEADER);
    let signature = header(SIGNATURE_HEADER);

    if !verify_signature(&state.signing_secret, timestamp, &bytes, signature, unix_now()) {
        warn!(uri = %parts.uri, "rejected Slack request with invalid signature");
        return (StatusCode::UNAUTHORIZED, "invalid signature").into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Outbound side of the Slack gateway.
pub trait Messenger: Send + Sync {
    /// Post `text` to a channel, or to a user's DM when `channel` is a user id.
    fn post_message<'a>(
        &'a self,
        channel: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), SlackError>> + Send + 'a>>;

    /// Deliver a delayed reply to a slash command's `response_url`.
    fn respond<'a>(
        &'a self,
        response_url: &'a str,
        payload: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), SlackError>> + Send + 'a>>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Slack Web API client authenticated with the bot token.
pub struct SlackClient {
    http: reqwest::Client,
    post_message_url: Url,
    bot_token: Secret<String>,
}

impl SlackClient {
    pub fn new(api_base: &str, bot_token: Secret<String>, timeout: Duration) -> Result<Self, SlackError> {
        let base = api_base.trim_end_matches('/');
        let post_message_url = Url::parse(&format!("{base}/chat.postMessage"))
            .map_err(|e| SlackError::Http(format!("invalid Slack API base {api_base}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SlackError::Http(format!("building HTTP client: {e}")))?;
        Ok(Self {
            http,
            post_message_url,
            bot_token,
        })
    }
}

impl Messenger for SlackClient {
    fn post_message<'a>(
        &'a self,
        channel: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), SlackError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .http
                .post(self.post_message_url.clone())
                .bearer_auth(self.bot_token.expose())
                .json(&json!({ "channel": channel, "text": text }))
                .send()
                .await
                .map_err(|e| SlackError::Http(e.without_url().to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(SlackError::Http(format!("chat.postMessage returned {status}")));
            }
            let body: ApiResponse = response
                .json()
                .await
                .map_err(|e| SlackError::Http(format!("invalid chat.postMessage response: {e}")))?;
            if !body.ok {
                return Err(SlackError::Api(
                    body.error.unwrap_or_else(|| "unknown_error".into()),
                ));
            }
            debug!(channel, "posted Slack message");
            Ok(())
        })
    }

    fn respond<'a>(
        &'a self,
        response_url: &'a str,
        payload: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), SlackError>> + Send + 'a>> {
        Box::pin(async move {
            let url = Url::parse(response_url)
                .map_err(|e| SlackError::Http(format!("invalid response_url: {e}")))?;
            if url.scheme() != "https" && url.scheme() != "http" {
                return Err(SlackError::Http(format!(
                    "response_url must use http or https, got {}",
                    url.scheme()
                )));
            }
            let response = self
                .http
                .post(url)
                .json(payload)
                .send()
                .await
                .map_err(|e| SlackError::Http(e.without_url().to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(SlackError::Http(format!("response_url returned {status}")));
            }
            Ok(())
        })
    }
}

/// Reply only the invoking user sees.
pub fn ephemeral(text: &str) -> Value {
    json!({ "response_type": "ephemeral", "text": text })
}

/// Reply visible to the whole channel.
pub fn in_channel(text: &str) -> Value {
    json!({ "response_type": "in_channel", "text": text })
}

/// Block Kit message with a button that opens the GitHub authorization page.
pub fn connect_prompt(authorization_url: &str) -> Value {
    json!({
        "response_type": "ephemeral",
        "text": "Connect your GitHub account",
        "blocks": [
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": "Click the button below to connect your GitHub account:"
                }
            },
            {
                "type": "actions",
                "elements": [
                    {
                        "type": "button",
                        "text": { "type": "plain_text", "text": "Connect GitHub" },
                        "url": authorization_url,
                        "action_id": "github_connect"
                    }
                ]
            }
        ]
    })
}
