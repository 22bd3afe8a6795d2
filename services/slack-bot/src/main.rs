//! Slack GitHub bot
//!
//! Single-binary service that:
//! 1. Links a Slack user to a GitHub account via OAuth (`/connect-github`
//!    and `GET /github/callback`)
//! 2. Stores the resulting access token per Slack user
//! 3. Answers `/analyze owner/repo [feature]` by reading the repository with
//!    the user's token and asking a language model about the feature

mod callback;
mod commands;
mod config;
mod error;
mod metrics;
mod slack;
#[cfg(test)]
mod testing;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use common::Secret;
use github_auth::{CredentialStore, OAuthClient, OAuthSettings, StateTokenStore};
use metrics_exporter_prometheus::PrometheusHandle;
use repo_analysis::{Analyzer, GitHubContents, OpenAiChat, SearchOptions};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Credentials};
use crate::slack::{Messenger, SlackClient};

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    states: Arc<StateTokenStore>,
    credentials: Arc<CredentialStore>,
    oauth: Arc<OAuthClient>,
    messenger: Arc<dyn Messenger>,
    /// `None` when no completion API key is configured
    analyzer: Option<Arc<Analyzer>>,
    signing_secret: Arc<Secret<String>>,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Only `/slack/events` sits behind the Slack signature check; the OAuth
/// callback is reached by the user's browser and is guarded by the state
/// nonce instead.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let slack_routes = Router::new()
        .route("/slack/events", post(commands::slack_events))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            slack::require_signature,
        ));

    Router::new()
        .route("/github/callback", get(callback::github_callback))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(slack_routes)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting slack-github-bot");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus = metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config = match Config::resolve_path(cli_config_path) {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            Config::load(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => Config::load_optional(Path::new(config::DEFAULT_CONFIG_FILE))
            .with_context(|| format!("failed to load {}", config::DEFAULT_CONFIG_FILE))?,
    };
    let credentials = Credentials::from_env().context("missing required credentials")?;

    info!(
        listen_addr = %config.server.listen_addr,
        data_dir = %config.storage.data_dir.display(),
        state_ttl_secs = config.oauth.state_ttl_secs,
        redirect_uri = %credentials.github_redirect_uri,
        "configuration loaded"
    );

    let states = StateTokenStore::open(config.storage.states_path(), config.oauth.state_ttl())
        .await
        .context("failed to open state token store")?;
    let credential_store = CredentialStore::open(config.storage.credentials_path())
        .await
        .context("failed to open credential store")?;
    info!(
        credentials = %credential_store.path().display(),
        linked_identities = credential_store.len().await.unwrap_or(0),
        states = %states.path().display(),
        pending_states = states.pending().await.unwrap_or(0),
        "stores opened"
    );

    let oauth = OAuthClient::new(OAuthSettings {
        client_id: credentials.github_client_id.clone(),
        client_secret: credentials.github_client_secret.clone(),
        redirect_uri: credentials.github_redirect_uri.clone(),
        scope: config.oauth.scope.clone(),
        authorize_endpoint: config.oauth.authorize_endpoint.clone(),
        token_endpoint: config.oauth.token_endpoint.clone(),
        timeout: config.oauth.exchange_timeout(),
    })
    .context("invalid GitHub OAuth settings")?;

    let slack_client = SlackClient::new(
        &config.slack.api_base,
        credentials.slack_bot_token.clone(),
        Duration::from_secs(config.slack.timeout_secs),
    )
    .context("failed to build Slack client")?;

    let analyzer = match &credentials.openai_api_key {
        Some(key) => Some(Arc::new(build_analyzer(&config, key.clone())?)),
        None => {
            warn!("OPENAI_API_KEY not set, /analyze is disabled");
            None
        }
    };

    let app_state = AppState {
        states: Arc::new(states),
        credentials: Arc::new(credential_store),
        oauth: Arc::new(oauth),
        messenger: Arc::new(slack_client),
        analyzer,
        signing_secret: Arc::new(credentials.slack_signing_secret.clone()),
        started_at: Instant::now(),
        prometheus,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts when the signal arrives, not when the server
    // starts: notify the server to drain, then race it against the timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

fn build_analyzer(config: &Config, api_key: Secret<String>) -> Result<Analyzer> {
    let source = GitHubContents::new(
        &config.analysis.github_api_base,
        Duration::from_secs(config.analysis.github_timeout_secs),
    )
    .context("failed to build GitHub contents client")?;
    let model = OpenAiChat::new(
        &config.analysis.completion_api_base,
        api_key,
        config.analysis.model.clone(),
        Duration::from_secs(config.analysis.completion_timeout_secs),
    )
    .context("failed to build completion client")?;

    info!(model = %config.analysis.model, max_files = config.analysis.max_files, "analysis enabled");
    Ok(Analyzer::new(
        Arc::new(source),
        Arc::new(model),
        SearchOptions {
            max_files: config.analysis.max_files,
            ..SearchOptions::default()
        },
    ))
}

/// Health endpoint: JSON with status, uptime and the number of linked
/// identities. 503 when the credential store cannot be read.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();

    let (status_code, body) = match state.credentials.len().await {
        Ok(linked) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "uptime_seconds": uptime,
                "linked_identities": linked,
            }),
        ),
        Err(e) => {
            warn!(error = %e, "health check could not read credential store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "status": "degraded",
                    "uptime_seconds": uptime,
                    "error": "credential store unavailable",
                }),
            )
        }
    };

    (status_code, [(CONTENT_TYPE, "application/json")], body.to_string())
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
