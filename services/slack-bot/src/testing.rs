//! Shared fixtures for handler tests: an `AppState` wired to temp-dir
//! stores, a local token endpoint, a recording Slack messenger and fake
//! analysis collaborators.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::routing::post;
use axum::{Form, Json, Router};
use common::Secret;
use github_auth::{CredentialStore, OAuthClient, OAuthSettings, StateTokenStore};
use hmac::{Hmac, Mac};
use repo_analysis::{
    Analyzer, CompletionModel, ContentEntry, EntryKind, RepoRef, RepositorySource, SearchOptions,
    SourceFile,
};
use serde_json::{Value, json};
use sha2::Sha256;
use tokio::net::TcpListener;

use crate::AppState;
use crate::error::SlackError;
use crate::slack::Messenger;

pub const CLIENT_SECRET: &str = "test-client-secret";
pub const SIGNING_SECRET: &str = "test-signing-secret";

/// `X-Slack-Signature` value for `body` sent at unix time `ts`.
pub fn sign(secret: &str, ts: u64, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("v0:{ts}:").as_bytes());
    mac.update(body);
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

/// Messenger that records what it was asked to send.
#[derive(Default)]
pub struct RecordingMessenger {
    posts: Mutex<Vec<(String, String)>>,
    responses: Mutex<Vec<(String, Value)>>,
    fail_posts: bool,
    fail_responses: bool,
}

impl RecordingMessenger {
    pub fn failing_posts() -> Self {
        Self {
            fail_posts: true,
            ..Self::default()
        }
    }

    pub fn failing_responses() -> Self {
        Self {
            fail_responses: true,
            ..Self::default()
        }
    }

    pub fn posted(&self) -> Vec<(String, String)> {
        self.posts.lock().unwrap().clone()
    }

    /// Poll until at least `n` messages were posted (background tasks).
    pub async fn wait_for_posts(&self, n: usize) -> Vec<(String, String)> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let posts = self.posted();
            if posts.len() >= n || Instant::now() > deadline {
                return posts;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until at least `n` response_url replies were sent.
    pub async fn wait_for_responses(&self, n: usize) -> Vec<(String, Value)> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let responses = self.responses.lock().unwrap().clone();
            if responses.len() >= n || Instant::now() > deadline {
                return responses;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Messenger for RecordingMessenger {
    fn post_message<'a>(
        &'a self,
        channel: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), SlackError>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail_posts {
                return Err(SlackError::Api("channel_not_found".into()));
            }
            self.posts
                .lock()
                .unwrap()
                .push((channel.to_string(), text.to_string()));
            Ok(())
        })
    }

    fn respond<'a>(
        &'a self,
        response_url: &'a str,
        payload: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), SlackError>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail_responses {
                return Err(SlackError::Http("response_url returned 404 Not Found".into()));
            }
            self.responses
                .lock()
                .unwrap()
                .push((response_url.to_string(), payload.clone()));
            Ok(())
        })
    }
}

/// `octo/shop` holds `payment.py` and a README; `octo/private` is not
/// accessible. Records the token of every root listing.
#[derive(Default)]
struct FakeRepo {
    tokens: Mutex<Vec<String>>,
}

impl RepositorySource for FakeRepo {
    fn list_dir<'a>(
        &'a self,
        token: &'a str,
        repo: &'a RepoRef,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = repo_analysis::Result<Vec<ContentEntry>>> + Send + 'a>> {
        Box::pin(async move {
            if path.is_empty() {
                self.tokens.lock().unwrap().push(token.to_string());
            }
            if repo.name != "shop" {
                return Err(repo_analysis::Error::NotFound(repo.to_string()));
            }
            if !path.is_empty() {
                return Ok(Vec::new());
            }
            Ok(["payment.py", "README.md"]
                .into_iter()
                .map(|name| ContentEntry {
                    name: name.to_string(),
                    path: name.to_string(),
                    kind: EntryKind::File,
                })
                .collect())
        })
    }

    fn fetch_file<'a>(
        &'a self,
        _token: &'a str,
        _repo: &'a RepoRef,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = repo_analysis::Result<SourceFile>> + Send + 'a>> {
        Box::pin(async move {
            match path {
                "payment.py" => Ok(SourceFile {
                    path: path.to_string(),
                    content: "def charge(card):\n    return gateway.charge(card)\n".to_string(),
                }),
                other => Err(repo_analysis::Error::NotFound(other.to_string())),
            }
        })
    }
}

/// Model that answers with the prompt it was given.
struct EchoModel;

impl CompletionModel for EchoModel {
    fn id(&self) -> &str {
        "echo"
    }

    fn complete<'a>(
        &'a self,
        _system: &'a str,
        user: &'a str,
    ) -> Pin<Box<dyn Future<Output = repo_analysis::Result<String>> + Send + 'a>> {
        Box::pin(async move { Ok(user.to_string()) })
    }
}

/// Local token endpoint that behaves like GitHub's: 200 with `access_token`
/// for `good-code` and the right client secret, 200 with `error` otherwise.
async fn start_token_server() -> (String, Arc<AtomicUsize>) {
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();
    let app = Router::new().route(
        "/login/oauth/access_token",
        post(move |Form(form): Form<HashMap<String, String>>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let valid = form.get("code").map(String::as_str) == Some("good-code")
                    && form.get("client_secret").map(String::as_str) == Some(CLIENT_SECRET);
                if valid {
                    Json(json!({ "access_token": "ghp_x", "token_type": "bearer", "scope": "repo" }))
                } else {
                    Json(json!({
                        "error": "bad_verification_code",
                        "error_description": "The code passed is incorrect or expired."
                    }))
                }
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/login/oauth/access_token"), requests)
}

/// A fully wired `AppState` over temporary storage.
pub struct TestApp {
    pub state: AppState,
    pub messenger: Arc<RecordingMessenger>,
    pub dir: tempfile::TempDir,
    token_requests: Arc<AtomicUsize>,
    repo: Arc<FakeRepo>,
}

impl TestApp {
    pub async fn start() -> Self {
        Self::build(RecordingMessenger::default(), true).await
    }

    pub async fn start_with_messenger(messenger: RecordingMessenger) -> Self {
        Self::build(messenger, true).await
    }

    pub async fn start_without_analyzer() -> Self {
        Self::build(RecordingMessenger::default(), false).await
    }

    async fn build(messenger: RecordingMessenger, with_analyzer: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let (token_endpoint, token_requests) = start_token_server().await;

        let states = StateTokenStore::open(dir.path().join("states.json"), Duration::from_secs(600))
            .await
            .unwrap();
        let credentials = CredentialStore::open(dir.path().join("tokens.json"))
            .await
            .unwrap();
        let oauth = OAuthClient::new(OAuthSettings {
            token_endpoint,
            timeout: Duration::from_secs(5),
            ..OAuthSettings::github(
                "Iv1.test".into(),
                Secret::from(CLIENT_SECRET),
                "https://bot.example.com/github/callback".into(),
            )
        })
        .unwrap();

        let repo = Arc::new(FakeRepo::default());
        let analyzer = with_analyzer.then(|| {
            Arc::new(Analyzer::new(
                repo.clone(),
                Arc::new(EchoModel),
                SearchOptions::default(),
            ))
        });

        let messenger = Arc::new(messenger);
        let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();

        let state = AppState {
            states: Arc::new(states),
            credentials: Arc::new(credentials),
            oauth: Arc::new(oauth),
            messenger: messenger.clone(),
            analyzer,
            signing_secret: Arc::new(Secret::from(SIGNING_SECRET)),
            started_at: Instant::now(),
            prometheus,
        };

        Self {
            state,
            messenger,
            dir,
            token_requests,
            repo,
        }
    }

    pub fn router(&self) -> Router {
        crate::build_router(self.state.clone(), 16)
    }

    /// Number of requests that reached the token endpoint.
    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    /// Tokens the analyzer used to list repositories.
    pub fn repo_tokens(&self) -> Vec<String> {
        self.repo.tokens.lock().unwrap().clone()
    }
}
