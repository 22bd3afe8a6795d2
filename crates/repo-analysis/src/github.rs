//! GitHub contents API client
//!
//! Lists directories and fetches files with the linked user's access token:
//! `GET {api_base}/repos/{owner}/{repo}/contents/{path}`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::{ContentEntry, EntryKind, RepoRef, RepositorySource, SourceFile};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const CLIENT_USER_AGENT: &str = concat!("slack-github-bot/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    path: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<RawEntry>),
    File(RawFile),
}

pub struct GitHubContents {
    http: reqwest::Client,
    api_base: Url,
}

impl GitHubContents {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        let api_base = Url::parse(api_base)
            .map_err(|e| Error::Source(format!("invalid API base {api_base}: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(Error::Source(format!("invalid API base {api_base}")));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Source(format!("building HTTP client: {e}")))?;
        Ok(Self { http, api_base })
    }

    fn contents_url(&self, repo: &RepoRef, path: &str) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["repos", repo.owner.as_str(), repo.name.as_str(), "contents"])
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    async fn get_contents(&self, token: &str, repo: &RepoRef, path: &str) -> Result<ContentsResponse> {
        let url = self.contents_url(repo, path);
        debug!(repo = %repo, path, "fetching repository contents");

        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| Error::Source(format!("{repo}/{path}: {}", e.without_url())))?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                return Err(Error::NotFound(format!("{repo}/{path}")));
            }
            s => return Err(Error::Source(format!("{repo}/{path}: GitHub returned {s}"))),
        }

        response
            .json::<ContentsResponse>()
            .await
            .map_err(|e| Error::Source(format!("{repo}/{path}: unexpected response: {e}")))
    }
}

impl RepositorySource for GitHubContents {
    fn list_dir<'a>(
        &'a self,
        token: &'a str,
        repo: &'a RepoRef,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ContentEntry>>> + Send + 'a>> {
        Box::pin(async move {
            match self.get_contents(token, repo, path).await? {
                ContentsResponse::Listing(entries) => Ok(entries
                    .into_iter()
                    .map(|e| ContentEntry {
                        kind: match e.kind.as_str() {
                            "file" => EntryKind::File,
                            "dir" => EntryKind::Dir,
                            _ => EntryKind::Other,
                        },
                        name: e.name,
                        path: e.path,
                    })
                    .collect()),
                ContentsResponse::File(_) => {
                    Err(Error::Source(format!("{repo}/{path} is a file, not a directory")))
                }
            }
        })
    }

    fn fetch_file<'a>(
        &'a self,
        token: &'a str,
        repo: &'a RepoRef,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<SourceFile>> + Send + 'a>> {
        Box::pin(async move {
            match self.get_contents(token, repo, path).await? {
                ContentsResponse::File(file) => decode_file(file),
                ContentsResponse::Listing(_) => {
                    Err(Error::Source(format!("{repo}/{path} is a directory")))
                }
            }
        })
    }
}

fn decode_file(file: RawFile) -> Result<SourceFile> {
    if file.encoding.as_deref() != Some("base64") {
        return Err(Error::Decode(format!(
            "{}: unsupported encoding {:?}",
            file.path, file.encoding
        )));
    }
    let encoded: String = file
        .content
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::Decode(format!("{}: {e}", file.path)))?;
    let content =
        String::from_utf8(bytes).map_err(|_| Error::Decode(format!("{}: not UTF-8", file.path)))?;
    Ok(SourceFile {
        path: file.path,
        content,
    })
}
