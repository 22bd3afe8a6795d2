//! Repository analysis collaborators
//!
//! Defines the two external services `/analyze` depends on and their HTTP
//! implementations:
//! - `RepositorySource`: directory listing and file retrieval on the
//!   source-control host (`GitHubContents`)
//! - `CompletionModel`: text generation from a prompt (`OpenAiChat`)
//!
//! `Analyzer` ties them together: walk the repository for candidate files,
//! assemble the prompt, ask the model. Both traits use
//! `Pin<Box<dyn Future>>` returns so they can live behind `Arc<dyn _>` and be
//! swapped for fakes in tests.

pub mod analyzer;
pub mod error;
pub mod github;
pub mod openai;
pub mod prompt;
pub mod search;

pub use analyzer::Analyzer;
pub use error::{Error, Result};
pub use github::GitHubContents;
pub use openai::OpenAiChat;
pub use search::{SearchOptions, find_candidate_files};

use std::future::Future;
use std::pin::Pin;

/// `owner/name` reference to a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parse `owner/name`. Surrounding whitespace and a trailing `.git` are
    /// tolerated; anything else malformed is rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        let mut parts = trimmed.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if valid_segment(owner) && valid_segment(name) => {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(Error::InvalidRepo(input.trim().to_string())),
        }
    }
}

fn valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Symlinks, submodules: never traversed or fetched
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
}

/// A fetched file with its decoded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

/// Source-control hosting API.
pub trait RepositorySource: Send + Sync {
    /// List the entries of `path` (`""` for the repository root).
    fn list_dir<'a>(
        &'a self,
        token: &'a str,
        repo: &'a RepoRef,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ContentEntry>>> + Send + 'a>>;

    /// Fetch a single file and decode it as UTF-8.
    fn fetch_file<'a>(
        &'a self,
        token: &'a str,
        repo: &'a RepoRef,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<SourceFile>> + Send + 'a>>;
}

/// Language-model completion API.
pub trait CompletionModel: Send + Sync {
    /// Model identifier for logging
    fn id(&self) -> &str;

    /// Generate a reply to `user` under the `system` instructions.
    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}
