//! Feature analysis pipeline: search -> fetch -> prompt -> complete

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::prompt::{SYSTEM_PROMPT, user_prompt};
use crate::search::{SearchOptions, find_candidate_files};
use crate::{CompletionModel, RepoRef, RepositorySource};

/// Reply when the search finds nothing that can be fed to the model.
pub const NO_FILES_MESSAGE: &str = "No files to analyze.";

pub struct Analyzer {
    source: Arc<dyn RepositorySource>,
    model: Arc<dyn CompletionModel>,
    options: SearchOptions,
}

impl Analyzer {
    pub fn new(
        source: Arc<dyn RepositorySource>,
        model: Arc<dyn CompletionModel>,
        options: SearchOptions,
    ) -> Self {
        Self {
            source,
            model,
            options,
        }
    }

    /// Ask the model whether `feature` is implemented in `repo`, reading the
    /// repository with the user's `token`.
    ///
    /// Files that cannot be fetched or decoded are skipped. When none remain
    /// the model is not called and `NO_FILES_MESSAGE` is returned.
    pub async fn analyze(&self, token: &str, repo: &RepoRef, feature: &str) -> Result<String> {
        let candidates =
            find_candidate_files(self.source.as_ref(), token, repo, feature, self.options).await?;

        let mut files = Vec::with_capacity(candidates.len());
        for entry in &candidates {
            match self.source.fetch_file(token, repo, &entry.path).await {
                Ok(file) => files.push(file),
                Err(e) => warn!(repo = %repo, path = entry.path, error = %e, "skipping file"),
            }
        }

        if files.is_empty() {
            info!(repo = %repo, candidates = candidates.len(), "no analyzable files");
            return Ok(NO_FILES_MESSAGE.to_string());
        }

        info!(repo = %repo, files = files.len(), model = self.model.id(), "running analysis");
        self.model
            .complete(SYSTEM_PROMPT, &user_prompt(feature, &files))
            .await
    }
}
