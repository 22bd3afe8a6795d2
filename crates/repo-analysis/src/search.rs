//! Candidate file discovery
//!
//! Breadth-first walk of the repository from its root. A file is a
//! candidate when it has a source extension and its name contains one of
//! the feature description's keywords. With no usable keywords every source
//! file is a candidate.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::error::Result;
use crate::{ContentEntry, EntryKind, RepoRef, RepositorySource};

/// Extensions considered source code.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".java", ".cpp", ".cs", ".php", ".rs", ".go", ".ts",
];

/// Keywords shorter than this are ignored ("a", "of", "to" match everything).
const MIN_KEYWORD_LEN: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Stop after this many candidates
    pub max_files: usize,
    /// Stop after listing this many directories
    pub max_dirs: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_files: 20,
            max_dirs: 200,
        }
    }
}

/// Lower-cased keywords from a free-text feature description.
pub fn keywords(feature: &str) -> Vec<String> {
    feature
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
        .collect()
}

/// Whether a file name is a candidate for the given keywords.
pub fn is_candidate(file_name: &str, keywords: &[String]) -> bool {
    let lower = file_name.to_lowercase();
    if !SOURCE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }
    keywords.is_empty() || keywords.iter().any(|k| lower.contains(k.as_str()))
}

/// Walk `repo` and return up to `options.max_files` candidate files in
/// breadth-first order.
///
/// A failure listing the root is returned to the caller; failures on
/// subdirectories are logged and the subdirectory is skipped.
pub async fn find_candidate_files(
    source: &dyn RepositorySource,
    token: &str,
    repo: &RepoRef,
    feature: &str,
    options: SearchOptions,
) -> Result<Vec<ContentEntry>> {
    let keywords = keywords(feature);
    let mut found = Vec::new();
    let mut queue = VecDeque::from([String::new()]);
    let mut listed = 0usize;

    while let Some(dir) = queue.pop_front() {
        if found.len() >= options.max_files || listed >= options.max_dirs {
            break;
        }

        let entries = match source.list_dir(token, repo, &dir).await {
            Ok(entries) => entries,
            Err(e) if dir.is_empty() => return Err(e),
            Err(e) => {
                warn!(repo = %repo, dir, error = %e, "skipping unreadable directory");
                continue;
            }
        };
        listed += 1;

        for entry in entries {
            match entry.kind {
                EntryKind::Dir => queue.push_back(entry.path),
                EntryKind::File if is_candidate(&entry.name, &keywords) => {
                    found.push(entry);
                    if found.len() >= options.max_files {
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    debug!(repo = %repo, candidates = found.len(), dirs = listed, "candidate search finished");
    Ok(found)
}
