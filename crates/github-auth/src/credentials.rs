//! Credential storage for linked GitHub accounts
//!
//! Maps a Slack user id to the GitHub access token obtained for it. At most
//! one record exists per identity; writing replaces the previous record.
//! Each operation loads, modifies and saves the whole document under the
//! store's own lock, so writes for different identities never lose each
//! other's updates.
//!
//! Tokens are stored in plaintext (file mode 0600).
//!
//! Persisted layout (`tokens.json`):
//! ```json
//! { "U123": { "github_token": "gho_...", "updated_at": "2026-10-15T09:31:12Z" } }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::JsonDocument;
use crate::error::Result;

/// A stored GitHub credential.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub github_token: String,
    #[serde(deserialize_with = "crate::timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("github_token", &"[REDACTED]")
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Thread-safe credential file manager.
pub struct CredentialStore {
    document: JsonDocument<CredentialRecord>,
}

impl CredentialStore {
    /// Open (or create) the credential document at `path`.
    ///
    /// A missing file starts an empty store. A file that exists but does
    /// not parse is an error.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let document = JsonDocument::open(path).await?;
        Ok(Self { document })
    }

    /// Location of the backing document.
    pub fn path(&self) -> &Path {
        self.document.path()
    }

    /// Store `secret` for `identity`, replacing any previous record.
    pub async fn put(&self, identity: &str, secret: &str) -> Result<()> {
        let record = CredentialRecord {
            github_token: secret.to_owned(),
            updated_at: Utc::now(),
        };

        let replaced = self
            .document
            .update(|records| {
                let replaced = records.insert(identity.to_owned(), record).is_some();
                (replaced, true)
            })
            .await?;

        info!(identity, replaced, "stored credential");
        Ok(())
    }

    /// Token for `identity`, or `None` when the user has not linked an account.
    pub async fn get(&self, identity: &str) -> Result<Option<Secret<String>>> {
        self.document
            .read(|records| {
                records
                    .get(identity)
                    .map(|r| Secret::new(r.github_token.clone()))
            })
            .await
    }

    /// Remove the record for `identity`. Returns whether one existed.
    pub async fn delete(&self, identity: &str) -> Result<bool> {
        let removed = self
            .document
            .update(|records| {
                let removed = records.remove(identity).is_some();
                (removed, removed)
            })
            .await?;

        if removed {
            info!(identity, "deleted credential");
        } else {
            debug!(identity, "no credential to delete");
        }
        Ok(removed)
    }

    /// Number of linked identities.
    pub async fn len(&self) -> Result<usize> {
        self.document.read(|records| records.len()).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
