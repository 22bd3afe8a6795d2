//! Single-use state tokens for the OAuth handshake
//!
//! `/connect-github` issues a nonce bound to the Slack user who ran it; the
//! GitHub callback redeems it exactly once. Lookup and delete happen in the
//! same critical section, so of any number of concurrent `consume` calls on
//! one nonce exactly one observes the identity.
//!
//! Persisted layout (`states.json`):
//! ```json
//! { "<nonce>": { "user_id": "U123", "created_at": "2026-10-15T09:30:00Z" } }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::JsonDocument;
use crate::error::Result;
use crate::nonce::{generate_nonce, redact};

/// The identity a nonce was issued to, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub user_id: String,
    #[serde(deserialize_with = "crate::timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
}

impl StateEntry {
    /// Expired entries are redeemable no longer. A TTL too large to
    /// represent never expires.
    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match TimeDelta::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.created_at) > ttl,
            Err(_) => false,
        }
    }
}

pub struct StateTokenStore {
    document: JsonDocument<StateEntry>,
    ttl: Duration,
}

impl StateTokenStore {
    /// Open (or create) the state document at `path`.
    pub async fn open(path: PathBuf, ttl: Duration) -> Result<Self> {
        let document = JsonDocument::open(path).await?;
        Ok(Self { document, ttl })
    }

    /// Location of the backing document.
    pub fn path(&self) -> &Path {
        self.document.path()
    }

    /// Issue a fresh nonce for `identity` and persist it before returning.
    ///
    /// Expired entries are pruned in the same write.
    pub async fn issue(&self, identity: &str) -> Result<String> {
        let nonce = generate_nonce();
        let now = Utc::now();
        let ttl = self.ttl;
        let entry = StateEntry {
            user_id: identity.to_owned(),
            created_at: now,
        };

        let pruned = self
            .document
            .update(|states| {
                let before = states.len();
                states.retain(|_, s| !s.is_expired(now, ttl));
                let pruned = before - states.len();
                states.insert(nonce.clone(), entry);
                (pruned, true)
            })
            .await?;

        if pruned > 0 {
            debug!(pruned, "pruned expired state tokens");
        }
        info!(identity, nonce = redact(&nonce), "issued state token");
        Ok(nonce)
    }

    /// Redeem `nonce`, returning the identity it was issued to.
    ///
    /// Returns `None` when the nonce is unknown, already consumed, or
    /// expired. An expired entry is deleted as part of the same call.
    pub async fn consume(&self, nonce: &str) -> Result<Option<String>> {
        let now = Utc::now();
        let ttl = self.ttl;

        let removed = self
            .document
            .update(|states| {
                let removed = states.remove(nonce);
                let changed = removed.is_some();
                (removed, changed)
            })
            .await?;

        match removed {
            Some(entry) if entry.is_expired(now, ttl) => {
                warn!(
                    identity = entry.user_id,
                    nonce = redact(nonce),
                    issued_at = %entry.created_at,
                    "state token expired"
                );
                Ok(None)
            }
            Some(entry) => {
                info!(identity = entry.user_id, nonce = redact(nonce), "consumed state token");
                Ok(Some(entry.user_id))
            }
            None => {
                debug!(nonce = redact(nonce), "unknown or already consumed state token");
                Ok(None)
            }
        }
    }

    /// Number of unconsumed entries on disk, expired ones included.
    pub async fn pending(&self) -> Result<usize> {
        self.document.read(|states| states.len()).await
    }
}
