//! GitHub account linking for Slack identities
//!
//! Provides the state-token handshake, the credential store, and the OAuth
//! exchange client used by the bot. This crate has no dependency on the
//! bot binary or on Slack and can be tested on its own.
//!
//! Linking flow:
//! 1. `/connect-github` calls `StateTokenStore::issue()` with the Slack user id
//! 2. The user authorizes via `OAuthClient::build_authorization_url()`
//! 3. The callback calls `StateTokenStore::consume()` with the returned `state`
//! 4. `OAuthClient::exchange()` trades the authorization code for a token
//! 5. The token is stored via `CredentialStore::put()`
//! 6. Later commands read it back with `CredentialStore::get()`

pub mod constants;
pub mod credentials;
mod document;
pub mod error;
pub mod nonce;
pub mod oauth;
pub mod state;
mod timestamp;

pub use constants::*;
pub use credentials::{CredentialRecord, CredentialStore};
pub use error::{Error, Result};
pub use nonce::generate_nonce;
pub use oauth::{OAuthClient, OAuthSettings};
pub use state::{StateEntry, StateTokenStore};
