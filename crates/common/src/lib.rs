//! Shared types for the Slack/GitHub bot workspace

mod env;
mod error;
mod secret;

pub use env::{optional_secret, required_secret, required_var};
pub use error::{Error, Result};
pub use secret::Secret;
