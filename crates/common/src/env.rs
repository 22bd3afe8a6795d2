//! Environment variable lookup with fail-fast semantics
//!
//! Required variables that are unset or blank produce `Error::MissingEnv`
//! so the process refuses to start instead of serving malformed URLs later.

use crate::error::{Error, Result};
use crate::secret::Secret;

/// Read a required, non-secret variable (trimmed).
pub fn required_var(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_owned()),
        _ => Err(Error::MissingEnv(key.to_owned())),
    }
}

/// Read a required secret variable.
pub fn required_secret(key: &str) -> Result<Secret<String>> {
    required_var(key).map(Secret::new)
}

/// Read an optional secret variable. Blank values count as unset.
pub fn optional_secret(key: &str) -> Option<Secret<String>> {
    required_var(key).ok().map(Secret::new)
}
