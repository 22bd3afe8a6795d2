//! GitHub OAuth endpoints and defaults

use std::time::Duration;

/// Browser-facing authorization endpoint
pub const AUTHORIZE_ENDPOINT: &str = "https://github.com/login/oauth/authorize";

/// Token endpoint for authorization code exchange
pub const TOKEN_ENDPOINT: &str = "https://github.com/login/oauth/access_token";

/// Scope requested by default. `repo` grants read access to private
/// repositories, which `/analyze` needs.
pub const DEFAULT_SCOPE: &str = "repo";

/// How long an issued state token stays redeemable.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600);

/// Upper bound on a single token exchange request.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes of randomness in a state nonce.
pub const NONCE_BYTES: usize = 32;
