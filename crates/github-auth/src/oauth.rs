//! GitHub OAuth exchange client
//!
//! Builds the browser authorization URL and trades an authorization code for
//! an access token at the token endpoint. The client is stateless: it never
//! persists anything, the caller decides where the token goes.
//!
//! GitHub answers a rejected code with `200 OK` and an `error` field rather
//! than an error status, so success is decided by the presence of
//! `access_token` in the body.

use std::time::Duration;

use common::Secret;
use reqwest::Url;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::constants::{AUTHORIZE_ENDPOINT, DEFAULT_EXCHANGE_TIMEOUT, DEFAULT_SCOPE, TOKEN_ENDPOINT};
use crate::error::{Error, Result};

/// Everything needed to talk to the OAuth provider.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_uri: String,
    pub scope: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub timeout: Duration,
}

impl OAuthSettings {
    /// Settings against github.com with the default scope and timeout.
    pub fn github(client_id: String, client_secret: Secret<String>, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            scope: DEFAULT_SCOPE.to_string(),
            authorize_endpoint: AUTHORIZE_ENDPOINT.to_string(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }
}

/// Token endpoint response. Either `access_token` or `error` is present.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct OAuthClient {
    http: reqwest::Client,
    authorize_url: Url,
    token_url: Url,
    settings: OAuthSettings,
}

impl OAuthClient {
    /// Validate the settings and build an HTTP client bounded by
    /// `settings.timeout`.
    pub fn new(settings: OAuthSettings) -> Result<Self> {
        if settings.client_id.trim().is_empty() {
            return Err(Error::InvalidConfig("client_id is empty".into()));
        }
        if settings.client_secret.is_blank() {
            return Err(Error::InvalidConfig("client_secret is empty".into()));
        }
        if settings.timeout.is_zero() {
            return Err(Error::InvalidConfig("exchange timeout must be greater than 0".into()));
        }

        let redirect = parse_http_url("redirect_uri", &settings.redirect_uri)?;
        let authorize_url = parse_http_url("authorize_endpoint", &settings.authorize_endpoint)?;
        let token_url = parse_http_url("token_endpoint", &settings.token_endpoint)?;
        debug!(redirect_uri = %redirect, "OAuth client configured");

        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("building HTTP client: {e}")))?;

        Ok(Self {
            http,
            authorize_url,
            token_url,
            settings,
        })
    }

    /// Authorization URL carrying client id, redirect target, scope and the
    /// nonce as `state`. No network call.
    pub fn build_authorization_url(&self, nonce: &str) -> String {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("scope", &self.settings.scope)
            .append_pair("state", nonce);
        url.into()
    }

    /// Exchange an authorization code for an access token.
    ///
    /// Every failure (network error, timeout, non-success status, body
    /// without `access_token`) is reported as `Error::ExchangeFailure`. The
    /// error text never contains the client secret.
    pub async fn exchange(&self, code: &str) -> Result<Secret<String>> {
        let response = self
            .http
            .post(self.token_url.clone())
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.expose().as_str()),
                ("code", code),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timed out" } else { "failed" };
                Error::ExchangeFailure(format!("token request {kind}: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "token endpoint returned error status");
            return Err(Error::ExchangeFailure(format!(
                "token endpoint returned {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::ExchangeFailure(format!("invalid token response: {e}")))?;

        match body.access_token.filter(|t| !t.is_empty()) {
            Some(token) => {
                debug!(scope = body.scope.as_deref().unwrap_or(""), "token exchange succeeded");
                Ok(Secret::new(token))
            }
            None => Err(Error::ExchangeFailure(format!(
                "no access_token in response ({})",
                body.error.as_deref().unwrap_or("no error code")
            ))),
        }
    }
}

fn parse_http_url(field: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value)
        .map_err(|e| Error::InvalidConfig(format!("{field} is not a valid URL ({value}): {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::InvalidConfig(format!(
            "{field} must use http or https, got {other}"
        ))),
    }
}
