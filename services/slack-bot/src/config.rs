//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Tunables live in an optional TOML file. Credentials come from the
//! environment only and are never read from the TOML, so a checked-in config
//! file cannot leak them. Missing required credentials fail at startup.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when none is named.
pub const DEFAULT_CONFIG_FILE: &str = "slack-github-bot.toml";

/// Root configuration (file-backed tunables)
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub oauth: OAuthConfig,
    pub slack: SlackConfig,
    pub analysis: AnalysisConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            max_connections: 256,
        }
    }
}

/// Where the state and credential documents live
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join("tokens.json")
    }

    pub fn states_path(&self) -> PathBuf {
        self.data_dir.join("states.json")
    }
}

/// OAuth handshake tunables
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub state_ttl_secs: u64,
    pub exchange_timeout_secs: u64,
    pub scope: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: github_auth::DEFAULT_STATE_TTL.as_secs(),
            exchange_timeout_secs: github_auth::DEFAULT_EXCHANGE_TIMEOUT.as_secs(),
            scope: github_auth::DEFAULT_SCOPE.to_string(),
            authorize_endpoint: github_auth::AUTHORIZE_ENDPOINT.to_string(),
            token_endpoint: github_auth::TOKEN_ENDPOINT.to_string(),
        }
    }
}

impl OAuthConfig {
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }
}

/// Slack Web API settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_base: crate::slack::DEFAULT_API_BASE.to_string(),
            timeout_secs: 10,
        }
    }
}

/// `/analyze` settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub model: String,
    pub max_files: usize,
    pub completion_api_base: String,
    pub completion_timeout_secs: u64,
    pub github_api_base: String,
    pub github_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: repo_analysis::openai::DEFAULT_MODEL.to_string(),
            max_files: 20,
            completion_api_base: repo_analysis::openai::DEFAULT_API_BASE.to_string(),
            completion_timeout_secs: 120,
            github_api_base: repo_analysis::github::DEFAULT_API_BASE.to_string(),
            github_timeout_secs: 15,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. The file must exist.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_optional(path: &Path) -> common::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Explicitly requested config path from the CLI arg or the CONFIG_PATH
    /// env var. `None` means fall back to `DEFAULT_CONFIG_FILE` if present.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(PathBuf::from(p));
        }
        std::env::var("CONFIG_PATH").ok().map(PathBuf::from)
    }

    fn validate(&self) -> common::Result<()> {
        let nonzero = [
            ("server.max_connections", self.server.max_connections as u64),
            ("oauth.state_ttl_secs", self.oauth.state_ttl_secs),
            ("oauth.exchange_timeout_secs", self.oauth.exchange_timeout_secs),
            ("slack.timeout_secs", self.slack.timeout_secs),
            ("analysis.max_files", self.analysis.max_files as u64),
            ("analysis.completion_timeout_secs", self.analysis.completion_timeout_secs),
            ("analysis.github_timeout_secs", self.analysis.github_timeout_secs),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(common::Error::Config(format!("{field} must be greater than 0")));
            }
        }

        for (field, url) in [
            ("oauth.authorize_endpoint", &self.oauth.authorize_endpoint),
            ("oauth.token_endpoint", &self.oauth.token_endpoint),
            ("slack.api_base", &self.slack.api_base),
            ("analysis.completion_api_base", &self.analysis.completion_api_base),
            ("analysis.github_api_base", &self.analysis.github_api_base),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{field} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.oauth.scope.trim().is_empty() {
            return Err(common::Error::Config("oauth.scope must not be empty".into()));
        }
        Ok(())
    }
}

/// Credentials read from the environment.
#[derive(Debug)]
pub struct Credentials {
    pub github_client_id: String,
    pub github_client_secret: Secret<String>,
    pub github_redirect_uri: String,
    pub slack_bot_token: Secret<String>,
    pub slack_signing_secret: Secret<String>,
    /// `/analyze` is disabled without it
    pub openai_api_key: Option<Secret<String>>,
}

impl Credentials {
    /// Read every credential, failing on the first missing required one.
    pub fn from_env() -> common::Result<Self> {
        let github_redirect_uri = common::required_var("GITHUB_REDIRECT_URI")?;
        if !github_redirect_uri.starts_with("http://") && !github_redirect_uri.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "GITHUB_REDIRECT_URI must start with http:// or https://, got: {github_redirect_uri}"
            )));
        }

        Ok(Self {
            github_client_id: common::required_var("GITHUB_CLIENT_ID")?,
            github_client_secret: common::required_secret("GITHUB_CLIENT_SECRET")?,
            github_redirect_uri,
            slack_bot_token: common::required_secret("SLACK_BOT_TOKEN")?,
            slack_signing_secret: common::required_secret("SLACK_SIGNING_SECRET")?,
            openai_api_key: common::optional_secret("OPENAI_API_KEY"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const CREDENTIAL_VARS: [(&str, &str); 6] = [
        ("GITHUB_CLIENT_ID", "Iv1.abc"),
        ("GITHUB_CLIENT_SECRET", "gh-secret"),
        ("GITHUB_REDIRECT_URI", "https://bot.example.com/github/callback"),
        ("SLACK_BOT_TOKEN", "xoxb-1"),
        ("SLACK_SIGNING_SECRET", "signing"),
        ("OPENAI_API_KEY", "sk-1"),
    ];

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn set_all_credentials() {
        for (k, v) in CREDENTIAL_VARS {
            unsafe { set_env(k, v) };
        }
    }

    fn clear_all_credentials() {
        for (k, _) in CREDENTIAL_VARS {
            unsafe { remove_env(k) };
        }
    }

    fn write_config(name: &str, contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.listen_addr.port(), 5000);
        assert_eq!(config.server.max_connections, 256);
        assert_eq!(config.storage.credentials_path(), PathBuf::from("data/tokens.json"));
        assert_eq!(config.storage.states_path(), PathBuf::from("data/states.json"));
        assert_eq!(config.oauth.state_ttl(), Duration::from_secs(600));
        assert_eq!(config.oauth.scope, "repo");
        assert_eq!(config.analysis.max_files, 20);
        assert_eq!(config.analysis.model, "gpt-4");
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let (_dir, path) = write_config(
            "bot.toml",
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[storage]
data_dir = "/var/lib/slack-github-bot"

[oauth]
state_ttl_secs = 300
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.server.max_connections, 256);
        assert_eq!(
            config.storage.states_path(),
            PathBuf::from("/var/lib/slack-github-bot/states.json")
        );
        assert_eq!(config.oauth.state_ttl_secs, 300);
        assert_eq!(config.oauth.exchange_timeout_secs, 10);
        assert_eq!(config.oauth.token_endpoint, github_auth::TOKEN_ENDPOINT);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_optional_missing_file_uses_defaults() {
        let config = Config::load_optional(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config.server.max_connections, 256);
    }

    #[test]
    fn test_load_invalid_toml() {
        let (_dir, path) = write_config("bad.toml", "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_zero_values_rejected() {
        for (section, field) in [
            ("server", "max_connections"),
            ("oauth", "state_ttl_secs"),
            ("oauth", "exchange_timeout_secs"),
            ("analysis", "max_files"),
        ] {
            let (_dir, path) = write_config("zero.toml", &format!("[{section}]\n{field} = 0\n"));
            let err = Config::load(&path).unwrap_err().to_string();
            assert!(
                err.contains(&format!("{section}.{field} must be greater than 0")),
                "got: {err}"
            );
        }
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let (_dir, path) = write_config(
            "endpoint.toml",
            "[oauth]\ntoken_endpoint = \"github.com/login/oauth/access_token\"\n",
        );
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("oauth.token_endpoint must start with http"), "got: {err}");
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, Some(PathBuf::from("/custom/path.toml")));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, Some(PathBuf::from("/env/path.toml")));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_unset() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(Config::resolve_path(None), None);
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            Some(PathBuf::from("/cli/wins.toml")),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_credentials_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        set_all_credentials();

        let creds = Credentials::from_env().unwrap();
        assert_eq!(creds.github_client_id, "Iv1.abc");
        assert_eq!(creds.github_client_secret.expose(), "gh-secret");
        assert_eq!(creds.github_redirect_uri, "https://bot.example.com/github/callback");
        assert_eq!(creds.slack_bot_token.expose(), "xoxb-1");
        assert_eq!(creds.openai_api_key.as_ref().unwrap().expose(), "sk-1");

        let debug = format!("{creds:?}");
        assert!(!debug.contains("gh-secret"), "secrets must be redacted: {debug}");

        clear_all_credentials();
    }

    #[test]
    fn test_each_required_credential_fails_fast() {
        let _lock = ENV_MUTEX.lock().unwrap();
        for missing in [
            "GITHUB_CLIENT_ID",
            "GITHUB_CLIENT_SECRET",
            "GITHUB_REDIRECT_URI",
            "SLACK_BOT_TOKEN",
            "SLACK_SIGNING_SECRET",
        ] {
            set_all_credentials();
            unsafe { remove_env(missing) };
            let err = Credentials::from_env().unwrap_err().to_string();
            assert!(err.contains(missing), "expected {missing} in error, got: {err}");
        }
        clear_all_credentials();
    }

    #[test]
    fn test_openai_key_is_optional() {
        let _lock = ENV_MUTEX.lock().unwrap();
        set_all_credentials();
        unsafe { remove_env("OPENAI_API_KEY") };

        let creds = Credentials::from_env().unwrap();
        assert!(creds.openai_api_key.is_none());

        clear_all_credentials();
    }

    #[test]
    fn test_redirect_uri_must_be_http() {
        let _lock = ENV_MUTEX.lock().unwrap();
        set_all_credentials();
        unsafe { set_env("GITHUB_REDIRECT_URI", "bot.example.com/callback") };

        let err = Credentials::from_env().unwrap_err().to_string();
        assert!(err.contains("GITHUB_REDIRECT_URI must start with http"), "got: {err}");

        clear_all_credentials();
    }
}
