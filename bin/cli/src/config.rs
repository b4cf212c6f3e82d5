//! Client configuration.
//!
//! Loaded via the `config` crate from environment variables prefixed with
//! `BUDGETDESK`, using `__` to separate both the prefix and nested keys:
//!
//! ```text
//! BUDGETDESK__API_BASE_URL=https://portal.example.com
//! BUDGETDESK__CALLBACK__PORT=9000
//! BUDGETDESK__ENDPOINTS__TOKEN=/api/auth/token
//! ```

use std::path::PathBuf;
use std::time::Duration;

use budgetdesk_platform_access::AuthEndpoints;
use serde::Deserialize;
use url::Url;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BUDGETDESK";

/// File the durable storage scope is kept in, inside the state directory.
const SESSION_FILE: &str = "session.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/";

/// Client configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the portal API.
    pub api_base_url: Url,

    /// Location of a deployment's `runtime-config.json`. When set, its
    /// `apiBaseUrl` overrides `api_base_url`.
    #[serde(default)]
    pub runtime_config_url: Option<Url>,

    /// Directory holding the durable session file. Defaults to
    /// `~/.budgetdesk`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Loopback listener receiving the provider's redirect.
    #[serde(default)]
    pub callback: CallbackConfig,

    /// Timeout of every backend request, in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Path the local pages send an authenticated user to.
    #[serde(default = "default_landing_path")]
    pub landing_path: String,

    /// Authentication endpoint paths.
    #[serde(default)]
    pub endpoints: AuthEndpoints,
}

/// Callback listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackConfig {
    /// Address to listen on. Must be a loopback address the identity
    /// provider accepts in redirect URIs.
    #[serde(default = "default_callback_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_callback_port")]
    pub port: u16,

    /// How long `login` waits for the callback, in seconds.
    #[serde(default = "default_callback_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_landing_path() -> String {
    "/".to_string()
}

fn default_callback_host() -> String {
    "127.0.0.1".to_string()
}

fn default_callback_port() -> u16 {
    8765
}

fn default_callback_timeout_seconds() -> u64 {
    300
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            host: default_callback_host(),
            port: default_callback_port(),
            timeout_seconds: default_callback_timeout_seconds(),
        }
    }
}

impl CallbackConfig {
    /// Origin the callback listener serves, e.g. `http://127.0.0.1:8765`.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` does not form a valid URL.
    pub fn origin(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("http://{}:{}", self.host, self.port))
    }

    /// Time `login` waits for the callback.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_builder(
            config::Config::builder().add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            ),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        builder
            .set_default("api_base_url", DEFAULT_API_BASE_URL)?
            .build()?
            .try_deserialize()
    }

    /// Timeout of every backend request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Path of the durable session file.
    ///
    /// Falls back to the working directory when no home directory exists.
    #[must_use]
    pub fn session_file(&self) -> PathBuf {
        let dir = self.state_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".budgetdesk")
        });
        dir.join(SESSION_FILE)
    }
}
