use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{InterstitialError, Result};

/// Main configuration structure for Interstitial
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Inbound HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream inference server configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Framing messages inserted around the last user message
    #[serde(default)]
    pub framing: FramingConfig,
    /// Synthetic model listing configuration
    #[serde(default)]
    pub models: ModelsConfig,
}

impl Config {
    /// Read and parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            InterstitialError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| InterstitialError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load from an explicit path, or the first default location that exists
    ///
    /// Falls back to built-in defaults when no config file is found.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        for path in default_config_paths().iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Check the values that can only be validated after parsing
    pub fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;
        self.upstream.endpoint()?;
        Ok(())
    }
}

fn default_config_paths() -> [Option<PathBuf>; 3] {
    [
        dirs::home_dir().map(|h| h.join(".interstitial").join("config.toml")),
        dirs::config_dir().map(|c| c.join("interstitial").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ]
}

/// Inbound HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// File served at `/favicon.ico`
    #[serde(default = "default_favicon_path")]
    pub favicon_path: PathBuf,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| InterstitialError::Config(format!("Invalid listen address: {e}")))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            favicon_path: default_favicon_path(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_favicon_path() -> PathBuf {
    PathBuf::from("favicon.ico")
}

/// Upstream inference server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the inference server
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Chat completions path on the inference server
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    /// Whole-request timeout for streamed chat completions, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whole-request timeout for the model probe, in seconds
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl UpstreamConfig {
    /// Resolve the full chat completions URL
    ///
    /// `chat_path` is appended to any path already present in `base_url`,
    /// so `http://host/llm` resolves to `http://host/llm/v1/chat/completions`.
    pub fn endpoint(&self) -> Result<Url> {
        let mut base = Url::parse(&self.base_url).map_err(|e| {
            InterstitialError::Config(format!("Invalid upstream URL '{}': {e}", self.base_url))
        })?;

        let scheme = base.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(InterstitialError::Config(format!(
                "Unsupported upstream URL scheme '{scheme}': only http and https are allowed"
            )));
        }

        let prefix = format!("{}/", base.path().trim_end_matches('/'));
        base.set_path(&prefix);

        base.join(self.chat_path.trim_start_matches('/')).map_err(|e| {
            InterstitialError::Config(format!("Invalid chat path '{}': {e}", self.chat_path))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_path: default_chat_path(),
            timeout_secs: default_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:6789".to_string()
}

fn default_chat_path() -> String {
    "/v1/chat/completions".to_string()
}

fn default_timeout_secs() -> u64 {
    180
}

fn default_probe_timeout_secs() -> u64 {
    30
}

/// Framing message texts
#[derive(Debug, Clone, Deserialize)]
pub struct FramingConfig {
    /// System message inserted immediately before the last user message
    #[serde(default = "default_instructions")]
    pub instructions: String,
    /// System message inserted immediately after the last user message
    #[serde(default = "default_response")]
    pub response: String,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            instructions: default_instructions(),
            response: default_response(),
        }
    }
}

fn default_instructions() -> String {
    "### Instructions:".to_string()
}

fn default_response() -> String {
    "### Response:".to_string()
}

/// Synthetic model listing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Value reported in the `owned_by` field
    #[serde(default = "default_owned_by")]
    pub owned_by: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            owned_by: default_owned_by(),
        }
    }
}

fn default_owned_by() -> String {
    "interstitial".to_string()
}
