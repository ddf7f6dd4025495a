//! Client configuration: backend base URL and session token storage.
//!
//! `config.toml` in the config directory holds the base URL and the
//! `include_context` flag; `TRIPMATE_BASE_URL` overrides the file. The
//! optional bearer token lives in `auth.json` and is re-read before each
//! request, so a session refreshed elsewhere is picked up without a
//! restart.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.tripmate.example";

/// Partial config.toml parsing.
#[derive(Debug, Deserialize)]
struct ConfigToml {
    base_url: Option<String>,
    include_context: Option<bool>,
}

/// Persisted session token, written by the login flow (out of scope here).
#[derive(Debug, Deserialize)]
struct AuthDotJson {
    token: Option<String>,
}

/// Configuration for the chat client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    include_context: bool,
    config_dir: PathBuf,
}

impl ClientConfig {
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            include_context: true,
            config_dir,
        }
    }

    /// Default config directory: `$TRIPMATE_HOME`, else the platform config
    /// dir, else the current directory.
    pub fn default_config_dir() -> PathBuf {
        if let Ok(home) = std::env::var("TRIPMATE_HOME") {
            return PathBuf::from(home);
        }
        dirs::config_dir()
            .map(|d| d.join("tripmate"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Load configuration from `config.toml` in `config_dir`, then apply
    /// the `TRIPMATE_BASE_URL` environment override. A missing or
    /// unparseable file just yields the defaults.
    pub async fn load(config_dir: PathBuf) -> Self {
        let mut config = Self::new(config_dir);

        let config_file = config.config_dir.join("config.toml");
        if let Ok(content) = tokio::fs::read_to_string(&config_file).await {
            match toml::from_str::<ConfigToml>(&content) {
                Ok(parsed) => {
                    if let Some(base_url) = parsed.base_url {
                        config.base_url = base_url;
                    }
                    if let Some(include_context) = parsed.include_context {
                        config.include_context = include_context;
                    }
                }
                Err(e) => warn!("Ignoring malformed config.toml: {e}"),
            }
        }

        if let Ok(base_url) = std::env::var("TRIPMATE_BASE_URL") {
            if !base_url.trim().is_empty() {
                config.base_url = base_url;
            }
        }

        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_include_context(mut self, include_context: bool) -> Self {
        self.include_context = include_context;
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn include_context(&self) -> bool {
        self.include_context
    }

    /// Read the bearer token from `auth.json`, if one is stored. Absence is
    /// not an error; requests simply go out unauthenticated.
    pub async fn read_token(&self) -> Option<String> {
        let auth_file = self.config_dir.join("auth.json");
        let content = tokio::fs::read_to_string(&auth_file).await.ok()?;
        match serde_json::from_str::<AuthDotJson>(&content) {
            Ok(auth) => auth
                .token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            Err(e) => {
                debug!("Ignoring malformed auth.json: {e}");
                None
            }
        }
    }
}
