use crate::error::{ProbeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://spai.aicoding.sh";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_CHAT_MODEL: &str = "claude-3-5-haiku-20241022";
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

/// Environment variables consulted after the config file, in `.env` and the process env.
pub const ENV_API_KEY: &str = "API_KEY";
pub const ENV_BASE_URL: &str = "API_BASE_URL";
pub const ENV_DEFAULT_MODEL: &str = "DEFAULT_MODEL";
pub const ENV_CHAT_MODEL: &str = "CHAT_MODEL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Per-kind request timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_discovery_secs")]
    pub discovery_secs: u64,
    #[serde(default = "default_chat_secs")]
    pub chat_secs: u64,
    #[serde(default = "default_messages_secs")]
    pub messages_secs: u64,
    #[serde(default = "default_web_search_secs")]
    pub web_search_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_anthropic_version() -> String {
    DEFAULT_ANTHROPIC_VERSION.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_discovery_secs() -> u64 {
    10
}

fn default_chat_secs() -> u64 {
    30
}

fn default_messages_secs() -> u64 {
    60
}

fn default_web_search_secs() -> u64 {
    90
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            discovery_secs: default_discovery_secs(),
            chat_secs: default_chat_secs(),
            messages_secs: default_messages_secs(),
            web_search_secs: default_web_search_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn discovery(&self) -> Duration {
        Duration::from_secs(self.discovery_secs)
    }

    pub fn chat(&self) -> Duration {
        Duration::from_secs(self.chat_secs)
    }

    pub fn messages(&self) -> Duration {
        Duration::from_secs(self.messages_secs)
    }

    pub fn web_search(&self) -> Duration {
        Duration::from_secs(self.web_search_secs)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            default_model: default_model(),
            chat_model: default_chat_model(),
            anthropic_version: default_anthropic_version(),
            output_dir: default_output_dir(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl ProbeConfig {
    /// Build a config for a known server and key, everything else defaulted.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProbeError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file; defaults when none exists.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(&candidate);
            }
        }

        tracing::debug!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Full resolution: file layer, then `.env` in the working directory, then the
    /// process environment. Fails when no API key was found in any layer.
    pub fn resolve(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::find_and_load(explicit_path)?;

        let dotenv = read_dotenv(Path::new(".env"))?;
        config.apply_overrides(|key| dotenv.get(key).cloned());
        config.apply_overrides(|key| std::env::var(key).ok());

        config.api_key()?;
        Ok(config)
    }

    /// Overlay values found by `lookup` (keyed by the `ENV_*` names). Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(model) = get(ENV_DEFAULT_MODEL) {
            self.default_model = model;
        }
        if let Some(model) = get(ENV_CHAT_MODEL) {
            self.chat_model = model;
        }
    }

    pub fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            ProbeError::config(format!(
                "{ENV_API_KEY} not found. Set it in the environment, a .env file, or the config file."
            ))
        })
    }

    /// The key with everything but its first 10 and last 4 characters hidden.
    pub fn masked_api_key(&self) -> String {
        match self.api_key.as_deref() {
            None => "<unset>".to_string(),
            Some(key) => {
                let chars: Vec<char> = key.chars().collect();
                if chars.len() <= 14 {
                    return "*".repeat(chars.len());
                }
                let head: String = chars[..10].iter().collect();
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("{head}...{tail}")
            }
        }
    }

    /// Join the base URL and an endpoint path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

fn read_dotenv(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let mut vars = HashMap::new();
    for item in dotenvy::from_path_iter(path)? {
        let (key, value) = item?;
        vars.insert(key, value);
    }
    Ok(vars)
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("api-probe.toml"));

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("api-probe").join("config.toml"));
    }
    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("api-probe").join("config.toml"));
        paths.push(home.join(".api-probe.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
