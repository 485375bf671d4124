use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

use crate::markdown::MarkdownPreference;
use crate::state::Language;

/// Server used when neither the command line nor the config file names one.
/// Can be baked in at build time with `LABTA_DEFAULT_SERVER`.
pub const DEFAULT_SERVER: &str = match option_env!("LABTA_DEFAULT_SERVER") {
    Some(url) => url,
    None => "http://localhost:8000",
};

pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub server_url: Option<String>,
    pub api_prefix: Option<String>,
    pub lab_id: Option<String>,
    pub default_language: Option<String>,
    pub markdown: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid config file {}: {}", config_path.display(), e))?;
        Ok(config)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("labta"))
    }

    pub fn log_dir() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("logs"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_url: Option<String>,
    pub api_prefix: Option<String>,
    pub lab_id: Option<String>,
    pub language: Option<Language>,
    pub plain_markdown: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub endpoints: Endpoints,
    pub lab_id: Option<String>,
    pub language: Language,
    pub markdown: MarkdownPreference,
    pub request_timeout: Duration,
}

impl Settings {
    pub fn resolve(config: &Config, overrides: &Overrides) -> Self {
        let server = overrides
            .server_url
            .clone()
            .or_else(|| config.server_url.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let api_prefix = overrides
            .api_prefix
            .clone()
            .or_else(|| config.api_prefix.clone())
            .unwrap_or_else(|| DEFAULT_API_PREFIX.to_string());

        let language = overrides
            .language
            .or_else(|| config.default_language.as_deref().and_then(Language::from_str))
            .unwrap_or_default();

        let markdown = if overrides.plain_markdown {
            MarkdownPreference::Minimal
        } else {
            config
                .markdown
                .as_deref()
                .and_then(MarkdownPreference::from_str)
                .unwrap_or_default()
        };

        Self {
            endpoints: Endpoints::new(&server, &api_prefix),
            lab_id: overrides.lab_id.clone().or_else(|| config.lab_id.clone()),
            language,
            markdown,
            request_timeout: Duration::from_secs(
                config.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::resolve(&Config::default(), &Overrides::default())
    }
}

// Health check at the server root, everything else under the API prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    server: String,
    api_base: String,
}

impl Endpoints {
    pub fn new(server: &str, api_prefix: &str) -> Self {
        let server = server.trim().trim_end_matches('/').to_string();
        let prefix = api_prefix.trim().trim_matches('/');
        let api_base = if prefix.is_empty() {
            server.clone()
        } else {
            format!("{}/{}", server, prefix)
        };
        Self { server, api_base }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn is_loopback(&self) -> bool {
        reqwest::Url::parse(&self.server)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .map(|host| matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]" | "::1"))
            .unwrap_or(false)
    }

    pub fn health(&self) -> String {
        format!("{}/health", self.server)
    }

    pub fn run(&self) -> String {
        format!("{}/submissions/run", self.api_base)
    }

    pub fn submit(&self) -> String {
        format!("{}/submissions/submit", self.api_base)
    }

    pub fn ask(&self) -> String {
        format!("{}/chat/ask", self.api_base)
    }

    pub fn knowledge(&self, name: &str) -> String {
        format!("{}/chat/knowledge/{}", self.api_base, urlencoding::encode(name))
    }
}
