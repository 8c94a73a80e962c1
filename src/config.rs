//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use crate::Result;
use crate::error::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Gemini API key
    #[serde(default)]
    pub gemini_api_key: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tool-calling cycles per analysis
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Offer Gemini's built-in Google Search grounding alongside function tools
    #[serde(default)]
    pub google_search: bool,

    /// Tool names the model handles itself; requests for these are not forwarded
    #[serde(default = "default_builtin_tools")]
    pub builtin_tools: Vec<String>,

    /// Patent search MCP server
    #[serde(default)]
    pub patent_server: PatentServerConfig,

    /// Directory for per-run debug reports
    #[serde(default = "default_debug_dir")]
    pub debug_dir: PathBuf,

    /// Directory for archived responses
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Timeout for each model request and each tool request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// How to launch the patent search MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatentServerConfig {
    #[serde(default = "default_patent_command")]
    pub command: String,

    #[serde(default = "default_patent_args")]
    pub args: Vec<String>,

    /// KIPRIS API key; missing or placeholder selects the mock provider
    #[serde(default)]
    pub api_key: String,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_max_turns() -> usize {
    10
}

fn default_builtin_tools() -> Vec<String> {
    vec![
        "google_search".to_string(),
        "googleSearch".to_string(),
        "web_search".to_string(),
    ]
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from("debug")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("responses")
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_patent_command() -> String {
    "python3".to_string()
}

fn default_patent_args() -> Vec<String> {
    vec![
        "-c".to_string(),
        "import asyncio; import mcp_kipris.server; asyncio.run(mcp_kipris.server.main())".to_string(),
    ]
}

impl Default for PatentServerConfig {
    fn default() -> Self {
        Self {
            command: default_patent_command(),
            args: default_patent_args(),
            api_key: String::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            model: default_model(),
            max_turns: default_max_turns(),
            google_search: false,
            builtin_tools: default_builtin_tools(),
            patent_server: PatentServerConfig::default(),
            debug_dir: default_debug_dir(),
            archive_dir: default_archive_dir(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Override settings from environment variables.
    ///
    /// `GEMINI_API_KEY` (or `API_KEY`), `KIPRIS_API_KEY` and `ADVERIFY_MODEL`.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY").or_else(|| non_empty("API_KEY")) {
            self.gemini_api_key = key;
        }
        if let Some(key) = non_empty("KIPRIS_API_KEY") {
            self.patent_server.api_key = key;
        }
        if let Some(model) = non_empty("ADVERIFY_MODEL") {
            self.model = model;
        }
    }

    /// Check the settings needed to call the model
    pub fn validate(&self) -> Result<()> {
        if self.gemini_api_key.trim().is_empty() {
            return Err(Error::Config(
                "Gemini API key not set. Set GEMINI_API_KEY or add it to the config file.".to_string(),
            ));
        }
        if self.max_turns == 0 {
            return Err(Error::Config("max_turns must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".adverify")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from the default path, then apply environment overrides
pub fn load() -> Result<Config> {
    let mut config = load_from(&config_path())?;
    config.apply_env();
    Ok(config)
}

/// Load configuration from a file; a missing file yields the defaults
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!("No config at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config at {:?}: {}", path, e)))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    // Create parent directory
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Write a default config file unless one already exists
pub fn init() -> Result<PathBuf> {
    let path = config_path();
    if path.exists() {
        return Err(Error::Config(format!("Config already exists at {:?}", path)));
    }
    save_to(&Config::default(), &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.max_turns, 10);
        assert!(config.builtin_tools.contains(&"google_search".to_string()));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"max_turns": 3}"#).unwrap();
        assert_eq!(config.max_turns, 3);
        assert_eq!(config.patent_server.command, "python3");
        assert_eq!(config.request_timeout_secs, 120);
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.model = "gemini-test".to_string();
        save_to(&config, &path).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded.model, "gemini-test");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let loaded = load_from(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(loaded.max_turns, 10);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GEMINI_API_KEY", ""),
            ("API_KEY", "fallback-key"),
            ("KIPRIS_API_KEY", "kipris"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_vars(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.gemini_api_key, "fallback-key");
        assert_eq!(config.patent_server.api_key, "kipris");
        assert_eq!(config.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_validate_requires_api_key() {
        let mut config = Config::default();
        assert!(config.validate().is_err());
        config.gemini_api_key = "key".to_string();
        assert!(config.validate().is_ok());
    }
}
