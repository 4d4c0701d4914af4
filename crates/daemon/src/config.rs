use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Daemon configuration, loaded once in main and injected everywhere.
/// Nothing reads ambient/global settings after startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    pub database_path: PathBuf,
    /// Static creator-authored guidance text injected into every prompt.
    pub knowledge_base_path: Option<PathBuf>,
    pub autosave_quiet_ms: u64,
    pub generative: GenerativeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerativeConfig {
    pub base_url: String,
    /// Cheap/fast model, used for question generation and transcript parsing.
    pub fast_model: String,
    /// Capable model, used for outline and script generation.
    pub capable_model: String,
    pub timeout_secs: u64,
    pub api_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "127.0.0.1:7788".to_string(),
            database_path: PathBuf::from(".cache/scriptdeck.db"),
            knowledge_base_path: None,
            autosave_quiet_ms: 1500,
            generative: GenerativeConfig::default(),
        }
    }
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        GenerativeConfig {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            fast_model: "gemini-2.0-flash".to_string(),
            capable_model: "gemini-2.0-pro".to_string(),
            timeout_secs: 120,
            api_key: String::new(),
        }
    }
}

impl Config {
    /// Load from a TOML file when present, otherwise defaults. The API key
    /// comes from `GEMINI_API_KEY` and overrides anything in the file.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("SCRIPTDECK_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("scriptdeck.toml"));

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {:?}", path))?;
            toml::from_str(&raw).with_context(|| format!("parsing config {:?}", path))?
        } else {
            Config::default()
        };

        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                config.generative.api_key = key;
            }
        }
        Ok(config)
    }

    pub fn load_knowledge_base(&self) -> Result<String> {
        match &self.knowledge_base_path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("reading knowledge base {:?}", path)),
            None => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_field() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:7788");
        assert_eq!(config.generative.timeout_secs, 120);
        assert_eq!(config.autosave_quiet_ms, 1500);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let config: Config = toml::from_str(
            "bind_addr = \"0.0.0.0:9000\"\n[generative]\ntimeout_secs = 30\n",
        )
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.generative.timeout_secs, 30);
        assert_eq!(config.generative.fast_model, "gemini-2.0-flash");
    }
}
