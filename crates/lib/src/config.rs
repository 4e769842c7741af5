//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.colloq/config.json`). A
//! missing file means defaults; the chat history persists beside it as
//! `chats.json`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Inference server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Chat defaults (e.g. default model).
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Inference server endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Base URL of the Ollama server (default "http://localhost:11434").
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    crate::llm::DEFAULT_BASE_URL.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// Chat defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Model used for sends: the exact name from the server's listing (e.g.
    /// "llama3.2"). Reconciled against /api/tags at startup.
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_model() -> String {
    "llama3.2".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
        }
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("COLLOQ_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".colloq").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Chat history file: `chats.json` beside the config file.
pub fn chats_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("chats.json")
}

/// Load config from the default path (or COLLOQ_CONFIG_PATH). Missing file
/// => default config. Returns the config and the path that was used (for
/// resolving sibling files).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
