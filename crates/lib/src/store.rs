//! Chat history persistence: the full chat list as one JSON document at a
//! fixed path.
//!
//! Loads are defensive: a missing, unreadable, or malformed file yields an
//! empty history instead of an error, so a corrupted cache never blocks
//! startup. Timestamps round-trip as RFC 3339 strings.

use crate::chats::Chat;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Durable store for the chat list.
#[derive(Debug, Clone)]
pub struct ChatStore {
    path: PathBuf,
}

impl ChatStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the chat list. Missing file => empty list; unreadable or
    /// malformed content => logged and empty. Never fails.
    pub fn load(&self) -> Vec<Chat> {
        if !self.path.exists() {
            return Vec::new();
        }
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) => {
                log::error!("error reading chats from {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(chats) => chats,
            Err(e) => {
                log::error!("error parsing chats from {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Write the full chat list, creating the parent directory if needed.
    pub fn save(&self, chats: &[Chat]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating store directory {}", parent.display()))?;
        }
        let raw = serde_json::to_string(chats).context("serializing chats")?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("writing chats to {}", self.path.display()))?;
        Ok(())
    }
}
