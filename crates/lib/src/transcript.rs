//! Transcript export and history display helpers.

use crate::chats::Chat;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Render a chat as plain text: `ROLE: content` blocks separated by blank
/// lines.
pub fn render(chat: &Chat) -> String {
    chat.messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// File name for an exported transcript: sanitized title plus the date.
pub fn file_name(chat: &Chat, date: DateTime<Utc>) -> String {
    let safe: String = chat
        .title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}-{}.txt", safe, date.format("%Y-%m-%d"))
}

/// Write the transcript into `dir`; returns the created path.
pub fn write(chat: &Chat, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(file_name(chat, Utc::now()));
    std::fs::write(&path, render(chat))
        .with_context(|| format!("writing transcript to {}", path.display()))?;
    Ok(path)
}

/// Relative-date label used to group the chat history.
pub fn group_label(updated_at: DateTime<Utc>) -> String {
    group_label_at(updated_at, Utc::now())
}

pub fn group_label_at(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now.date_naive() - updated_at.date_naive()).num_days();
    if days <= 0 {
        "Today".to_string()
    } else if days == 1 {
        "Yesterday".to_string()
    } else if days < 7 {
        format!("{} days ago", days)
    } else {
        updated_at.format("%Y-%m-%d").to_string()
    }
}
