//! Chat registry: persisted conversations and the current-chat selection.
//!
//! The registry is the single source of truth for chat state. Every mutation
//! goes through one of its operations and is synchronously flushed to the
//! store; a failed flush is logged and the in-memory state stays
//! authoritative for the session. Message lists are only ever changed through
//! the replacement path, so streaming merges and rollbacks compose with user
//! edits without partial states.

use crate::store::ChatStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Title given to a chat at creation, replaced by the auto-derived title on
/// the first message unless the user renamed the chat first.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Fallback when a rename submits an empty title.
pub const UNTITLED_TITLE: &str = "Untitled Chat";

const TITLE_WORD_LIMIT: usize = 6;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: format!("msg-{}", uuid::Uuid::new_v4()),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// A persisted conversation: ordered messages plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub title: String,
    /// Set once the user renames the chat; suppresses auto-titling even if
    /// the title is renamed back to the literal default.
    #[serde(default)]
    pub title_is_user_set: bool,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: format!("chat-{}", uuid::Uuid::new_v4()),
            title: DEFAULT_TITLE.to_string(),
            title_is_user_set: false,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The one message-list mutation point: refreshes `updated_at` and
    /// derives the title from the first message while it is still eligible.
    fn set_messages(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
        self.updated_at = Utc::now();
        if self.title == DEFAULT_TITLE && !self.title_is_user_set {
            if let Some(first) = self.messages.first() {
                self.title = derive_title(&first.content);
            }
        }
    }
}

impl Default for Chat {
    fn default() -> Self {
        Self::new()
    }
}

/// First 6 whitespace-separated words, with a truncation marker when the
/// content has more.
fn derive_title(content: &str) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.len() <= TITLE_WORD_LIMIT {
        words.join(" ")
    } else {
        format!("{}...", words[..TITLE_WORD_LIMIT].join(" "))
    }
}

struct RegistryState {
    /// Most-recently-created first.
    chats: Vec<Chat>,
    current: Option<String>,
}

/// In-memory chat collection backed by a [`ChatStore`].
pub struct ChatRegistry {
    inner: RwLock<RegistryState>,
    store: ChatStore,
}

impl ChatRegistry {
    /// Load persisted history; the most-recently-updated chat becomes
    /// current.
    pub fn open(store: ChatStore) -> Self {
        let chats = store.load();
        let current = chats
            .iter()
            .max_by_key(|c| c.updated_at)
            .map(|c| c.id.clone());
        Self {
            inner: RwLock::new(RegistryState { chats, current }),
            store,
        }
    }

    fn persist(&self, state: &RegistryState) {
        if let Err(e) = self.store.save(&state.chats) {
            log::error!("error saving chats: {:#}", e);
        }
    }

    /// Insert a new chat at the front and make it current. Returns the new
    /// id so callers can act on it in the same control-flow step.
    pub async fn create_chat(&self) -> String {
        let chat = Chat::new();
        let id = chat.id.clone();
        let mut g = self.inner.write().await;
        g.chats.insert(0, chat);
        g.current = Some(id.clone());
        self.persist(&g);
        id
    }

    /// Remove a chat. If it was current, the most-recently-updated remaining
    /// chat becomes current (or none when the list is empty).
    pub async fn delete_chat(&self, chat_id: &str) {
        let mut g = self.inner.write().await;
        let before = g.chats.len();
        g.chats.retain(|c| c.id != chat_id);
        if g.chats.len() == before {
            return;
        }
        if g.current.as_deref() == Some(chat_id) {
            g.current = g
                .chats
                .iter()
                .max_by_key(|c| c.updated_at)
                .map(|c| c.id.clone());
        }
        self.persist(&g);
    }

    /// Rename a chat. An empty trimmed title falls back to
    /// [`UNTITLED_TITLE`]; auto-titling is disarmed from then on.
    pub async fn rename_chat(&self, chat_id: &str, new_title: &str) {
        let mut g = self.inner.write().await;
        let renamed = match g.chats.iter_mut().find(|c| c.id == chat_id) {
            Some(chat) => {
                let trimmed = new_title.trim();
                chat.title = if trimmed.is_empty() {
                    UNTITLED_TITLE.to_string()
                } else {
                    trimmed.to_string()
                };
                chat.title_is_user_set = true;
                chat.updated_at = Utc::now();
                true
            }
            None => false,
        };
        if renamed {
            self.persist(&g);
        }
    }

    /// Wholesale message-list replacement. Returns false when the chat no
    /// longer exists, which callers treat as a silent no-op.
    pub async fn replace_messages(&self, chat_id: &str, messages: Vec<ChatMessage>) -> bool {
        let mut g = self.inner.write().await;
        let found = match g.chats.iter_mut().find(|c| c.id == chat_id) {
            Some(chat) => {
                chat.set_messages(messages);
                true
            }
            None => false,
        };
        if found {
            self.persist(&g);
        }
        found
    }

    /// Overwrite one message's content in place (streaming merge). Routed
    /// through the same replacement path as [`Self::replace_messages`].
    pub async fn update_message_content(
        &self,
        chat_id: &str,
        message_id: &str,
        content: &str,
    ) -> bool {
        let mut g = self.inner.write().await;
        let found = match g.chats.iter_mut().find(|c| c.id == chat_id) {
            Some(chat) => {
                let mut messages = chat.messages.clone();
                match messages.iter_mut().find(|m| m.id == message_id) {
                    Some(message) => {
                        message.content = content.to_string();
                        chat.set_messages(messages);
                        true
                    }
                    None => false,
                }
            }
            None => false,
        };
        if found {
            self.persist(&g);
        }
        found
    }

    /// Drop one message (streaming rollback). No-op when the chat or the
    /// message is already gone.
    pub async fn remove_message(&self, chat_id: &str, message_id: &str) -> bool {
        let mut g = self.inner.write().await;
        let found = match g.chats.iter_mut().find(|c| c.id == chat_id) {
            Some(chat) => {
                let mut messages = chat.messages.clone();
                let before = messages.len();
                messages.retain(|m| m.id != message_id);
                if messages.len() == before {
                    false
                } else {
                    chat.set_messages(messages);
                    true
                }
            }
            None => false,
        };
        if found {
            self.persist(&g);
        }
        found
    }

    /// Clear a chat's transcript.
    pub async fn clear_messages(&self, chat_id: &str) -> bool {
        self.replace_messages(chat_id, Vec::new()).await
    }

    /// Change the current pointer; no-op if the id does not exist.
    pub async fn select_chat(&self, chat_id: &str) {
        let mut g = self.inner.write().await;
        if g.chats.iter().any(|c| c.id == chat_id) {
            g.current = Some(chat_id.to_string());
        }
    }

    pub async fn current_chat_id(&self) -> Option<String> {
        self.inner.read().await.current.clone()
    }

    pub async fn chat(&self, chat_id: &str) -> Option<Chat> {
        let g = self.inner.read().await;
        g.chats.iter().find(|c| c.id == chat_id).cloned()
    }

    pub async fn chats(&self) -> Vec<Chat> {
        self.inner.read().await.chats.clone()
    }

    /// Snapshot of a chat's message list, for reconstruction before a merge.
    pub async fn messages(&self, chat_id: &str) -> Option<Vec<ChatMessage>> {
        let g = self.inner.read().await;
        g.chats
            .iter()
            .find(|c| c.id == chat_id)
            .map(|c| c.messages.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_registry() -> (tempfile::TempDir, ChatRegistry) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ChatStore::new(dir.path().join("chats.json"));
        (dir, ChatRegistry::open(store))
    }

    #[test]
    fn derive_title_short_message_unchanged() {
        assert_eq!(derive_title("Hello there friend"), "Hello there friend");
    }

    #[test]
    fn derive_title_truncates_past_six_words() {
        assert_eq!(
            derive_title("Please help me understand how garbage collection works in depth"),
            "Please help me understand how garbage..."
        );
    }

    #[tokio::test]
    async fn create_chat_becomes_current() {
        let (_dir, registry) = temp_registry();
        let id = registry.create_chat().await;
        assert_eq!(registry.current_chat_id().await.as_deref(), Some(id.as_str()));
        let chat = registry.chat(&id).await.expect("chat exists");
        assert_eq!(chat.title, DEFAULT_TITLE);
        assert!(chat.messages.is_empty());
    }

    #[tokio::test]
    async fn first_message_derives_title_and_bumps_updated_at() {
        let (_dir, registry) = temp_registry();
        let id = registry.create_chat().await;
        let created_at = registry.chat(&id).await.expect("chat").created_at;

        registry
            .replace_messages(&id, vec![ChatMessage::user("Hello there friend")])
            .await;

        let chat = registry.chat(&id).await.expect("chat");
        assert_eq!(chat.title, "Hello there friend");
        assert!(chat.updated_at > created_at);
    }

    #[tokio::test]
    async fn title_derivation_stops_after_first_message() {
        let (_dir, registry) = temp_registry();
        let id = registry.create_chat().await;
        registry
            .replace_messages(&id, vec![ChatMessage::user("First topic")])
            .await;
        let mut messages = registry.messages(&id).await.expect("messages");
        messages.push(ChatMessage::user("Entirely different second topic"));
        registry.replace_messages(&id, messages).await;

        assert_eq!(registry.chat(&id).await.expect("chat").title, "First topic");
    }

    #[tokio::test]
    async fn rename_to_default_does_not_rearm_auto_title() {
        let (_dir, registry) = temp_registry();
        let id = registry.create_chat().await;
        registry.rename_chat(&id, DEFAULT_TITLE).await;
        registry
            .replace_messages(&id, vec![ChatMessage::user("should not become the title")])
            .await;

        assert_eq!(registry.chat(&id).await.expect("chat").title, DEFAULT_TITLE);
    }

    #[tokio::test]
    async fn rename_empty_falls_back_to_untitled() {
        let (_dir, registry) = temp_registry();
        let id = registry.create_chat().await;
        registry.rename_chat(&id, "   ").await;
        assert_eq!(registry.chat(&id).await.expect("chat").title, UNTITLED_TITLE);
    }

    #[tokio::test]
    async fn delete_current_selects_most_recently_updated_remaining() {
        let (_dir, registry) = temp_registry();
        let first = registry.create_chat().await;
        let second = registry.create_chat().await;
        let third = registry.create_chat().await;

        // Touch the oldest so it is the most recently updated.
        registry
            .replace_messages(&first, vec![ChatMessage::user("bump")])
            .await;

        registry.delete_chat(&third).await;
        let current = registry.current_chat_id().await.expect("current set");
        assert_eq!(current, first);
        assert_ne!(current, third);
        let _ = second;
    }

    #[tokio::test]
    async fn delete_last_chat_clears_current() {
        let (_dir, registry) = temp_registry();
        let id = registry.create_chat().await;
        registry.delete_chat(&id).await;
        assert!(registry.current_chat_id().await.is_none());
    }

    #[tokio::test]
    async fn delete_non_current_keeps_selection() {
        let (_dir, registry) = temp_registry();
        let first = registry.create_chat().await;
        let second = registry.create_chat().await;
        registry.delete_chat(&first).await;
        assert_eq!(registry.current_chat_id().await.as_deref(), Some(second.as_str()));
    }

    #[tokio::test]
    async fn select_unknown_chat_is_a_no_op() {
        let (_dir, registry) = temp_registry();
        let id = registry.create_chat().await;
        registry.select_chat("chat-does-not-exist").await;
        assert_eq!(registry.current_chat_id().await.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn replace_messages_on_deleted_chat_reports_missing() {
        let (_dir, registry) = temp_registry();
        let id = registry.create_chat().await;
        registry.delete_chat(&id).await;
        assert!(!registry.replace_messages(&id, vec![ChatMessage::user("late")]).await);
        assert!(!registry.update_message_content(&id, "msg-x", "late").await);
        assert!(!registry.remove_message(&id, "msg-x").await);
    }

    #[tokio::test]
    async fn clear_messages_keeps_title() {
        let (_dir, registry) = temp_registry();
        let id = registry.create_chat().await;
        registry
            .replace_messages(&id, vec![ChatMessage::user("Hello there friend")])
            .await;
        registry.clear_messages(&id).await;
        let chat = registry.chat(&id).await.expect("chat");
        assert!(chat.messages.is_empty());
        assert_eq!(chat.title, "Hello there friend");
    }

    #[tokio::test]
    async fn mutations_flush_to_the_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chats.json");
        let registry = ChatRegistry::open(ChatStore::new(&path));
        let id = registry.create_chat().await;
        registry
            .replace_messages(&id, vec![ChatMessage::user("persist me")])
            .await;

        let reloaded = ChatRegistry::open(ChatStore::new(&path));
        let chat = reloaded.chat(&id).await.expect("persisted chat");
        assert_eq!(chat.messages[0].content, "persist me");
        assert_eq!(reloaded.current_chat_id().await.as_deref(), Some(id.as_str()));
    }
}
