//! Send/stream engine: opens the model stream and reconciles incremental
//! output into the chat registry.
//!
//! A send appends the user message plus an empty assistant placeholder, then
//! overwrites the placeholder with the full accumulated answer once per
//! content-bearing record. Merges are keyed by chat id: switching chats
//! mid-stream keeps writing into the original chat, and deleting it turns
//! the remaining merges into silent no-ops. On any failure the placeholder
//! is removed so the chat rolls back to just the user message.

use crate::chats::{ChatMessage, ChatRegistry};
use crate::llm::{LlmError, OllamaClient, StreamRecord, TurnMessage};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

const STATE_IDLE: u8 = 0;
const STATE_SENDING: u8 = 1;
const STATE_STREAMING: u8 = 2;

/// How a send call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Stream consumed to the end; the placeholder holds the final answer.
    Completed,
    /// A precondition failed (empty prompt, unknown chat, send already in
    /// flight); nothing was changed.
    Ignored,
    /// Cancelled mid-stream; content merged so far stays committed.
    Cancelled,
}

/// Streams one answer at a time into the registry.
pub struct ChatEngine {
    registry: Arc<ChatRegistry>,
    client: OllamaClient,
    state: AtomicU8,
    cancel: AtomicBool,
}

impl ChatEngine {
    pub fn new(registry: Arc<ChatRegistry>, client: OllamaClient) -> Self {
        Self {
            registry,
            client,
            state: AtomicU8::new(STATE_IDLE),
            cancel: AtomicBool::new(false),
        }
    }

    /// True while a send is in flight.
    pub fn is_busy(&self) -> bool {
        self.state.load(Ordering::SeqCst) != STATE_IDLE
    }

    /// Request cancellation of the in-flight stream, if any. Observed
    /// between reads; already-merged content stays committed.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Send one prompt into a chat and stream the answer back into it.
    /// `on_delta` receives each content fragment as it arrives.
    pub async fn send_message(
        &self,
        chat_id: &str,
        prompt: &str,
        model: &str,
        on_delta: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> Result<SendOutcome, LlmError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Ok(SendOutcome::Ignored);
        }
        if self
            .state
            .compare_exchange(STATE_IDLE, STATE_SENDING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // A send is already streaming; re-entrant calls are dropped, not queued.
            return Ok(SendOutcome::Ignored);
        }
        let _guard = StateGuard(&self.state);
        self.cancel.store(false, Ordering::SeqCst);

        let Some(mut messages) = self.registry.messages(chat_id).await else {
            return Ok(SendOutcome::Ignored);
        };
        messages.push(ChatMessage::user(prompt));
        let history: Vec<TurnMessage> = messages.iter().map(TurnMessage::from).collect();
        self.registry.replace_messages(chat_id, messages.clone()).await;

        let placeholder = ChatMessage::assistant("");
        let placeholder_id = placeholder.id.clone();
        messages.push(placeholder);
        self.registry.replace_messages(chat_id, messages).await;

        let response = match self.client.open_stream(model, &history).await {
            Ok(res) => res,
            Err(e) => {
                self.registry.remove_message(chat_id, &placeholder_id).await;
                return Err(e);
            }
        };
        self.state.store(STATE_STREAMING, Ordering::SeqCst);

        match self
            .drain_stream(response, chat_id, &placeholder_id, on_delta)
            .await
        {
            Ok(DrainEnd::Completed) => Ok(SendOutcome::Completed),
            Ok(DrainEnd::Cancelled { merged_any }) => {
                if !merged_any {
                    self.registry.remove_message(chat_id, &placeholder_id).await;
                }
                Ok(SendOutcome::Cancelled)
            }
            Err(e) => {
                self.registry.remove_message(chat_id, &placeholder_id).await;
                Err(e)
            }
        }
    }

    /// Consume the byte stream, buffering across read boundaries and
    /// applying each complete newline-delimited record in arrival order.
    async fn drain_stream<'d>(
        &self,
        response: reqwest::Response,
        chat_id: &str,
        placeholder_id: &str,
        mut on_delta: Option<&mut (dyn FnMut(&str) + Send + 'd)>,
    ) -> Result<DrainEnd, LlmError> {
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut accumulated = String::new();

        while let Some(chunk) = stream.next().await {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(DrainEnd::Cancelled {
                    merged_any: !accumulated.is_empty(),
                });
            }
            let chunk = chunk.map_err(LlmError::Request)?;
            buffer.extend_from_slice(&chunk);
            while let Some(i) = buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..i).collect();
                buffer.drain(..1);
                let line = String::from_utf8_lossy(&line_bytes);
                self.apply_line(
                    line.trim(),
                    chat_id,
                    placeholder_id,
                    &mut accumulated,
                    on_delta.as_deref_mut(),
                )
                .await?;
            }
        }
        // A final record is complete at end-of-stream even without its newline.
        let tail = String::from_utf8_lossy(&buffer);
        self.apply_line(
            tail.trim(),
            chat_id,
            placeholder_id,
            &mut accumulated,
            on_delta.as_deref_mut(),
        )
        .await?;
        Ok(DrainEnd::Completed)
    }

    /// Handle one complete line: empty lines and unparsable records are
    /// skipped, completion markers are ignored, content is concatenated and
    /// merged into the placeholder through the registry.
    async fn apply_line<'d>(
        &self,
        line: &str,
        chat_id: &str,
        placeholder_id: &str,
        accumulated: &mut String,
        on_delta: Option<&mut (dyn FnMut(&str) + Send + 'd)>,
    ) -> Result<(), LlmError> {
        if line.is_empty() {
            return Ok(());
        }
        let record = match StreamRecord::parse(line) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("skipping unparsable stream record: {}", e);
                return Ok(());
            }
        };
        match record {
            StreamRecord::Error(message) => Err(LlmError::Stream(message)),
            StreamRecord::Done => Ok(()),
            StreamRecord::Delta(content) => {
                if !content.is_empty() {
                    accumulated.push_str(&content);
                    if let Some(cb) = on_delta {
                        cb(&content);
                    }
                    if !self
                        .registry
                        .update_message_content(chat_id, placeholder_id, accumulated)
                        .await
                    {
                        log::debug!("stream target chat {} no longer exists; dropping merge", chat_id);
                    }
                }
                Ok(())
            }
        }
    }
}

enum DrainEnd {
    Completed,
    Cancelled { merged_any: bool },
}

/// Returns the engine to Idle on every exit path of a send.
struct StateGuard<'a>(&'a AtomicU8);

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(STATE_IDLE, Ordering::SeqCst);
    }
}
