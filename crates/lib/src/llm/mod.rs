//! LLM endpoint client for a local Ollama server.
//!
//! Supports listing models and streaming chat with a single-prompt fallback,
//! plus the per-record parser for the NDJSON response stream.

mod ollama;

pub use ollama::{
    LlmError, OllamaClient, OllamaModel, StreamRecord, TurnMessage, DEFAULT_BASE_URL,
};
