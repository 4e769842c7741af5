//! Colloq core library — chat registry, persistence, the Ollama streaming
//! client, and the send/stream engine used by the CLI.

pub mod chats;
pub mod config;
pub mod engine;
pub mod llm;
pub mod models;
pub mod store;
pub mod transcript;
