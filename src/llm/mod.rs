//! LLM integration module.
//!
//! Provides an OpenAI-compatible client for chat-completion calls and
//! the prompts used for model-graded evaluation.

mod client;
mod prompts;

pub use client::{ChatModel, LlmClient, Message, Role};
pub use prompts::Prompts;
