//! LLM integration layer.
//!
//! - [`types`] -- Provider-agnostic messages and requests.
//! - [`client`] -- HTTP client for the OpenAI Chat Completions API and the
//!   Ollama chat API.
//! - [`backend`] -- The [`InferenceBackend`] seam used by the resolver and
//!   the ordered failover [`BackendPool`].

pub mod backend;
pub mod client;
pub mod types;

pub use backend::{BackendKind, BackendPool, Completion, InferenceBackend};
pub use client::{LlmClient, LlmClientConfig, LlmProvider};
pub use types::{ChatRequest, Message, Role};
