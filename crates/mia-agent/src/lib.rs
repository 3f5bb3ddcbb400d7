//! Language-model plumbing for MIA.
//!
//! This crate holds everything the intent pipeline needs from the outside
//! world that is not an OS action:
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌──────────────────┐
//! │   Settings   │────>│ BackendPool │────>│ LlmClient        │
//! │ (toml + env) │     │ (failover)  │     │ (OpenAI, Ollama) │
//! └──────────────┘     └─────────────┘     └──────────────────┘
//!
//!                      ┌───────────────┐
//!                      │ SessionMemory │  turns + symbolic context
//!                      └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`llm`] -- LLM client, wire types, and the backend abstraction.
//! - [`config`] -- Layered settings (defaults, TOML file, environment).
//! - [`memory`] -- Per-session turn log used as resolver context.
//! - [`error`] -- Agent error types.

pub mod config;
pub mod error;
pub mod llm;
pub mod memory;

// Re-export the most commonly used types at the crate root.
pub use config::{
    ConfirmationMode, EngineChoice, FeatureSettings, OllamaSettings, OpenAiSettings, Settings,
    env_non_empty,
};
pub use error::{AgentError, Result};
pub use llm::{
    BackendKind, BackendPool, ChatRequest, Completion, InferenceBackend, LlmClient,
    LlmClientConfig, LlmProvider, Message, Role,
};
pub use memory::{SessionMemory, Turn, TurnOutcome};
