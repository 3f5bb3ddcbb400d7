//! Inference backends and ordered failover.
//!
//! The resolver never talks to an [`LlmClient`] directly.  It asks a
//! [`BackendPool`], which tries each configured [`InferenceBackend`] in order
//! and moves on when one cannot be reached.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{EngineChoice, Settings};
use crate::error::{AgentError, Result};
use crate::llm::client::{LlmClient, LlmClientConfig, LlmProvider};
use crate::llm::types::ChatRequest;

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Where a backend runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Inference service on this machine or LAN.
    Local,
    /// Hosted inference API.
    Remote,
}

/// A language-model service that turns a system prompt plus user text into
/// a single completion.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short identifier used in logs and error messages.
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Request one JSON-mode completion.
    ///
    /// Transport failures must be reported as
    /// [`AgentError::LlmRequestFailed`] so the pool can fail over.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Cheap reachability probe.
    async fn is_available(&self) -> bool;
}

#[async_trait]
impl InferenceBackend for LlmClient {
    fn name(&self) -> &str {
        self.provider().as_str()
    }

    fn kind(&self) -> BackendKind {
        match self.provider() {
            LlmProvider::OpenAI => BackendKind::Remote,
            LlmProvider::Ollama => BackendKind::Local,
        }
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.chat(&ChatRequest::json(system, user)).await
    }

    async fn is_available(&self) -> bool {
        LlmClient::is_available(self).await
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// A completion together with the backend that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub backend: String,
    pub text: String,
}

/// Ordered list of backends tried one after another.
#[derive(Clone, Default)]
pub struct BackendPool {
    backends: Vec<Arc<dyn InferenceBackend>>,
}

impl std::fmt::Debug for BackendPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendPool")
            .field("backends", &self.names())
            .finish()
    }
}

impl BackendPool {
    pub fn new(backends: Vec<Arc<dyn InferenceBackend>>) -> Self {
        Self { backends }
    }

    /// Build the pool the configured engine choice asks for.
    ///
    /// - `auto`: OpenAI first when an API key is set, then Ollama.
    /// - `openai`: OpenAI only; a missing key is an error.
    /// - `ollama`: Ollama only.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut pool = Self::default();
        let key = settings.openai_api_key();

        match settings.engine {
            EngineChoice::Auto => {
                if let Some(key) = key {
                    pool.push(Arc::new(LlmClient::new(openai_config(settings, key))?));
                }
                pool.push(Arc::new(LlmClient::new(ollama_config(settings))?));
            }
            EngineChoice::OpenAI => {
                let key = key.unwrap_or_default();
                pool.push(Arc::new(LlmClient::new(openai_config(settings, key))?));
            }
            EngineChoice::Ollama => {
                pool.push(Arc::new(LlmClient::new(ollama_config(settings))?));
            }
        }

        debug!(engine = %settings.engine, backends = ?pool.names(), "backend pool built");
        Ok(pool)
    }

    pub fn push(&mut self, backend: Arc<dyn InferenceBackend>) {
        self.backends.push(backend);
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn backends(&self) -> &[Arc<dyn InferenceBackend>] {
        &self.backends
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_owned()).collect()
    }

    /// Ask each backend in order until one responds.
    ///
    /// A backend that cannot be reached is skipped; any other error is
    /// returned as is.  When every backend was skipped (or the pool is
    /// empty) the result is [`AgentError::BackendUnavailable`].
    pub async fn complete(&self, system: &str, user: &str) -> Result<Completion> {
        let mut attempts = Vec::new();

        for backend in &self.backends {
            match backend.complete(system, user).await {
                Ok(text) => {
                    debug!(backend = backend.name(), chars = text.len(), "completion received");
                    return Ok(Completion {
                        backend: backend.name().to_owned(),
                        text,
                    });
                }
                Err(e) if e.is_unreachable() => {
                    warn!(backend = backend.name(), error = %e, "backend unreachable, trying next");
                    attempts.push(format!("{}: {e}", backend.name()));
                }
                Err(e) => return Err(e),
            }
        }

        Err(AgentError::BackendUnavailable { attempts })
    }
}

fn openai_config(settings: &Settings, key: &str) -> LlmClientConfig {
    match &settings.openai.base_url {
        Some(base) => LlmClientConfig::openai_compatible(key, &settings.openai.model, base),
        None => LlmClientConfig::openai(key, &settings.openai.model),
    }
}

fn ollama_config(settings: &Settings) -> LlmClientConfig {
    LlmClientConfig::ollama(&settings.ollama.model, &settings.ollama.base_url)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Scripted {
        name: &'static str,
        reply: fn() -> Result<String>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, reply: fn() -> Result<String>) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl InferenceBackend for Scripted {
        fn name(&self) -> &str {
            self.name
        }
        fn kind(&self) -> BackendKind {
            BackendKind::Local
        }
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.reply)()
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    fn down() -> Result<String> {
        Err(AgentError::LlmRequestFailed {
            reason: "connection refused".into(),
        })
    }

    fn up() -> Result<String> {
        Ok("{\"intent\":null}".into())
    }

    fn garbled() -> Result<String> {
        Err(AgentError::LlmParseFailed {
            reason: "bad envelope".into(),
        })
    }

    #[tokio::test]
    async fn falls_over_to_next_backend() {
        let first = Scripted::new("remote", down);
        let second = Scripted::new("local", up);
        let pool = BackendPool::new(vec![first.clone(), second.clone()]);

        let completion = pool.complete("sys", "hi").await.unwrap();
        assert_eq!(completion.backend, "local");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let first = Scripted::new("remote", up);
        let second = Scripted::new("local", up);
        let pool = BackendPool::new(vec![first.clone(), second.clone()]);

        pool.complete("sys", "hi").await.unwrap();
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_down_is_backend_unavailable() {
        let pool = BackendPool::new(vec![
            Scripted::new("remote", down),
            Scripted::new("local", down),
        ]);
        match pool.complete("sys", "hi").await {
            Err(AgentError::BackendUnavailable { attempts }) => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].starts_with("remote:"));
            }
            other => panic!("expected BackendUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_pool_is_backend_unavailable() {
        let pool = BackendPool::default();
        assert!(matches!(
            pool.complete("sys", "hi").await,
            Err(AgentError::BackendUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn parse_errors_do_not_fail_over() {
        let second = Scripted::new("local", up);
        let pool = BackendPool::new(vec![Scripted::new("remote", garbled), second.clone()]);
        assert!(matches!(
            pool.complete("sys", "hi").await,
            Err(AgentError::LlmParseFailed { .. })
        ));
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn auto_without_key_is_local_only() {
        let pool = BackendPool::from_settings(&Settings::default()).unwrap();
        assert_eq!(pool.names(), vec!["ollama"]);
        assert_eq!(pool.backends()[0].kind(), BackendKind::Local);
    }

    #[test]
    fn auto_with_key_prefers_remote() {
        let mut settings = Settings::default();
        settings.openai.api_key = Some("sk-test".into());
        let pool = BackendPool::from_settings(&settings).unwrap();
        assert_eq!(pool.names(), vec!["openai", "ollama"]);
    }

    #[test]
    fn openai_engine_requires_key() {
        let settings = Settings {
            engine: EngineChoice::OpenAI,
            ..Settings::default()
        };
        assert!(matches!(
            BackendPool::from_settings(&settings),
            Err(AgentError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn ollama_engine_ignores_key() {
        let mut settings = Settings {
            engine: EngineChoice::Ollama,
            ..Settings::default()
        };
        settings.openai.api_key = Some("sk-test".into());
        let pool = BackendPool::from_settings(&settings).unwrap();
        assert_eq!(pool.names(), vec!["ollama"]);
    }
}
