//! Multi-provider LLM client.
//!
//! Supports the **OpenAI Chat Completions API** (including OpenAI-compatible
//! endpoints such as Together or vLLM) and the **Ollama chat API** for
//! locally hosted models.  Requests are always non-streaming: the resolver
//! needs one complete JSON object per utterance.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::llm::types::{ChatRequest, Message};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Ollama host.
const OLLAMA_BASE_URL: &str = "http://127.0.0.1:11434";

/// Timeout for the cheap availability probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// Provider enum
// ---------------------------------------------------------------------------

/// Identifies which LLM provider the client should target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// OpenAI Chat Completions API (also covers OpenAI-compatible endpoints).
    OpenAI,
    /// Ollama's native `/api/chat` endpoint.
    Ollama,
}

impl LlmProvider {
    /// Short lowercase name used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Ollama => "ollama",
        }
    }
}

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to a single LLM provider endpoint.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// Which provider this configuration targets.
    pub provider: LlmProvider,
    /// API key for authentication.  Unused by Ollama.
    pub api_key: String,
    /// Base URL for the API (e.g. `https://api.openai.com/v1`).
    pub base_url: String,
    /// Default model identifier.
    pub default_model: String,
    /// Default maximum tokens per response.
    pub max_tokens: u32,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
}

impl LlmClientConfig {
    /// Create a configuration for the OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_owned(),
            default_model: model.into(),
            max_tokens: 512,
            timeout_secs: 120,
        }
    }

    /// Create a configuration for any OpenAI-compatible API.
    pub fn openai_compatible(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::openai(api_key, model)
        }
    }

    /// Create a configuration for a local Ollama server.
    ///
    /// An empty `host` falls back to `http://127.0.0.1:11434`.
    pub fn ollama(model: impl Into<String>, host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            provider: LlmProvider::Ollama,
            api_key: String::new(),
            base_url: if host.is_empty() {
                OLLAMA_BASE_URL.to_owned()
            } else {
                host
            },
            default_model: model.into(),
            max_tokens: 512,
            timeout_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// An LLM client that talks to either OpenAI or Ollama.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: LlmClientConfig,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a new client with the given configuration.
    ///
    /// Returns [`AgentError::MissingApiKey`] for OpenAI without a key.
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        if config.provider == LlmProvider::OpenAI && config.api_key.is_empty() {
            return Err(AgentError::MissingApiKey {
                provider: config.provider.as_str().into(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { config, http })
    }

    /// Returns the provider this client targets.
    pub fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    /// Returns the model requests use when none is given explicitly.
    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    /// Returns the base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Send a chat request and return the assistant's text.
    pub async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let (url, body) = match self.config.provider {
            LlmProvider::OpenAI => (
                format!("{}/chat/completions", self.base()),
                build_openai_request_body(request, &self.config),
            ),
            LlmProvider::Ollama => (
                format!("{}/api/chat", self.base()),
                build_ollama_request_body(request, &self.config),
            ),
        };

        tracing::debug!(
            url = %url,
            model = %body["model"],
            provider = self.config.provider.as_str(),
            "sending LLM request"
        );

        let resp = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(AgentError::LlmRequestFailed {
                reason: format!("API returned {status}: {text}"),
            });
        }

        let v: Value = serde_json::from_str(&text).map_err(|e| AgentError::LlmParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })?;

        match self.config.provider {
            LlmProvider::OpenAI => parse_openai_response(&v),
            LlmProvider::Ollama => parse_ollama_response(&v),
        }
    }

    /// Cheap reachability probe.
    ///
    /// OpenAI lists models at `GET /models`; Ollama lists local models at
    /// `GET /api/tags`.  Any transport failure or non-success status counts
    /// as unavailable.
    pub async fn is_available(&self) -> bool {
        let url = match self.config.provider {
            LlmProvider::OpenAI => format!("{}/models", self.base()),
            LlmProvider::Ollama => format!("{}/api/tags", self.base()),
        };
        let headers = match self.headers() {
            Ok(h) => h,
            Err(_) => return false,
        };

        match self
            .http
            .get(&url)
            .headers(headers)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "availability probe failed");
                false
            }
        }
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if self.config.provider == LlmProvider::OpenAI {
            let auth_value = format!("Bearer {}", self.config.api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value).map_err(|e| AgentError::LlmRequestFailed {
                    reason: format!("invalid authorization header: {e}"),
                })?,
            );
        }
        Ok(headers)
    }
}

// ---------------------------------------------------------------------------
// Wire format helpers
// ---------------------------------------------------------------------------

fn messages_to_wire(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| json!({ "role": m.role, "content": m.content }))
        .collect()
}

fn model_for<'a>(request: &'a ChatRequest, config: &'a LlmClientConfig) -> &'a str {
    if request.model.is_empty() {
        &config.default_model
    } else {
        &request.model
    }
}

/// Build the JSON body for the OpenAI Chat Completions API.
pub fn build_openai_request_body(request: &ChatRequest, config: &LlmClientConfig) -> Value {
    let mut body = json!({
        "model": model_for(request, config),
        "max_tokens": request.max_tokens.unwrap_or(config.max_tokens),
        "messages": messages_to_wire(&request.messages),
    });

    if let Some(temp) = request.temperature {
        body["temperature"] = json!(temp);
    }

    if request.json_mode {
        body["response_format"] = json!({ "type": "json_object" });
    }

    body
}

/// Build the JSON body for Ollama's `/api/chat`.
pub fn build_ollama_request_body(request: &ChatRequest, config: &LlmClientConfig) -> Value {
    let mut options = json!({
        "num_predict": request.max_tokens.unwrap_or(config.max_tokens),
    });
    if let Some(temp) = request.temperature {
        options["temperature"] = json!(temp);
    }

    let mut body = json!({
        "model": model_for(request, config),
        "messages": messages_to_wire(&request.messages),
        "stream": false,
        "options": options,
    });

    if request.json_mode {
        body["format"] = json!("json");
    }

    body
}

/// Extract the assistant text from an OpenAI Chat Completions response.
pub fn parse_openai_response(v: &Value) -> Result<String> {
    let message = &v["choices"][0]["message"];

    if message.is_null() {
        return Err(AgentError::LlmParseFailed {
            reason: "missing `choices[0].message` in response".into(),
        });
    }

    Ok(message["content"].as_str().unwrap_or_default().to_owned())
}

/// Extract the assistant text from an Ollama chat response.
pub fn parse_ollama_response(v: &Value) -> Result<String> {
    if let Some(err) = v["error"].as_str() {
        return Err(AgentError::LlmRequestFailed {
            reason: format!("ollama error: {err}"),
        });
    }

    v["message"]["content"]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| AgentError::LlmParseFailed {
            reason: "missing `message.content` in response".into(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_config_construction() {
        let config = LlmClientConfig::openai("sk-test-key", "gpt-4o-mini");
        assert_eq!(config.provider, LlmProvider::OpenAI);
        assert_eq!(config.api_key, "sk-test-key");
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn openai_compatible_config_construction() {
        let config =
            LlmClientConfig::openai_compatible("local-key", "mixtral", "http://localhost:8000/v1");
        assert_eq!(config.provider, LlmProvider::OpenAI);
        assert_eq!(config.default_model, "mixtral");
        assert_eq!(config.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn ollama_config_defaults_host() {
        let config = LlmClientConfig::ollama("llama3", "");
        assert_eq!(config.provider, LlmProvider::Ollama);
        assert_eq!(config.base_url, "http://127.0.0.1:11434");
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn openai_empty_api_key_returns_error() {
        let result = LlmClient::new(LlmClientConfig::openai("", "gpt-4o-mini"));
        assert!(matches!(
            result,
            Err(AgentError::MissingApiKey { ref provider }) if provider == "openai"
        ));
    }

    #[test]
    fn ollama_needs_no_api_key() {
        let client = LlmClient::new(LlmClientConfig::ollama("llama3", "")).unwrap();
        assert_eq!(client.provider(), LlmProvider::Ollama);
        assert_eq!(client.default_model(), "llama3");
    }

    #[test]
    fn build_openai_request_body_json_mode() {
        let config = LlmClientConfig::openai("k", "gpt-4o-mini");
        let body = build_openai_request_body(&ChatRequest::json("sys", "hi"), &config);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn build_openai_request_body_explicit_model() {
        let config = LlmClientConfig::openai("k", "gpt-4o-mini");
        let mut req = ChatRequest::json("sys", "hi");
        req.model = "gpt-4o".into();
        req.json_mode = false;
        let body = build_openai_request_body(&req, &config);

        assert_eq!(body["model"], "gpt-4o");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn build_ollama_request_body_json_mode() {
        let config = LlmClientConfig::ollama("llama3", "");
        let body = build_ollama_request_body(&ChatRequest::json("sys", "hi"), &config);

        assert_eq!(body["model"], "llama3");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], "json");
        assert_eq!(body["options"]["temperature"], 0.0);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn parse_openai_text_response() {
        let v = json!({
            "id": "chatcmpl-abc",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "{\"intent\":null}" },
                "finish_reason": "stop"
            }]
        });
        assert_eq!(parse_openai_response(&v).unwrap(), "{\"intent\":null}");
    }

    #[test]
    fn parse_openai_missing_message() {
        let v = json!({ "choices": [] });
        assert!(matches!(
            parse_openai_response(&v),
            Err(AgentError::LlmParseFailed { .. })
        ));
    }

    #[test]
    fn parse_ollama_text_response() {
        let v = json!({
            "model": "llama3",
            "message": { "role": "assistant", "content": "{}" },
            "done": true
        });
        assert_eq!(parse_ollama_response(&v).unwrap(), "{}");
    }

    #[test]
    fn parse_ollama_error_is_request_failure() {
        let v = json!({ "error": "model 'llama3' not found" });
        let err = parse_ollama_response(&v).unwrap_err();
        assert!(err.is_unreachable());
    }
}
