//! Agent error types.

/// Errors from backends, settings, and memory.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Transport failure or non-success HTTP status.  The backend pool
    /// moves on to the next backend.
    #[error("llm request failed: {reason}")]
    LlmRequestFailed { reason: String },

    /// The backend answered with a body that could not be read.
    #[error("unreadable llm response: {reason}")]
    LlmParseFailed { reason: String },

    #[error("{provider} needs an API key")]
    MissingApiKey { provider: String },

    /// Every configured backend failed to respond.
    #[error("no language-model backend responded ({})", format_attempts(.attempts))]
    BackendUnavailable { attempts: Vec<String> },

    #[error("config error: {reason}")]
    ConfigError { reason: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether this error means the backend never produced a usable answer
    /// and a different backend may be tried instead.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::LlmRequestFailed { .. })
    }
}

fn format_attempts(attempts: &[String]) -> String {
    if attempts.is_empty() {
        "no backend configured".to_owned()
    } else {
        attempts.join("; ")
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::LlmRequestFailed {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_unavailable_lists_attempts() {
        let err = AgentError::BackendUnavailable {
            attempts: vec!["openai: timeout".into(), "ollama: refused".into()],
        };
        assert_eq!(
            err.to_string(),
            "no language-model backend responded (openai: timeout; ollama: refused)"
        );
    }

    #[test]
    fn backend_unavailable_without_backends() {
        let err = AgentError::BackendUnavailable { attempts: vec![] };
        assert!(err.to_string().contains("no backend configured"));
    }

    #[test]
    fn only_request_failures_are_unreachable() {
        assert!(
            AgentError::LlmRequestFailed {
                reason: "x".into()
            }
            .is_unreachable()
        );
        assert!(
            !AgentError::LlmParseFailed {
                reason: "x".into()
            }
            .is_unreachable()
        );
    }
}
