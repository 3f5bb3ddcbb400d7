//! Intent pipeline error types.
//!
//! Every stage between an utterance and an executed action surfaces errors
//! through [`IntentError`].  Failing to match an intent is not an error: the
//! resolver reports it as [`crate::Resolution::NoMatch`].

use mia_adapters::AdapterError;
use mia_agent::AgentError;

/// Unified error type for the intent pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    // -- Catalog errors ------------------------------------------------------
    /// A catalog source could not be read, parsed, or validated.
    #[error("failed to load intent catalog from {file}{}: {reason}", intent_suffix(.intent))]
    CatalogLoad {
        file: String,
        intent: Option<String>,
        reason: String,
    },

    /// The named intent is not in the current catalog.
    #[error("unknown intent: {name}")]
    UnknownIntent { name: String },

    // -- Resolver errors -----------------------------------------------------
    /// The utterance could not be handed to the resolver at all.
    #[error("failed to parse utterance: {reason}")]
    ParseFailed { reason: String },

    /// Neither the local nor the remote backend responded.
    #[error("no resolver backend available: {reason}")]
    BackendUnavailable { reason: String },

    // -- Dispatcher errors ---------------------------------------------------
    /// A required parameter has no value and no default.
    #[error("intent `{intent}` is missing required parameter `{param}`")]
    MissingParameter { intent: String, param: String },

    /// The intent needs a feature that is switched off in the settings.
    #[error("intent `{intent}` requires feature `{feature}`, which is disabled")]
    FeatureDisabled { intent: String, feature: String },

    /// A shell template failed to render.
    #[error("failed to render intent `{intent}`: {reason}")]
    Render { intent: String, reason: String },

    /// The plugin an intent points at is not registered.
    #[error("plugin not found: {plugin}")]
    PluginNotFound { plugin: String },

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from the agent crate.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// An error propagated from an adapter.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    // -- Serialization -------------------------------------------------------
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntentError {
    pub(crate) fn catalog(
        file: impl Into<String>,
        intent: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Self::CatalogLoad {
            file: file.into(),
            intent: intent.map(str::to_owned),
            reason: reason.into(),
        }
    }

    /// Map a backend failure from the agent crate, keeping
    /// "nothing answered" distinct from other agent errors.
    pub(crate) fn from_backend(err: AgentError) -> Self {
        if matches!(err, AgentError::BackendUnavailable { .. }) {
            Self::BackendUnavailable {
                reason: err.to_string(),
            }
        } else {
            Self::Agent(err)
        }
    }
}

fn intent_suffix(intent: &Option<String>) -> String {
    match intent {
        Some(name) => format!(" (intent `{name}`)"),
        None => String::new(),
    }
}

/// Convenience alias used throughout the intent crate.
pub type Result<T> = std::result::Result<T, IntentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_error_names_file_and_intent() {
        let err = IntentError::catalog("files.yaml", Some("create_folder"), "bad regex");
        assert_eq!(
            err.to_string(),
            "failed to load intent catalog from files.yaml (intent `create_folder`): bad regex"
        );

        let err = IntentError::catalog("intents", None, "catalog is empty");
        assert_eq!(
            err.to_string(),
            "failed to load intent catalog from intents: catalog is empty"
        );
    }

    #[test]
    fn backend_unavailable_is_kept_distinct() {
        let err = IntentError::from_backend(AgentError::BackendUnavailable { attempts: vec![] });
        assert!(matches!(err, IntentError::BackendUnavailable { .. }));

        let err = IntentError::from_backend(AgentError::LlmParseFailed {
            reason: "bad".into(),
        });
        assert!(matches!(err, IntentError::Agent(_)));
    }
}
