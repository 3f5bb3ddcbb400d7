//! Language resolver -- turns an utterance into a catalog intent.
//!
//! Two tiers:
//!
//! 1. **Fast tier**: the catalog's phrase and regex triggers
//!    ([`crate::matcher::IntentMatcher`]).  No model call.
//! 2. **Model tier**: the utterance, the catalog summary, and the session
//!    context go to the [`BackendPool`], which answers with strict JSON
//!    `{"intent": <name|null>, "params": {...}}`.
//!
//! Anything the model says that does not name a catalog intent is a
//! [`Resolution::NoMatch`], never an action.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use mia_agent::{BackendPool, SessionMemory};

use crate::catalog::{IntentCatalog, IntentDefinition};
use crate::error::{IntentError, Result};
use crate::matcher::MatchKind;

/// Turns of session context sent with each model request.
pub const DEFAULT_CONTEXT_WINDOW: usize = 20;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which tier produced a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "tier")]
pub enum ResolutionSource {
    Phrase,
    Pattern,
    Model { backend: String },
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Phrase => write!(f, "phrase"),
            Self::Pattern => write!(f, "pattern"),
            Self::Model { backend } => write!(f, "model:{backend}"),
        }
    }
}

/// An utterance matched to a definition that exists in the catalog.
#[derive(Debug, Clone)]
pub struct ResolvedIntent {
    pub definition: Arc<IntentDefinition>,
    pub params: BTreeMap<String, Value>,
    pub source: ResolutionSource,
}

impl ResolvedIntent {
    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

/// Result of resolving one utterance.
#[derive(Debug, Clone)]
pub enum Resolution {
    Matched(ResolvedIntent),
    /// Nothing in the catalog fits.  Not an error.
    NoMatch { reason: String },
}

impl Resolution {
    fn no_match(reason: impl Into<String>) -> Self {
        Self::NoMatch {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelAnswer {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    params: Value,
}

// ---------------------------------------------------------------------------
// System prompt
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT_HEAD: &str = r#"You translate a user's request into exactly one intent from a fixed catalog.

Respond ONLY with a JSON object:
{"intent": "<intent name or null>", "params": {"<param>": "<value>", ...}}

Rules:
- Use only intent names from the catalog below. Never invent one.
- If nothing fits, answer {"intent": null, "params": {}}.
- Fill every parameter marked with * ; omit parameters you cannot infer.
- Use the conversation context to resolve words like "it" or "there".

Catalog (name(params): description):"#;

/// System prompt listing every intent with its parameters.
pub fn system_prompt(catalog: &IntentCatalog) -> String {
    let mut prompt = String::from(SYSTEM_PROMPT_HEAD);
    for definition in catalog.iter() {
        prompt.push_str("\n- ");
        prompt.push_str(&definition.signature());
    }
    prompt
}

/// Strip optional markdown code fences around a JSON answer.
pub fn strip_code_fences(text: &str) -> &str {
    let cleaned = text.trim();
    let cleaned = cleaned.strip_prefix("```json").unwrap_or(cleaned);
    let cleaned = cleaned.strip_prefix("```").unwrap_or(cleaned);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned);
    cleaned.trim()
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Two-tier resolver over a backend pool.
#[derive(Debug, Clone)]
pub struct Resolver {
    backends: BackendPool,
    context_window: usize,
}

impl Resolver {
    pub fn new(backends: BackendPool) -> Self {
        Self {
            backends,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }

    /// Number of past turns included as model context.
    pub fn with_context_window(mut self, window: usize) -> Self {
        self.context_window = window;
        self
    }

    pub fn backends(&self) -> &BackendPool {
        &self.backends
    }

    /// Resolve `utterance` against `catalog`.
    ///
    /// Fails with [`IntentError::ParseFailed`] for blank input and with
    /// [`IntentError::BackendUnavailable`] when the model tier is needed
    /// but no backend answers.
    pub async fn resolve(
        &self,
        utterance: &str,
        catalog: &IntentCatalog,
        memory: &SessionMemory,
    ) -> Result<Resolution> {
        let text = utterance.trim();
        if text.is_empty() {
            return Err(IntentError::ParseFailed {
                reason: "empty utterance".into(),
            });
        }

        debug!(utterance = text, "resolving utterance");

        // Tier 1: catalog triggers.
        if let Some(resolved) = Self::resolve_fast(text, catalog) {
            info!(intent = %resolved.name(), source = %resolved.source, "intent resolved via fast tier");
            return Ok(Resolution::Matched(resolved));
        }

        // Tier 2: model.
        let system = system_prompt(catalog);
        let user = self.user_prompt(text, memory);
        let completion = self
            .backends
            .complete(&system, &user)
            .await
            .map_err(IntentError::from_backend)?;

        let resolution = interpret(&completion.text, catalog, &completion.backend);
        match &resolution {
            Resolution::Matched(resolved) => {
                info!(intent = %resolved.name(), source = %resolved.source, "intent resolved via model");
            }
            Resolution::NoMatch { reason } => {
                info!(backend = %completion.backend, reason = %reason, "no intent matched");
            }
        }
        Ok(resolution)
    }

    /// The fast tier on its own.
    pub fn resolve_fast(text: &str, catalog: &IntentCatalog) -> Option<ResolvedIntent> {
        let hit = catalog.matcher().find(text)?;
        let definition = catalog.lookup(&hit.intent)?;
        let params = hit
            .captures
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        let source = match hit.kind {
            MatchKind::Phrase => ResolutionSource::Phrase,
            MatchKind::Pattern => ResolutionSource::Pattern,
        };
        Some(ResolvedIntent {
            definition,
            params,
            source,
        })
    }

    fn user_prompt(&self, text: &str, memory: &SessionMemory) -> String {
        let context = memory.to_prompt(self.context_window);
        if context.is_empty() {
            format!("User: {text}")
        } else {
            format!("{context}\n\nUser: {text}")
        }
    }
}

/// Interpret a model answer against `catalog`.
pub fn interpret(answer: &str, catalog: &IntentCatalog, backend: &str) -> Resolution {
    let parsed: ModelAnswer = match serde_json::from_str(strip_code_fences(answer)) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, answer = answer, "model answer is not valid JSON");
            return Resolution::no_match(format!("model answer was not valid JSON: {e}"));
        }
    };

    let name = match parsed.intent.as_deref().map(str::trim) {
        None | Some("") => return Resolution::no_match("model found no matching intent"),
        Some(n) if n.eq_ignore_ascii_case("unknown") || n.eq_ignore_ascii_case("none") => {
            return Resolution::no_match("model found no matching intent");
        }
        Some(n) => n,
    };

    let Some(definition) = catalog.lookup(name) else {
        return Resolution::no_match(format!("model chose `{name}`, which is not in the catalog"));
    };

    let params = match parsed.params {
        Value::Object(map) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        _ => BTreeMap::new(),
    };

    Resolution::Matched(ResolvedIntent {
        definition,
        params,
        source: ResolutionSource::Model {
            backend: backend.to_owned(),
        },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
