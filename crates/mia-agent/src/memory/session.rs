//! Session turn log and symbolic context.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest output excerpt kept in a prompt line.
const PROMPT_OUTPUT_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// What became of one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The command was confirmed and run.
    Executed {
        success: bool,
        exit_code: Option<i32>,
        output: String,
    },
    /// The user declined the previewed command.
    Rejected,
    /// No catalog intent matched.
    NoMatch { reason: String },
    /// Resolution, rendering, or execution raised an error.
    Failed { error: String },
}

impl TurnOutcome {
    /// One-line description for prompts and the `:memory` view.
    pub fn describe(&self) -> String {
        match self {
            Self::Executed {
                success,
                exit_code,
                output,
            } => {
                let status = match (success, exit_code) {
                    (true, _) => "ok".to_owned(),
                    (false, Some(code)) => format!("failed (exit {code})"),
                    (false, None) => "failed".to_owned(),
                };
                let excerpt = excerpt(output, PROMPT_OUTPUT_CHARS);
                if excerpt.is_empty() {
                    status
                } else {
                    format!("{status}: {excerpt}")
                }
            }
            Self::Rejected => "rejected by user".to_owned(),
            Self::NoMatch { reason } => format!("no match ({reason})"),
            Self::Failed { error } => format!("error: {error}"),
        }
    }
}

/// One utterance and everything that followed from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub utterance: String,
    /// Name of the resolved intent, if any.
    pub intent: Option<String>,
    /// The rendered command shown for confirmation, if any.
    pub preview: Option<String>,
    pub outcome: TurnOutcome,
}

impl Turn {
    /// Create a turn stamped with a fresh id and the current time.
    pub fn new(utterance: impl Into<String>, outcome: TurnOutcome) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            utterance: utterance.into(),
            intent: None,
            preview: None,
            outcome,
        }
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }

    /// Render as a single prompt line.
    pub fn to_line(&self) -> String {
        let mut line = format!("user: {}", self.utterance);
        if let Some(intent) = &self.intent {
            line.push_str(&format!(" -> {intent}"));
        }
        line.push_str(&format!(" [{}]", self.outcome.describe()));
        line
    }
}

// ---------------------------------------------------------------------------
// SessionMemory
// ---------------------------------------------------------------------------

/// Ordered turn log plus symbolic context for a single session.
///
/// The log only grows until [`SessionMemory::clear`] ends the session.
#[derive(Debug, Clone)]
pub struct SessionMemory {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    turns: Vec<Turn>,
    symbols: BTreeMap<String, String>,
}

impl Default for SessionMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMemory {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::now_v7(),
            started_at: Utc::now(),
            turns: Vec::new(),
            symbols: BTreeMap::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Append a turn to the end of the log.
    pub fn append(&mut self, turn: Turn) {
        tracing::debug!(
            session = %self.session_id,
            turn = %turn.id,
            intent = turn.intent.as_deref().unwrap_or("-"),
            "turn recorded"
        );
        self.turns.push(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Every turn, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The `window` most recent turns, oldest first.
    pub fn get_context(&self, window: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }

    // -- Symbolic context ----------------------------------------------------

    /// Record a symbolic value such as `last_folder`.  A leading `~` is
    /// expanded to the home directory.
    pub fn set(&mut self, key: impl Into<String>, value: &str) {
        self.symbols.insert(key.into(), expand_home(value));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.symbols.get(key).map(String::as_str)
    }

    /// `Context:` block listing every symbolic entry, or empty.
    pub fn summary(&self) -> String {
        if self.symbols.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = self
            .symbols
            .iter()
            .map(|(k, v)| format!("- {k}: {v}"))
            .collect();
        format!("Context:\n{}", lines.join("\n"))
    }

    /// Symbolic summary followed by the most recent turns.
    pub fn to_prompt(&self, window: usize) -> String {
        let mut parts = Vec::new();
        let summary = self.summary();
        if !summary.is_empty() {
            parts.push(summary);
        }
        let recent = self.get_context(window);
        if !recent.is_empty() {
            let lines: Vec<String> = recent.iter().map(Turn::to_line).collect();
            parts.push(format!("Recent conversation:\n{}", lines.join("\n")));
        }
        parts.join("\n\n")
    }

    /// End the session: drop every turn and symbol.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.symbols.clear();
    }
}

fn expand_home(value: &str) -> String {
    let home = match std::env::var("HOME") {
        Ok(h) if !h.is_empty() => h,
        _ => return value.to_owned(),
    };
    if value == "~" {
        home
    } else if let Some(rest) = value.strip_prefix("~/") {
        format!("{}/{rest}", home.trim_end_matches('/'))
    } else {
        value.to_owned()
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
