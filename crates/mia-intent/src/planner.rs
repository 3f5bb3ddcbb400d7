//! Autonomous planner: plan, act, observe, repeat.
//!
//! Each step the backend sees the allowed intents, the symbolic context,
//! recent history, the last observation, and the goal, and answers with one
//! JSON step:
//!
//! ```json
//! {"thought": "...", "intent": "create_file", "params": {...}, "stop": false, "report": "..."}
//! ```
//!
//! Actions still go through [`Dispatcher::render`], [`Dispatcher::confirm`]
//! and [`Dispatcher::execute`].  Guards end or redirect the loop:
//!
//! - a `stop` is vetoed while the goal asks for an edit (or a creation) that
//!   has not happened yet;
//! - repeating an action that already succeeded, or reading the same file
//!   twice, ends the run;
//! - an intent outside the whitelist or the catalog ends the run.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use mia_adapters::{Adapter, AdapterError, AdapterType, HealthStatus, ToolDefinition};
use mia_agent::{BackendPool, SessionMemory};

use crate::catalog::{CatalogHandle, IntentCatalog};
use crate::dispatcher::{AutoApprove, Confirmer, Dispatcher};
use crate::error::{IntentError, Result};
use crate::pipeline::remember_paths;
use crate::resolver::strip_code_fences;

pub const DEFAULT_MAX_STEPS: usize = 20;
/// Step budget when the planner runs as the `planner.run` plugin.
pub const PLUGIN_MAX_STEPS: usize = 8;
const HISTORY_LINES: usize = 12;
const OBSERVATION_CHARS: usize = 2000;
const HISTORY_NOTE_CHARS: usize = 500;

const MUTATING: &[&str] = &["create_file", "write_file", "edit_file", "create_folder"];
const EDITING: &[&str] = &["edit_file", "write_file"];

const CREATE_WORDS: &[&str] = &[
    "create",
    "make",
    "write a file",
    "write file",
    "put a file",
    "add a file",
    "new folder",
    "new directory",
];
const EDIT_WORDS: &[&str] = &["edit", "modify", "change", "convert", "update", "refactor"];

const PLANNER_SYSTEM_PROMPT: &str = r#"You are MIA's autonomous planner. Reach the user's GOAL by choosing ONE next action per reply from the allowed intents.

Respond ONLY with a JSON object:
{"thought": "short reasoning", "intent": "<allowed intent or null>", "params": {...}, "stop": false, "report": "1-2 sentence status for the user"}

Rules:
- Choose only from ALLOWED INTENTS. Never invent an intent.
- Set "stop": true only after the last required action has succeeded.
- After reading a file, the next step is an edit or write, not another read.
- Describing a change is not making it: issue the actual create/write/edit action.
- Paths starting with ./ are relative to the last folder you created.
- If you cannot proceed safely, set "stop": true and explain in "report"."#;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum StopReason {
    /// The backend said the goal is reached.
    Finished,
    MaxSteps,
    /// The backend proposed no intent.
    NoAction,
    Disallowed { intent: String },
    UnknownIntent { intent: String },
    Repeated { intent: String },
    /// The confirmer declined an action.
    Declined { intent: String },
    BackendError { error: String },
    InvalidPlan { error: String },
}

impl StopReason {
    /// Runs that ended because something broke rather than by decision.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::BackendError { .. } | Self::InvalidPlan { .. })
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finished => write!(f, "goal reached"),
            Self::MaxSteps => write!(f, "step limit reached"),
            Self::NoAction => write!(f, "no action proposed"),
            Self::Disallowed { intent } => write!(f, "intent `{intent}` is not allowed"),
            Self::UnknownIntent { intent } => write!(f, "intent `{intent}` is not in the catalog"),
            Self::Repeated { intent } => write!(f, "repeated `{intent}` action"),
            Self::Declined { intent } => write!(f, "`{intent}` declined"),
            Self::BackendError { error } => write!(f, "engine error: {error}"),
            Self::InvalidPlan { error } => write!(f, "invalid planner reply: {error}"),
        }
    }
}

/// The backend's answer for one step.
#[derive(Debug, Clone, Deserialize)]
struct PlanStep {
    #[serde(default)]
    thought: String,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    stop: bool,
    #[serde(default)]
    report: String,
}

/// What one step did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub thought: String,
    pub intent: Option<String>,
    pub params: Value,
    /// Rendered command, when one ran.
    pub command: Option<String>,
    pub success: Option<bool>,
    pub observation: String,
}

/// Result of [`Planner::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    pub goal: String,
    pub allowed: Vec<String>,
    pub steps: Vec<StepRecord>,
    pub stop: StopReason,
    /// Last status text from the backend.
    pub report: String,
}

impl PlanReport {
    pub fn success(&self) -> bool {
        !self.stop.is_error()
    }

    /// Multi-line summary for the terminal and the `planner.run` plugin.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("Goal: {}", self.goal)];
        for step in &self.steps {
            let intent = step.intent.as_deref().unwrap_or("-");
            let status = match step.success {
                Some(true) => "ok",
                Some(false) => "failed",
                None => "skipped",
            };
            lines.push(format!("[{}] {intent} ({status}) {}", step.step, step.thought));
            if let Some(command) = &step.command {
                lines.push(format!("    -> {command}"));
            }
        }
        lines.push(format!("Stopped: {}", self.stop));
        if !self.report.is_empty() {
            lines.push(format!("Report: {}", self.report));
        }
        lines.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Goal-driven loop over the resolver backend and the dispatcher.
pub struct Planner {
    backends: BackendPool,
    catalog: Arc<CatalogHandle>,
    dispatcher: Arc<Dispatcher>,
    confirmer: Arc<dyn Confirmer>,
    /// `None` means the catalog's safe intents.
    allowed: Option<BTreeSet<String>>,
    max_steps: usize,
}

/// Mutable state of one run.
struct RunState {
    memory: SessionMemory,
    history: Vec<String>,
    observation: String,
    succeeded: Vec<(String, Value)>,
    read_paths: BTreeSet<String>,
    did_mutate: bool,
    did_edit: bool,
    steps: Vec<StepRecord>,
    report: String,
}

impl Planner {
    /// A planner that acts without asking, like the original autonomous
    /// mode.  Use [`Planner::with_confirmer`] to ask per action.
    pub fn new(
        backends: BackendPool,
        catalog: Arc<CatalogHandle>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            backends,
            catalog,
            dispatcher,
            confirmer: Arc::new(AutoApprove),
            allowed: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    /// Replace the default whitelist.
    pub fn with_allowed<I, S>(mut self, intents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(intents.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Work toward `goal` until it is reached, a guard trips, or the step
    /// budget runs out.
    pub async fn run(&self, goal: &str) -> Result<PlanReport> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(IntentError::ParseFailed {
                reason: "empty goal".into(),
            });
        }

        let catalog = self.catalog.snapshot();
        let allowed = self.allowed.clone().unwrap_or_else(|| catalog.safe_intents());
        info!(goal = goal, allowed = ?allowed, max_steps = self.max_steps, "planner started");

        let mut state = RunState {
            memory: SessionMemory::new(),
            history: Vec::new(),
            observation: "(start)".to_owned(),
            succeeded: Vec::new(),
            read_paths: BTreeSet::new(),
            did_mutate: false,
            did_edit: false,
            steps: Vec::new(),
            report: String::new(),
        };

        let stop = self.run_steps(goal, &catalog, &allowed, &mut state).await;
        info!(goal = goal, steps = state.steps.len(), stop = %stop, "planner finished");

        Ok(PlanReport {
            goal: goal.to_owned(),
            allowed: allowed.into_iter().collect(),
            steps: state.steps,
            stop,
            report: state.report,
        })
    }

    async fn run_steps(
        &self,
        goal: &str,
        catalog: &IntentCatalog,
        allowed: &BTreeSet<String>,
        state: &mut RunState,
    ) -> StopReason {
        for step in 1..=self.max_steps {
            let prompt = user_prompt(goal, allowed, state);
            let completion = match self.backends.complete(PLANNER_SYSTEM_PROMPT, &prompt).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(step, error = %e, "planner backend failed");
                    state.report = format!("engine error: {e}");
                    return StopReason::BackendError {
                        error: e.to_string(),
                    };
                }
            };
            let plan: PlanStep = match serde_json::from_str(strip_code_fences(&completion.text)) {
                Ok(plan) => plan,
                Err(e) => {
                    return StopReason::InvalidPlan {
                        error: e.to_string(),
                    };
                }
            };
            if !plan.report.is_empty() {
                state.report = plan.report.clone();
            }
            debug!(step, thought = %plan.thought, intent = ?plan.intent, stop = plan.stop, "planner step");

            let mut record = StepRecord {
                step,
                thought: plan.thought.clone(),
                intent: plan.intent.clone(),
                params: plan.params.clone(),
                command: None,
                success: None,
                observation: String::new(),
            };

            // Stop guard.
            let mut veto = None;
            if plan.stop {
                match stop_veto(goal, state) {
                    None => {
                        state.steps.push(record);
                        return StopReason::Finished;
                    }
                    Some(reason) => {
                        info!(step, reason, "stop vetoed");
                        state.history.push(format!("GUARD: {reason}"));
                        veto = Some(reason);
                    }
                }
            }

            let intent = match plan.intent.as_deref().map(str::trim) {
                Some(i) if !i.is_empty() && i != "null" => i.to_owned(),
                _ => {
                    if let Some(reason) = veto {
                        record.observation = reason.to_owned();
                        state.observation = reason.to_owned();
                        state.steps.push(record);
                        continue;
                    }
                    state.steps.push(record);
                    return StopReason::NoAction;
                }
            };

            if !allowed.contains(&intent) {
                state.steps.push(record);
                return StopReason::Disallowed { intent };
            }
            let Some(definition) = catalog.lookup(&intent) else {
                state.steps.push(record);
                return StopReason::UnknownIntent { intent };
            };

            let mut params = match plan.params {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            resolve_relative_path(&mut params, &state.memory);
            let params_value = Value::Object(params.clone());
            record.params = params_value.clone();

            // Repeat guards.
            let path = params.get("path").and_then(Value::as_str).map(str::to_owned);
            let is_read = definition.plugin_ref().as_deref() == Some("files.read_file")
                || intent == "read_file";
            if state
                .succeeded
                .iter()
                .any(|(i, p)| *i == intent && *p == params_value)
                || (is_read && path.as_ref().is_some_and(|p| state.read_paths.contains(p)))
            {
                state.steps.push(record);
                return StopReason::Repeated { intent };
            }

            let command = match self
                .dispatcher
                .render(definition, params.into_iter().collect())
            {
                Ok(command) => command,
                Err(e) => {
                    let text = format!("error: {e}");
                    state.history.push(format!("ERR: {}", excerpt(&text, HISTORY_NOTE_CHARS)));
                    record.observation = text.clone();
                    state.observation = text;
                    state.steps.push(record);
                    continue;
                }
            };
            record.command = Some(command.preview());

            let Some(confirmed) = self
                .dispatcher
                .confirm(command, self.confirmer.as_ref())
                .await
            else {
                state.steps.push(record);
                return StopReason::Declined { intent };
            };
            remember_paths(&mut state.memory, confirmed.command());
            let tool = confirmed.command().definition().plugin_ref();
            let outcome = self.dispatcher.execute(confirmed).await;
            let success = outcome.success();

            state.history.push(format!(
                "MIA: ran {intent} params={params_value} -> {}",
                if success { "ok" } else { "failed" }
            ));
            let output = outcome.output();
            if !output.is_empty() {
                state
                    .history
                    .push(format!("OBS: {}", excerpt(&output, HISTORY_NOTE_CHARS)));
            }
            let error = outcome.error();
            if let Some(error) = &error {
                state
                    .history
                    .push(format!("ERR: {}", excerpt(error, HISTORY_NOTE_CHARS)));
            }

            let mut observation = match (output.is_empty(), error) {
                (false, _) => output,
                (true, Some(error)) => error,
                (true, None) => "(no output)".to_owned(),
            };
            if let Some(reason) = veto {
                observation = format!("{reason}\n{observation}");
            }

            if success {
                let name = tool
                    .as_deref()
                    .and_then(|t| t.split_once('.'))
                    .map_or(intent.as_str(), |(_, t)| t);
                state.did_mutate |= MUTATING.contains(&name) || MUTATING.contains(&intent.as_str());
                state.did_edit |= EDITING.contains(&name) || EDITING.contains(&intent.as_str());
                state.succeeded.push((intent.clone(), params_value));
            }
            if is_read && let Some(path) = path {
                state.read_paths.insert(path);
            }

            record.success = Some(success);
            record.observation = observation.clone();
            state.observation = observation;
            state.steps.push(record);
        }

        StopReason::MaxSteps
    }
}

fn user_prompt(goal: &str, allowed: &BTreeSet<String>, state: &RunState) -> String {
    let allowed = allowed.iter().cloned().collect::<Vec<_>>().join(", ");
    let symbolic = match state.memory.summary() {
        s if s.is_empty() => "(none)".to_owned(),
        s => s,
    };
    let start = state.history.len().saturating_sub(HISTORY_LINES);
    let history = if state.history.is_empty() {
        "(none)".to_owned()
    } else {
        state.history[start..].join("\n")
    };
    format!(
        "ALLOWED INTENTS:\n{allowed}\n\nCONTEXT (symbolic):\n{symbolic}\n\nRECENT MESSAGES:\n{history}\n\nLAST OBSERVATION:\n{}\n\nGOAL:\n{goal}",
        excerpt(&state.observation, OBSERVATION_CHARS)
    )
}

/// Why a `stop` must not be accepted yet, if it must not.
fn stop_veto(goal: &str, state: &RunState) -> Option<&'static str> {
    let goal = goal.to_lowercase();
    if EDIT_WORDS.iter().any(|w| goal.contains(w)) && !state.did_edit {
        return Some("stop rejected: the goal asks for an edit but no edit or write has run yet");
    }
    if CREATE_WORDS.iter().any(|w| goal.contains(w)) && !state.did_mutate {
        return Some("stop rejected: the goal asks to create something but nothing was created yet");
    }
    None
}

/// `./x` means "inside the last folder".
fn resolve_relative_path(params: &mut Map<String, Value>, memory: &SessionMemory) {
    let Some(folder) = memory.get("last_folder") else {
        return;
    };
    if let Some(Value::String(path)) = params.get_mut("path")
        && let Some(rest) = path.strip_prefix("./")
    {
        *path = format!("{}/{rest}", folder.trim_end_matches('/'));
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_owned(),
        None => text.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

/// Exposes the planner as the `planner.run {goal, steps?}` tool.
///
/// Its dispatcher must not be able to reach this adapter, or a plan could
/// start another plan.
pub struct PlannerAdapter {
    id: String,
    backends: BackendPool,
    catalog: Arc<CatalogHandle>,
    dispatcher: Arc<Dispatcher>,
    connected: bool,
}

impl PlannerAdapter {
    pub fn new(
        id: impl Into<String>,
        backends: BackendPool,
        catalog: Arc<CatalogHandle>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            id: id.into(),
            backends,
            catalog,
            dispatcher,
            connected: false,
        }
    }
}

#[async_trait]
impl Adapter for PlannerAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Orchestration
    }

    async fn connect(&mut self) -> mia_adapters::Result<()> {
        info!(id = %self.id, backends = ?self.backends.names(), "planner adapter connected");
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> mia_adapters::Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn health_check(&self) -> mia_adapters::Result<HealthStatus> {
        Ok(match (self.connected, self.backends.is_empty()) {
            (false, _) => HealthStatus::Unhealthy,
            (true, true) => HealthStatus::Degraded,
            (true, false) => HealthStatus::Healthy,
        })
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "run".into(),
            description: "Work toward a goal autonomously using the safe intents".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "goal": { "type": "string", "description": "What to achieve, in plain English" },
                    "steps": { "type": "integer", "description": "Maximum number of actions (default 8)" }
                },
                "required": ["goal"]
            }),
        }]
    }

    async fn execute_tool(&self, name: &str, params: Value) -> mia_adapters::Result<Value> {
        if name != "run" {
            return Err(AdapterError::ToolNotFound {
                adapter_id: self.id.clone(),
                tool_name: name.to_string(),
            });
        }
        let goal = params
            .get("goal")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::InvalidParams {
                tool_name: "run".into(),
                reason: "missing required string field `goal`".into(),
            })?;
        // Models and templates hand over numbers as strings too.
        let steps = match params.get("steps") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .map_or(PLUGIN_MAX_STEPS, |n| usize::try_from(n).unwrap_or(PLUGIN_MAX_STEPS));

        let planner = Planner::new(
            self.backends.clone(),
            Arc::clone(&self.catalog),
            Arc::clone(&self.dispatcher),
        )
        .with_max_steps(steps);

        let report = planner
            .run(goal)
            .await
            .map_err(|e| AdapterError::ExecutionFailed {
                tool_name: "run".into(),
                reason: e.to_string(),
            })?;

        Ok(json!({
            "success": report.success(),
            "output": report.summary(),
            "steps": report.steps.len(),
            "stop_reason": report.stop.to_string(),
            "report": report.report,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
