//! Action dispatcher: render, confirm, execute.
//!
//! ```text
//! IntentDefinition + params ──render──> ResolvedCommand
//!                                            │
//!                              Confirmer ──confirm──> Option<ConfirmedCommand>
//!                                                            │
//!                                  AdapterRegistry <──execute─┘──> Outcome
//! ```
//!
//! [`Dispatcher::execute`] only accepts a [`ConfirmedCommand`], and the only
//! way to get one is [`Dispatcher::confirm`], so nothing reaches an adapter
//! without the confirmer agreeing first.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use mia_adapters::AdapterRegistry;
use mia_agent::{FeatureSettings, TurnOutcome};

use crate::catalog::{ActionTemplate, IntentDefinition};
use crate::error::{IntentError, Result};
use crate::template::TemplateEngine;

/// Adapter and tool that run rendered shell templates.
pub const SHELL_ADAPTER: &str = "shell";
pub const SHELL_TOOL: &str = "shell_execute";

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// One concrete step of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Action {
    Shell(String),
    Plugin {
        adapter: String,
        tool: String,
        params: Value,
    },
}

impl Action {
    /// What the user is asked to confirm.
    pub fn preview(&self) -> String {
        match self {
            Self::Shell(command) => command.clone(),
            Self::Plugin {
                adapter,
                tool,
                params,
            } => format!("{adapter}.{tool} {params}"),
        }
    }
}

/// A rendered intent awaiting confirmation.
#[derive(Debug, Clone)]
pub struct ResolvedCommand {
    definition: Arc<IntentDefinition>,
    params: BTreeMap<String, Value>,
    actions: Vec<Action>,
}

impl ResolvedCommand {
    pub fn intent(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &Arc<IntentDefinition> {
        &self.definition
    }

    /// Parameters after defaults were filled in.
    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Every action, one per line.
    pub fn preview(&self) -> String {
        self.actions
            .iter()
            .map(Action::preview)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A command the confirmer approved.  Only [`Dispatcher::confirm`] makes
/// these.
#[derive(Debug, Clone)]
pub struct ConfirmedCommand(ResolvedCommand);

impl ConfirmedCommand {
    pub fn command(&self) -> &ResolvedCommand {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

/// Decides whether a previewed command may run.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, command: &ResolvedCommand) -> bool;
}

/// Consent given up front (`confirmation = "auto"` or `--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl Confirmer for AutoApprove {
    async fn confirm(&self, _command: &ResolvedCommand) -> bool {
        true
    }
}

/// Refuses everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deny;

#[async_trait]
impl Confirmer for Deny {
    async fn confirm(&self, _command: &ResolvedCommand) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of one executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error: Option<String>,
}

impl ActionResult {
    /// Read an adapter reply using the `success` / `output` / `exit_code`
    /// convention.
    fn from_reply(action: String, reply: &Value) -> Self {
        let success = reply.get("success").and_then(Value::as_bool).unwrap_or(true);
        let exit_code = reply
            .get("exit_code")
            .and_then(Value::as_i64)
            .and_then(|c| i32::try_from(c).ok());
        let output = match reply.get("output").and_then(Value::as_str) {
            Some(text) => text.to_owned(),
            None => reply.to_string(),
        };
        Self {
            action,
            success,
            exit_code,
            output,
            error: None,
        }
    }

    fn failed(action: String, error: String) -> Self {
        Self {
            action,
            success: false,
            exit_code: None,
            output: String::new(),
            error: Some(error),
        }
    }
}

/// Result of executing a confirmed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub intent: String,
    /// One entry per action that ran; execution stops at the first failure.
    pub results: Vec<ActionResult>,
}

impl Outcome {
    pub fn success(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.success)
    }

    /// Exit code of the last action that reported one.
    pub fn exit_code(&self) -> Option<i32> {
        self.results.iter().rev().find_map(|r| r.exit_code)
    }

    /// Outputs of every action, in order.
    pub fn output(&self) -> String {
        join_non_empty(self.results.iter().map(|r| r.output.trim_end()))
    }

    /// Error text of failed actions, if any.
    pub fn error(&self) -> Option<String> {
        let errors = join_non_empty(self.results.iter().filter_map(|r| r.error.as_deref()));
        (!errors.is_empty()).then_some(errors)
    }

    pub fn to_turn_outcome(&self) -> TurnOutcome {
        let mut output = self.output();
        if let Some(error) = self.error() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&error);
        }
        TurnOutcome::Executed {
            success: self.success(),
            exit_code: self.exit_code(),
            output,
        }
    }
}

fn join_non_empty<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.filter(|p| !p.is_empty()).collect::<Vec<_>>().join("\n")
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Renders intents into commands and runs confirmed commands through the
/// adapter registry.
#[derive(Debug)]
pub struct Dispatcher {
    registry: AdapterRegistry,
    features: FeatureSettings,
    templates: TemplateEngine,
}

impl Dispatcher {
    pub fn new(registry: AdapterRegistry, features: FeatureSettings) -> Self {
        Self {
            registry,
            features,
            templates: TemplateEngine::new(),
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn features(&self) -> &FeatureSettings {
        &self.features
    }

    /// Render `definition` with `params` into a concrete command.
    ///
    /// Null values count as absent, defaults fill the gaps, and every
    /// required parameter must end up with a non-empty value.
    pub fn render(
        &self,
        definition: Arc<IntentDefinition>,
        params: BTreeMap<String, Value>,
    ) -> Result<ResolvedCommand> {
        let intent = definition.name.clone();

        if let Some(feature) = &definition.requires
            && !self.features.is_enabled(feature)
        {
            return Err(IntentError::FeatureDisabled {
                intent,
                feature: feature.clone(),
            });
        }

        let mut params: BTreeMap<String, Value> =
            params.into_iter().filter(|(_, v)| !v.is_null()).collect();
        for spec in &definition.params {
            if let Some(default) = &spec.default {
                params
                    .entry(spec.name.clone())
                    .or_insert_with(|| default.clone());
            }
            if spec.required && params.get(&spec.name).is_none_or(is_blank) {
                return Err(IntentError::MissingParameter {
                    intent,
                    param: spec.name.clone(),
                });
            }
        }

        let actions = match &definition.action {
            ActionTemplate::Shell(templates) => {
                let mut actions = Vec::with_capacity(templates.len());
                for template in templates {
                    let command = self.templates.render(template, &params).map_err(|e| {
                        IntentError::Render {
                            intent: intent.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    if command.is_empty() {
                        return Err(IntentError::Render {
                            intent,
                            reason: format!("template `{template}` rendered an empty command"),
                        });
                    }
                    actions.push(Action::Shell(command));
                }
                actions
            }
            ActionTemplate::Plugin { adapter, tool } => {
                if !self.registry.has_tool(adapter, tool) {
                    return Err(IntentError::PluginNotFound {
                        plugin: format!("{adapter}.{tool}"),
                    });
                }
                let object: serde_json::Map<String, Value> =
                    params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                vec![Action::Plugin {
                    adapter: adapter.clone(),
                    tool: tool.clone(),
                    params: Value::Object(object),
                }]
            }
        };

        debug!(intent = %intent, actions = actions.len(), "command rendered");
        Ok(ResolvedCommand {
            definition,
            params,
            actions,
        })
    }

    /// Ask `confirmer` about `command`.  `None` means it was declined and
    /// must not run.
    pub async fn confirm(
        &self,
        command: ResolvedCommand,
        confirmer: &dyn Confirmer,
    ) -> Option<ConfirmedCommand> {
        if confirmer.confirm(&command).await {
            debug!(intent = %command.intent(), "command confirmed");
            Some(ConfirmedCommand(command))
        } else {
            info!(intent = %command.intent(), "command declined");
            None
        }
    }

    /// Run every action in order, stopping at the first failure.
    pub async fn execute(&self, confirmed: ConfirmedCommand) -> Outcome {
        let ConfirmedCommand(command) = confirmed;
        let mut results = Vec::with_capacity(command.actions.len());

        for action in &command.actions {
            let preview = action.preview();
            let reply = match action {
                Action::Shell(line) => {
                    let mut params = serde_json::json!({ "command": line });
                    if let Some(secs) = command.definition.timeout_secs {
                        params["timeout_secs"] = secs.into();
                    }
                    self.registry.execute(SHELL_ADAPTER, SHELL_TOOL, params).await
                }
                Action::Plugin {
                    adapter,
                    tool,
                    params,
                } => self.registry.execute(adapter, tool, params.clone()).await,
            };

            let result = match reply {
                Ok(value) => ActionResult::from_reply(preview, &value),
                Err(e) => ActionResult::failed(preview, e.to_string()),
            };
            let failed = !result.success;
            if failed {
                warn!(
                    intent = %command.intent(),
                    action = %result.action,
                    exit_code = ?result.exit_code,
                    error = result.error.as_deref().unwrap_or(""),
                    "action failed"
                );
            } else {
                debug!(intent = %command.intent(), action = %result.action, "action succeeded");
            }
            results.push(result);
            if failed {
                break;
            }
        }

        info!(intent = %command.intent(), actions = results.len(), "command executed");
        Outcome {
            intent: command.definition.name.clone(),
            results,
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use mia_adapters::{FilesystemAdapter, ShellAdapter};
    use serde_json::json;

    use super::*;
    use crate::catalog::IntentCatalog;

    const CATALOG: &str = r#"
greet:
  params:
    name: { required: true }
    punct: { default: "!" }
  shell:
    - "echo hello {{ name | quote }}{{ punct }}"
two_steps:
  params:
    code: { default: 3 }
  shell:
    - "echo first"
    - "exit {{ code }}"
    - "echo never"
make_dir:
  params:
    path: { required: true }
  plugin: files.create_folder
docker_ps:
  requires: docker
  shell: ["docker ps"]
ghost:
  plugin: ghost.haunt
slow:
  shell: ["sleep 5"]
  timeout_secs: 1
"#;

    async fn dispatcher(root: &std::path::Path) -> (Dispatcher, IntentCatalog) {
        let registry = AdapterRegistry::new();
        registry
            .register(ShellAdapter::new("shell").with_working_dir(root).with_timeout(10))
            .await
            .unwrap();
        registry
            .register(FilesystemAdapter::new("files").with_root(root))
            .await
            .unwrap();
        let catalog = IntentCatalog::from_yaml_str("test.yaml", CATALOG).unwrap();
        (Dispatcher::new(registry, FeatureSettings::default()), catalog)
    }

    fn params(value: Value) -> BTreeMap<String, Value> {
        match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn render_fills_defaults_and_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let (d, c) = dispatcher(dir.path()).await;
        let cmd = d
            .render(c.lookup("greet").unwrap(), params(json!({"name": "Ada Lovelace"})))
            .unwrap();
        assert_eq!(cmd.preview(), "echo hello 'Ada Lovelace'!");
        assert_eq!(cmd.params()["punct"], json!("!"));
    }

    #[tokio::test]
    async fn render_requires_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let (d, c) = dispatcher(dir.path()).await;
        for p in [json!({}), json!({"name": null}), json!({"name": "  "})] {
            let err = d.render(c.lookup("greet").unwrap(), params(p)).unwrap_err();
            assert!(matches!(err, IntentError::MissingParameter { ref param, .. } if param == "name"));
        }
    }

    #[tokio::test]
    async fn render_checks_features_and_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let (d, c) = dispatcher(dir.path()).await;
        assert!(d.render(c.lookup("docker_ps").unwrap(), BTreeMap::new()).is_ok());

        let err = d.render(c.lookup("ghost").unwrap(), BTreeMap::new()).unwrap_err();
        assert!(matches!(err, IntentError::PluginNotFound { .. }));

        let features = FeatureSettings {
            docker: false,
            ..FeatureSettings::default()
        };
        let disabled = Dispatcher::new(d.registry().clone(), features);
        let err = disabled
            .render(c.lookup("docker_ps").unwrap(), BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, IntentError::FeatureDisabled { ref feature, .. } if feature == "docker"));
    }

    #[tokio::test]
    async fn declined_command_never_runs() {
        let dir = tempfile::tempdir().unwrap();
        let (d, c) = dispatcher(dir.path()).await;
        let cmd = d
            .render(c.lookup("make_dir").unwrap(), params(json!({"path": "kept_out"})))
            .unwrap();
        assert!(d.confirm(cmd, &Deny).await.is_none());
        assert!(!dir.path().join("kept_out").exists());
    }

    #[tokio::test]
    async fn plugin_action_runs_after_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let (d, c) = dispatcher(dir.path()).await;
        let cmd = d
            .render(c.lookup("make_dir").unwrap(), params(json!({"path": "made"})))
            .unwrap();
        assert_eq!(cmd.preview(), r#"files.create_folder {"path":"made"}"#);
        let confirmed = d.confirm(cmd, &AutoApprove).await.unwrap();
        let outcome = d.execute(confirmed).await;
        assert!(outcome.success(), "{outcome:?}");
        assert!(dir.path().join("made").is_dir());
    }

    #[tokio::test]
    async fn execution_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (d, c) = dispatcher(dir.path()).await;
        let cmd = d.render(c.lookup("two_steps").unwrap(), BTreeMap::new()).unwrap();
        let outcome = d.execute(d.confirm(cmd, &AutoApprove).await.unwrap()).await;

        assert_eq!(outcome.results.len(), 2);
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code(), Some(3));
        assert_eq!(outcome.output(), "first");
        assert!(matches!(
            outcome.to_turn_outcome(),
            TurnOutcome::Executed { success: false, exit_code: Some(3), .. }
        ));
    }

    #[tokio::test]
    async fn intent_timeout_overrides_adapter_default() {
        let dir = tempfile::tempdir().unwrap();
        let (d, c) = dispatcher(dir.path()).await;
        let cmd = d.render(c.lookup("slow").unwrap(), BTreeMap::new()).unwrap();
        let outcome = d.execute(d.confirm(cmd, &AutoApprove).await.unwrap()).await;
        assert!(!outcome.success());
        let error = outcome.error().unwrap_or_default();
        assert!(error.contains("timed out after 1s"), "{error}");
    }

    #[tokio::test]
    async fn adapter_errors_become_failed_results() {
        let dir = tempfile::tempdir().unwrap();
        let (d, c) = dispatcher(dir.path()).await;
        let cmd = d
            .render(c.lookup("make_dir").unwrap(), params(json!({"path": "../../escape"})))
            .unwrap();
        let outcome = d.execute(d.confirm(cmd, &AutoApprove).await.unwrap()).await;
        assert!(!outcome.success());
        assert!(outcome.error().is_some());
    }
}
