//! One interactive session: resolve, render, confirm, execute, remember.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use mia_agent::{SessionMemory, Turn, TurnOutcome};

use crate::catalog::CatalogHandle;
use crate::dispatcher::{Confirmer, Dispatcher, Outcome, ResolvedCommand};
use crate::error::Result;
use crate::resolver::{Resolution, ResolutionSource, Resolver};

/// File tools whose `path` becomes `last_file`.
const FILE_TOOLS: &[&str] = &[
    "files.create_file",
    "files.write_file",
    "files.edit_file",
    "files.read_file",
    "files.file_exists",
];
const FOLDER_TOOL: &str = "files.create_folder";

/// Everything that happened for one utterance.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub utterance: String,
    pub intent: Option<String>,
    pub source: Option<ResolutionSource>,
    /// Command shown for confirmation.
    pub preview: Option<String>,
    pub outcome: TurnOutcome,
    /// Per-action results when the command ran.
    pub result: Option<Outcome>,
}

impl TurnReport {
    /// Process exit status for `mia run`.
    pub fn exit_code(&self) -> i32 {
        match &self.outcome {
            TurnOutcome::Executed { success: true, .. } => 0,
            TurnOutcome::Executed { exit_code, .. } => exit_code.filter(|c| *c != 0).unwrap_or(1),
            TurnOutcome::Rejected | TurnOutcome::NoMatch { .. } | TurnOutcome::Failed { .. } => 1,
        }
    }
}

/// Drives turns for a single session.
pub struct Pipeline {
    catalog: Arc<CatalogHandle>,
    resolver: Resolver,
    dispatcher: Arc<Dispatcher>,
    confirmer: Arc<dyn Confirmer>,
    memory: SessionMemory,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<CatalogHandle>,
        resolver: Resolver,
        dispatcher: Arc<Dispatcher>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            catalog,
            resolver,
            dispatcher,
            confirmer,
            memory: SessionMemory::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<CatalogHandle> {
        &self.catalog
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Reload the catalog; returns the new intent count.  On failure the
    /// previous catalog keeps serving.
    pub fn reload(&self) -> Result<usize> {
        Ok(self.catalog.reload()?.len())
    }

    /// End the session.
    pub fn end(&mut self) {
        info!(session = %self.memory.session_id(), turns = self.memory.len(), "session ended");
        self.memory.clear();
    }

    /// Handle one utterance end to end.  Errors are recorded as a failed
    /// turn rather than returned.
    pub async fn handle(&mut self, utterance: &str) -> TurnReport {
        let utterance = utterance.trim().to_owned();
        let mut report = TurnReport {
            utterance: utterance.clone(),
            intent: None,
            source: None,
            preview: None,
            outcome: TurnOutcome::Rejected,
            result: None,
        };

        let catalog = self.catalog.snapshot();
        let resolution = self.resolver.resolve(&utterance, &catalog, &self.memory).await;
        let resolved = match resolution {
            Ok(Resolution::Matched(resolved)) => resolved,
            Ok(Resolution::NoMatch { reason }) => {
                report.outcome = TurnOutcome::NoMatch { reason };
                return self.record(report);
            }
            Err(e) => {
                warn!(error = %e, "resolution failed");
                report.outcome = TurnOutcome::Failed {
                    error: e.to_string(),
                };
                return self.record(report);
            }
        };
        report.intent = Some(resolved.name().to_owned());
        report.source = Some(resolved.source.clone());

        let command = match self
            .dispatcher
            .render(Arc::clone(&resolved.definition), resolved.params)
        {
            Ok(command) => command,
            Err(e) => {
                report.outcome = TurnOutcome::Failed {
                    error: e.to_string(),
                };
                return self.record(report);
            }
        };
        report.preview = Some(command.preview());

        let Some(confirmed) = self
            .dispatcher
            .confirm(command, self.confirmer.as_ref())
            .await
        else {
            report.outcome = TurnOutcome::Rejected;
            return self.record(report);
        };

        let outcome = self.dispatcher.execute(confirmed.clone()).await;
        if outcome.success() {
            remember_paths(&mut self.memory, confirmed.command());
        }
        report.outcome = outcome.to_turn_outcome();
        report.result = Some(outcome);
        self.record(report)
    }

    fn record(&mut self, report: TurnReport) -> TurnReport {
        let mut turn = Turn::new(report.utterance.clone(), report.outcome.clone());
        if let Some(intent) = &report.intent {
            turn = turn.with_intent(intent.clone());
        }
        if let Some(preview) = &report.preview {
            turn = turn.with_preview(preview.clone());
        }
        self.memory.append(turn);
        report
    }
}

/// Record `last_folder` / `last_file` from a command's `path` parameter.
pub(crate) fn remember_paths(memory: &mut SessionMemory, command: &ResolvedCommand) {
    let Some(path) = command.params().get("path").and_then(Value::as_str) else {
        return;
    };
    let Some(tool) = command.definition().plugin_ref() else {
        return;
    };
    if tool == FOLDER_TOOL {
        memory.set("last_folder", path);
    } else if FILE_TOOLS.contains(&tool.as_str()) {
        memory.set("last_file", path);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use mia_adapters::{AdapterRegistry, FilesystemAdapter, ShellAdapter};
    use mia_agent::{BackendPool, FeatureSettings};

    use super::*;
    use crate::catalog::CatalogSource;
    use crate::dispatcher::{AutoApprove, Deny};

    const CATALOG: &str = r#"
create_folder:
  patterns: ["create folder (?P<path>\\S+)"]
  params:
    path: { required: true }
  plugin: files.create_folder
write_note:
  patterns: ["note (?P<path>\\S+) (?P<content>.+)"]
  params:
    path: { required: true }
    content: { required: true }
  plugin: files.write_file
fail:
  patterns: [{ phrase: "fail now" }]
  shell: ["exit 4"]
"#;

    async fn pipeline(root: &std::path::Path, confirmer: Arc<dyn Confirmer>) -> Pipeline {
        let registry = AdapterRegistry::new();
        registry
            .register(ShellAdapter::new("shell").with_working_dir(root).with_timeout(10))
            .await
            .unwrap();
        registry
            .register(FilesystemAdapter::new("files").with_root(root))
            .await
            .unwrap();
        let catalog =
            CatalogHandle::load(CatalogSource::inline("pipeline.yaml", CATALOG)).unwrap();
        Pipeline::new(
            Arc::new(catalog),
            Resolver::new(BackendPool::default()),
            Arc::new(Dispatcher::new(registry, FeatureSettings::default())),
            confirmer,
        )
    }

    #[tokio::test]
    async fn executed_turn_updates_memory_and_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(dir.path(), Arc::new(AutoApprove)).await;

        let report = p.handle("create folder Work").await;
        assert_eq!(report.intent.as_deref(), Some("create_folder"));
        assert_eq!(report.exit_code(), 0);
        assert!(dir.path().join("Work").is_dir());
        assert_eq!(p.memory().get("last_folder"), Some("Work"));

        p.handle("note Work/todo.txt buy milk").await;
        assert_eq!(p.memory().get("last_file"), Some("Work/todo.txt"));
        assert_eq!(p.memory().len(), 2);
    }

    #[tokio::test]
    async fn rejected_turn_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(dir.path(), Arc::new(Deny)).await;
        let report = p.handle("create folder Nope").await;
        assert_eq!(report.outcome, TurnOutcome::Rejected);
        assert!(report.preview.is_some());
        assert_eq!(report.exit_code(), 1);
        assert!(!dir.path().join("Nope").exists());
        assert_eq!(p.memory().turns()[0].outcome, TurnOutcome::Rejected);
    }

    #[tokio::test]
    async fn failed_command_reports_its_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(dir.path(), Arc::new(AutoApprove)).await;
        assert_eq!(p.handle("fail now").await.exit_code(), 4);
    }

    #[tokio::test]
    async fn errors_become_failed_turns() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(dir.path(), Arc::new(AutoApprove)).await;
        // No fast match and an empty backend pool.
        let report = p.handle("tell me a joke").await;
        assert!(matches!(report.outcome, TurnOutcome::Failed { .. }));
        assert_eq!(p.memory().len(), 1);
    }

    #[test]
    fn remember_paths_ignores_shell_intents() {
        let catalog = crate::catalog::IntentCatalog::from_yaml_str(
            "t.yaml",
            "x:\n  params:\n    path: {}\n  shell: [\"ls {{ path }}\"]\n",
        )
        .unwrap();
        let registry = AdapterRegistry::new();
        let d = Dispatcher::new(registry, FeatureSettings::default());
        let mut params = BTreeMap::new();
        params.insert("path".to_owned(), Value::String("/tmp".into()));
        let cmd = d.render(catalog.lookup("x").unwrap(), params).unwrap();
        let mut memory = SessionMemory::new();
        remember_paths(&mut memory, &cmd);
        assert!(memory.summary().is_empty());
    }
}
