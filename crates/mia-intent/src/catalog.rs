//! Intent catalog.
//!
//! A catalog maps intent names to parameterized actions loaded from YAML:
//!
//! ```yaml
//! create_folder:
//!   description: Create a folder (and parents)
//!   patterns:
//!     - "create (?:a )?folder (?P<path>\\S+)"
//!     - phrase: "make a new folder"
//!   params:
//!     path: { required: true, description: folder path }
//!   plugin: files.create_folder
//!   safe: true
//! ```
//!
//! A source is a directory of `*.yaml` / `*.yml` files read in file-name
//! order, a single file, or an inline string.  A later definition of the
//! same name replaces the earlier one.  Every definition is validated while
//! loading, so a catalog that loads is fully usable.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{IntentError, Result};
use crate::matcher::{IntentMatcher, compile_pattern};
use crate::template::TemplateEngine;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// How an utterance can select an intent without a model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Case-insensitive exact phrase.
    Phrase(String),
    /// Regex whose named captures become parameters.
    Pattern(String),
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub required: bool,
    pub default: Option<Value>,
    pub description: String,
}

/// What an intent does once confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTemplate {
    /// Shell templates rendered and run in order.
    Shell(Vec<String>),
    /// A built-in tool addressed as `adapter.tool`.
    Plugin { adapter: String, tool: String },
}

/// A validated catalog entry.  Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDefinition {
    pub name: String,
    pub description: String,
    pub triggers: Vec<Trigger>,
    pub params: Vec<ParamSpec>,
    pub action: ActionTemplate,
    /// Feature switch that must be on for the intent to run.
    pub requires: Option<String>,
    /// Eligible for the planner's default whitelist.
    pub safe: bool,
    /// Per-command timeout for shell intents, replacing the adapter default.
    pub timeout_secs: Option<u64>,
    /// File (or inline source name) the definition came from.
    pub source: String,
}

impl IntentDefinition {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// `adapter.tool` for plugin intents.
    pub fn plugin_ref(&self) -> Option<String> {
        match &self.action {
            ActionTemplate::Plugin { adapter, tool } => Some(format!("{adapter}.{tool}")),
            ActionTemplate::Shell(_) => None,
        }
    }

    /// One line for model prompts and `mia intents`:
    /// `create_folder(path*, open=false): Create a folder`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| match (&p.default, p.required) {
                (_, true) => format!("{}*", p.name),
                (Some(default), false) => format!("{}={default}", p.name),
                (None, false) => p.name.clone(),
            })
            .collect();
        let mut line = format!("{}({})", self.name, params.join(", "));
        if !self.description.is_empty() {
            line.push_str(": ");
            line.push_str(&self.description);
        }
        line
    }
}

// ---------------------------------------------------------------------------
// YAML shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawIntent {
    #[serde(default)]
    description: String,
    #[serde(default)]
    patterns: Vec<RawPattern>,
    #[serde(default)]
    params: BTreeMap<String, Option<RawParam>>,
    shell: Option<Vec<String>>,
    plugin: Option<String>,
    requires: Option<String>,
    #[serde(default)]
    safe: bool,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPattern {
    Regex(String),
    Phrase { phrase: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParam {
    #[serde(default)]
    required: bool,
    default: Option<Value>,
    #[serde(default)]
    description: String,
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Where a catalog is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    Directory(PathBuf),
    File(PathBuf),
    Inline { name: String, content: String },
}

impl CatalogSource {
    /// A directory or a file, whichever `path` is.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_file() {
            Self::File(path)
        } else {
            Self::Directory(path)
        }
    }

    pub fn inline(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Inline {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Human-readable origin for errors and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Directory(p) | Self::File(p) => p.display().to_string(),
            Self::Inline { name, .. } => name.clone(),
        }
    }

    /// Read every document as `(name, content)` in load order.
    fn documents(&self) -> Result<Vec<(String, String)>> {
        match self {
            Self::Inline { name, content } => Ok(vec![(name.clone(), content.clone())]),
            Self::File(path) => Ok(vec![(display_name(path), read(path)?)]),
            Self::Directory(dir) => {
                let entries = std::fs::read_dir(dir)
                    .map_err(|e| IntentError::catalog(self.describe(), None, e.to_string()))?;
                let mut files: Vec<PathBuf> = entries
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| {
                        p.is_file()
                            && p.extension()
                                .and_then(|e| e.to_str())
                                .is_some_and(|e| e == "yaml" || e == "yml")
                    })
                    .collect();
                files.sort();
                files
                    .iter()
                    .map(|p| Ok((display_name(p), read(p)?)))
                    .collect()
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| IntentError::catalog(path.display().to_string(), None, e.to_string()))
}

// ---------------------------------------------------------------------------
// IntentCatalog
// ---------------------------------------------------------------------------

/// A validated, immutable set of intent definitions plus the fast-tier
/// matcher built from their triggers.
#[derive(Debug, Clone)]
pub struct IntentCatalog {
    intents: BTreeMap<String, Arc<IntentDefinition>>,
    matcher: IntentMatcher,
    origin: String,
}

impl IntentCatalog {
    /// Load and validate every definition in `source`.
    pub fn load(source: &CatalogSource) -> Result<Self> {
        let documents = source.documents()?;
        let templates = TemplateEngine::new();

        let mut intents: BTreeMap<String, Arc<IntentDefinition>> = BTreeMap::new();
        // Trigger registration order: file order, then order within a file.
        let mut order: Vec<String> = Vec::new();

        for (file, content) in &documents {
            for definition in parse_document(file, content, &templates)? {
                let name = definition.name.clone();
                if let Some(previous) = intents.insert(name.clone(), Arc::new(definition)) {
                    warn!(intent = %name, previous = %previous.source, file = %file, "intent redefined");
                    order.retain(|n| n != &name);
                }
                order.push(name);
            }
        }

        if intents.is_empty() {
            return Err(IntentError::catalog(
                source.describe(),
                None,
                "catalog contains no intents",
            ));
        }

        let mut matcher = IntentMatcher::new();
        for name in &order {
            let Some(def) = intents.get(name) else {
                continue;
            };
            for trigger in &def.triggers {
                match trigger {
                    Trigger::Phrase(phrase) => matcher.add_phrase(phrase, name.clone()),
                    Trigger::Pattern(pattern) => matcher
                        .add_pattern(pattern, name.clone())
                        .map_err(|e| {
                            IntentError::catalog(&def.source, Some(name.as_str()), e.to_string())
                        })?,
                }
            }
        }
        matcher
            .build()
            .map_err(|e| IntentError::catalog(source.describe(), None, e.to_string()))?;

        info!(
            source = %source.describe(),
            intents = intents.len(),
            phrases = matcher.phrase_count(),
            patterns = matcher.pattern_count(),
            "intent catalog loaded"
        );

        Ok(Self {
            intents,
            matcher,
            origin: source.describe(),
        })
    }

    /// Load from YAML text.
    pub fn from_yaml_str(name: &str, content: &str) -> Result<Self> {
        Self::load(&CatalogSource::inline(name, content))
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<IntentDefinition>> {
        self.intents.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.intents.contains_key(name)
    }

    /// Intent names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.intents.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Definitions sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<IntentDefinition>> {
        self.intents.values()
    }

    /// Intents marked `safe: true`.
    pub fn safe_intents(&self) -> BTreeSet<String> {
        self.intents
            .values()
            .filter(|d| d.safe)
            .map(|d| d.name.clone())
            .collect()
    }

    pub fn matcher(&self) -> &IntentMatcher {
        &self.matcher
    }

    /// Where the catalog was loaded from.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

fn parse_document(
    file: &str,
    content: &str,
    templates: &TemplateEngine,
) -> Result<Vec<IntentDefinition>> {
    let blank = content.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---"
    });
    if blank {
        debug!(file = file, "empty catalog file skipped");
        return Ok(Vec::new());
    }

    let document: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| IntentError::catalog(file, None, format!("invalid YAML: {e}")))?;
    let mapping = match document {
        serde_yaml::Value::Null => return Ok(Vec::new()),
        serde_yaml::Value::Mapping(m) => m,
        _ => {
            return Err(IntentError::catalog(
                file,
                None,
                "top level must be a mapping of intent names",
            ));
        }
    };

    let mut definitions = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = key
            .as_str()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| IntentError::catalog(file, None, format!("invalid intent name {key:?}")))?
            .to_owned();
        let raw: RawIntent = serde_yaml::from_value(value)
            .map_err(|e| IntentError::catalog(file, Some(name.as_str()), e.to_string()))?;
        let definition = validate(file, &name, raw, templates)
            .map_err(|reason| IntentError::catalog(file, Some(name.as_str()), reason))?;
        definitions.push(definition);
    }
    Ok(definitions)
}

fn validate(
    file: &str,
    name: &str,
    raw: RawIntent,
    templates: &TemplateEngine,
) -> std::result::Result<IntentDefinition, String> {
    let mut params = Vec::with_capacity(raw.params.len());
    for (param, spec) in raw.params {
        let spec = spec.unwrap_or_default();
        if spec.required && spec.default.is_some() {
            return Err(format!("parameter `{param}` is both required and defaulted"));
        }
        params.push(ParamSpec {
            name: param,
            required: spec.required,
            default: spec.default,
            description: spec.description,
        });
    }
    let declared: BTreeSet<&str> = params.iter().map(|p| p.name.as_str()).collect();

    let action = match (raw.shell, raw.plugin) {
        (Some(_), Some(_)) => return Err("defines both `shell` and `plugin`".into()),
        (None, None) => return Err("needs a `shell` list or a `plugin`".into()),
        (Some(shell), None) => {
            if shell.is_empty() {
                return Err("`shell` list is empty".into());
            }
            for template in &shell {
                let vars = templates
                    .variables(template)
                    .map_err(|e| format!("template `{template}` does not compile: {e}"))?;
                if let Some(unknown) = vars.iter().find(|v| !declared.contains(v.as_str())) {
                    return Err(format!(
                        "template `{template}` uses undeclared parameter `{unknown}`"
                    ));
                }
            }
            ActionTemplate::Shell(shell)
        }
        (None, Some(plugin)) => match plugin.trim().split_once('.') {
            Some((adapter, tool)) if !adapter.is_empty() && !tool.is_empty() => {
                ActionTemplate::Plugin {
                    adapter: adapter.to_owned(),
                    tool: tool.to_owned(),
                }
            }
            _ => return Err(format!("plugin `{plugin}` is not of the form adapter.tool")),
        },
    };

    match (raw.timeout_secs, &action) {
        (Some(0), _) => return Err("`timeout_secs` must be at least 1".into()),
        (Some(_), ActionTemplate::Plugin { .. }) => {
            return Err("`timeout_secs` only applies to `shell` intents".into());
        }
        _ => {}
    }

    let mut triggers = Vec::with_capacity(raw.patterns.len());
    for pattern in raw.patterns {
        match pattern {
            RawPattern::Phrase { phrase } => triggers.push(Trigger::Phrase(phrase)),
            RawPattern::Regex(pattern) => {
                let compiled = compile_pattern(&pattern)
                    .map_err(|e| format!("pattern `{pattern}` does not compile: {e}"))?;
                if let Some(unknown) = compiled
                    .capture_names()
                    .flatten()
                    .find(|c| !declared.contains(c))
                {
                    return Err(format!(
                        "pattern `{pattern}` captures undeclared parameter `{unknown}`"
                    ));
                }
                triggers.push(Trigger::Pattern(pattern));
            }
        }
    }

    Ok(IntentDefinition {
        name: name.to_owned(),
        description: raw.description,
        triggers,
        params,
        action,
        requires: raw.requires.filter(|r| !r.trim().is_empty()),
        safe: raw.safe,
        timeout_secs: raw.timeout_secs,
        source: file.to_owned(),
    })
}

// ---------------------------------------------------------------------------
// CatalogHandle
// ---------------------------------------------------------------------------

/// Shared owner of the current catalog snapshot.
///
/// Readers take an `Arc` snapshot and keep it as long as they like; a
/// reload swaps in a new snapshot only after it validated completely.
#[derive(Debug)]
pub struct CatalogHandle {
    source: RwLock<CatalogSource>,
    current: RwLock<Arc<IntentCatalog>>,
}

impl CatalogHandle {
    pub fn new(source: CatalogSource, catalog: IntentCatalog) -> Self {
        Self {
            source: RwLock::new(source),
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// Load `source` and wrap it.
    pub fn load(source: CatalogSource) -> Result<Self> {
        let catalog = IntentCatalog::load(&source)?;
        Ok(Self::new(source, catalog))
    }

    /// The catalog currently served.
    pub fn snapshot(&self) -> Arc<IntentCatalog> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn source(&self) -> CatalogSource {
        self.source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read the current source.  On failure the previous catalog stays.
    pub fn reload(&self) -> Result<Arc<IntentCatalog>> {
        let source = self.source();
        self.reload_from(source)
    }

    /// Load `source` and, if it validates, serve it from now on.
    pub fn reload_from(&self, source: CatalogSource) -> Result<Arc<IntentCatalog>> {
        let catalog = match IntentCatalog::load(&source) {
            Ok(catalog) => Arc::new(catalog),
            Err(e) => {
                warn!(source = %source.describe(), error = %e, "catalog reload failed, keeping previous catalog");
                return Err(e);
            }
        };
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&catalog);
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = source;
        info!(intents = catalog.len(), "intent catalog reloaded");
        Ok(catalog)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
create_folder:
  description: Create a folder
  patterns:
    - "create (?:a )?folder (?P<path>\\S+)"
  params:
    path: { required: true, description: folder path }
  plugin: files.create_folder
  safe: true

show_uptime:
  description: Show uptime
  patterns:
    - phrase: "show uptime"
  shell:
    - "uptime -p"

ping_host:
  patterns:
    - "ping (?P<host>\\S+)"
  params:
    host: { required: true }
    count: { default: 3 }
  shell:
    - "ping -c {{ count }} {{ host | quote }}"
"#;

    fn load_err(yaml: &str) -> String {
        IntentCatalog::from_yaml_str("test.yaml", yaml)
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn loads_valid_catalog() {
        let catalog = IntentCatalog::from_yaml_str("basic.yaml", BASIC).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.names(), vec!["create_folder", "ping_host", "show_uptime"]);
        assert_eq!(catalog.safe_intents().into_iter().collect::<Vec<_>>(), vec!["create_folder"]);

        let ping = catalog.lookup("ping_host").unwrap();
        assert_eq!(ping.param("count").unwrap().default, Some(serde_json::json!(3)));
        assert!(ping.param("host").unwrap().required);
        assert_eq!(ping.source, "basic.yaml");

        let folder = catalog.lookup("create_folder").unwrap();
        assert_eq!(folder.plugin_ref().as_deref(), Some("files.create_folder"));
        assert!(catalog.lookup("missing").is_none());
    }

    #[test]
    fn signature_marks_required_and_defaults() {
        let catalog = IntentCatalog::from_yaml_str("basic.yaml", BASIC).unwrap();
        assert_eq!(
            catalog.lookup("ping_host").unwrap().signature(),
            "ping_host(count=3, host*)"
        );
        assert_eq!(
            catalog.lookup("show_uptime").unwrap().signature(),
            "show_uptime(): Show uptime"
        );
    }

    #[test]
    fn matcher_is_built_from_triggers() {
        let catalog = IntentCatalog::from_yaml_str("basic.yaml", BASIC).unwrap();
        assert_eq!(catalog.matcher().find("show uptime").unwrap().intent, "show_uptime");
        let hit = catalog.matcher().find("ping example.org").unwrap();
        assert_eq!(hit.captures.get("host").map(String::as_str), Some("example.org"));
    }

    #[test]
    fn rejects_both_shell_and_plugin() {
        let err = load_err("x:\n  shell: [\"ls\"]\n  plugin: files.list_dir\n");
        assert!(err.contains("test.yaml"), "{err}");
        assert!(err.contains("intent `x`"), "{err}");
        assert!(err.contains("both"), "{err}");
    }

    #[test]
    fn rejects_missing_action() {
        assert!(load_err("x:\n  description: nothing\n").contains("needs a `shell` list"));
    }

    #[test]
    fn rejects_empty_shell_list() {
        assert!(load_err("x:\n  shell: []\n").contains("empty"));
    }

    #[test]
    fn rejects_malformed_plugin_reference() {
        assert!(load_err("x:\n  plugin: files\n").contains("adapter.tool"));
    }

    #[test]
    fn rejects_undeclared_template_variable() {
        let err = load_err("x:\n  shell:\n    - \"rm {{ target }}\"\n");
        assert!(err.contains("undeclared parameter `target`"), "{err}");
    }

    #[test]
    fn rejects_broken_template() {
        assert!(load_err("x:\n  shell:\n    - \"echo {{ oops\"\n").contains("does not compile"));
    }

    #[test]
    fn rejects_bad_regex_and_undeclared_capture() {
        assert!(load_err("x:\n  patterns: [\"(unclosed\"]\n  shell: [\"ls\"]\n").contains("does not compile"));
        let err = load_err("x:\n  patterns: [\"go (?P<where>\\\\S+)\"]\n  shell: [\"ls\"]\n");
        assert!(err.contains("undeclared parameter `where`"), "{err}");
    }

    #[test]
    fn rejects_required_with_default() {
        let err = load_err("x:\n  params:\n    p: { required: true, default: 1 }\n  shell: [\"echo {{ p }}\"]\n");
        assert!(err.contains("both required and defaulted"), "{err}");
    }

    #[test]
    fn rejects_unknown_keys_and_bad_yaml() {
        assert!(load_err("x:\n  shel: [\"ls\"]\n").contains("intent `x`"));
        assert!(load_err("x: [unclosed\n").contains("invalid YAML"));
        assert!(load_err("- just\n- a list\n").contains("top level"));
    }

    #[test]
    fn shell_intents_take_a_timeout() {
        let catalog = IntentCatalog::from_yaml_str(
            "t.yaml",
            "upgrade:\n  shell: [\"apt-get upgrade -y\"]\n  timeout_secs: 3600\nls:\n  shell: [\"ls\"]\n",
        )
        .unwrap();
        assert_eq!(catalog.lookup("upgrade").unwrap().timeout_secs, Some(3600));
        assert_eq!(catalog.lookup("ls").unwrap().timeout_secs, None);

        assert!(load_err("x:\n  shell: [\"ls\"]\n  timeout_secs: 0\n").contains("at least 1"));
        let err = load_err("x:\n  plugin: files.list_dir\n  timeout_secs: 30\n");
        assert!(err.contains("only applies to `shell`"), "{err}");
    }

    #[test]
    fn rejects_empty_catalog() {
        assert!(load_err("").contains("no intents"));
        assert!(load_err("# only a comment\n").contains("no intents"));
    }

    #[test]
    fn null_param_spec_means_optional() {
        let catalog =
            IntentCatalog::from_yaml_str("t.yaml", "x:\n  params:\n    p:\n  shell: [\"echo {{ p }}\"]\n")
                .unwrap();
        let p = catalog.lookup("x").unwrap().param("p").cloned().unwrap();
        assert!(!p.required);
        assert!(p.default.is_none());
    }

    #[test]
    fn directory_loads_in_name_order_and_later_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("10-base.yaml"), "hello:\n  shell: [\"echo base\"]\nbye:\n  shell: [\"echo bye\"]\n").unwrap();
        std::fs::write(dir.path().join("20-override.yml"), "hello:\n  shell: [\"echo override\"]\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not: yaml: at all: [").unwrap();

        let catalog = IntentCatalog::load(&CatalogSource::from_path(dir.path())).unwrap();
        assert_eq!(catalog.len(), 2);
        let hello = catalog.lookup("hello").unwrap();
        assert_eq!(hello.action, ActionTemplate::Shell(vec!["echo override".into()]));
        assert_eq!(hello.source, "20-override.yml");
    }

    #[test]
    fn missing_directory_is_a_load_error() {
        let err = IntentCatalog::load(&CatalogSource::Directory("/nonexistent/mia-intents".into()))
            .unwrap_err();
        assert!(matches!(err, IntentError::CatalogLoad { .. }));
    }

    #[test]
    fn reload_swaps_only_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("intents.yaml");
        std::fs::write(&file, BASIC).unwrap();

        let handle = CatalogHandle::load(CatalogSource::from_path(&file)).unwrap();
        let before = handle.snapshot();
        assert_eq!(before.len(), 3);

        std::fs::write(&file, "broken: [").unwrap();
        assert!(handle.reload().is_err());
        assert_eq!(handle.snapshot().len(), 3);

        std::fs::write(&file, "only:\n  shell: [\"true\"]\n").unwrap();
        let after = handle.reload().unwrap();
        assert_eq!(after.names(), vec!["only"]);
        assert_eq!(handle.snapshot().names(), vec!["only"]);
        // Old snapshots stay valid for whoever still holds them.
        assert!(before.lookup("create_folder").is_some());
    }
}
