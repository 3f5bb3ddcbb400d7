//! Layered runtime settings.
//!
//! Settings are assembled in this order, later layers overriding earlier
//! ones:
//!
//! 1. Built-in defaults ([`Settings::default`]).
//! 2. A TOML file (`config/mia.toml`, or an explicit path).
//! 3. Process environment (`ENGINE`, `OPENAI_API_KEY`, `ALLOW_DOCKER`, ...).
//!
//! Command-line flags are applied on top by the binary.  Loading `.env`
//! into the process environment is also the binary's job.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AgentError, Result};

/// Config file consulted when no explicit path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/mia.toml";

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Which language-model backend(s) the resolver may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineChoice {
    /// Remote first when an API key is configured, then local.
    #[default]
    Auto,
    /// Remote OpenAI-compatible service only.
    OpenAI,
    /// Local Ollama service only.
    Ollama,
}

impl FromStr for EngineChoice {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "openai" | "remote" => Ok(Self::OpenAI),
            "ollama" | "local" => Ok(Self::Ollama),
            other => Err(AgentError::ConfigError {
                reason: format!("unknown engine '{other}' (expected auto, openai or ollama)"),
            }),
        }
    }
}

impl fmt::Display for EngineChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::OpenAI => "openai",
            Self::Ollama => "ollama",
        })
    }
}

/// How commands are confirmed before execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationMode {
    /// Ask the user for every command.
    #[default]
    Ask,
    /// Consent was given up front; approve every command.
    Auto,
}

impl FromStr for ConfirmationMode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ask" => Ok(Self::Ask),
            "auto" => Ok(Self::Auto),
            other => Err(AgentError::ConfigError {
                reason: format!("unknown confirmation mode '{other}' (expected ask or auto)"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Remote backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub model: String,
    pub api_key: Option<String>,
    /// Overrides `https://api.openai.com/v1` for compatible services.
    pub base_url: Option<String>,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Local backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub model: String,
    pub base_url: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            model: "llama3".into(),
            base_url: "http://127.0.0.1:11434".into(),
        }
    }
}

/// Feature switches gating intents that declare `requires:`.
///
/// The built-in features are on by default.  Unknown feature names are off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    pub docker: bool,
    pub apt: bool,
    pub playerctl: bool,
    /// Any additional feature switches named in the config file.
    #[serde(flatten)]
    pub other: BTreeMap<String, bool>,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            docker: true,
            apt: true,
            playerctl: true,
            other: BTreeMap::new(),
        }
    }
}

impl FeatureSettings {
    /// Whether the named feature is switched on.
    pub fn is_enabled(&self, feature: &str) -> bool {
        match feature {
            "docker" => self.docker,
            "apt" => self.apt,
            "playerctl" => self.playerctl,
            other => self.other.get(other).copied().unwrap_or(false),
        }
    }

    /// Names of every enabled feature, sorted.
    pub fn enabled(&self) -> Vec<String> {
        let mut names: Vec<String> = [
            ("apt", self.apt),
            ("docker", self.docker),
            ("playerctl", self.playerctl),
        ]
        .into_iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| name.to_owned())
        .chain(
            self.other
                .iter()
                .filter(|(_, on)| **on)
                .map(|(name, _)| name.clone()),
        )
        .collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineChoice,
    pub openai: OpenAiSettings,
    pub ollama: OllamaSettings,
    pub confirmation: ConfirmationMode,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: Option<String>,
    /// Append logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    pub features: FeatureSettings,
    /// Directory (or single file) holding the intent catalog.
    pub intents_dir: PathBuf,
    /// Number of recent turns handed to the resolver.
    pub memory_window: usize,
    pub shell_timeout_secs: u64,
    /// Confine file plugin paths to this directory when set.
    pub fs_root: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineChoice::Auto,
            openai: OpenAiSettings::default(),
            ollama: OllamaSettings::default(),
            confirmation: ConfirmationMode::Ask,
            log_level: None,
            log_file: None,
            features: FeatureSettings::default(),
            intents_dir: PathBuf::from("intents"),
            memory_window: 20,
            shell_timeout_secs: 120,
            fs_root: None,
        }
    }
}

impl Settings {
    /// Load defaults, then the config file, then the process environment.
    ///
    /// An explicit `path` must exist.  Without one, [`DEFAULT_CONFIG_PATH`]
    /// is read if present and silently skipped otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    debug!(path = DEFAULT_CONFIG_PATH, "no config file, using defaults");
                    Self::default()
                }
            }
        };
        settings.apply_env()?;
        Ok(settings)
    }

    /// Parse a TOML file on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to read config file {}: {e}", path.display()),
        })?;
        let settings = Self::from_toml_str(&content).map_err(|e| AgentError::ConfigError {
            reason: format!("{}: {e}", path.display()),
        })?;
        info!(path = %path.display(), "configuration loaded from file");
        Ok(settings)
    }

    /// Parse TOML text on top of the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to parse TOML config: {e}"),
        })
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(env_non_empty)
    }

    /// Overlay values from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset by [`env_non_empty`]; custom lookups
    /// should do the same.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ENGINE") {
            self.engine = v.parse()?;
        }
        if let Some(v) = lookup("OPENAI_MODEL") {
            self.openai.model = v;
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.openai.api_key = Some(v);
        }
        if let Some(v) = lookup("OPENAI_BASE_URL") {
            self.openai.base_url = Some(v);
        }
        if let Some(v) = lookup("OLLAMA_MODEL") {
            self.ollama.model = v;
        }
        if let Some(v) = lookup("OLLAMA_HOST") {
            self.ollama.base_url = v;
        }
        if let Some(v) = lookup("CONFIRMATION") {
            self.confirmation = v.parse()?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = Some(v);
        }
        if let Some(v) = lookup("LOG_FILE") {
            self.log_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("MIA_INTENTS_DIR") {
            self.intents_dir = PathBuf::from(v);
        }

        for (var, slot) in [
            ("ALLOW_DOCKER", &mut self.features.docker),
            ("ALLOW_APT", &mut self.features.apt),
            ("ALLOW_PLAYERCTL", &mut self.features.playerctl),
        ] {
            if let Some(v) = lookup(var) {
                *slot = parse_flag(&v).ok_or_else(|| AgentError::ConfigError {
                    reason: format!("{var} must be 1/0, true/false, yes/no or on/off, got '{v}'"),
                })?;
            }
        }

        Ok(())
    }

    /// The OpenAI API key, if one is configured and non-empty.
    pub fn openai_api_key(&self) -> Option<&str> {
        self.openai.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read an environment variable, treating empty values as unset.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a boolean switch the way the environment spells them.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
