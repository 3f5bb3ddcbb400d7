//! Filesystem adapter -- the `files` plugin.
//!
//! Tools: `create_file`, `write_file`, `edit_file`, `read_file`,
//! `file_exists`, `create_folder`, `list_dir`.
//!
//! Paths expand `$VARS` and a leading `~`.  When a root directory is set,
//! relative paths resolve against it and any path escaping it is rejected;
//! otherwise relative paths resolve against the current directory.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::edit::{DIFF_PREVIEW_LINES, EditTarget, apply_edit, diff_preview};
use crate::error::{AdapterError, Result};
use crate::traits::{Adapter, AdapterType, HealthStatus, ToolDefinition};

/// Maximum characters returned per file read.
const MAX_FILE_READ_CHARS: usize = 16_000;

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Expand `$VAR` / `${VAR}` and a leading `~` in a user-supplied path.
///
/// Unset variables are left untouched.  The result may still be relative.
pub fn expand_path(raw: &str) -> PathBuf {
    static VAR: OnceLock<Option<Regex>> = OnceLock::new();
    let expanded = match VAR
        .get_or_init(|| Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").ok())
    {
        Some(re) => re
            .replace_all(raw, |caps: &regex::Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                std::env::var(name).unwrap_or_else(|_| caps[0].to_owned())
            })
            .into_owned(),
        None => raw.to_owned(),
    };

    let home = std::env::var("HOME").ok().filter(|h| !h.is_empty());
    match home {
        Some(home) if expanded == "~" => PathBuf::from(home),
        Some(home) if expanded.starts_with("~/") => PathBuf::from(home).join(&expanded[2..]),
        _ => PathBuf::from(expanded),
    }
}

/// Normalize a path by resolving `.` and `..` components without touching
/// the filesystem (the target may not exist yet).
fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            Component::CurDir => {}
            _ => components.push(component),
        }
    }
    components.iter().collect()
}

fn backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".bak");
    PathBuf::from(os)
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Filesystem service adapter.
pub struct FilesystemAdapter {
    id: String,
    /// Confinement root.  `None` means unconfined.
    root_dir: Option<PathBuf>,
    connected: bool,
}

impl FilesystemAdapter {
    /// Create an unconfined adapter.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            root_dir: None,
            connected: false,
        }
    }

    /// Confine every path to `root_dir`.
    pub fn with_root(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root_dir.into());
        self
    }

    /// Expand, absolutize, and (when confined) validate a path.
    fn resolve(&self, raw_path: &str, tool_name: &str) -> Result<PathBuf> {
        let expanded = expand_path(raw_path);

        let Some(root) = &self.root_dir else {
            let absolute = if expanded.is_absolute() {
                expanded
            } else {
                std::env::current_dir()?.join(expanded)
            };
            return Ok(normalize_path(&absolute));
        };

        // Canonicalize the root so the prefix check is reliable.
        let canon_root = root.canonicalize().unwrap_or_else(|_| root.clone());
        let candidate = if expanded.is_absolute() {
            expanded
        } else {
            canon_root.join(expanded)
        };
        let normalized = normalize_path(&candidate);

        if !normalized.starts_with(&canon_root) {
            return Err(AdapterError::InvalidParams {
                tool_name: tool_name.to_string(),
                reason: format!(
                    "path `{raw_path}` resolves to `{}` which is outside the root directory `{}`",
                    normalized.display(),
                    canon_root.display(),
                ),
            });
        }

        Ok(normalized)
    }

    /// Extract a required string field from JSON params.
    fn require_str<'a>(params: &'a Value, field: &str, tool_name: &str) -> Result<&'a str> {
        params
            .get(field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::InvalidParams {
                tool_name: tool_name.to_string(),
                reason: format!("missing required string field `{field}`"),
            })
    }

    /// Extract an optional string field, treating `""` as absent.
    fn optional_str<'a>(params: &'a Value, field: &str) -> Option<&'a str> {
        params
            .get(field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    // -- Tool implementations ------------------------------------------------

    async fn tool_create_file(&self, params: Value) -> Result<Value> {
        let path = self.resolve(Self::require_str(&params, "path", "create_file")?, "create_file")?;
        let content = params.get("content").and_then(|v| v.as_str()).unwrap_or("");
        debug!(path = %path.display(), "creating file");

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;

        Ok(json!({
            "path": path.display().to_string(),
            "success": true,
            "output": format!("Created file: {}", path.display()),
        }))
    }

    async fn tool_write_file(&self, params: Value) -> Result<Value> {
        let path = self.resolve(Self::require_str(&params, "path", "write_file")?, "write_file")?;
        let content = Self::require_str(&params, "content", "write_file")?;
        let mode = Self::optional_str(&params, "mode").unwrap_or("overwrite");
        debug!(path = %path.display(), mode = mode, "writing file");

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let verb = match mode {
            "overwrite" => {
                tokio::fs::write(&path, content).await?;
                "Overwrote"
            }
            "append" => {
                use tokio::io::AsyncWriteExt;
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await?;
                file.write_all(content.as_bytes()).await?;
                file.flush().await?;
                "Appended to"
            }
            other => {
                return Err(AdapterError::InvalidParams {
                    tool_name: "write_file".into(),
                    reason: format!("mode must be `overwrite` or `append`, got `{other}`"),
                });
            }
        };

        Ok(json!({
            "path": path.display().to_string(),
            "mode": mode,
            "success": true,
            "output": format!("{verb}: {}", path.display()),
        }))
    }

    async fn tool_edit_file(&self, params: Value) -> Result<Value> {
        let path = self.resolve(Self::require_str(&params, "path", "edit_file")?, "edit_file")?;
        let new_content = Self::require_str(&params, "new_content", "edit_file")?;

        let target = match (
            Self::optional_str(&params, "start_marker"),
            Self::optional_str(&params, "end_marker"),
            Self::optional_str(&params, "keyword"),
        ) {
            (Some(start), Some(end), _) => EditTarget::Markers {
                start: start.into(),
                end: end.into(),
            },
            (Some(_), None, _) | (None, Some(_), _) => {
                return Err(AdapterError::InvalidParams {
                    tool_name: "edit_file".into(),
                    reason: "`start_marker` and `end_marker` must be given together".into(),
                });
            }
            (None, None, Some(keyword)) => EditTarget::Keyword(keyword.into()),
            (None, None, None) => EditTarget::WholeFile,
        };

        if !tokio::fs::try_exists(&path).await? {
            return Err(AdapterError::ExecutionFailed {
                tool_name: "edit_file".into(),
                reason: format!("file not found: {}", path.display()),
            });
        }

        let before = tokio::fs::read_to_string(&path).await?;
        let Some(after) = apply_edit(&before, &target, new_content) else {
            return Err(AdapterError::ExecutionFailed {
                tool_name: "edit_file".into(),
                reason: format!(
                    "no match for {} in {}; file left unchanged",
                    target.mode(),
                    path.display()
                ),
            });
        };

        let backup = backup_path(&path);
        tokio::fs::copy(&path, &backup).await?;
        tokio::fs::write(&path, &after).await?;

        let diff = diff_preview(&before, &after, DIFF_PREVIEW_LINES);
        info!(
            path = %path.display(),
            mode = target.mode(),
            backup = %backup.display(),
            "file edited"
        );

        let mut output = format!("Edited file: {} (backup: {})", path.display(), backup.display());
        if !diff.is_empty() {
            output.push('\n');
            output.push_str(&diff);
        }

        Ok(json!({
            "path": path.display().to_string(),
            "mode": target.mode(),
            "backup": backup.display().to_string(),
            "diff": diff,
            "success": true,
            "output": output,
        }))
    }

    async fn tool_read_file(&self, params: Value) -> Result<Value> {
        let path = self.resolve(Self::require_str(&params, "path", "read_file")?, "read_file")?;
        debug!(path = %path.display(), "reading file");

        let raw = tokio::fs::read_to_string(&path).await?;
        let total_chars = raw.chars().count();

        let (content, truncated) = if total_chars > MAX_FILE_READ_CHARS {
            let body: String = raw.chars().take(MAX_FILE_READ_CHARS).collect();
            (
                format!("{body}\n\n[... file truncated at {MAX_FILE_READ_CHARS} chars ({total_chars} total)]"),
                true,
            )
        } else {
            (raw, false)
        };

        Ok(json!({
            "path": path.display().to_string(),
            "truncated": truncated,
            "success": true,
            "output": content,
        }))
    }

    async fn tool_file_exists(&self, params: Value) -> Result<Value> {
        let path = self.resolve(Self::require_str(&params, "path", "file_exists")?, "file_exists")?;
        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        let output = exists.to_string();

        Ok(json!({
            "path": path.display().to_string(),
            "exists": exists,
            "success": true,
            "output": output,
        }))
    }

    async fn tool_create_folder(&self, params: Value) -> Result<Value> {
        let path = self.resolve(Self::require_str(&params, "path", "create_folder")?, "create_folder")?;
        debug!(path = %path.display(), "creating directory");

        tokio::fs::create_dir_all(&path).await?;
        Ok(json!({
            "path": path.display().to_string(),
            "success": true,
            "output": format!("Created folder: {}", path.display()),
        }))
    }

    async fn tool_list_dir(&self, params: Value) -> Result<Value> {
        let raw = Self::optional_str(&params, "path").unwrap_or(".");
        let path = self.resolve(raw, "list_dir")?;
        debug!(path = %path.display(), "listing directory");

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let is_dir = entry.file_type().await?.is_dir();
            let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir, size));
        }
        entries.sort();

        let lines: Vec<String> = entries
            .iter()
            .map(|(name, is_dir, size)| {
                if *is_dir {
                    format!("{name}/")
                } else {
                    format!("{name}  ({size} bytes)")
                }
            })
            .collect();
        let json_entries: Vec<Value> = entries
            .iter()
            .map(|(name, is_dir, size)| json!({ "name": name, "is_dir": is_dir, "size_bytes": size }))
            .collect();

        Ok(json!({
            "path": path.display().to_string(),
            "entries": json_entries,
            "count": entries.len(),
            "success": true,
            "output": lines.join("\n"),
        }))
    }
}

#[async_trait]
impl Adapter for FilesystemAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Filesystem
    }

    async fn connect(&mut self) -> Result<()> {
        info!(id = %self.id, root = ?self.root_dir, "filesystem adapter connected");
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        info!(id = %self.id, "filesystem adapter disconnected");
        self.connected = false;
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        if !self.connected {
            return Ok(HealthStatus::Unhealthy);
        }
        let Some(root) = &self.root_dir else {
            return Ok(HealthStatus::Healthy);
        };
        match tokio::fs::metadata(root).await {
            Ok(meta) if meta.is_dir() => Ok(HealthStatus::Healthy),
            Ok(_) => Ok(HealthStatus::Degraded),
            Err(_) => Ok(HealthStatus::Unhealthy),
        }
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        let path_only = |description: &str| {
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": description }
                },
                "required": ["path"]
            })
        };

        vec![
            ToolDefinition {
                name: "create_file".into(),
                description: "Create a file (and parent folders) with optional content".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "content": { "type": "string" }
                    },
                    "required": ["path"]
                }),
            },
            ToolDefinition {
                name: "write_file".into(),
                description: "Overwrite or append to a whole file".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "content": { "type": "string" },
                        "mode": { "type": "string", "enum": ["overwrite", "append"] }
                    },
                    "required": ["path", "content"]
                }),
            },
            ToolDefinition {
                name: "edit_file".into(),
                description: "Replace a marked section, a def/class block or line, or the whole file"
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "new_content": { "type": "string" },
                        "start_marker": { "type": "string" },
                        "end_marker": { "type": "string" },
                        "keyword": { "type": "string" }
                    },
                    "required": ["path", "new_content"]
                }),
            },
            ToolDefinition {
                name: "read_file".into(),
                description: "Read a text file".into(),
                parameters: path_only("File to read"),
            },
            ToolDefinition {
                name: "file_exists".into(),
                description: "Check whether a path exists".into(),
                parameters: path_only("Path to check"),
            },
            ToolDefinition {
                name: "create_folder".into(),
                description: "Create a folder and any missing parents".into(),
                parameters: path_only("Folder to create"),
            },
            ToolDefinition {
                name: "list_dir".into(),
                description: "List the entries of a folder".into(),
                parameters: path_only("Folder to list"),
            },
        ]
    }

    async fn execute_tool(&self, name: &str, params: Value) -> Result<Value> {
        if !self.connected {
            return Err(AdapterError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: format!("adapter `{}` is not connected", self.id),
            });
        }
        match name {
            "create_file" => self.tool_create_file(params).await,
            "write_file" => self.tool_write_file(params).await,
            "edit_file" => self.tool_edit_file(params).await,
            "read_file" => self.tool_read_file(params).await,
            "file_exists" => self.tool_file_exists(params).await,
            "create_folder" => self.tool_create_folder(params).await,
            "list_dir" => self.tool_list_dir(params).await,
            _ => Err(AdapterError::ToolNotFound {
                adapter_id: self.id.clone(),
                tool_name: name.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
