//! The [`Adapter`] trait: how the dispatcher reaches `adapter.tool`.
//!
//! A tool replies with a JSON object.  The dispatcher reads three keys from
//! it and ignores the rest:
//!
//! - `success` (bool, default true)
//! - `output` (string) -- shown to the user, fed to the planner as an
//!   observation
//! - `exit_code` (integer, optional)
//!
//! Calls that cannot be carried out at all return [`crate::AdapterError`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// What kind of executor an adapter is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterType {
    /// Runs processes or inspects the host.
    System,
    Filesystem,
    /// Calls back into the dispatcher (the planner).
    Orchestration,
}

impl AdapterType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Filesystem => "filesystem",
            Self::Orchestration => "orchestration",
        }
    }
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Usable, but something it depends on is missing.
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        })
    }
}

/// One callable tool and the JSON Schema of its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// An action executor registered under an id such as `files`.
///
/// `connect` runs once before registration; `execute_tool` must refuse work
/// after `disconnect`.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn id(&self) -> &str;

    fn adapter_type(&self) -> AdapterType;

    async fn connect(&mut self) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    async fn health_check(&self) -> Result<HealthStatus>;

    fn tools(&self) -> Vec<ToolDefinition>;

    async fn execute_tool(&self, name: &str, params: Value) -> Result<Value>;
}
