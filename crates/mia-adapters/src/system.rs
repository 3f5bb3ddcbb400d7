//! System information adapter -- the `system` plugin.
//!
//! Read-only host inspection: busiest processes, uptime, and hardware
//! sensors.  Each tool shells out to the standard utility and reports its
//! output.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use crate::error::{AdapterError, Result};
use crate::shell::{DEFAULT_TIMEOUT_SECS, run_command};
use crate::traits::{Adapter, AdapterType, HealthStatus, ToolDefinition};

const TOP_PROCESSES: &str = "ps -eo pid,comm,%cpu,%mem --sort=-%cpu | head -n 20";
const UPTIME: &str = "uptime -p 2>/dev/null || uptime";
const SENSORS: &str =
    "if command -v sensors >/dev/null 2>&1; then sensors; else echo 'lm-sensors not installed'; fi";

/// Host inspection adapter.
pub struct SystemAdapter {
    id: String,
    timeout_secs: u64,
    connected: bool,
}

impl SystemAdapter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connected: false,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// The shell command behind a tool name.
    fn command_for(name: &str) -> Option<&'static str> {
        match name {
            "top_processes" => Some(TOP_PROCESSES),
            "uptime" => Some(UPTIME),
            "sensors" => Some(SENSORS),
            _ => None,
        }
    }
}

#[async_trait]
impl Adapter for SystemAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::System
    }

    async fn connect(&mut self) -> Result<()> {
        info!(id = %self.id, "system adapter connected");
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        if self.connected {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        let no_params = json!({ "type": "object", "properties": {} });
        vec![
            ToolDefinition {
                name: "top_processes".into(),
                description: "Show the 20 processes using the most CPU".into(),
                parameters: no_params.clone(),
            },
            ToolDefinition {
                name: "uptime".into(),
                description: "Show how long the system has been running".into(),
                parameters: no_params.clone(),
            },
            ToolDefinition {
                name: "sensors".into(),
                description: "Show hardware temperature and fan sensors".into(),
                parameters: no_params,
            },
        ]
    }

    async fn execute_tool(&self, name: &str, _params: Value) -> Result<Value> {
        if !self.connected {
            return Err(AdapterError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: format!("adapter `{}` is not connected", self.id),
            });
        }
        let command = Self::command_for(name).ok_or_else(|| AdapterError::ToolNotFound {
            adapter_id: self.id.clone(),
            tool_name: name.to_string(),
        })?;

        let out = run_command(command, None, self.timeout_secs, name).await?;
        Ok(json!({
            "command": command,
            "exit_code": out.exit_code,
            "success": out.success(),
            "output": out.combined(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let mut adapter = SystemAdapter::new("system");
        adapter.connect().await.unwrap();
        let err = adapter.execute_tool("reboot", json!({})).await.unwrap_err();
        assert!(matches!(err, AdapterError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn sensors_never_fails_without_lm_sensors() {
        let mut adapter = SystemAdapter::new("system").with_timeout(10);
        adapter.connect().await.unwrap();
        let out = adapter.execute_tool("sensors", json!({})).await.unwrap();
        assert!(out["output"].is_string());
    }

    #[test]
    fn every_tool_has_a_command() {
        let adapter = SystemAdapter::new("system");
        for tool in adapter.tools() {
            assert!(SystemAdapter::command_for(&tool.name).is_some(), "{}", tool.name);
        }
    }
}
