//! Adapter registry.
//!
//! Maps adapter ids (`shell`, `files`, `system`, `planner`) to connected
//! [`Adapter`] instances so plugin references of the form `adapter.tool` can
//! be routed.  Backed by [`DashMap`]; cloning a registry shares it.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{AdapterError, Result};
use crate::traits::{Adapter, HealthStatus, ToolDefinition};

/// Concurrent registry of connected adapters.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    inner: Arc<DashMap<String, Arc<dyn Adapter>>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.list_ids())
            .finish()
    }
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `adapter` and register it under its id.
    ///
    /// An adapter with the same id is replaced.
    pub async fn register<A>(&self, mut adapter: A) -> Result<()>
    where
        A: Adapter + 'static,
    {
        adapter.connect().await?;
        self.insert(Arc::new(adapter));
        Ok(())
    }

    /// Register an adapter that is already connected.
    pub fn insert(&self, adapter: Arc<dyn Adapter>) {
        let id = adapter.id().to_owned();
        info!(adapter_id = %id, "adapter registered");
        self.inner.insert(id, adapter);
    }

    /// A registry holding the same adapters that does not share future
    /// registrations with this one.
    pub fn fork(&self) -> Self {
        let forked = Self::new();
        for entry in self.inner.iter() {
            forked
                .inner
                .insert(entry.key().clone(), Arc::clone(entry.value()));
        }
        forked
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn Adapter>> {
        self.inner
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AdapterError::AdapterNotFound {
                adapter_id: id.to_string(),
            })
    }

    /// Whether `adapter` exists and exposes `tool`.
    pub fn has_tool(&self, adapter: &str, tool: &str) -> bool {
        self.inner
            .get(adapter)
            .map(|entry| entry.value().tools().iter().any(|t| t.name == tool))
            .unwrap_or(false)
    }

    /// Route one tool call.
    pub async fn execute(&self, adapter: &str, tool: &str, params: Value) -> Result<Value> {
        let target = self.get(adapter)?;
        debug!(adapter = adapter, tool = tool, "dispatching tool call");
        target.execute_tool(tool, params).await
    }

    /// Sorted adapter ids.
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Every `adapter.tool` pair with its definition, sorted by adapter id.
    pub fn list_tools(&self) -> Vec<(String, ToolDefinition)> {
        let mut tools = Vec::new();
        for id in self.list_ids() {
            if let Ok(adapter) = self.get(&id) {
                tools.extend(adapter.tools().into_iter().map(|t| (id.clone(), t)));
            }
        }
        tools
    }

    /// Health of every adapter, sorted by id.  A failing check counts as
    /// unhealthy.
    pub async fn health(&self) -> Vec<(String, HealthStatus)> {
        let mut report = Vec::new();
        for id in self.list_ids() {
            let Ok(adapter) = self.get(&id) else {
                continue;
            };
            let status = adapter
                .health_check()
                .await
                .unwrap_or(HealthStatus::Unhealthy);
            report.push((id, status));
        }
        report
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::shell::ShellAdapter;
    use crate::system::SystemAdapter;

    #[tokio::test]
    async fn register_connects_and_routes() {
        let registry = AdapterRegistry::new();
        registry.register(ShellAdapter::new("shell")).await.unwrap();

        assert!(registry.has_tool("shell", "shell_execute"));
        assert!(!registry.has_tool("shell", "rm_rf"));
        assert!(!registry.has_tool("files", "read_file"));

        let out = registry
            .execute("shell", "shell_execute", json!({"command": "echo routed"}))
            .await
            .unwrap();
        assert_eq!(out["stdout"], "routed\n");
    }

    #[tokio::test]
    async fn unknown_adapter_is_an_error() {
        let registry = AdapterRegistry::new();
        let err = registry
            .execute("docker", "ps", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::AdapterNotFound { .. }));
    }

    #[tokio::test]
    async fn fork_does_not_share_later_registrations() {
        let base = AdapterRegistry::new();
        base.register(ShellAdapter::new("shell")).await.unwrap();

        let forked = base.fork();
        forked.register(SystemAdapter::new("system")).await.unwrap();

        assert_eq!(base.list_ids(), vec!["shell"]);
        assert_eq!(forked.list_ids(), vec!["shell", "system"]);
    }

    #[tokio::test]
    async fn health_reports_every_adapter() {
        let registry = AdapterRegistry::new();
        registry.register(SystemAdapter::new("system")).await.unwrap();
        let health = registry.health().await;
        assert_eq!(health, vec![("system".to_owned(), HealthStatus::Healthy)]);
        assert_eq!(registry.list_tools().len(), 3);
    }
}
