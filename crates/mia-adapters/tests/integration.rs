//! Integration tests for the mia-adapters crate.
//!
//! These tests exercise the adapters through the registry, the way the
//! dispatcher reaches them.

use mia_adapters::{
    Adapter, AdapterError, AdapterRegistry, FilesystemAdapter, HealthStatus, ShellAdapter,
    SystemAdapter,
};
use serde_json::json;

/// On macOS, tempfile returns `/var/folders/...` but the filesystem
/// canonicalizes to `/private/var/folders/...`. We canonicalize the temp
/// dir path to match the adapter's confinement checks.
fn canon_tempdir() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let canon = dir.path().canonicalize().unwrap();
    (dir, canon)
}

async fn registry_rooted_at(root: &std::path::Path) -> AdapterRegistry {
    let registry = AdapterRegistry::new();
    registry
        .register(ShellAdapter::new("shell").with_working_dir(root).with_timeout(10))
        .await
        .unwrap();
    registry
        .register(FilesystemAdapter::new("files").with_root(root))
        .await
        .unwrap();
    registry
        .register(SystemAdapter::new("system").with_timeout(10))
        .await
        .unwrap();
    registry
}

// ═══════════════════════════════════════════════════════════════════════
//  Filesystem adapter
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn filesystem_adapter_lifecycle() {
    let (_dir, canon) = canon_tempdir();
    let mut adapter = FilesystemAdapter::new("files").with_root(&canon);

    assert_eq!(adapter.health_check().await.unwrap(), HealthStatus::Unhealthy);
    adapter.connect().await.unwrap();
    assert_eq!(adapter.health_check().await.unwrap(), HealthStatus::Healthy);

    adapter
        .execute_tool("create_folder", json!({"path": "Projects"}))
        .await
        .unwrap();
    adapter
        .execute_tool(
            "create_file",
            json!({"path": "Projects/main.py", "content": "print('hi')\n"}),
        )
        .await
        .unwrap();

    let listing = adapter
        .execute_tool("list_dir", json!({"path": "Projects"}))
        .await
        .unwrap();
    let entries = listing["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "main.py");

    adapter.disconnect().await.unwrap();
    assert!(
        adapter
            .execute_tool("read_file", json!({"path": "Projects/main.py"}))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn edit_then_read_through_registry() {
    let (_dir, canon) = canon_tempdir();
    let registry = registry_rooted_at(&canon).await;
    std::fs::write(
        canon.join("config.ini"),
        "[core]\n# BEGIN managed\nold=1\n# END managed\n",
    )
    .unwrap();

    let edited = registry
        .execute(
            "files",
            "edit_file",
            json!({
                "path": "config.ini",
                "start_marker": "# BEGIN managed",
                "end_marker": "# END managed",
                "new_content": "new=2",
            }),
        )
        .await
        .unwrap();
    assert_eq!(edited["mode"], "markers");
    assert!(canon.join("config.ini.bak").exists());

    let read = registry
        .execute("files", "read_file", json!({"path": "config.ini"}))
        .await
        .unwrap();
    assert_eq!(
        read["output"],
        "[core]\n# BEGIN managed\nnew=2\n# END managed\n"
    );
}

#[tokio::test]
async fn filesystem_confinement_blocks_traversal() {
    let (_dir, canon) = canon_tempdir();
    let registry = registry_rooted_at(&canon).await;
    let err = registry
        .execute("files", "read_file", json!({"path": "../../etc/passwd"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidParams { .. }));
}

// ═══════════════════════════════════════════════════════════════════════
//  Shell adapter
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn shell_runs_in_configured_directory() {
    let (_dir, canon) = canon_tempdir();
    let registry = registry_rooted_at(&canon).await;

    registry
        .execute("shell", "shell_execute", json!({"command": "touch marker.txt"}))
        .await
        .unwrap();
    assert!(canon.join("marker.txt").exists());
}

#[tokio::test]
async fn shell_reports_exit_code_and_stderr() {
    let (_dir, canon) = canon_tempdir();
    let registry = registry_rooted_at(&canon).await;

    let out = registry
        .execute(
            "shell",
            "shell_execute",
            json!({"command": "echo failing >&2; exit 7"}),
        )
        .await
        .unwrap();
    assert_eq!(out["success"], false);
    assert_eq!(out["exit_code"], 7);
    assert_eq!(out["stderr"], "failing\n");
}

// ═══════════════════════════════════════════════════════════════════════
//  Registry
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn adapter_tools_are_well_defined() {
    let (_dir, canon) = canon_tempdir();
    let registry = registry_rooted_at(&canon).await;

    let tools = registry.list_tools();
    assert_eq!(tools.len(), 1 + 7 + 3);
    for (adapter, tool) in &tools {
        assert!(!tool.name.is_empty(), "tool name must not be empty");
        assert!(
            !tool.description.is_empty(),
            "{adapter}.{} needs a description",
            tool.name
        );
        assert!(registry.has_tool(adapter, &tool.name));
    }
}

#[tokio::test]
async fn unknown_tool_returns_error() {
    let (_dir, canon) = canon_tempdir();
    let registry = registry_rooted_at(&canon).await;

    let err = registry
        .execute("files", "nonexistent_tool", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::ToolNotFound { .. }));
}

#[tokio::test]
async fn all_adapters_healthy_after_registration() {
    let (_dir, canon) = canon_tempdir();
    let registry = registry_rooted_at(&canon).await;
    let health = registry.health().await;
    assert_eq!(health.len(), 3);
    assert!(health.iter().all(|(_, s)| *s == HealthStatus::Healthy));
}
