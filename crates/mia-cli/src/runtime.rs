//! Wiring shared by every subcommand.
//!
//! Two registries are built: the base one (`shell`, `files`, `system`) that
//! the planner acts through, and a fork of it that also holds the `planner`
//! adapter for chat turns.  The planner therefore cannot start another plan.

use std::sync::Arc;

use anyhow::{Context, Result};
use mia_adapters::{AdapterRegistry, FilesystemAdapter, ShellAdapter, SystemAdapter};
use mia_agent::{BackendPool, ConfirmationMode, Settings};
use mia_intent::{
    AutoApprove, CatalogHandle, CatalogSource, Confirmer, Dispatcher, Pipeline, Planner,
    PlannerAdapter, Resolver,
};
use tracing::info;

use crate::cli::GlobalArgs;
use crate::confirm::StdinConfirmer;

/// Adapter id of the planner plugin.
pub const PLANNER_ADAPTER: &str = "planner";

/// Apply command-line flags on top of the loaded settings.
pub fn apply_overrides(settings: &mut Settings, args: &GlobalArgs) {
    if let Some(dir) = &args.intents {
        settings.intents_dir = dir.clone();
    }
    if let Some(engine) = args.engine {
        settings.engine = engine;
    }
    if args.yes {
        settings.confirmation = ConfirmationMode::Auto;
    }
}

/// Register the OS adapters under `shell`, `files` and `system`.
pub async fn base_registry(settings: &Settings) -> Result<AdapterRegistry> {
    let registry = AdapterRegistry::new();

    registry
        .register(ShellAdapter::new("shell").with_timeout(settings.shell_timeout_secs))
        .await
        .context("failed to connect shell adapter")?;

    let mut files = FilesystemAdapter::new("files");
    if let Some(root) = &settings.fs_root {
        files = files.with_root(root);
    }
    registry
        .register(files)
        .await
        .context("failed to connect files adapter")?;

    registry
        .register(SystemAdapter::new("system").with_timeout(settings.shell_timeout_secs))
        .await
        .context("failed to connect system adapter")?;

    Ok(registry)
}

/// Load the catalog the settings point at.
pub fn load_catalog(settings: &Settings) -> Result<CatalogHandle> {
    let source = CatalogSource::from_path(&settings.intents_dir);
    let described = source.describe();
    CatalogHandle::load(source)
        .with_context(|| format!("failed to load intent catalog from {described}"))
}

/// Everything a session needs, built once per process.
pub struct Runtime {
    pub settings: Settings,
    pub backends: BackendPool,
    pub catalog: Arc<CatalogHandle>,
    /// Dispatcher for chat turns; can reach the planner.
    pub dispatcher: Arc<Dispatcher>,
    /// Dispatcher the planner acts through; cannot reach the planner.
    pub planner_dispatcher: Arc<Dispatcher>,
}

impl Runtime {
    pub async fn build(settings: Settings) -> Result<Self> {
        let backends =
            BackendPool::from_settings(&settings).context("failed to configure backends")?;
        let catalog = Arc::new(load_catalog(&settings)?);

        let base = base_registry(&settings).await?;
        let planner_dispatcher = Arc::new(Dispatcher::new(base.clone(), settings.features.clone()));

        let chat_registry = base.fork();
        chat_registry
            .register(PlannerAdapter::new(
                PLANNER_ADAPTER,
                backends.clone(),
                Arc::clone(&catalog),
                Arc::clone(&planner_dispatcher),
            ))
            .await
            .context("failed to connect planner adapter")?;
        let dispatcher = Arc::new(Dispatcher::new(chat_registry, settings.features.clone()));

        info!(
            intents = catalog.snapshot().len(),
            backends = ?backends.names(),
            adapters = ?dispatcher.registry().list_ids(),
            "runtime ready"
        );

        Ok(Self {
            settings,
            backends,
            catalog,
            dispatcher,
            planner_dispatcher,
        })
    }

    /// The confirmer the configured mode asks for.
    pub fn confirmer(&self) -> Arc<dyn Confirmer> {
        match self.settings.confirmation {
            ConfirmationMode::Auto => Arc::new(AutoApprove),
            ConfirmationMode::Ask => Arc::new(StdinConfirmer),
        }
    }

    /// A fresh chat session.
    pub fn pipeline(&self) -> Pipeline {
        let resolver =
            Resolver::new(self.backends.clone()).with_context_window(self.settings.memory_window);
        Pipeline::new(
            Arc::clone(&self.catalog),
            resolver,
            Arc::clone(&self.dispatcher),
            self.confirmer(),
        )
    }

    /// A planner that acts on its own, or asks per action when `confirm`.
    pub fn planner(&self, confirm: bool) -> Planner {
        let planner = Planner::new(
            self.backends.clone(),
            Arc::clone(&self.catalog),
            Arc::clone(&self.planner_dispatcher),
        );
        if confirm {
            planner.with_confirmer(self.confirmer())
        } else {
            planner
        }
    }
}
