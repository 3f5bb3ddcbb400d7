//! Non-interactive subcommands: `run`, `plan`, `intents`, `status`.

use std::collections::BTreeSet;
use std::process::ExitCode;

use anyhow::{Result, bail};
use mia_adapters::AdapterRegistry;
use mia_agent::{BackendPool, Settings};
use mia_intent::{ActionTemplate, IntentCatalog};

use crate::helpers::{format_plan, format_turn};
use crate::runtime::{PLANNER_ADAPTER, Runtime, base_registry, load_catalog};

// ---------------------------------------------------------------------------
// run / plan
// ---------------------------------------------------------------------------

/// `mia run <utterance...>`: one turn; the exit status is the command's.
pub async fn cmd_run(runtime: &Runtime, utterance: &[String]) -> Result<ExitCode> {
    let mut pipeline = runtime.pipeline();
    let report = pipeline.handle(&utterance.join(" ")).await;
    println!("{}", format_turn(&report));
    pipeline.end();
    Ok(ExitCode::from(exit_status(report.exit_code())))
}

/// `mia plan <goal...>`.
pub async fn cmd_plan(
    runtime: &Runtime,
    goal: &[String],
    allow: &[String],
    steps: usize,
    confirm: bool,
) -> Result<ExitCode> {
    let mut planner = runtime.planner(confirm).with_max_steps(steps);
    if !allow.is_empty() {
        let catalog = runtime.catalog.snapshot();
        if let Some(unknown) = allow.iter().find(|name| !catalog.contains(name)) {
            bail!("--allow names unknown intent `{unknown}`");
        }
        planner = planner.with_allowed(allow.iter().cloned());
    }

    let report = planner.run(&goal.join(" ")).await?;
    println!("{}", format_plan(&report));
    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Process status for a command exit code; out-of-range codes become 1.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

// ---------------------------------------------------------------------------
// intents
// ---------------------------------------------------------------------------

/// Plugin references no adapter in `registry` can serve.  `planner.*` is
/// only registered for chat sessions, so its tools are taken as given.
pub fn unresolved_plugins(catalog: &IntentCatalog, registry: &AdapterRegistry) -> Vec<String> {
    catalog
        .iter()
        .filter_map(|def| match &def.action {
            ActionTemplate::Plugin { adapter, tool }
                if adapter != PLANNER_ADAPTER && !registry.has_tool(adapter, tool) =>
            {
                Some(format!("{}: {adapter}.{tool}", def.name))
            }
            ActionTemplate::Plugin { adapter, tool }
                if adapter == PLANNER_ADAPTER && tool != "run" =>
            {
                Some(format!("{}: {adapter}.{tool}", def.name))
            }
            _ => None,
        })
        .collect()
}

/// Intents gated on a feature that is switched off.
pub fn gated_intents(catalog: &IntentCatalog, settings: &Settings) -> Vec<String> {
    catalog
        .iter()
        .filter_map(|def| {
            let feature = def.requires.as_deref()?;
            (!settings.features.is_enabled(feature)).then(|| format!("{} ({feature})", def.name))
        })
        .collect()
}

/// `mia intents [--check]`.
pub async fn cmd_intents(settings: &Settings, check: bool) -> Result<ExitCode> {
    let handle = load_catalog(settings)?;
    let catalog = handle.snapshot();

    if !check {
        let mut by_file: Vec<_> = catalog.iter().collect();
        by_file.sort_by(|a, b| (&a.source, &a.name).cmp(&(&b.source, &b.name)));
        let mut current = None;
        for def in by_file {
            if current != Some(&def.source) {
                println!("{}", def.source);
                current = Some(&def.source);
            }
            let mut flags = Vec::new();
            if def.safe {
                flags.push("safe".to_owned());
            }
            if let Some(feature) = &def.requires {
                flags.push(format!("requires {feature}"));
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!("  [{}]", flags.join(", "))
            };
            println!("  {}{flags}", def.signature());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let registry = base_registry(settings).await?;
    let unresolved = unresolved_plugins(&catalog, &registry);
    let gated = gated_intents(&catalog, settings);

    println!(
        "  {} intents from {} ({} safe)",
        catalog.len(),
        handle.source().describe(),
        catalog.safe_intents().len()
    );
    if !gated.is_empty() {
        println!("  Disabled by configuration: {}", gated.join(", "));
    }
    if unresolved.is_empty() {
        println!("  All plugin references resolve.");
        Ok(ExitCode::SUCCESS)
    } else {
        for entry in &unresolved {
            println!("  Unknown plugin  {entry}");
        }
        Ok(ExitCode::FAILURE)
    }
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

/// `mia status`.  Reports problems instead of failing on them.
pub async fn cmd_status(settings: &Settings) -> Result<ExitCode> {
    println!();
    println!("  MIA Status");
    println!("  ==========");
    println!();
    println!("  Engine:           {}", settings.engine);
    println!("  OpenAI model:     {}", settings.openai.model);
    println!(
        "  OpenAI API key:   {}",
        if settings.openai_api_key().is_some() {
            "CONFIGURED"
        } else {
            "NOT SET"
        }
    );
    println!("  Ollama:           {} at {}", settings.ollama.model, settings.ollama.base_url);
    println!("  Confirmation:     {:?}", settings.confirmation);
    let features: BTreeSet<String> = settings.features.enabled().into_iter().collect();
    println!(
        "  Features:         {}",
        if features.is_empty() {
            "none".to_owned()
        } else {
            features.into_iter().collect::<Vec<_>>().join(", ")
        }
    );
    if let Some(root) = &settings.fs_root {
        println!("  File root:        {}", root.display());
    }

    println!();
    match load_catalog(settings) {
        Ok(handle) => {
            let catalog = handle.snapshot();
            println!(
                "  Catalog:          OK ({} intents, {} safe)",
                catalog.len(),
                catalog.safe_intents().len()
            );
        }
        Err(e) => println!("  Catalog:          ERROR ({e:#})"),
    }

    match BackendPool::from_settings(settings) {
        Ok(pool) if pool.is_empty() => println!("  Backends:         none"),
        Ok(pool) => {
            for backend in pool.backends() {
                let state = if backend.is_available().await {
                    "reachable"
                } else {
                    "UNREACHABLE"
                };
                println!("  Backend {:<9} {state}", format!("{}:", backend.name()));
            }
        }
        Err(e) => println!("  Backends:         ERROR ({e})"),
    }

    let registry = base_registry(settings).await?;
    for (id, health) in registry.health().await {
        let kind = registry
            .get(&id)
            .map(|a| a.adapter_type().to_string())
            .unwrap_or_default();
        println!("  Adapter {:<9} {health} ({kind})", format!("{id}:"));
    }
    println!();

    Ok(ExitCode::SUCCESS)
}
