//! Intent pipeline for MIA.
//!
//! ```text
//! utterance ──> Resolver ──> IntentCatalog lookup ──> Dispatcher
//!               (fast tier,                           (render, confirm,
//!                model tier)                           execute)
//!                                                          │
//!                    SessionMemory <── turn recorded <─────┘
//! ```
//!
//! - [`catalog`] -- YAML intent definitions, validation, atomic reload.
//! - [`matcher`] -- phrase and regex triggers for the fast tier.
//! - [`resolver`] -- two-tier utterance resolution.
//! - [`template`] -- minijinja shell templates with a `quote` filter.
//! - [`dispatcher`] -- render, confirm, and execute commands.
//! - [`pipeline`] -- one session's turn loop.
//! - [`planner`] -- goal-driven plan/act/observe loop and its plugin.

pub mod catalog;
pub mod dispatcher;
pub mod error;
pub mod matcher;
pub mod pipeline;
pub mod planner;
pub mod resolver;
pub mod template;

pub use catalog::{
    ActionTemplate, CatalogHandle, CatalogSource, IntentCatalog, IntentDefinition, ParamSpec,
    Trigger,
};
pub use dispatcher::{
    Action, ActionResult, AutoApprove, ConfirmedCommand, Confirmer, Deny, Dispatcher, Outcome,
    ResolvedCommand,
};
pub use error::{IntentError, Result};
pub use matcher::{FastMatch, IntentMatcher, MatchKind};
pub use pipeline::{Pipeline, TurnReport};
pub use planner::{
    DEFAULT_MAX_STEPS, PlanReport, Planner, PlannerAdapter, StepRecord, StopReason,
};
pub use resolver::{Resolution, ResolutionSource, ResolvedIntent, Resolver};
pub use template::{TemplateEngine, shell_quote};
