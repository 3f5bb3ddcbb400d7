//! Built-in action adapters for MIA.
//!
//! Each adapter implements the [`Adapter`] trait defined in [`traits`] and
//! is addressed from intent definitions as `adapter.tool`:
//!
//! - [`ShellAdapter`] (`shell`) -- runs rendered shell templates.
//! - [`FilesystemAdapter`] (`files`) -- create, write, edit, and inspect files.
//! - [`SystemAdapter`] (`system`) -- processes, uptime, sensors.
//!
//! The [`AdapterRegistry`] routes calls by adapter id.

pub mod edit;
pub mod error;
pub mod filesystem;
pub mod registry;
pub mod shell;
pub mod system;
pub mod traits;

pub use error::{AdapterError, Result};
pub use filesystem::{FilesystemAdapter, expand_path};
pub use registry::AdapterRegistry;
pub use shell::{CommandOutput, ShellAdapter, run_command};
pub use system::SystemAdapter;
pub use traits::{Adapter, AdapterType, HealthStatus, ToolDefinition};
