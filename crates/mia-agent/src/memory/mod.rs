//! Per-session conversational memory.
//!
//! The [`SessionMemory`] log is the resolver's view of "what happened so
//! far": an ordered list of turns plus symbolic context such as the folder
//! or file the user last worked with.  Nothing is persisted beyond the
//! process lifetime.

pub mod session;

pub use session::{SessionMemory, Turn, TurnOutcome};
