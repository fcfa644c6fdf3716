//! Task execution engine
//!
//! This module handles the execution of tasks: building command lines,
//! running child processes, the task lifecycle and the ordered registry
//! that drives it.

pub mod command;
pub mod context;
pub mod interpolate;
pub mod interrupt;
pub mod process;
pub mod recipe;
pub mod registry;
pub mod task;

// Re-export main types
pub use command::{ArgFlags, CommandArg, CommandLine};
pub use context::*;
pub use interrupt::Interrupter;
pub use recipe::RecipeTask;
pub use registry::{Registry, RunOutcome};
pub use task::*;
