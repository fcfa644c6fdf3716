//! depbuild - builds third-party dependencies with a toolchain-correct
//! environment
//!
//! Tasks are declared in a depbuild.yml file and run in order. Each step is a
//! child process with an explicitly composed environment, supervised for
//! interruption and reported through one leveled output channel.

// Public modules
pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod runner;
pub mod ui;

// Re-export commonly used types
pub use error::{BuildError, Result};

/// Current version of depbuild
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
