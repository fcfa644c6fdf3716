//! CLI interface and argument parsing
//!
//! This module handles command-line parsing, interrupt handling and the
//! top-level mapping of run outcomes to exit codes.

pub mod app;

// Re-export main types
pub use app::*;
