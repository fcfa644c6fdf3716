//! Console output
//!
//! Leveled, thread-safe log channel shared by every component, plus console
//! capability detection for colored rendering.

pub mod console;
pub mod output;

pub use console::{ColorMethod, Paint};
pub use output::*;
