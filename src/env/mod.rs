//! Process environment composition
//!
//! An [`Environment`] is a case-insensitive set of variables handed to child
//! processes. Toolchain environments are captured once per [`Arch`] and
//! layered over the ambient environment of the run.

pub mod arch;
pub mod environment;
pub mod toolchain;

pub use arch::Arch;
pub use environment::{Environment, SetMode, PATH_SEPARATOR};
