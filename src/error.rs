//! Error types for depbuild

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for depbuild operations
pub type Result<T> = std::result::Result<T, BuildError>;

/// Main error type for depbuild
#[derive(Error, Debug)]
pub enum BuildError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Process execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Variable interpolation errors
    #[error("Interpolation error: {0}")]
    Interpolation(#[from] InterpolationError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A single task was requested that is not registered
    #[error("unknown task '{0}'")]
    UnknownTask(String),

    /// Run-terminating condition. Only the top level handles this.
    #[error("{0}")]
    Bail(String),
}

impl BuildError {
    /// Whether this error ends the whole run
    pub fn is_bail(&self) -> bool {
        matches!(self, BuildError::Bail(_))
    }

    /// Whether this error is a cancellation rather than a failure
    pub fn is_interrupted(&self) -> bool {
        matches!(self, BuildError::Execution(e) if e.is_interrupted())
    }
}

/// Configuration parsing and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config file (searched: {0})")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Task '{0}' is defined more than once")]
    DuplicateTask(String),

    #[error("Task name cannot be empty")]
    EmptyTaskName,

    #[error("Task '{task}': {error}")]
    InvalidStep { task: String, error: String },

    #[error("Failed to read env file '{path}': {error}")]
    EnvFile { path: PathBuf, error: String },
}

/// Process execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The process could not be created at all
    #[error("failed to start '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The process was created but waiting on it or reading its output failed
    #[error("failed to wait for '{program}'")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The tool ran and reported failure
    #[error("'{program}' exited with code {code}")]
    ToolFailed { program: String, code: i32 },

    /// The run was interrupted while this process was running
    #[error("interrupted")]
    Interrupted,
}

impl ExecutionError {
    /// The process never ran to completion for reasons outside the tool itself
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, ExecutionError::Spawn { .. } | ExecutionError::Wait { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, ExecutionError::Interrupted)
    }

    /// The I/O error behind an infrastructure failure
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            ExecutionError::Spawn { source, .. } | ExecutionError::Wait { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Raw OS error code, when the failure came from the OS
    pub fn os_error(&self) -> Option<i32> {
        self.io_error().and_then(io::Error::raw_os_error)
    }
}

/// Variable interpolation errors
#[derive(Error, Debug)]
pub enum InterpolationError {
    #[error("Variable '{0}' is not defined")]
    UndefinedVariable(String),

    #[error("Recursive interpolation detected")]
    RecursiveInterpolation,
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Specialized result type for interpolation operations
pub type InterpolationResult<T> = std::result::Result<T, InterpolationError>;
