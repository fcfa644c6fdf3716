//! Configuration validation
//!
//! This module provides validation logic for configuration files.

use crate::config::types::{ArgConfig, ArgValue, Config, StepConfig, TaskConfig};
use crate::error::{ConfigError, ConfigResult};
use std::collections::HashSet;
use url::Url;

/// Validate a complete configuration
pub fn validate_config(config: &Config) -> ConfigResult<()> {
    let mut seen = HashSet::new();

    for task in &config.tasks {
        if task.name.trim().is_empty() {
            return Err(ConfigError::EmptyTaskName);
        }
        if !seen.insert(task.name.as_str()) {
            return Err(ConfigError::DuplicateTask(task.name.clone()));
        }
        validate_task(task)?;
    }

    if config.grace_period_ms == Some(0) {
        return Err(ConfigError::Invalid(
            "grace_period_ms must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Validate a single task
pub fn validate_task(task: &TaskConfig) -> ConfigResult<()> {
    let invalid = |error: String| ConfigError::InvalidStep {
        task: task.name.clone(),
        error,
    };

    for step in task.fetch.iter().chain(&task.build) {
        match step {
            StepConfig::Line(line) => match shlex::split(line) {
                Some(words) if !words.is_empty() => {}
                Some(_) => return Err(invalid("empty command line".to_string())),
                None => return Err(invalid(format!("unbalanced quotes in '{}'", line))),
            },
            StepConfig::Detail(detail) => {
                if detail.exec.trim().is_empty() {
                    return Err(invalid("step has no program".to_string()));
                }
                for arg in &detail.args {
                    validate_arg(arg).map_err(invalid)?;
                }
            }
        }
    }

    Ok(())
}

fn validate_arg(arg: &ArgConfig) -> Result<(), String> {
    let ArgConfig::Detail(detail) = arg else {
        return Ok(());
    };

    match detail.value()? {
        // values holding ${var} are checked once interpolated
        ArgValue::Url(s) if !s.contains("${") => Url::parse(s)
            .map(|_| ())
            .map_err(|e| format!("bad url '{}': {}", s, e)),
        ArgValue::CStr(s) if s.contains('\0') => Err("cstr argument contains a NUL".to_string()),
        _ => Ok(()),
    }
}
