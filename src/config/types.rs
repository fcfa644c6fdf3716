//! Core configuration types
//!
//! This module defines the data structures that represent a depbuild.yml
//! configuration file.

use crate::env::{Arch, SetMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Default architecture for tasks that don't name one
    #[serde(default)]
    pub arch: Arch,

    /// Echo debug lines, including child stdout
    #[serde(default)]
    pub verbose: bool,

    /// Log commands instead of running them
    #[serde(default)]
    pub dry: bool,

    /// Grace period before an interrupted child is killed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_ms: Option<u64>,

    /// Where the full log is written at exit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Explicit path to vcvarsall.bat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcvars: Option<PathBuf>,

    /// Directories put in front of PATH before any task runs
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub path: Vec<String>,

    /// Ambient environment overrides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, EnvEntry>,

    /// Variables for `${name}` interpolation
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub vars: BTreeMap<String, String>,

    /// Tasks in run order
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

/// An environment variable, either a plain value or a value with a mode
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EnvEntry {
    Value(String),
    Detail {
        value: String,
        #[serde(default)]
        mode: SetMode,
    },
}

impl EnvEntry {
    pub fn value(&self) -> &str {
        match self {
            EnvEntry::Value(v) | EnvEntry::Detail { value: v, .. } => v,
        }
    }

    pub fn mode(&self) -> SetMode {
        match self {
            EnvEntry::Value(_) => SetMode::Replace,
            EnvEntry::Detail { mode, .. } => *mode,
        }
    }
}

/// A task definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskConfig {
    pub name: String,

    /// Overrides the top-level arch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<Arch>,

    #[serde(default, deserialize_with = "deserialize_steps")]
    pub fetch: Vec<StepConfig>,

    #[serde(default, deserialize_with = "deserialize_steps")]
    pub build: Vec<StepConfig>,
}

/// A step - a command line string or a detailed invocation
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StepConfig {
    /// Shell-like command line, split into words
    Line(String),

    Detail(StepDetail),
}

/// Detailed step specification
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StepDetail {
    /// Program to run
    pub exec: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgConfig>,

    /// Working directory, relative to the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Variables layered over the task environment
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, EnvEntry>,

    /// Directories appended to PATH for this step
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub path: Vec<String>,

    /// Log a failure as a warning and carry on
    #[serde(default)]
    pub ignore_errors: bool,
}

/// A command argument
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ArgConfig {
    Plain(String),
    Detail(ArgDetail),
}

/// Argument with an explicit kind and rendering flags
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArgDetail {
    /// Option name the value belongs to, e.g. `-G` or `/p:Platform=`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cstr: Option<String>,

    /// Hide from the logged command line
    #[serde(default)]
    pub quiet: bool,

    /// Attach to the previous argument
    #[serde(default)]
    pub nospace: bool,

    /// Always quote
    #[serde(default)]
    pub quote: bool,
}

/// The value of an argument, by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgValue<'a> {
    String(&'a str),
    Path(&'a str),
    Url(&'a str),
    CStr(&'a str),
}

impl ArgDetail {
    /// The one value kind this argument names
    pub fn value(&self) -> Result<ArgValue<'_>, String> {
        let kinds = [
            self.string.as_deref().map(ArgValue::String),
            self.path.as_deref().map(ArgValue::Path),
            self.url.as_deref().map(ArgValue::Url),
            self.cstr.as_deref().map(ArgValue::CStr),
        ];

        let mut given = kinds.into_iter().flatten();
        match (given.next(), given.next()) {
            (Some(value), None) => Ok(value),
            (None, _) => Err("argument needs one of string, path, url or cstr".to_string()),
            (Some(_), Some(_)) => {
                Err("argument must have only one of string, path, url or cstr".to_string())
            }
        }
    }
}

/// Custom deserializer for steps that handles both single values and arrays
fn deserialize_steps<'de, D>(deserializer: D) -> Result<Vec<StepConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let value = Value::deserialize(deserializer)?;

    match value {
        // Single command line
        Value::String(s) => Ok(vec![StepConfig::Line(s)]),
        Value::Mapping(_) => {
            let step = StepConfig::deserialize(value).map_err(D::Error::custom)?;
            Ok(vec![step])
        }
        Value::Sequence(seq) => {
            let mut steps = Vec::new();
            for item in seq {
                let step = StepConfig::deserialize(item).map_err(D::Error::custom)?;
                steps.push(step);
            }
            Ok(steps)
        }
        Value::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("steps must be a string, object, or array")),
    }
}

/// A single string or a list of strings
fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let value = Value::deserialize(deserializer)?;

    match value {
        Value::String(s) => Ok(vec![s]),
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|item| String::deserialize(item).map_err(D::Error::custom))
            .collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("expected a string or a list of strings")),
    }
}

/// Map of scalars; numbers and booleans are kept as their text
fn deserialize_scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;

    raw.into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                _ => return Err(D::Error::custom(format!("variable '{}' must be a scalar", key))),
            };
            Ok((key, text))
        })
        .collect()
}
