//! Environment variable sets

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

/// Separator between entries of path-list variables
#[cfg(windows)]
pub const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const PATH_SEPARATOR: char = ':';

const PATH_KEY: &str = "PATH";

/// How [`Environment::set`] combines a new value with an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SetMode {
    /// Overwrite
    #[default]
    Replace,
    /// `existing<sep>value`
    Append,
    /// `value<sep>existing`
    Prepend,
}

/// A set of environment variables with case-insensitive names
///
/// Names keep the case they were first set with. The flat list of pairs
/// handed to child processes is built on first use and dropped on every
/// mutation.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    // folded name -> (original name, value)
    vars: BTreeMap<String, (String, String)>,
    block: OnceLock<Vec<(String, String)>>,
}

fn fold(key: &str) -> String {
    key.to_uppercase()
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment
    pub fn from_process() -> Self {
        let mut env = Self::new();
        for (k, v) in std::env::vars_os() {
            env.set(k.to_string_lossy(), v.to_string_lossy(), SetMode::Replace);
        }
        env
    }

    /// Set a variable; creates it if absent whatever the mode
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        mode: SetMode,
    ) -> &mut Self {
        let key = key.into();
        let value = value.into();
        self.block = OnceLock::new();

        match self.vars.entry(fold(&key)) {
            Entry::Vacant(entry) => {
                entry.insert((key, value));
            }
            Entry::Occupied(mut entry) => {
                let existing = &mut entry.get_mut().1;
                *existing = match mode {
                    SetMode::Replace => value,
                    _ if existing.is_empty() => value,
                    SetMode::Append => format!("{}{}{}", existing, PATH_SEPARATOR, value),
                    SetMode::Prepend => format!("{}{}{}", value, PATH_SEPARATOR, existing),
                };
            }
        }

        self
    }

    /// Append one directory to `PATH`
    pub fn append_path(&mut self, path: impl AsRef<Path>) -> &mut Self {
        let value = path.as_ref().to_string_lossy().into_owned();
        self.set(PATH_KEY, value, SetMode::Append)
    }

    /// Append directories to `PATH`, in order
    pub fn append_paths<I, P>(&mut self, paths: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for p in paths {
            self.append_path(p);
        }
        self
    }

    /// Put one directory in front of `PATH`
    pub fn prepend_path(&mut self, path: impl AsRef<Path>) -> &mut Self {
        let value = path.as_ref().to_string_lossy().into_owned();
        self.set(PATH_KEY, value, SetMode::Prepend)
    }

    /// Apply every variable of `other` as a replacement
    pub fn set_from(&mut self, other: &Environment) {
        for (key, value) in other.iter() {
            self.set(key, value, SetMode::Replace);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(&fold(key)).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(&fold(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.block = OnceLock::new();
        self.vars.remove(&fold(key)).map(|(_, v)| v)
    }

    /// Variables in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.values().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Flat `(name, value)` list given to a child process
    pub fn block(&self) -> &[(String, String)] {
        self.block.get_or_init(|| self.vars.values().cloned().collect())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut env = Environment::new();
        for (k, v) in iter {
            env.set(k, v, SetMode::Replace);
        }
        env
    }
}
