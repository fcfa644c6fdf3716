//! Configuration file parsing and discovery

use crate::config::types::Config;
use crate::error::{BuildError, ConfigError, ConfigResult};
use directories::ProjectDirs;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["depbuild.yml", "depbuild.yaml"];

/// Environment file read next to the configuration file
pub const ENV_FILE_NAME: &str = ".env";

/// Find the configuration file by searching current and parent directories,
/// then the user configuration directory
pub fn find_config_file() -> ConfigResult<PathBuf> {
    let current = env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("Failed to get current directory: {}", e))
    })?;

    match find_config_file_from(current) {
        Ok(path) => Ok(path),
        Err(ConfigError::NotFound(searched)) => {
            let Some(dir) = user_config_dir() else {
                return Err(ConfigError::NotFound(searched));
            };
            find_in_dir(&dir).ok_or_else(|| {
                ConfigError::NotFound(format!("{}, {}", searched, dir.display()))
            })
        }
        Err(e) => Err(e),
    }
}

/// Find the configuration file starting from a specific directory
pub fn find_config_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        if let Some(found) = find_in_dir(&current_dir) {
            return Ok(found);
        }
        searched_paths.push(current_dir.display().to_string());

        // Try parent directory
        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Per-user configuration directory, e.g. `~/.config/depbuild`
pub fn user_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "depbuild").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Parse a configuration file from a path
pub fn parse_config_file(path: &Path) -> Result<Config, BuildError> {
    let contents = fs::read_to_string(path).map_err(|e| {
        ConfigError::Invalid(format!("Failed to read {}: {}", path.display(), e))
    })?;

    parse_config(&contents)
}

/// Parse configuration from a string
pub fn parse_config(yaml: &str) -> Result<Config, BuildError> {
    // an empty file is an empty configuration
    if yaml.trim().is_empty() {
        return Ok(Config::default());
    }

    let config: Config = serde_yaml::from_str(yaml)?;
    Ok(config)
}

/// Parse configuration with automatic file discovery
pub fn parse_config_auto() -> Result<(Config, PathBuf), BuildError> {
    let config_path = find_config_file()?;
    let config = parse_config_file(&config_path)?;
    Ok((config, config_path))
}

/// Read `.env` from `dir`; a missing file yields nothing
pub fn load_env_file(dir: &Path) -> ConfigResult<Vec<(String, String)>> {
    let path = dir.join(ENV_FILE_NAME);
    if !path.is_file() {
        return Ok(Vec::new());
    }

    let to_error = |e: dotenvy::Error| ConfigError::EnvFile {
        path: path.clone(),
        error: e.to_string(),
    };

    dotenvy::from_path_iter(&path)
        .map_err(to_error)?
        .map(|item| item.map_err(to_error))
        .collect()
}
