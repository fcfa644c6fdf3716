//! Common test utilities

#![allow(dead_code)]

use depbuild::config::{parse_config, validate_config};
use depbuild::runner::{Context, RecipeTask, Registry};
use depbuild::ui::{Level, Output};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Create a temporary directory with a depbuild.yml file
pub fn create_test_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("depbuild.yml");
    fs::write(&config_path, content).unwrap();
    (temp_dir, config_path)
}

/// Create a test config in a subdirectory
pub fn create_test_config_in_subdir(content: &str) -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("depbuild.yml");
    let sub_dir = temp_dir.path().join("subdir");

    fs::write(&config_path, content).unwrap();
    fs::create_dir(&sub_dir).unwrap();

    (temp_dir, config_path, sub_dir)
}

/// A registry and a context sharing its interrupt flag, logging to memory
pub fn setup() -> (Registry, Context) {
    let registry = Registry::default();
    let ctx = Context::new(Arc::new(Output::buffered())).with_interrupter(registry.interrupter());
    (registry, ctx)
}

/// Registry holding the recipe tasks of a YAML config
pub fn registry_from(yaml: &str) -> (Registry, Context) {
    let config = parse_config(yaml).unwrap();
    validate_config(&config).unwrap();

    let (mut registry, ctx) = setup();
    for task in config.tasks {
        registry.add(Box::new(RecipeTask::from_config(task, config.arch).unwrap()));
    }
    (registry, ctx)
}

/// Texts of the recorded lines at one level
pub fn texts(ctx: &Context, level: Level) -> Vec<String> {
    ctx.output
        .lines()
        .into_iter()
        .filter(|l| l.level == level)
        .map(|l| l.text)
        .collect()
}
