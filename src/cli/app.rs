//! Main CLI application

use crate::config::{
    load_env_file, parse_config_auto, parse_config_file, validate_config, Config,
};
use crate::env::{Environment, SetMode};
use crate::error::{BuildError, Result};
use crate::runner::{Context, Interrupter, RecipeTask, Registry, RunOutcome};
use crate::ui::{console, Output, Verbosity};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Options taken from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Run only this task
    pub task: Option<String>,
    /// Explicit config file
    pub file: Option<PathBuf>,
    /// Verbosity forced by a flag
    pub verbosity: Option<Verbosity>,
    pub dry_run: bool,
    pub list: bool,
}

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("depbuild")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Fetches and builds third-party dependencies with a consistent toolchain environment")
        .arg(
            Arg::new("task")
                .value_name("TASK")
                .help("Run only this task; all tasks run when omitted"),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Path to depbuild.yml config file"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print warnings and errors")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output, including tool output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Log commands instead of running them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .help("List tasks in run order and exit")
                .action(ArgAction::SetTrue),
        )
}

/// Read options from parsed matches
pub fn parse_options(matches: &ArgMatches) -> Options {
    Options {
        task: matches.get_one::<String>("task").cloned(),
        file: matches.get_one::<PathBuf>("file").cloned(),
        verbosity: get_verbosity(matches),
        dry_run: matches.get_flag("dry-run"),
        list: matches.get_flag("list"),
    }
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Option<Verbosity> {
    if matches.get_flag("silent") {
        Some(Verbosity::Silent)
    } else if matches.get_flag("quiet") {
        Some(Verbosity::Quiet)
    } else if matches.get_flag("verbose") {
        Some(Verbosity::Verbose)
    } else {
        None
    }
}

/// Run the CLI application, returning the process exit code
pub fn run() -> i32 {
    run_from(std::env::args_os())
}

/// Run with explicit arguments
pub fn run_from<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match build_command().try_get_matches_from(args) {
        Ok(m) => m,
        Err(e) => {
            // help and version end up here too
            let _ = e.print();
            return e.exit_code();
        }
    };
    let options = parse_options(&matches);

    let color = console::setup();
    let loaded = load_config(&options);

    let verbosity = options.verbosity.unwrap_or(match &loaded {
        Ok((config, _)) if config.verbose => Verbosity::Verbose,
        _ => Verbosity::Normal,
    });

    let mut output = Output::new(verbosity, color);
    if let Ok((config, dir)) = &loaded {
        if let Some(file) = &config.log_file {
            output = output.with_log_file(dir.join(file));
        }
    }
    let output = Arc::new(output);

    // the summary and log file are written on every path out of here
    let _logs = scopeguard::guard(Arc::clone(&output), |output| output.dump_logs());

    let (config, config_dir) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            output.error(e.to_string());
            return 1;
        }
    };

    match execute(config, config_dir, &options, &output) {
        Ok(RunOutcome::Completed) => 0,
        Ok(RunOutcome::Interrupted) => {
            output.warn("interrupted");
            1
        }
        Err(e) if e.is_bail() => {
            output.error("bailing out");
            1
        }
        // already reported by the registry
        Err(BuildError::UnknownTask(_)) => 1,
        Err(e) => {
            output.error(e.to_string());
            1
        }
    }
}

/// Find, parse and validate the config; returns it with its directory
fn load_config(options: &Options) -> Result<(Config, PathBuf)> {
    let (config, path) = match &options.file {
        Some(path) => (parse_config_file(path)?, path.clone()),
        None => parse_config_auto()?,
    };
    validate_config(&config)?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok((config, dir))
}

fn execute(
    config: Config,
    config_dir: PathBuf,
    options: &Options,
    output: &Arc<Output>,
) -> Result<RunOutcome> {
    let mut registry = Registry::new(Interrupter::new());
    for task in config.tasks.iter().cloned() {
        registry.add(Box::new(RecipeTask::from_config(task, config.arch)?));
    }

    if options.list {
        for name in registry.names() {
            println!("{}", name);
        }
        return Ok(RunOutcome::Completed);
    }

    let ambient = ambient_env(&config, &config_dir)?;
    let ctx = Context::new(Arc::clone(output))
        .with_working_dir(config_dir.clone())
        .with_vars(build_vars(&config, &config_dir))
        .with_dry_run(options.dry_run || config.dry)
        .with_vcvars(config.vcvars.as_ref().map(|p| config_dir.join(p)))
        .with_ambient(ambient)
        .with_interrupter(registry.interrupter());

    let ctx = match config.grace_period_ms {
        Some(ms) => ctx.with_grace_period(Duration::from_millis(ms)),
        None => ctx,
    };

    install_interrupt_handler(&registry, output);

    match &options.task {
        Some(name) => registry.run_task(name, &ctx),
        None => registry.run_all_tasks(&ctx),
    }
}

/// Process environment, then `.env`, then the config's `env` and `path`
fn ambient_env(config: &Config, config_dir: &Path) -> Result<Environment> {
    let mut env = Environment::from_process();

    for (key, value) in load_env_file(config_dir)? {
        env.set(key, value, SetMode::Replace);
    }

    for (key, entry) in &config.env {
        env.set(key.as_str(), entry.value(), entry.mode());
    }

    // first listed ends up first
    for dir in config.path.iter().rev() {
        env.prepend_path(config_dir.join(dir));
    }

    Ok(env)
}

fn build_vars(config: &Config, config_dir: &Path) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = config
        .vars
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    vars.insert("arch".to_string(), config.arch.to_string());
    vars.insert(
        "config_dir".to_string(),
        config_dir.to_string_lossy().into_owned(),
    );
    vars
}

/// Raise the registry's interrupt flag on Ctrl-C or a termination request
fn install_interrupt_handler(registry: &Registry, output: &Arc<Output>) {
    let interrupter = registry.interrupter();
    let handler_output = Arc::clone(output);

    let installed = ctrlc::set_handler(move || {
        handler_output.info("caught interrupt");
        interrupter.interrupt();
    });

    if let Err(e) = installed {
        output.warn(format!("can't install the interrupt handler, {}", e));
    }
}
