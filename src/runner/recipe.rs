//! Tasks described by the configuration file
//!
//! A recipe task is a list of fetch steps and a list of build steps. Each
//! step becomes one child process, run with the ambient environment, the
//! toolchain for the task's architecture and the step's own variables.

use crate::config::{ArgConfig, ArgDetail, ArgValue, EnvEntry, StepConfig, StepDetail, TaskConfig};
use crate::env::{Arch, Environment};
use crate::error::{ConfigError, ConfigResult, Result};
use crate::runner::command::CommandArg;
use crate::runner::{process, ArgFlags, CommandLine, Context, Task};
use crate::ui::Level;
use std::ffi::CString;
use std::path::PathBuf;
use url::Url;

/// A task built from configuration
#[derive(Debug, Clone)]
pub struct RecipeTask {
    name: String,
    arch: Arch,
    fetch: Vec<StepDetail>,
    build: Vec<StepDetail>,
}

impl RecipeTask {
    /// Create a task from its configuration; `default_arch` applies when the
    /// task doesn't name one
    pub fn from_config(config: TaskConfig, default_arch: Arch) -> ConfigResult<Self> {
        let name = config.name;
        let steps = |list: Vec<StepConfig>| -> ConfigResult<Vec<StepDetail>> {
            list.into_iter().map(|s| to_detail(&name, s)).collect()
        };

        let fetch = steps(config.fetch)?;
        let build = steps(config.build)?;

        Ok(RecipeTask {
            arch: config.arch.unwrap_or(default_arch),
            fetch,
            build,
            name,
        })
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    fn run_steps(&self, steps: &[StepDetail], ctx: &Context) -> Result<()> {
        for step in steps {
            self.run_step(step, ctx)?;
        }
        Ok(())
    }

    fn run_step(&self, step: &StepDetail, ctx: &Context) -> Result<()> {
        let cmd = build_command(step, ctx)?;

        if ctx.dry_run {
            ctx.output.info(format!("(dry run) {}", cmd.display()));
            return Ok(());
        }

        let env = step_env(step, self.arch, ctx)?;
        let cwd = match &step.dir {
            Some(dir) => ctx.working_dir.join(ctx.interpolate(dir)?),
            None => ctx.working_dir.clone(),
        };

        match process::execute_checked(&cmd, &env, Some(&cwd), ctx) {
            Ok(()) => Ok(()),
            Err(e) if step.ignore_errors && !e.is_interrupted() => {
                let message = format!("{}: ignoring failure, {}", self.name, e);
                match e.io_error() {
                    Some(source) => ctx.output.out_io(Level::Warning, &message, source),
                    None => ctx.output.warn(message),
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Task for RecipeTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&mut self, ctx: &Context) -> Result<()> {
        self.run_steps(&self.fetch, ctx)
    }

    fn build(&mut self, ctx: &Context) -> Result<()> {
        self.run_steps(&self.build, ctx)
    }
}

/// Command line strings are split like a POSIX shell would
fn to_detail(task: &str, step: StepConfig) -> ConfigResult<StepDetail> {
    match step {
        StepConfig::Detail(detail) => Ok(detail),
        StepConfig::Line(line) => {
            let mut words = shlex::split(&line).unwrap_or_default().into_iter();
            let exec = words.next().ok_or_else(|| ConfigError::InvalidStep {
                task: task.to_string(),
                error: format!("can't parse command line '{}'", line),
            })?;

            Ok(StepDetail {
                exec,
                args: words.map(ArgConfig::Plain).collect(),
                ..Default::default()
            })
        }
    }
}

fn build_command(step: &StepDetail, ctx: &Context) -> Result<CommandLine> {
    let mut cmd = CommandLine::new(&ctx.interpolate(&step.exec)?);

    for arg in &step.args {
        match arg {
            ArgConfig::Plain(s) => {
                cmd.arg(&ctx.interpolate(s)?);
            }
            ArgConfig::Detail(detail) => push_detail(&mut cmd, detail, ctx)?,
        }
    }

    Ok(cmd)
}

fn push_detail(cmd: &mut CommandLine, detail: &ArgDetail, ctx: &Context) -> Result<()> {
    let mut flags = ArgFlags::NONE;
    if detail.quiet {
        flags = flags | ArgFlags::QUIET;
    }
    if detail.nospace {
        flags = flags | ArgFlags::NOSPACE;
    }
    if detail.quote {
        flags = flags | ArgFlags::QUOTE;
    }

    let name = match &detail.name {
        Some(n) => ctx.interpolate(n)?,
        None => String::new(),
    };

    let value = detail
        .value()
        .map_err(|e| ctx.output.bail(format!("bad argument, {}", e)))?;

    match value {
        ArgValue::String(s) => push(cmd, &name, &ctx.interpolate(s)?, flags),
        ArgValue::Path(s) => push(cmd, &name, &PathBuf::from(ctx.interpolate(s)?), flags),
        ArgValue::Url(s) => {
            let text = ctx.interpolate(s)?;
            let url = Url::parse(&text)
                .map_err(|e| ctx.output.bail(format!("bad url '{}', {}", text, e)))?;
            push(cmd, &name, &url, flags);
        }
        ArgValue::CStr(s) => {
            let cstr = CString::new(ctx.interpolate(s)?)
                .map_err(|e| ctx.output.bail(format!("bad cstr argument, {}", e)))?;
            push(cmd, &name, &cstr, flags);
        }
    }

    Ok(())
}

fn push<T: CommandArg + ?Sized>(cmd: &mut CommandLine, name: &str, value: &T, flags: ArgFlags) {
    if name.is_empty() {
        cmd.arg_with(value, flags);
    } else {
        cmd.named_with(name, value, flags);
    }
}

/// Ambient and toolchain environment with the step's variables on top
fn step_env(step: &StepDetail, arch: Arch, ctx: &Context) -> Result<Environment> {
    let mut env = ctx.env_for(arch)?;

    for (key, entry) in &step.env {
        apply_entry(&mut env, key, entry, ctx)?;
    }

    for dir in &step.path {
        env.append_path(ctx.interpolate(dir)?);
    }

    Ok(env)
}

fn apply_entry(env: &mut Environment, key: &str, entry: &EnvEntry, ctx: &Context) -> Result<()> {
    env.set(key, ctx.interpolate(entry.value())?, entry.mode());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SetMode;
    use crate::runner::{run_lifecycle, TaskState};
    use crate::ui::Output;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn task(yaml: &str) -> RecipeTask {
        let config: TaskConfig = serde_yaml::from_str(yaml).unwrap();
        RecipeTask::from_config(config, Arch::DontCare).unwrap()
    }

    fn context() -> Context {
        let mut vars = HashMap::new();
        vars.insert("prefix".to_string(), "/opt/dev".to_string());
        Context::new(Arc::new(Output::buffered())).with_vars(vars)
    }

    #[test]
    fn test_line_steps_are_split() {
        let t = task("{name: zlib, build: 'cmake -G \"NMake Makefiles\" ..'}");
        assert_eq!(t.build[0].exec, "cmake");
        assert_eq!(t.build[0].args.len(), 3);
        assert_eq!(t.arch(), Arch::DontCare);
    }

    #[test]
    fn test_task_arch_overrides_default() {
        let config: TaskConfig = serde_yaml::from_str("{name: zlib, arch: x86}").unwrap();
        let t = RecipeTask::from_config(config, Arch::X64).unwrap();
        assert_eq!(t.arch(), Arch::X86);
    }

    #[test]
    fn test_command_is_interpolated() {
        let t = task(
            r#"
name: zlib
build:
  - exec: cmake
    args:
      - name: -DCMAKE_INSTALL_PREFIX=
        path: ${prefix}
      - string: secret
        quiet: true
"#,
        );
        let ctx = context();
        let cmd = build_command(&t.build[0], &ctx).unwrap();
        assert_eq!(cmd.args()[0], "-DCMAKE_INSTALL_PREFIX=/opt/dev");
        assert_eq!(cmd.display(), "cmake -DCMAKE_INSTALL_PREFIX=/opt/dev");
    }

    #[test]
    fn test_bad_url_bails() {
        let t = task(
            r#"
name: zlib
fetch:
  - exec: curl
    args:
      - url: ${prefix}
"#,
        );
        let ctx = context();
        let err = build_command(&t.fetch[0], &ctx).unwrap_err();
        assert!(err.is_bail());
    }

    #[test]
    fn test_undefined_variable_fails_step() {
        let t = task("{name: zlib, build: 'echo ${nope}'}");
        let ctx = context();
        assert!(build_command(&t.build[0], &ctx).is_err());
    }

    #[test]
    fn test_step_env_layers_entries() {
        let t = task(
            r#"
name: zlib
build:
  - exec: nmake
    env:
      CL: /MP
      INCLUDE:
        value: ${prefix}/include
        mode: append
    path: ${prefix}/bin
"#,
        );
        let mut ambient = Environment::new();
        ambient.set("INCLUDE", "/usr/include", SetMode::Replace);
        let ctx = context().with_ambient(ambient);

        let env = step_env(&t.build[0], Arch::DontCare, &ctx).unwrap();
        assert_eq!(env.get("CL"), Some("/MP"));
        assert_eq!(
            env.get("INCLUDE").unwrap(),
            format!("/usr/include{}/opt/dev/include", crate::env::PATH_SEPARATOR)
        );
        assert_eq!(env.get("PATH"), Some("/opt/dev/bin"));
    }

    #[test]
    fn test_dry_run_spawns_nothing() {
        let mut t = task("{name: zlib, build: depbuild-no-such-program}");
        let ctx = context().with_dry_run(true);
        let mut state = TaskState::Idle;

        run_lifecycle(&mut t, &ctx, &mut state).unwrap();
        assert_eq!(state, TaskState::Done);
        assert!(ctx
            .output
            .lines()
            .iter()
            .any(|l| l.text == "(dry run) depbuild-no-such-program"));
    }

    #[cfg(unix)]
    #[test]
    fn test_ignore_errors_continues() {
        let mut t = task(
            r#"
name: zlib
build:
  - exec: sh
    args: [-c, exit 4]
    ignore_errors: true
  - exec: sh
    args: [-c, echo second]
"#,
        );
        let ctx = context();
        let mut state = TaskState::Idle;

        run_lifecycle(&mut t, &ctx, &mut state).unwrap();
        assert_eq!(state, TaskState::Done);
        assert_eq!(ctx.output.count(Level::Warning), 1);
        assert!(ctx.output.lines().iter().any(|l| l.text == "second"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_step_bails() {
        let mut t = task("{name: zlib, build: ['sh -c \"exit 4\"', 'sh -c \"echo never\"']}");
        let ctx = context();
        let mut state = TaskState::Idle;

        let err = run_lifecycle(&mut t, &ctx, &mut state).unwrap_err();
        assert!(err.is_bail());
        assert_eq!(state, TaskState::BuildFailed);
        assert!(!ctx.output.lines().iter().any(|l| l.text == "never"));
    }
}
