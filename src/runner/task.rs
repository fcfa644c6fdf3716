//! Task abstraction and lifecycle
//!
//! A task is a named unit of work with a fetch phase and a build phase. The
//! lifecycle driver below runs both phases, tracks the task state and turns
//! failures into the outcome the runner acts on.

use crate::error::{BuildError, ExecutionError, Result};
use crate::runner::Context;
use crate::ui::Level;
use std::fmt;

/// A unit of work run by the registry
pub trait Task: Send {
    /// Unique task name
    fn name(&self) -> &str;

    /// Download or otherwise prepare sources; nothing by default
    fn fetch(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    /// Everything from extraction to installation
    fn build(&mut self, ctx: &Context) -> Result<()>;
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetch,
    Build,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Fetch => write!(f, "fetch"),
            Phase::Build => write!(f, "build"),
        }
    }
}

/// Where a task is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Idle,
    Fetching,
    Fetched,
    FetchFailed,
    Building,
    BuildFailed,
    Done,
    Interrupted,
}

impl TaskState {
    /// No further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::FetchFailed
                | TaskState::BuildFailed
                | TaskState::Done
                | TaskState::Interrupted
        )
    }

    fn running(phase: Phase) -> Self {
        match phase {
            Phase::Fetch => TaskState::Fetching,
            Phase::Build => TaskState::Building,
        }
    }

    fn finished(phase: Phase) -> Self {
        match phase {
            Phase::Fetch => TaskState::Fetched,
            Phase::Build => TaskState::Done,
        }
    }

    fn failed(phase: Phase) -> Self {
        match phase {
            Phase::Fetch => TaskState::FetchFailed,
            Phase::Build => TaskState::BuildFailed,
        }
    }
}

/// Run both phases of a task, updating `state` as it goes
///
/// Interruption ends in [`TaskState::Interrupted`] and returns
/// [`ExecutionError::Interrupted`]. Any other failure leaves the task in the
/// failed state of its phase and is returned as a bail, so the run stops.
pub fn run_lifecycle(task: &mut dyn Task, ctx: &Context, state: &mut TaskState) -> Result<()> {
    for phase in [Phase::Fetch, Phase::Build] {
        if ctx.is_interrupted() {
            *state = TaskState::Interrupted;
            return Err(ExecutionError::Interrupted.into());
        }

        *state = TaskState::running(phase);
        ctx.output.debug(format!("{}: {}", task.name(), phase));

        let result = match phase {
            Phase::Fetch => task.fetch(ctx),
            Phase::Build => task.build(ctx),
        };

        if let Err(e) = result {
            return Err(phase_failed(task.name(), phase, e, ctx, state));
        }

        *state = TaskState::finished(phase);
    }

    Ok(())
}

fn phase_failed(
    name: &str,
    phase: Phase,
    err: BuildError,
    ctx: &Context,
    state: &mut TaskState,
) -> BuildError {
    if err.is_interrupted() {
        *state = TaskState::Interrupted;
        ctx.output.warn(format!("{}: interrupted during {}", name, phase));
        return err;
    }

    *state = TaskState::failed(phase);

    if err.is_bail() {
        return err;
    }

    match &err {
        BuildError::Execution(e) => match e.io_error() {
            Some(source) => ctx.output.out_io(Level::Error, &e.to_string(), source),
            None => ctx.output.error(e.to_string()),
        },
        BuildError::Io(e) => ctx.output.out_io(Level::Error, "I/O error", e),
        _ => ctx.output.error(err.to_string()),
    }

    ctx.output
        .bail(format!("task '{}' failed during {}", name, phase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::Output;
    use std::sync::Arc;

    #[derive(Default)]
    struct Scripted {
        fetch_error: Option<fn() -> BuildError>,
        build_error: Option<fn() -> BuildError>,
        built: bool,
    }

    impl Task for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch(&mut self, _ctx: &Context) -> Result<()> {
            match self.fetch_error {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }

        fn build(&mut self, _ctx: &Context) -> Result<()> {
            if let Some(make) = self.build_error {
                return Err(make());
            }
            self.built = true;
            Ok(())
        }
    }

    fn context() -> Context {
        Context::new(Arc::new(Output::buffered()))
    }

    #[test]
    fn test_successful_lifecycle() {
        let ctx = context();
        let mut task = Scripted::default();
        let mut state = TaskState::Idle;

        run_lifecycle(&mut task, &ctx, &mut state).unwrap();
        assert_eq!(state, TaskState::Done);
        assert!(task.built);
    }

    #[test]
    fn test_tool_failure_escalates_to_bail() {
        let ctx = context();
        let mut task = Scripted {
            build_error: Some(|| {
                ExecutionError::ToolFailed {
                    program: "nmake".to_string(),
                    code: 2,
                }
                .into()
            }),
            ..Default::default()
        };
        let mut state = TaskState::Idle;

        let err = run_lifecycle(&mut task, &ctx, &mut state).unwrap_err();
        assert!(err.is_bail());
        assert_eq!(err.to_string(), "task 'scripted' failed during build");
        assert_eq!(state, TaskState::BuildFailed);
        assert_eq!(ctx.output.count(Level::Error), 1);
    }

    #[test]
    fn test_spawn_failure_logs_os_error_once() {
        let ctx = context();
        let mut task = Scripted {
            fetch_error: Some(|| {
                ExecutionError::Spawn {
                    program: "git".to_string(),
                    source: std::io::Error::from_raw_os_error(2),
                }
                .into()
            }),
            ..Default::default()
        };
        let mut state = TaskState::Idle;

        let err = run_lifecycle(&mut task, &ctx, &mut state).unwrap_err();
        assert!(err.is_bail());

        let errors: Vec<String> = ctx
            .output
            .lines()
            .into_iter()
            .filter(|l| l.level == Level::Error)
            .map(|l| l.text)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("failed to start 'git', "));
        assert_eq!(errors[0].matches("os error 2").count(), 1);
    }

    #[test]
    fn test_bail_in_fetch_skips_build() {
        let ctx = context();
        let mut task = Scripted {
            fetch_error: Some(|| BuildError::Bail("no network".to_string())),
            ..Default::default()
        };
        let mut state = TaskState::Idle;

        let err = run_lifecycle(&mut task, &ctx, &mut state).unwrap_err();
        assert!(err.is_bail());
        assert_eq!(state, TaskState::FetchFailed);
        assert!(!task.built);
    }

    #[test]
    fn test_interruption_is_not_failure() {
        let ctx = context();
        let mut task = Scripted {
            build_error: Some(|| ExecutionError::Interrupted.into()),
            ..Default::default()
        };
        let mut state = TaskState::Idle;

        let err = run_lifecycle(&mut task, &ctx, &mut state).unwrap_err();
        assert!(err.is_interrupted());
        assert_eq!(state, TaskState::Interrupted);
        assert_eq!(ctx.output.count(Level::Bail), 0);
    }

    #[test]
    fn test_interrupted_before_start() {
        let ctx = context();
        ctx.interrupter().interrupt();
        let mut task = Scripted::default();
        let mut state = TaskState::Idle;

        assert!(run_lifecycle(&mut task, &ctx, &mut state).is_err());
        assert_eq!(state, TaskState::Interrupted);
        assert!(!task.built);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Done.is_terminal());
        assert!(TaskState::Interrupted.is_terminal());
        assert!(!TaskState::Fetched.is_terminal());
        assert!(!TaskState::Idle.is_terminal());
    }
}
