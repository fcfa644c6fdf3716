//! Task registry and runner
//!
//! Tasks run one at a time in registration order. The registry owns every
//! task for the lifetime of the run and shares an [`Interrupter`] with the
//! termination handler. When a run starts, the registry adopts the
//! context's flag, so there is one flag for the handler, the registry and
//! every process wait.

use crate::error::{BuildError, Result};
use crate::runner::{run_lifecycle, Context, Interrupter, Task, TaskState};
use std::time::Instant;

struct Entry {
    task: Box<dyn Task>,
    state: TaskState,
}

/// How a run ended when it did not bail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Interrupted,
}

/// Ordered set of tasks
pub struct Registry {
    entries: Vec<Entry>,
    interrupter: Interrupter,
}

impl Registry {
    pub fn new(interrupter: Interrupter) -> Self {
        Registry {
            entries: Vec::new(),
            interrupter,
        }
    }

    /// Register a task type at the end of the run order
    pub fn add_task<T: Task + Default + 'static>(&mut self) -> &mut Self {
        self.add(Box::new(T::default()))
    }

    /// Register a task instance at the end of the run order
    pub fn add(&mut self, task: Box<dyn Task>) -> &mut Self {
        self.entries.push(Entry {
            task,
            state: TaskState::Idle,
        });
        self
    }

    /// Task names in run order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.task.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// State of a registered task
    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.entries
            .iter()
            .find(|e| e.task.name() == name)
            .map(|e| e.state)
    }

    /// A handle on the interrupt flag, for the termination handler
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Flag every running task as interrupted
    ///
    /// Only raises the shared flag. The running task notices at its next
    /// process wait and unwinds on the run thread.
    pub fn interrupt_all(&self) {
        self.interrupter.interrupt();
    }

    /// Run the full lifecycle of one task
    pub fn run_task(&mut self, name: &str, ctx: &Context) -> Result<RunOutcome> {
        let Some(index) = self.entries.iter().position(|e| e.task.name() == name) else {
            ctx.output.error(format!("unknown task '{}'", name));
            return Err(BuildError::UnknownTask(name.to_string()));
        };

        self.adopt_interrupter(ctx);
        self.run_entry(index, ctx)
    }

    /// Run every task in registration order
    ///
    /// Stops at the first interruption; a bail is returned to the caller
    /// without starting later tasks.
    pub fn run_all_tasks(&mut self, ctx: &Context) -> Result<RunOutcome> {
        self.adopt_interrupter(ctx);
        for index in 0..self.entries.len() {
            if self.run_entry(index, ctx)? == RunOutcome::Interrupted {
                return Ok(RunOutcome::Interrupted);
            }
        }

        Ok(RunOutcome::Completed)
    }

    /// Make the context's flag the registry's own
    ///
    /// Handles given out earlier keep working: the old flag forwards to the
    /// context's, including an interrupt that is already pending.
    fn adopt_interrupter(&mut self, ctx: &Context) {
        let current = ctx.interrupter();
        if self.interrupter.shares(current) {
            return;
        }

        self.interrupter.forward_to(current);
        self.interrupter = current.clone();
    }

    fn run_entry(&mut self, index: usize, ctx: &Context) -> Result<RunOutcome> {
        let entry = &mut self.entries[index];
        let name = entry.task.name().to_string();

        if ctx.is_interrupted() {
            entry.state = TaskState::Interrupted;
            ctx.output.warn(format!("{}: not started, run interrupted", name));
            return Ok(RunOutcome::Interrupted);
        }

        ctx.output.info(format!("running task {}", name));
        let started = Instant::now();

        match run_lifecycle(entry.task.as_mut(), ctx, &mut entry.state) {
            Ok(()) => {
                ctx.output.info(format!(
                    "{}: done in {:.1}s",
                    name,
                    started.elapsed().as_secs_f64()
                ));
                Ok(RunOutcome::Completed)
            }
            Err(e) if e.is_interrupted() => Ok(RunOutcome::Interrupted),
            Err(e) => Err(e),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Interrupter::new())
    }
}
