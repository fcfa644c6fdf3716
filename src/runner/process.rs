//! Child process execution
//!
//! Spawns a [`CommandLine`] with an explicit [`Environment`], streams its
//! output into the context's output channel line by line and waits for it.
//! The wait polls the interrupt flag until the child has exited and its
//! pipes are closed. Once raised, the child's process tree is asked to stop
//! and is killed if it is still running after the grace period.

use crate::env::Environment;
use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::{CommandLine, Context};
use crate::ui::Output;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command as StdCommand, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Output captured from a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub code: i32,
    pub stdout: String,
}

/// Run a command and return its exit code
///
/// Errors are either infrastructure failures (the process never ran) or
/// [`ExecutionError::Interrupted`]; a non-zero exit code is not an error
/// here.
pub fn execute(
    cmd: &CommandLine,
    env: &Environment,
    cwd: Option<&Path>,
    ctx: &Context,
) -> ExecutionResult<i32> {
    run(cmd, env, cwd, ctx, false).map(|c| c.code)
}

/// Run a command and turn a non-zero exit code into
/// [`ExecutionError::ToolFailed`]
pub fn execute_checked(
    cmd: &CommandLine,
    env: &Environment,
    cwd: Option<&Path>,
    ctx: &Context,
) -> ExecutionResult<()> {
    match execute(cmd, env, cwd, ctx)? {
        0 => Ok(()),
        code => Err(ExecutionError::ToolFailed {
            program: cmd.program().to_string(),
            code,
        }),
    }
}

/// Run a command, collecting its stdout instead of logging it
pub fn capture(
    cmd: &CommandLine,
    env: &Environment,
    cwd: Option<&Path>,
    ctx: &Context,
) -> ExecutionResult<Captured> {
    run(cmd, env, cwd, ctx, true)
}

fn run(
    cmd: &CommandLine,
    env: &Environment,
    cwd: Option<&Path>,
    ctx: &Context,
    capture_stdout: bool,
) -> ExecutionResult<Captured> {
    if ctx.is_interrupted() {
        return Err(ExecutionError::Interrupted);
    }

    let output = ctx.output.as_ref();
    output.info(format!("> {}", cmd.display()));
    if let Some(dir) = cwd {
        output.debug(format!("  (in {})", dir.display()));
    }

    let mut command = std_command(cmd, env, cwd);
    let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
        program: cmd.program().to_string(),
        source,
    })?;
    let tree = ProcessTree::new(&child, output);

    // readers are detached: an interrupted run does not wait for the pipes
    let (tx, events) = mpsc::channel();
    if let Some(pipe) = child.stdout.take() {
        spawn_reader(pipe, Stream::Stdout, tx.clone());
    }
    if let Some(pipe) = child.stderr.take() {
        spawn_reader(pipe, Stream::Stderr, tx);
    }

    let mut run = Supervised {
        program: cmd.program(),
        child,
        tree,
        events,
        output,
        capture_stdout,
        status: None,
        pipes_open: true,
        read_error: None,
        stdout: String::new(),
    };

    run.supervise(ctx)?;

    if let Some(source) = run.read_error {
        return Err(ExecutionError::Wait {
            program: cmd.program().to_string(),
            source,
        });
    }

    Ok(Captured {
        code: run.status.unwrap_or(-1),
        stdout: run.stdout,
    })
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

enum Event {
    Line(Stream, String),
    Failed(io::Error),
}

/// A spawned child, its process tree and the pipes still being read
struct Supervised<'a> {
    program: &'a str,
    child: Child,
    tree: ProcessTree,
    events: Receiver<Event>,
    output: &'a Output,
    capture_stdout: bool,
    /// Exit code once the direct child has been reaped
    status: Option<i32>,
    /// Until both readers hit end of file
    pipes_open: bool,
    read_error: Option<io::Error>,
    stdout: String,
}

impl Supervised<'_> {
    /// Run until the child exited and both pipes closed, or the run is
    /// interrupted
    fn supervise(&mut self, ctx: &Context) -> ExecutionResult<()> {
        while self.status.is_none() || self.pipes_open {
            if ctx.is_interrupted() {
                self.terminate(ctx.grace_period);
                return Err(ExecutionError::Interrupted);
            }

            self.pump(POLL_INTERVAL);
            self.poll_child()?;
        }

        Ok(())
    }

    /// Handle at most one reader event, waiting up to `timeout` for it
    fn pump(&mut self, timeout: Duration) {
        if !self.pipes_open {
            if self.status.is_none() {
                thread::sleep(timeout);
            }
            return;
        }

        match self.events.recv_timeout(timeout) {
            Ok(Event::Line(Stream::Stdout, line)) if self.capture_stdout => {
                self.stdout.push_str(&line);
                self.stdout.push('\n');
            }
            Ok(Event::Line(Stream::Stdout, line)) => self.output.debug(line),
            Ok(Event::Line(Stream::Stderr, line)) => self.output.info(line),
            Ok(Event::Failed(e)) => {
                if self.read_error.is_none() {
                    self.read_error = Some(e);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            // both readers are done
            Err(RecvTimeoutError::Disconnected) => self.pipes_open = false,
        }
    }

    fn poll_child(&mut self) -> ExecutionResult<()> {
        if self.status.is_some() {
            return Ok(());
        }

        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.status = Some(exit_code(status));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(source) => {
                self.tree.kill(&mut self.child, false, self.output);
                let _ = self.child.wait();
                Err(ExecutionError::Wait {
                    program: self.program.to_string(),
                    source,
                })
            }
        }
    }

    /// Ask the tree to stop, then kill it once the grace period runs out
    ///
    /// Done when the child is reaped and its pipes are closed; a grandchild
    /// still holding a pipe keeps the tree alive.
    fn terminate(&mut self, grace_period: Duration) {
        let pid = self.child.id();
        self.output.debug(format!("asking process {} to stop", pid));
        self.tree.request_stop();

        let deadline = Instant::now() + grace_period;
        while Instant::now() < deadline {
            self.pump(POLL_INTERVAL);
            if self.poll_child().is_err() {
                return;
            }
            if self.status.is_some() && !self.pipes_open {
                return;
            }
        }

        self.output.warn(format!(
            "process {} still running after {}ms, killing it",
            pid,
            grace_period.as_millis()
        ));
        let reaped = self.status.is_some();
        self.tree.kill(&mut self.child, reaped, self.output);
        if !reaped {
            let _ = self.child.wait();
        }
    }
}

/// Forward complete lines, lossily decoded, without line terminators
fn spawn_reader<R: Read + Send + 'static>(pipe: R, stream: Stream, tx: Sender<Event>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let event = match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    Event::Line(stream, line.trim_end_matches(['\r', '\n']).to_string())
                }
                Err(e) => Event::Failed(e),
            };

            // stop after a read error, or once the run stopped listening
            let failed = matches!(event, Event::Failed(_));
            if tx.send(event).is_err() || failed {
                break;
            }
        }
    });
}

/// Build the std command; the environment replaces the inherited one
fn std_command(cmd: &CommandLine, env: &Environment, cwd: Option<&Path>) -> StdCommand {
    let mut command = StdCommand::new(cmd.program());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        use winapi::um::winbase::CREATE_NEW_PROCESS_GROUP;

        if !cmd.args_line().is_empty() {
            command.raw_arg(cmd.args_line());
        }
        command.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;

        command.args(cmd.args());
        // own process group, so a stop request reaches grandchildren too
        command.process_group(0);
    }

    command
        .env_clear()
        .envs(env.block().iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    command
}

fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    status.code().unwrap_or(-1)
}

/// The child and everything it started
///
/// On unix that is the child's own process group. On Windows the child is
/// placed in a job object, so a forced kill takes the whole tree.
struct ProcessTree {
    pid: u32,
    #[cfg(windows)]
    job: Option<job::Job>,
}

impl ProcessTree {
    #[cfg(unix)]
    fn new(child: &Child, _output: &Output) -> Self {
        ProcessTree { pid: child.id() }
    }

    #[cfg(windows)]
    fn new(child: &Child, output: &Output) -> Self {
        let job = match job::Job::assign(child) {
            Ok(job) => Some(job),
            Err(e) => {
                output.debug(format!("process {} runs outside a job, {}", child.id(), e));
                None
            }
        };
        ProcessTree {
            pid: child.id(),
            job,
        }
    }

    #[cfg(unix)]
    fn request_stop(&self) {
        self.signal(libc::SIGTERM);
    }

    #[cfg(windows)]
    fn request_stop(&self) {
        use winapi::um::wincon::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};

        // SAFETY: the child was created with its own process group, whose id
        // is the child's process id.
        unsafe {
            GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, self.pid);
        }
    }

    /// Kill the tree; `reaped` says the direct child is already gone
    #[cfg(unix)]
    fn kill(&self, child: &mut Child, reaped: bool, output: &Output) {
        self.signal(libc::SIGKILL);
        if reaped {
            return;
        }
        if let Err(e) = child.kill() {
            if e.kind() != io::ErrorKind::InvalidInput {
                output.warn(format!("failed to kill process {}, {}", self.pid, e));
            }
        }
    }

    #[cfg(windows)]
    fn kill(&self, child: &mut Child, reaped: bool, output: &Output) {
        if let Some(job) = &self.job {
            match job.terminate() {
                Ok(()) => return,
                Err(e) => output.warn(format!(
                    "failed to kill the job of process {}, {}",
                    self.pid, e
                )),
            }
        }
        if reaped {
            return;
        }
        if let Err(e) = child.kill() {
            output.warn(format!("failed to kill process {}, {}", self.pid, e));
        }
    }

    #[cfg(unix)]
    fn signal(&self, signal: libc::c_int) {
        if let Ok(pid) = libc::pid_t::try_from(self.pid) {
            // SAFETY: signalling the process group created for this child.
            // The group id stays reserved while any member is alive.
            unsafe {
                libc::kill(-pid, signal);
            }
        }
    }
}

#[cfg(windows)]
mod job {
    use std::io;
    use std::os::windows::io::AsRawHandle;
    use std::process::Child;
    use std::ptr;
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::jobapi2::{AssignProcessToJobObject, CreateJobObjectW, TerminateJobObject};
    use winapi::um::winnt::HANDLE;

    /// Owned job object handle
    pub struct Job(HANDLE);

    impl Job {
        pub fn assign(child: &Child) -> io::Result<Job> {
            // SAFETY: an anonymous job with default security; the handle is
            // owned by the returned value and closed on drop.
            let handle = unsafe { CreateJobObjectW(ptr::null_mut(), ptr::null()) };
            if handle.is_null() {
                return Err(io::Error::last_os_error());
            }
            let job = Job(handle);

            // SAFETY: both handles are valid for the duration of the call.
            let assigned =
                unsafe { AssignProcessToJobObject(job.0, child.as_raw_handle() as HANDLE) };
            if assigned == 0 {
                return Err(io::Error::last_os_error());
            }

            Ok(job)
        }

        pub fn terminate(&self) -> io::Result<()> {
            // SAFETY: the handle is open until drop.
            if unsafe { TerminateJobObject(self.0, 1) } == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    }

    impl Drop for Job {
        fn drop(&mut self) {
            // SAFETY: closed exactly once.
            unsafe {
                CloseHandle(self.0);
            }
        }
    }
}
