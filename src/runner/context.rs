//! Execution context for a build run
//!
//! The context owns everything tasks share: the output channel, the ambient
//! environment, the interrupt flag and the per-architecture toolchain
//! environments captured so far.

use crate::env::{toolchain, Arch, Environment, SetMode};
use crate::error::{InterpolationResult, Result};
use crate::runner::{interpolate, Interrupter};
use crate::ui::Output;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Time a child gets to exit after being asked to stop
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(3000);

/// State shared by every task of a run
pub struct Context {
    /// Log channel
    pub output: Arc<Output>,

    /// Base directory for relative step directories
    pub working_dir: PathBuf,

    /// Variables available to `${name}` interpolation
    pub vars: HashMap<String, String>,

    /// Log commands instead of running them
    pub dry_run: bool,

    /// How long an interrupted child gets before it is killed
    pub grace_period: Duration,

    /// Explicit toolchain environment script
    pub vcvars: Option<PathBuf>,

    ambient: Environment,
    interrupter: Interrupter,
    toolchains: Mutex<HashMap<Arch, Environment>>,
}

impl Context {
    /// Create a context over the current process environment
    pub fn new(output: Arc<Output>) -> Self {
        Context {
            output,
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            vars: HashMap::new(),
            dry_run: false,
            grace_period: DEFAULT_GRACE_PERIOD,
            vcvars: None,
            ambient: Environment::from_process(),
            interrupter: Interrupter::new(),
            toolchains: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_vcvars(mut self, path: Option<PathBuf>) -> Self {
        self.vcvars = path;
        self
    }

    /// Replace the ambient environment
    pub fn with_ambient(mut self, ambient: Environment) -> Self {
        self.ambient = ambient;
        self
    }

    /// Share an interrupt flag, typically the registry's
    pub fn with_interrupter(mut self, interrupter: Interrupter) -> Self {
        self.interrupter = interrupter;
        self
    }

    /// The ambient environment every task environment starts from
    pub fn current_env(&self) -> &Environment {
        &self.ambient
    }

    /// Look up one ambient variable
    pub fn current_env_get(&self, key: &str) -> Option<&str> {
        self.ambient.get(key)
    }

    /// Change the ambient environment; only done before tasks start
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>, mode: SetMode) {
        self.ambient.set(key, value, mode);
    }

    /// Put a directory in front of the ambient `PATH`
    pub fn prepend_to_path(&mut self, dir: impl AsRef<Path>) {
        self.ambient.prepend_path(dir);
    }

    pub fn interrupter(&self) -> &Interrupter {
        &self.interrupter
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupter.is_interrupted()
    }

    /// Interpolate `${name}` from the context variables, then the ambient
    /// environment; unknown names are an error
    pub fn interpolate(&self, s: &str) -> InterpolationResult<String> {
        interpolate::interpolate_strict(s, |name| {
            self.vars
                .get(name)
                .cloned()
                .or_else(|| self.ambient.get(name).map(str::to_string))
        })
    }

    /// Toolchain environment for an architecture, captured on first use
    ///
    /// [`Arch::DontCare`] needs no toolchain and yields an empty set.
    pub fn toolchain_env(&self, arch: Arch) -> Result<Environment> {
        if arch == Arch::DontCare {
            return Ok(Environment::new());
        }

        if let Some(env) = self.lock_toolchains().get(&arch) {
            return Ok(env.clone());
        }

        let captured = toolchain::vs(arch, self)?;
        self.cache_toolchain(arch, captured.clone());
        Ok(captured)
    }

    /// Store a toolchain environment so later lookups skip the capture
    pub fn cache_toolchain(&self, arch: Arch, env: Environment) {
        self.lock_toolchains().insert(arch, env);
    }

    /// Ambient environment with the toolchain for `arch` layered on top
    pub fn env_for(&self, arch: Arch) -> Result<Environment> {
        let mut env = self.ambient.clone();
        env.set_from(&self.toolchain_env(arch)?);
        Ok(env)
    }

    fn lock_toolchains(&self) -> std::sync::MutexGuard<'_, HashMap<Arch, Environment>> {
        self.toolchains
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Arc::new(Output::default()))
    }
}
