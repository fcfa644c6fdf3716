//! Visual Studio toolchain environment capture
//!
//! The compiler environment only exists as the side effect of running
//! `vcvarsall.bat`, so the script is run once per architecture in a child
//! shell followed by `set`, and the printed variables are parsed back into
//! an [`Environment`].

use crate::env::{Arch, Environment, SetMode};
use crate::error::{BuildError, ExecutionError, Result};
use crate::runner::{process, ArgFlags, CommandLine, Context};
use crate::ui::Level;
use std::path::{Path, PathBuf};

const VSWHERE: &str = "Microsoft Visual Studio/Installer/vswhere.exe";
const VCVARSALL: &str = "VC/Auxiliary/Build/vcvarsall.bat";

/// Toolchain environment for 32-bit builds
pub fn vs_x86(ctx: &Context) -> Result<Environment> {
    vs(Arch::X86, ctx)
}

/// Toolchain environment for 64-bit builds
pub fn vs_x64(ctx: &Context) -> Result<Environment> {
    vs(Arch::X64, ctx)
}

/// Capture the toolchain environment for `arch`
///
/// Every failure other than an interruption is a bail: nothing can be built
/// without a toolchain.
pub fn vs(arch: Arch, ctx: &Context) -> Result<Environment> {
    let out = &ctx.output;

    let arch_arg = arch
        .vcvars_arg()
        .ok_or_else(|| out.bail(format!("bad arch '{}' for toolchain environment", arch)))?;

    if !cfg!(windows) {
        return Err(out.bail("the Visual Studio toolchain is only available on Windows"));
    }

    let vcvars = find_vcvars(ctx)?;
    out.info(format!("capturing {} toolchain environment", arch));

    let cmd = vcvars_command(&comspec(ctx), &vcvars, arch_arg);
    let captured = match process::capture(&cmd, ctx.current_env(), None, ctx) {
        Ok(captured) => captured,
        Err(ExecutionError::Interrupted) => return Err(ExecutionError::Interrupted.into()),
        Err(e) => {
            match e.io_error() {
                Some(source) => out.out_io(Level::Error, &e.to_string(), source),
                None => out.error(e.to_string()),
            }
            return Err(out.bail("toolchain setup failed"));
        }
    };

    if captured.code != 0 {
        return Err(out.bail(format!(
            "{} exited with code {}",
            vcvars.display(),
            captured.code
        )));
    }

    let env = parse_set_output(&captured.stdout);
    if env.is_empty() {
        return Err(out.bail(format!("{} produced no variables", vcvars.display())));
    }

    out.debug(format!("captured {} toolchain variables", env.len()));
    Ok(env)
}

/// `cmd /C ""vcvarsall.bat" amd64 > NUL && set"`
///
/// The outer quotes keep cmd from stripping the quotes around the script
/// path.
pub fn vcvars_command(shell: &str, vcvars: &Path, arch_arg: &str) -> CommandLine {
    let mut cmd = CommandLine::new(shell);
    cmd.arg("/C")
        .arg("\"")
        .arg_with(vcvars, ArgFlags::NOSPACE | ArgFlags::QUOTE)
        .arg(arch_arg)
        .arg(">")
        .arg("NUL")
        .arg("&&")
        .arg("set")
        .arg_with("\"", ArgFlags::NOSPACE);
    cmd
}

/// Parse `NAME=value` lines as printed by `set`
pub fn parse_set_output(text: &str) -> Environment {
    let mut env = Environment::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some((key, value)) = line.split_once('=') {
            // cmd's hidden per-drive variables start with '='
            if !key.is_empty() && !key.contains(char::is_whitespace) {
                env.set(key, value, SetMode::Replace);
            }
        }
    }

    env
}

/// Locate `vcvarsall.bat`, from the configured path or through vswhere
pub fn find_vcvars(ctx: &Context) -> Result<PathBuf> {
    let out = &ctx.output;

    if let Some(path) = &ctx.vcvars {
        if path.is_file() {
            return Ok(path.clone());
        }
        return Err(out.bail(format!("vcvars script {} not found", path.display())));
    }

    let program_files = ctx
        .current_env_get("ProgramFiles(x86)")
        .unwrap_or("C:/Program Files (x86)");
    let vswhere = Path::new(program_files).join(VSWHERE);

    if !vswhere.is_file() {
        return Err(out.bail(format!(
            "toolchain not found: {} does not exist",
            vswhere.display()
        )));
    }

    let mut cmd = CommandLine::new(&vswhere);
    cmd.arg("-latest")
        .named("-products", "*")
        .named("-requires", "Microsoft.VisualStudio.Component.VC.Tools.x86.x64")
        .named("-property", "installationPath");

    let captured = process::capture(&cmd, ctx.current_env(), None, ctx).map_err(|e| match e {
        ExecutionError::Interrupted => BuildError::from(e),
        e => out.bail(format!("failed to run vswhere, {}", e)),
    })?;

    let install = captured.stdout.lines().next().unwrap_or("").trim();
    if captured.code != 0 || install.is_empty() {
        return Err(out.bail("toolchain not found: no Visual Studio installation with C++ tools"));
    }

    let vcvars = Path::new(install).join(VCVARSALL);
    if !vcvars.is_file() {
        return Err(out.bail(format!("toolchain not found: {} missing", vcvars.display())));
    }

    Ok(vcvars)
}

fn comspec(ctx: &Context) -> String {
    ctx.current_env_get("COMSPEC")
        .unwrap_or("cmd.exe")
        .to_string()
}
