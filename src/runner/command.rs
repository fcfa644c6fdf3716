//! Command line builder
//!
//! A [`CommandLine`] is a program and its arguments, built from a closed set
//! of argument kinds (strings, paths, URLs and C strings). Each argument is
//! quoted for the host convention when it contains whitespace or when
//! [`ArgFlags::QUOTE`] is given.

use std::ffi::{CStr, CString};
use std::ops::BitOr;
use std::path::{Path, PathBuf};
use url::Url;

/// Per-argument rendering flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArgFlags(u8);

impl ArgFlags {
    pub const NONE: ArgFlags = ArgFlags(0);
    /// Leave the argument out of the logged command line
    pub const QUIET: ArgFlags = ArgFlags(0x01);
    /// Attach the argument to the previous one without a space
    pub const NOSPACE: ArgFlags = ArgFlags(0x02);
    /// Always quote the argument
    pub const QUOTE: ArgFlags = ArgFlags(0x04);

    pub fn contains(self, other: ArgFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ArgFlags {
    type Output = ArgFlags;

    fn bitor(self, rhs: ArgFlags) -> ArgFlags {
        ArgFlags(self.0 | rhs.0)
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for str {}
    impl Sealed for String {}
    impl Sealed for std::path::Path {}
    impl Sealed for std::path::PathBuf {}
    impl Sealed for url::Url {}
    impl Sealed for std::ffi::CStr {}
    impl Sealed for std::ffi::CString {}
}

/// Values accepted as command arguments
pub trait CommandArg: sealed::Sealed {
    /// The unquoted argument text
    fn to_arg(&self) -> String;
}

impl CommandArg for str {
    fn to_arg(&self) -> String {
        self.to_string()
    }
}

impl CommandArg for String {
    fn to_arg(&self) -> String {
        self.clone()
    }
}

impl CommandArg for Path {
    fn to_arg(&self) -> String {
        let s = self.to_string_lossy();
        if cfg!(windows) {
            s.replace('/', "\\")
        } else {
            s.into_owned()
        }
    }
}

impl CommandArg for PathBuf {
    fn to_arg(&self) -> String {
        self.as_path().to_arg()
    }
}

impl CommandArg for Url {
    fn to_arg(&self) -> String {
        self.as_str().to_string()
    }
}

impl CommandArg for CStr {
    fn to_arg(&self) -> String {
        self.to_string_lossy().into_owned()
    }
}

impl CommandArg for CString {
    fn to_arg(&self) -> String {
        self.as_c_str().to_arg()
    }
}

/// Quote an argument for the Windows command line parser
#[cfg(windows)]
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');

    let mut backslashes = 0;
    for c in s.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                out.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                backslashes = 0;
            }
            _ => {
                out.extend(std::iter::repeat('\\').take(backslashes));
                backslashes = 0;
            }
        }
        if c != '\\' {
            out.push(c);
        }
    }

    // backslashes before the closing quote must be doubled
    out.extend(std::iter::repeat('\\').take(backslashes * 2));
    out.push('"');
    out
}

/// Quote an argument with POSIX double-quote rules
#[cfg(not(windows))]
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// A program invocation
///
/// ```
/// use depbuild::runner::{ArgFlags, CommandLine};
///
/// let mut cmd = CommandLine::new("cmake");
/// cmd.arg("-G")
///     .arg("NMake Makefiles")
///     .named("-DCMAKE_BUILD_TYPE=", "Release")
///     .arg_with("secret-token", ArgFlags::QUIET);
///
/// assert!(cmd.string().contains("\"NMake Makefiles\""));
/// assert!(!cmd.display().contains("secret-token"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    argv: Vec<String>,
    line: String,
    display: String,
}

impl CommandLine {
    pub fn new<T: CommandArg + ?Sized>(program: &T) -> Self {
        CommandLine {
            program: program.to_arg(),
            argv: Vec::new(),
            line: String::new(),
            display: String::new(),
        }
    }

    pub fn arg<T: CommandArg + ?Sized>(&mut self, value: &T) -> &mut Self {
        self.add("", value.to_arg(), ArgFlags::NONE)
    }

    pub fn arg_with<T: CommandArg + ?Sized>(&mut self, value: &T, flags: ArgFlags) -> &mut Self {
        self.add("", value.to_arg(), flags)
    }

    /// `name value`, or `namevalue` when the name ends with `=` or `:`
    pub fn named<T: CommandArg + ?Sized>(&mut self, name: &str, value: &T) -> &mut Self {
        self.add(name, value.to_arg(), ArgFlags::NONE)
    }

    pub fn named_with<T: CommandArg + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
        flags: ArgFlags,
    ) -> &mut Self {
        self.add(name, value.to_arg(), flags)
    }

    fn add(&mut self, name: &str, value: String, flags: ArgFlags) -> &mut Self {
        if name.is_empty() && value.is_empty() {
            return self;
        }

        let rendered = if flags.contains(ArgFlags::QUOTE) || value.contains(char::is_whitespace) {
            quote(&value)
        } else {
            value.clone()
        };

        let attached = name.ends_with('=') || name.ends_with(':');
        let (token, raw): (String, Vec<String>) = if name.is_empty() {
            (rendered, vec![value])
        } else if attached {
            (format!("{}{}", name, rendered), vec![format!("{}{}", name, value)])
        } else if value.is_empty() {
            (name.to_string(), vec![name.to_string()])
        } else {
            (format!("{} {}", name, rendered), vec![name.to_string(), value])
        };

        let nospace = flags.contains(ArgFlags::NOSPACE);

        if !nospace && !self.line.is_empty() {
            self.line.push(' ');
        }
        self.line.push_str(&token);

        if !flags.contains(ArgFlags::QUIET) {
            if !nospace && !self.display.is_empty() {
                self.display.push(' ');
            }
            self.display.push_str(&token);
        }

        if nospace {
            if let Some(last) = self.argv.last_mut() {
                last.push_str(&raw.concat());
                return self;
            }
        }
        self.argv.extend(raw);

        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Unquoted arguments, one per process argument
    pub fn args(&self) -> &[String] {
        &self.argv
    }

    /// Rendered arguments without the program
    pub fn args_line(&self) -> &str {
        &self.line
    }

    fn render_program(&self) -> String {
        if self.program.contains(char::is_whitespace) {
            quote(&self.program)
        } else {
            self.program.clone()
        }
    }

    /// Full rendered command line
    pub fn string(&self) -> String {
        if self.line.is_empty() {
            self.render_program()
        } else {
            format!("{} {}", self.render_program(), self.line)
        }
    }

    /// Command line for logs, without quiet arguments
    pub fn display(&self) -> String {
        if self.display.is_empty() {
            self.render_program()
        } else {
            format!("{} {}", self.render_program(), self.display)
        }
    }
}
