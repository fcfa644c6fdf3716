//! Target architecture

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which toolchain and artifact variant to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86,
    #[default]
    X64,
    DontCare,
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X64 => "x64",
            Arch::DontCare => "dont_care",
        }
    }

    /// Argument given to the toolchain environment script, `None` for
    /// [`Arch::DontCare`]
    pub fn vcvars_arg(self) -> Option<&'static str> {
        match self {
            Arch::X86 => Some("x86"),
            Arch::X64 => Some("amd64"),
            Arch::DontCare => None,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86" | "win32" => Ok(Arch::X86),
            "x64" | "amd64" => Ok(Arch::X64),
            "dont_care" | "any" => Ok(Arch::DontCare),
            _ => Err(format!("unknown architecture '{}'", s)),
        }
    }
}
