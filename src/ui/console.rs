//! Console capability detection and colored line rendering

use colored::Colorize;
use std::io::{self, IsTerminal, Write};

/// How colors can be rendered on the attached console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMethod {
    /// Redirected to a file or pipe, or color unavailable
    None,
    /// Virtual terminal escape sequences
    Ansi,
    /// Legacy Windows console text attributes
    Console,
}

/// Colors used by the output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paint {
    Default,
    Grey,
    Yellow,
    Red,
}

/// Detect what the console on stderr supports
pub fn detect() -> ColorMethod {
    if !io::stderr().is_terminal() {
        return ColorMethod::None;
    }

    #[cfg(windows)]
    {
        if colored::control::set_virtual_terminal(true).is_ok() {
            ColorMethod::Ansi
        } else {
            ColorMethod::Console
        }
    }

    #[cfg(not(windows))]
    {
        ColorMethod::Ansi
    }
}

/// Configure console output once at startup and return the detected method
pub fn setup() -> ColorMethod {
    let method = detect();
    colored::control::set_override(method == ColorMethod::Ansi);
    method
}

/// Write one line, colored with the given method, restoring the console
/// state afterwards
pub fn write_line(
    w: &mut dyn Write,
    method: ColorMethod,
    paint: Paint,
    text: &str,
) -> io::Result<()> {
    match (method, paint) {
        (ColorMethod::None, _) | (_, Paint::Default) => writeln!(w, "{}", text),
        (ColorMethod::Ansi, Paint::Grey) => writeln!(w, "{}", text.truecolor(150, 150, 150)),
        (ColorMethod::Ansi, Paint::Yellow) => writeln!(w, "{}", text.truecolor(240, 240, 50)),
        (ColorMethod::Ansi, Paint::Red) => writeln!(w, "{}", text.truecolor(240, 50, 50)),
        (ColorMethod::Console, _) => write_with_attributes(w, paint, text),
    }
}

#[cfg(windows)]
fn write_with_attributes(w: &mut dyn Write, paint: Paint, text: &str) -> io::Result<()> {
    use winapi::um::processenv::GetStdHandle;
    use winapi::um::winbase::STD_ERROR_HANDLE;
    use winapi::um::wincon::{
        GetConsoleScreenBufferInfo, SetConsoleTextAttribute, CONSOLE_SCREEN_BUFFER_INFO,
        FOREGROUND_BLUE, FOREGROUND_GREEN, FOREGROUND_RED,
    };

    let attributes = match paint {
        Paint::Default => return writeln!(w, "{}", text),
        Paint::Grey => FOREGROUND_BLUE | FOREGROUND_GREEN | FOREGROUND_RED,
        Paint::Yellow => FOREGROUND_GREEN | FOREGROUND_RED,
        Paint::Red => FOREGROUND_RED,
    };

    // SAFETY: the handle comes from GetStdHandle and the info struct is a
    // plain C struct the call fills in.
    let saved = unsafe {
        let handle = GetStdHandle(STD_ERROR_HANDLE);
        let mut info: CONSOLE_SCREEN_BUFFER_INFO = std::mem::zeroed();
        let saved = if GetConsoleScreenBufferInfo(handle, &mut info) != 0 {
            Some(info.wAttributes)
        } else {
            None
        };
        SetConsoleTextAttribute(handle, attributes);
        saved
    };

    let result = writeln!(w, "{}", text).and_then(|_| w.flush());

    if let Some(attributes) = saved {
        // SAFETY: same handle as above, restoring attributes it reported.
        unsafe {
            SetConsoleTextAttribute(GetStdHandle(STD_ERROR_HANDLE), attributes);
        }
    }

    result
}

#[cfg(not(windows))]
fn write_with_attributes(w: &mut dyn Write, _paint: Paint, text: &str) -> io::Result<()> {
    writeln!(w, "{}", text)
}
