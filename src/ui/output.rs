//! Leveled output channel
//!
//! Every component logs through one [`Output`]. Writers serialize on a single
//! mutex, so lines from the run thread and the interrupt handler never mix.
//! All lines are kept in memory and summarized by [`Output::dump_logs`] at
//! exit.

use crate::error::BuildError;
use crate::ui::console::{self, ColorMethod, Paint};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Bail,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARN",
            Level::Error => "ERROR",
            Level::Bail => "BAIL",
        }
    }

    fn paint(self) -> Paint {
        match self {
            Level::Debug => Paint::Grey,
            Level::Info => Paint::Default,
            Level::Warning => Paint::Yellow,
            Level::Error | Level::Bail => Paint::Red,
        }
    }

    /// Lowest verbosity at which lines of this level reach the console
    fn min_verbosity(self) -> Verbosity {
        match self {
            Level::Debug => Verbosity::Verbose,
            Level::Info => Verbosity::Normal,
            Level::Warning | Level::Error | Level::Bail => Verbosity::Quiet,
        }
    }
}

/// Verbosity levels for console output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    Normal = 2,
    Verbose = 3,
}

/// One recorded line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: Level,
    pub text: String,
}

impl LogLine {
    /// `[LEVEL] text`
    pub fn render(&self) -> String {
        format!("[{}] {}", self.level.tag(), self.text)
    }
}

enum Sink {
    Stderr,
    Writer(Box<dyn Write + Send>),
}

impl Sink {
    fn write_line(&mut self, method: ColorMethod, paint: Paint, text: &str) -> io::Result<()> {
        match self {
            Sink::Stderr => {
                let stderr = io::stderr();
                let mut lock = stderr.lock();
                console::write_line(&mut lock, method, paint, text)
            }
            Sink::Writer(w) => console::write_line(w.as_mut(), ColorMethod::None, paint, text),
        }
    }
}

struct Inner {
    lines: Vec<LogLine>,
    sink: Sink,
}

/// Thread-safe leveled output channel
pub struct Output {
    inner: Mutex<Inner>,
    verbosity: Verbosity,
    color: ColorMethod,
    log_file: Option<PathBuf>,
}

impl Output {
    /// Output to stderr with the given color method
    pub fn new(verbosity: Verbosity, color: ColorMethod) -> Self {
        Self::with_sink(verbosity, color, Sink::Stderr)
    }

    /// Output to an arbitrary writer, without color
    pub fn with_writer(verbosity: Verbosity, writer: Box<dyn Write + Send>) -> Self {
        Self::with_sink(verbosity, ColorMethod::None, Sink::Writer(writer))
    }

    /// Output that only records lines
    pub fn buffered() -> Self {
        Self::with_writer(Verbosity::Silent, Box::new(io::sink()))
    }

    fn with_sink(verbosity: Verbosity, color: ColorMethod, sink: Sink) -> Self {
        Output {
            inner: Mutex::new(Inner {
                lines: Vec::new(),
                sink,
            }),
            verbosity,
            color,
            log_file: None,
        }
    }

    /// Also write the full log to this file at exit
    pub fn with_log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record and print a message, one log line per text line
    ///
    /// An empty message still records one empty line.
    pub fn out(&self, level: Level, message: impl AsRef<str>) {
        let echo = self.verbosity >= level.min_verbosity();
        let mut inner = self.lock();

        let message = message.as_ref();
        let texts: Vec<&str> = if message.is_empty() {
            vec![""]
        } else {
            message.lines().collect()
        };

        for text in texts {
            let line = LogLine {
                level,
                text: text.to_string(),
            };

            if echo {
                // nowhere left to report a failing console
                let _ = inner
                    .sink
                    .write_line(self.color, level.paint(), &line.render());
            }

            inner.lines.push(line);
        }
    }

    /// Record a message with the text of a raw OS error code
    pub fn out_os(&self, level: Level, message: &str, code: i32) {
        let err = io::Error::from_raw_os_error(code);
        self.out(level, format!("{}, {}", message, err));
    }

    /// Record a message with an I/O error, through its OS code when it has one
    pub fn out_io(&self, level: Level, message: &str, err: &io::Error) {
        match err.raw_os_error() {
            Some(code) => self.out_os(level, message, code),
            None => self.out(level, format!("{}, {}", message, err)),
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.out(Level::Debug, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.out(Level::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.out(Level::Warning, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.out(Level::Error, message);
    }

    /// Record a bail line and return the error that ends the run
    ///
    /// ```
    /// use depbuild::ui::Output;
    ///
    /// let out = Output::buffered();
    /// let err = out.bail("toolchain not found");
    /// assert!(err.is_bail());
    /// ```
    #[must_use]
    pub fn bail(&self, message: impl Into<String>) -> BuildError {
        let message = message.into();
        self.out(Level::Bail, &message);
        BuildError::Bail(message)
    }

    /// Snapshot of every recorded line
    pub fn lines(&self) -> Vec<LogLine> {
        self.lock().lines.clone()
    }

    /// Number of recorded lines at a level
    pub fn count(&self, level: Level) -> usize {
        self.lock().lines.iter().filter(|l| l.level == level).count()
    }

    /// Print a summary of warnings and errors and write the log file
    pub fn dump_logs(&self) {
        let mut inner = self.lock();

        let problems: Vec<LogLine> = inner
            .lines
            .iter()
            .filter(|l| l.level >= Level::Warning)
            .cloned()
            .collect();

        if !problems.is_empty() && self.verbosity >= Verbosity::Quiet {
            let warnings = problems.iter().filter(|l| l.level == Level::Warning).count();
            let errors = problems.len() - warnings;
            let header = format!(
                "there were {} warning(s) and {} error(s):",
                warnings, errors
            );

            let _ = inner.sink.write_line(self.color, Paint::Default, "");
            let _ = inner.sink.write_line(self.color, Paint::Default, &header);
            for line in &problems {
                let _ = inner
                    .sink
                    .write_line(self.color, line.level.paint(), &line.render());
            }
        }

        if let Some(path) = &self.log_file {
            let mut contents = String::new();
            for line in &inner.lines {
                contents.push_str(&line.render());
                contents.push('\n');
            }

            if let Err(e) = fs::write(path, contents) {
                let text = format!("[ERROR] failed to write log file {}, {}", path.display(), e);
                let _ = inner.sink.write_line(self.color, Paint::Red, &text);
            }
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new(Verbosity::Normal, ColorMethod::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::thread;

    /// Writer that appends into a shared buffer
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<StdMutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_lines_are_recorded_with_level() {
        let out = Output::buffered();
        out.info("hello");
        out.warn("careful");

        let lines = out.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].render(), "[INFO] hello");
        assert_eq!(lines[1].level, Level::Warning);
    }

    #[test]
    fn test_debug_hidden_below_verbose() {
        let buf = SharedBuf::default();
        let out = Output::with_writer(Verbosity::Normal, Box::new(buf.clone()));
        out.debug("details");
        out.info("summary");

        assert_eq!(buf.text(), "[INFO] summary\n");
        // still buffered
        assert_eq!(out.count(Level::Debug), 1);
    }

    #[test]
    fn test_multiline_message_splits() {
        let out = Output::buffered();
        out.info("one\ntwo");
        assert_eq!(out.count(Level::Info), 2);
    }

    #[test]
    fn test_bail_records_and_returns_error() {
        let out = Output::buffered();
        let err = out.bail("no toolchain");
        assert!(err.is_bail());
        assert_eq!(err.to_string(), "no toolchain");
        assert_eq!(out.count(Level::Bail), 1);
    }

    #[test]
    fn test_out_os_includes_error_text() {
        let out = Output::buffered();
        out.out_os(Level::Error, "can't start", 2);
        let text = &out.lines()[0].text;
        assert!(text.starts_with("can't start, "));
        assert!(text.contains("os error 2"));
    }

    #[test]
    fn test_out_io_renders_the_error_once() {
        let out = Output::buffered();
        out.out_io(
            Level::Error,
            "failed to start 'git'",
            &io::Error::from_raw_os_error(2),
        );
        out.out_io(
            Level::Warning,
            "failed to wait for 'git'",
            &io::Error::new(io::ErrorKind::Other, "pipe closed"),
        );

        let lines = out.lines();
        assert_eq!(lines[0].text.matches("os error 2").count(), 1);
        assert_eq!(lines[1].text, "failed to wait for 'git', pipe closed");
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let out = Output::buffered();
        out.info("a\n\nb");
        out.debug("");
        let err = out.bail("");

        let texts: Vec<String> = out.lines().into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["a", "", "b", "", ""]);
        assert!(err.is_bail());
        assert_eq!(out.count(Level::Bail), 1);
    }

    #[test]
    fn test_concurrent_writers_never_interleave() {
        let buf = SharedBuf::default();
        let out = Arc::new(Output::with_writer(Verbosity::Normal, Box::new(buf.clone())));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let out = Arc::clone(&out);
                thread::spawn(move || {
                    for i in 0..200 {
                        out.info(format!("writer-{}-line-{}-{}", t, i, "x".repeat(64)));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let text = buf.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 800);
        for line in lines {
            assert!(line.starts_with("[INFO] writer-"));
            assert!(line.ends_with(&"x".repeat(64)));
        }
    }

    #[test]
    fn test_dump_logs_summarizes_and_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path().join("build.log");

        let buf = SharedBuf::default();
        let out = Output::with_writer(Verbosity::Normal, Box::new(buf.clone()))
            .with_log_file(log_path.clone());
        out.debug("quiet detail");
        out.warn("something odd");
        out.error("something broke");
        out.dump_logs();

        let console = buf.text();
        assert!(console.contains("there were 1 warning(s) and 1 error(s):"));

        let file = fs::read_to_string(&log_path).unwrap();
        assert!(file.contains("[DEBUG] quiet detail"));
        assert!(file.contains("[ERROR] something broke"));
    }
}
