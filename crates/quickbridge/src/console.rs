//! Console host object
//!
//! A script-facing `console` with the usual level methods. The first
//! argument is the message; any further arguments become positional
//! string fields. Output goes through a [`ConsoleSink`], so embedders can
//! capture log lines instead of printing them.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::bind::HostObject;
use crate::convert::Rest;

/// Console log levels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleLevel {
    /// Diagnostic output
    Debug,
    /// Normal output; `console.log` logs here
    Info,
    /// Something looks off
    Warn,
    /// Something failed
    Error,
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleLevel::Debug => write!(f, "debug"),
            ConsoleLevel::Info => write!(f, "info"),
            ConsoleLevel::Warn => write!(f, "warn"),
            ConsoleLevel::Error => write!(f, "error"),
        }
    }
}

/// Receives console output
pub trait ConsoleSink {
    /// One console call: level, message, positional fields ("0", "1", ...)
    fn write(&self, level: ConsoleLevel, message: &str, fields: &[(String, String)]);
}

/// Default sink: debug and info to stdout, warn and error to stderr
#[derive(Debug, Default)]
pub struct StdioSink;

impl ConsoleSink for StdioSink {
    fn write(&self, level: ConsoleLevel, message: &str, fields: &[(String, String)]) {
        let mut line = message.to_string();
        for (key, value) in fields {
            line.push_str(&format!(" {key}={value}"));
        }
        match level {
            ConsoleLevel::Debug => println!("[DEBUG] {line}"),
            ConsoleLevel::Info => println!("{line}"),
            ConsoleLevel::Warn => eprintln!("[WARN] {line}"),
            ConsoleLevel::Error => eprintln!("[ERROR] {line}"),
        }
    }
}

/// One captured console call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Level the entry was logged at
    pub level: ConsoleLevel,
    /// The message argument
    pub message: String,
    /// Positional fields from the remaining arguments
    pub fields: Vec<(String, String)>,
}

/// Sink capturing entries in memory, for tests and embedders that want to
/// observe script output
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    entries: Rc<RefCell<Vec<LogEntry>>>,
}

impl MemorySink {
    /// An empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything captured so far, in call order
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    /// The most recent entry
    pub fn last(&self) -> Option<LogEntry> {
        self.entries.borrow().last().cloned()
    }
}

impl ConsoleSink for MemorySink {
    fn write(&self, level: ConsoleLevel, message: &str, fields: &[(String, String)]) {
        self.entries.borrow_mut().push(LogEntry {
            level,
            message: message.to_string(),
            fields: fields.to_vec(),
        });
    }
}

/// The console binding
pub struct Console {
    sink: Rc<dyn ConsoleSink>,
}

impl Console {
    /// A console writing to stdout/stderr
    pub fn new() -> Self {
        Self::with_sink(Rc::new(StdioSink))
    }

    /// A console writing to `sink`
    pub fn with_sink(sink: Rc<dyn ConsoleSink>) -> Self {
        Console { sink }
    }

    /// The export table; bind it as `console`
    pub fn host_object(&self) -> HostObject {
        HostObject::new()
            .method("Log", level_fn(self.sink.clone(), ConsoleLevel::Info))
            .method("Debug", level_fn(self.sink.clone(), ConsoleLevel::Debug))
            .method("Info", level_fn(self.sink.clone(), ConsoleLevel::Info))
            .method("Warn", level_fn(self.sink.clone(), ConsoleLevel::Warn))
            .method("Error", level_fn(self.sink.clone(), ConsoleLevel::Error))
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

fn level_fn(
    sink: Rc<dyn ConsoleSink>,
    level: ConsoleLevel,
) -> impl Fn(String, Rest<String>) + 'static {
    move |message: String, rest: Rest<String>| {
        let fields: Vec<(String, String)> = rest
            .0
            .into_iter()
            .enumerate()
            .map(|(i, value)| (i.to_string(), value))
            .collect();
        sink.write(level, &message, &fields);
    }
}
