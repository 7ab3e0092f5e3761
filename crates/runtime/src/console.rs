//! Console and standard streams
//!
//! The host exposes a developer console that takes a level and a message.
//! Embedders hook it in with [`set_console_sink`]; from then on text written
//! through a [`ConsoleWriter`] (including everything `init_logging` emits) is
//! delivered to the console instead of the raw file descriptors.
//!
//! Writes go straight to fd 1 or 2 via `libc::write` when no sink is
//! installed or the bytes are not UTF-8. Rust's `std::io::stdout()` is not
//! used so output from coroutine strands never contends on its lock.

use std::fmt;
use std::io;
use std::sync::{Arc, RwLock};

/// Host console levels
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Tip = 0,
    Log = 1,
    Warning = 2,
    Error = 3,
}

impl LogLevel {
    pub fn to_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(level: i32) -> Option<LogLevel> {
        match level {
            0 => Some(LogLevel::Tip),
            1 => Some(LogLevel::Log),
            2 => Some(LogLevel::Warning),
            3 => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Map `tracing` levels onto the four console levels. Info shows as a tip;
/// debug and trace share the plain log level.
impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        if level == tracing::Level::ERROR {
            LogLevel::Error
        } else if level == tracing::Level::WARN {
            LogLevel::Warning
        } else if level == tracing::Level::INFO {
            LogLevel::Tip
        } else {
            LogLevel::Log
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Tip => "tip",
            LogLevel::Log => "log",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// The host console.
///
/// Implementations must not log through `tracing` themselves: with logging
/// routed to the console that would recurse.
pub trait ConsoleSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

static CONSOLE_SINK: RwLock<Option<Arc<dyn ConsoleSink>>> = RwLock::new(None);

/// Install the process-wide console sink, replacing any previous one
pub fn set_console_sink(sink: Arc<dyn ConsoleSink>) {
    let mut slot = CONSOLE_SINK.write().unwrap_or_else(|e| e.into_inner());
    *slot = Some(sink);
}

/// Remove the console sink; writers fall back to the raw streams
pub fn clear_console_sink() {
    let mut slot = CONSOLE_SINK.write().unwrap_or_else(|e| e.into_inner());
    *slot = None;
}

fn console_sink() -> Option<Arc<dyn ConsoleSink>> {
    CONSOLE_SINK
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Out,
    Err,
}

impl StdStream {
    pub fn fd(self) -> libc::c_int {
        match self {
            StdStream::Out => libc::STDOUT_FILENO,
            StdStream::Err => libc::STDERR_FILENO,
        }
    }

    /// Console level used for UTF-8 text written to this stream
    pub fn level(self) -> LogLevel {
        match self {
            StdStream::Out => LogLevel::Log,
            StdStream::Err => LogLevel::Error,
        }
    }
}

fn write_fd(fd: libc::c_int, buf: &[u8]) -> io::Result<usize> {
    loop {
        let n = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// `io::Write` over one of the standard streams, console-aware.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleWriter {
    stream: StdStream,
    level: LogLevel,
}

impl ConsoleWriter {
    pub fn stdout() -> Self {
        Self {
            stream: StdStream::Out,
            level: StdStream::Out.level(),
        }
    }

    pub fn stderr() -> Self {
        Self {
            stream: StdStream::Err,
            level: StdStream::Err.level(),
        }
    }

    /// Same stream, different console level
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn stream(&self) -> StdStream {
        self.stream
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(sink) = console_sink() {
            if let Ok(text) = std::str::from_utf8(buf) {
                // The console adds its own line break
                sink.log(self.level, text.strip_suffix('\n').unwrap_or(text));
                return Ok(buf.len());
            }
        }
        write_fd(self.stream.fd(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
