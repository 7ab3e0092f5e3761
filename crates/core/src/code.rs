//! Host result codes
//!
//! Every host call and every completion callback reports an `i32` status.
//! `Code` names the values the host documents. Positive values are byte
//! counts from successful reads and writes (`Bytes`); any other value is kept
//! as `Unrecognized`. Converting back to `i32` is lossless except for the
//! connection timeout (-105), which the host treats as a plain `TimedOut`.

use std::fmt;
use tracing::warn;

pub const PP_OK: i32 = 0;
pub const PP_OK_COMPLETIONPENDING: i32 = -1;
pub const PP_ERROR_CONNECTION_TIMEDOUT: i32 = -105;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    /// The operation will finish later through its completion callback
    CompletionPending,
    Failed,
    Aborted,
    BadArgument,
    BadResource,
    NoInterface,
    NoAccess,
    NoMemory,
    NoSpace,
    NoQuota,
    InProgress,
    NotSupported,
    BlocksMainThread,
    FileNotFound,
    FileExists,
    FileTooBig,
    FileChanged,
    NotAFile,
    TimedOut,
    UserCancel,
    NoUserGesture,
    ContextLost,
    NoMessageLoop,
    WrongThread,
    ConnectionClosed,
    ConnectionReset,
    ConnectionRefused,
    ConnectionAborted,
    /// Success carrying a positive byte count
    Bytes(i32),
    Unrecognized(i32),
}

impl Code {
    pub fn from_i32(code: i32) -> Code {
        match code {
            PP_OK => Code::Ok,
            PP_OK_COMPLETIONPENDING => Code::CompletionPending,
            -2 => Code::Failed,
            -3 => Code::Aborted,
            -4 => Code::BadArgument,
            -5 => Code::BadResource,
            -6 => Code::NoInterface,
            -7 => Code::NoAccess,
            -8 => Code::NoMemory,
            -9 => Code::NoSpace,
            -10 => Code::NoQuota,
            -11 => Code::InProgress,
            -12 => Code::NotSupported,
            -13 => Code::BlocksMainThread,
            -20 => Code::FileNotFound,
            -21 => Code::FileExists,
            -22 => Code::FileTooBig,
            -23 => Code::FileChanged,
            -24 => Code::NotAFile,
            -30 => Code::TimedOut,
            -40 => Code::UserCancel,
            -41 => Code::NoUserGesture,
            -50 => Code::ContextLost,
            -51 => Code::NoMessageLoop,
            -52 => Code::WrongThread,
            -100 => Code::ConnectionClosed,
            -101 => Code::ConnectionReset,
            -102 => Code::ConnectionRefused,
            -103 => Code::ConnectionAborted,
            PP_ERROR_CONNECTION_TIMEDOUT => Code::TimedOut,
            n if n > 0 => Code::Bytes(n),
            other => {
                warn!(code = other, "unrecognized host result code");
                Code::Unrecognized(other)
            }
        }
    }

    pub const fn to_i32(self) -> i32 {
        match self {
            Code::Ok => PP_OK,
            Code::CompletionPending => PP_OK_COMPLETIONPENDING,
            Code::Failed => -2,
            Code::Aborted => -3,
            Code::BadArgument => -4,
            Code::BadResource => -5,
            Code::NoInterface => -6,
            Code::NoAccess => -7,
            Code::NoMemory => -8,
            Code::NoSpace => -9,
            Code::NoQuota => -10,
            Code::InProgress => -11,
            Code::NotSupported => -12,
            Code::BlocksMainThread => -13,
            Code::FileNotFound => -20,
            Code::FileExists => -21,
            Code::FileTooBig => -22,
            Code::FileChanged => -23,
            Code::NotAFile => -24,
            Code::TimedOut => -30,
            Code::UserCancel => -40,
            Code::NoUserGesture => -41,
            Code::ContextLost => -50,
            Code::NoMessageLoop => -51,
            Code::WrongThread => -52,
            Code::ConnectionClosed => -100,
            Code::ConnectionReset => -101,
            Code::ConnectionRefused => -102,
            Code::ConnectionAborted => -103,
            Code::Bytes(n) => n,
            Code::Unrecognized(code) => code,
        }
    }

    /// Ok, CompletionPending and a byte count all mean the call succeeded
    pub const fn is_ok(&self) -> bool {
        matches!(self, Code::Ok | Code::CompletionPending | Code::Bytes(_))
    }

    pub fn into_result(self) -> Result<Code, Code> {
        if self.is_ok() { Ok(self) } else { Err(self) }
    }

    /// Keep `take` only when the code is ok
    pub fn map<T>(self, take: T) -> Option<T> {
        if self.is_ok() { Some(take) } else { None }
    }
}

impl From<i32> for Code {
    fn from(code: i32) -> Self {
        Code::from_i32(code)
    }
}

impl From<Code> for i32 {
    fn from(code: Code) -> Self {
        code.to_i32()
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Code::Ok => "ok",
            Code::CompletionPending => "completion callback pending",
            Code::Failed => "failed",
            Code::Aborted => "aborted",
            Code::BadArgument => "bad argument",
            Code::BadResource => "bad resource",
            Code::NoInterface => "no interface",
            Code::NoAccess => "no access",
            Code::NoMemory => "no memory",
            Code::NoSpace => "no space",
            Code::NoQuota => "no quota",
            Code::InProgress => "in-progress",
            Code::NotSupported => "not supported",
            Code::BlocksMainThread => "blocks main thread",
            Code::FileNotFound => "file not found",
            Code::FileExists => "file exists",
            Code::FileTooBig => "file too big",
            Code::FileChanged => "file changed",
            Code::NotAFile => "not a file",
            Code::TimedOut => "timed out",
            Code::UserCancel => "user cancel",
            Code::NoUserGesture => "no user gesture",
            Code::ContextLost => "context lost",
            Code::NoMessageLoop => "no message loop",
            Code::WrongThread => "wrong thread",
            Code::ConnectionClosed => "connection closed",
            Code::ConnectionReset => "connection reset",
            Code::ConnectionRefused => "connection attempt refused",
            Code::ConnectionAborted => "connection aborted",
            Code::Bytes(n) => return write!(f, "{} bytes", n),
            Code::Unrecognized(code) => return write!(f, "unrecognized code {}", code),
        };
        f.pad(text)
    }
}
