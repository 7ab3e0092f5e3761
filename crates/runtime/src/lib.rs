//! plugbridge runtime: the host-facing services around the value bridge
//!
//! Key design principles:
//! - Entropy: fail closed, never fall back to a weaker generator
//! - Compare: secrets are compared in time independent of their contents
//! - Console: host console when hooked up, raw stdout/stderr otherwise
//! - MessageLoop: one thread, callbacks run in post order, each once
//!
//! The value and callback types live in `plugbridge_core` and are
//! re-exported here so embedders need only this crate.

pub mod compare;
#[cfg(not(feature = "crypto"))]
mod compare_stub;
pub mod config;
pub mod console;
pub mod entropy;
pub mod logging;
pub mod message_loop;

pub use plugbridge_core::{
    Code, CompletionCallback, CompletionReceiver, DecodeError, HostId, RawVar, Var, VarKind,
    block_until_complete, completion_channel, make_callback,
};

pub use config::{BridgeConfig, ConfigError};
pub use console::{
    ConsoleSink, ConsoleWriter, LogLevel, StdStream, clear_console_sink, set_console_sink,
};
pub use logging::{init_logging, init_logging_with};
pub use message_loop::{LoopPoster, MessageLoop};

// Entropy and comparison (exported for C callers)
pub use compare::{
    Comparison, constant_time_compare, plugbridge_constant_time_compare as ct_compare,
    plugbridge_variable_time_compare as vt_compare, variable_time_compare,
};
#[cfg(feature = "crypto")]
pub use entropy::OsRngSource;
pub use entropy::{
    DeviceSource, EntropyError, EntropySource, fill_random, fill_random_from,
    plugbridge_fill_random as ffi_fill_random,
};
