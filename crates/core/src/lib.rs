//! plugbridge core: value marshalling for a native plugin host's C ABI
//!
//! Everything that crosses the host boundary goes through this crate:
//! dynamically typed values as 16-byte tagged unions, and one-shot completion
//! callbacks for asynchronous host operations.
//!
//! Key design principles:
//! - RawVar: the literal host struct, encoded and decoded without tag checks
//! - Var: the language-side enum; conversions from RawVar are checked
//! - CompletionCallback: function + context, consumed by its single invocation
//!
//! # Modules
//!
//! - `abi`: RawVar layout, kind tags, unchecked encoders/decoders
//! - `var`: Var enum, HostId, checked accessors and conversions
//! - `code`: host result codes
//! - `completion`: completion callbacks, blocking sentinel, one-shot channel
//! - `error`: thread-local error state for FFI callers

pub mod abi;
pub mod code;
pub mod completion;
pub mod error;
pub mod var;

pub use abi::{
    RawVar, RawVarValue, RefKind, VarKind, decode_bool, decode_double, decode_int32,
    decode_reference, encode_bool, encode_double, encode_int32, encode_reference, make_null,
    make_undefined,
};
pub use code::Code;
pub use completion::{
    CompletionCallback, CompletionDropped, CompletionFn, CompletionReceiver, block_until_complete,
    completion_channel, invoke, make_callback,
};
pub use var::{DecodeError, HostId, Var};

// Error handling
pub use error::{
    clear_runtime_error, format_panic_payload, has_runtime_error,
    plugbridge_clear_error as clear_error, plugbridge_get_error as get_error,
    plugbridge_has_error as has_error, plugbridge_take_error as take_error, set_runtime_error,
    take_runtime_error,
};
