//! Last-error slot for the C boundary
//!
//! Panics must not unwind into the host, so exported functions and callback
//! trampolines report failures here and return a status code instead. Each
//! thread has one slot holding the message and, once a native caller has
//! asked for it, the NUL-terminated copy that caller is reading.
//!
//! ```ignore
//! if let Err(e) = fill_random_from(&mut source, buf) {
//!     set_runtime_error(format!("fill_random: {}", e));
//!     return e.code();
//! }
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::ffi::{CString, c_char};
use std::ptr;

#[derive(Default)]
struct ErrorSlot {
    message: Option<String>,
    /// Backing store for the last pointer handed to C
    exported: Option<CString>,
}

thread_local! {
    static SLOT: RefCell<ErrorSlot> = RefCell::new(ErrorSlot::default());
}

/// Replace this thread's error message. A previously exported pointer dies.
pub fn set_runtime_error(msg: impl Into<String>) {
    let msg = msg.into();
    SLOT.with(|slot| {
        let mut slot = slot.borrow_mut();
        slot.exported = None;
        slot.message = Some(msg);
    });
}

pub fn take_runtime_error() -> Option<String> {
    SLOT.with(|slot| slot.borrow_mut().message.take())
}

pub fn has_runtime_error() -> bool {
    SLOT.with(|slot| slot.borrow().message.is_some())
}

pub fn clear_runtime_error() {
    SLOT.with(|slot| *slot.borrow_mut() = ErrorSlot::default());
}

/// Text of a payload caught by `catch_unwind`
pub fn format_panic_payload(payload: &(dyn Any + Send)) -> String {
    match payload.downcast_ref::<&str>() {
        Some(s) => s.to_string(),
        None => payload
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}

/// Keep a C copy of `msg` in the slot and point at it. NUL bytes become '?'.
fn export(msg: String) -> *const c_char {
    let bytes: Vec<u8> = msg
        .into_bytes()
        .into_iter()
        .map(|b| if b == 0 { b'?' } else { b })
        .collect();
    let Ok(text) = CString::new(bytes) else {
        return ptr::null();
    };
    SLOT.with(|slot| slot.borrow_mut().exported.insert(text).as_ptr())
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_has_error() -> bool {
    has_runtime_error()
}

/// This thread's error message, or null. The message stays set.
///
/// The returned string lives until this thread next records, reads, takes
/// or clears an error.
#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_get_error() -> *const c_char {
    match SLOT.with(|slot| slot.borrow().message.clone()) {
        Some(msg) => export(msg),
        None => ptr::null(),
    }
}

/// Like [`plugbridge_get_error`], but clears the message.
#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_take_error() -> *const c_char {
    take_runtime_error().map_or(ptr::null(), export)
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_clear_error() {
    clear_runtime_error();
}
