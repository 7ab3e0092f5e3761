//! Stub for constant-time comparison when the "crypto" feature is disabled.
//!
//! Same names and FFI interface, but every call panics with a message
//! explaining how to enable the feature.

use crate::compare::Comparison;

const FEATURE_MSG: &str = "crypto feature not enabled. Rebuild with: cargo build --features crypto";

pub fn constant_time_compare(_a: &[u8], _b: &[u8], _len: usize) -> Comparison {
    panic!("constant_time_compare requires {}", FEATURE_MSG);
}

/// # Safety
/// Never reads its arguments.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn plugbridge_constant_time_compare(
    _a: *const u8,
    _b: *const u8,
    _len: usize,
) -> i32 {
    panic!("plugbridge_constant_time_compare requires {}", FEATURE_MSG);
}
