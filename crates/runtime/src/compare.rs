//! Byte comparison for secrets
//!
//! `constant_time_compare` takes the same time wherever the first mismatch
//! is, so an observer timing it learns nothing about how much of a secret
//! matched. The length being compared is treated as public.
//!
//! `variable_time_compare` gives the same answer with no timing guarantee,
//! for data that is not secret.
//!
//! # C ABI
//!
//! ```c
//! int plugbridge_constant_time_compare(const uint8_t *a, const uint8_t *b, size_t len);
//! int plugbridge_variable_time_compare(const uint8_t *a, const uint8_t *b, size_t len);
//! ```
//!
//! Both return 0 when equal and 1 otherwise.
//!
//! The constant-time half needs the `crypto` feature; without it the same
//! names exist but panic.

use std::fmt;
#[cfg(feature = "crypto")]
use subtle::ConstantTimeEq;

#[cfg(not(feature = "crypto"))]
pub use crate::compare_stub::{constant_time_compare, plugbridge_constant_time_compare};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
}

impl Comparison {
    pub fn is_equal(self) -> bool {
        self == Comparison::Equal
    }

    /// 0 for equal, 1 for not equal
    pub const fn to_c(self) -> i32 {
        match self {
            Comparison::Equal => 0,
            Comparison::NotEqual => 1,
        }
    }
}

impl From<bool> for Comparison {
    fn from(equal: bool) -> Self {
        if equal {
            Comparison::Equal
        } else {
            Comparison::NotEqual
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Equal => write!(f, "equal"),
            Comparison::NotEqual => write!(f, "not equal"),
        }
    }
}

/// The first `len` bytes of both slices, or None if either is too short
fn prefixes<'a>(a: &'a [u8], b: &'a [u8], len: usize) -> Option<(&'a [u8], &'a [u8])> {
    Some((a.get(..len)?, b.get(..len)?))
}

/// Compare the first `len` bytes of `a` and `b` in constant time.
///
/// Running time depends only on `len`. A slice shorter than `len` compares
/// `NotEqual`.
#[cfg(feature = "crypto")]
pub fn constant_time_compare(a: &[u8], b: &[u8], len: usize) -> Comparison {
    match prefixes(a, b, len) {
        Some((a, b)) => bool::from(a.ct_eq(b)).into(),
        None => Comparison::NotEqual,
    }
}

/// Compare the first `len` bytes of `a` and `b`; may return early.
pub fn variable_time_compare(a: &[u8], b: &[u8], len: usize) -> Comparison {
    match prefixes(a, b, len) {
        Some((a, b)) => (a == b).into(),
        None => Comparison::NotEqual,
    }
}

/// Build the two slices for the C entry points. Null pointers are only
/// acceptable for a zero length.
///
/// # Safety
/// Non-null pointers must be valid for reads of `len` bytes.
unsafe fn c_slices<'a>(
    a: *const u8,
    b: *const u8,
    len: usize,
) -> Option<(&'a [u8], &'a [u8])> {
    if len == 0 {
        return Some((&[], &[]));
    }
    if a.is_null() || b.is_null() {
        return None;
    }
    unsafe {
        Some((
            std::slice::from_raw_parts(a, len),
            std::slice::from_raw_parts(b, len),
        ))
    }
}

/// # Safety
/// `a` and `b` must each be valid for reads of `len` bytes.
#[cfg(feature = "crypto")]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn plugbridge_constant_time_compare(
    a: *const u8,
    b: *const u8,
    len: usize,
) -> i32 {
    match unsafe { c_slices(a, b, len) } {
        Some((a, b)) => constant_time_compare(a, b, len).to_c(),
        None => Comparison::NotEqual.to_c(),
    }
}

/// # Safety
/// `a` and `b` must each be valid for reads of `len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn plugbridge_variable_time_compare(
    a: *const u8,
    b: *const u8,
    len: usize,
) -> i32 {
    match unsafe { c_slices(a, b, len) } {
        Some((a, b)) => variable_time_compare(a, b, len).to_c(),
        None => Comparison::NotEqual.to_c(),
    }
}
