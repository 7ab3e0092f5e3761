//! Variant ABI Layout
//!
//! The literal tagged union exchanged with the plugin host. Every value that
//! crosses the boundary is a 16-byte `RawVar` whose layout must match the
//! host's native struct bit for bit.
//!
//! ## Variant Layout (16 bytes)
//!
//! ```text
//! ┌──────────────────┬──────────────────┬───────────────────────────────────┐
//! │  kind (4 bytes)  │ reserved (4)     │  value (8 bytes, untagged union)  │
//! ├──────────────────┼──────────────────┼───────────────────────────────────┤
//! │   i32 tag        │ always 0         │ as_bool | as_int | as_double | id │
//! └──────────────────┴──────────────────┴───────────────────────────────────┘
//!
//! Kind tags:
//! - 0 = Undefined, 1 = Null          (no payload)
//! - 2 = Bool:   as_bool (32-bit, 0 or 1)
//! - 3 = Int32:  as_int
//! - 4 = Double: as_double
//! - 5 = String, 6 = Object, 7 = Array, 8 = Dictionary, 9 = ArrayBuffer:
//!   as_id, an opaque identity minted by the host's object table
//! ```
//!
//! ## Trusting the Kind
//!
//! The encoders and decoders here never cross-check the tag against the arm
//! they read. The host does not enforce it either, and a tag check would not
//! change what crosses the boundary. Reading the wrong arm of a var built
//! here yields an unspecified value: every arm is plain data and the encoders
//! zero-fill the full payload before writing one.
//!
//! A var written by other code may leave the upper payload bytes unset under
//! Bool and Int32, so `==` and `{:?}` only read the arm the kind names.
//!
//! Application code should go through [`crate::var::Var`], which checks.

use std::fmt;
use std::mem::{align_of, offset_of, size_of};

/// Kind tag of a variant.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    Undefined = 0,
    Null = 1,
    Bool = 2,
    Int32 = 3,
    Double = 4,
    String = 5,
    Object = 6,
    Array = 7,
    Dictionary = 8,
    ArrayBuffer = 9,
}

impl VarKind {
    /// Map a raw tag back to a kind. Tags outside the closed set return None.
    pub const fn from_tag(tag: i32) -> Option<VarKind> {
        match tag {
            0 => Some(VarKind::Undefined),
            1 => Some(VarKind::Null),
            2 => Some(VarKind::Bool),
            3 => Some(VarKind::Int32),
            4 => Some(VarKind::Double),
            5 => Some(VarKind::String),
            6 => Some(VarKind::Object),
            7 => Some(VarKind::Array),
            8 => Some(VarKind::Dictionary),
            9 => Some(VarKind::ArrayBuffer),
            _ => None,
        }
    }

    #[inline]
    pub const fn tag(self) -> i32 {
        self as i32
    }

    /// True for the five kinds whose payload is an opaque identity
    pub const fn is_reference(self) -> bool {
        matches!(
            self,
            VarKind::String
                | VarKind::Object
                | VarKind::Array
                | VarKind::Dictionary
                | VarKind::ArrayBuffer
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            VarKind::Undefined => "undefined",
            VarKind::Null => "null",
            VarKind::Bool => "bool",
            VarKind::Int32 => "int32",
            VarKind::Double => "double",
            VarKind::String => "string",
            VarKind::Object => "object",
            VarKind::Array => "array",
            VarKind::Dictionary => "dictionary",
            VarKind::ArrayBuffer => "array buffer",
        }
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// The reference kinds: variants whose payload is a host object identity.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    String = VarKind::String as i32,
    Object = VarKind::Object as i32,
    Array = VarKind::Array as i32,
    Dictionary = VarKind::Dictionary as i32,
    ArrayBuffer = VarKind::ArrayBuffer as i32,
}

impl RefKind {
    pub const ALL: [RefKind; 5] = [
        RefKind::String,
        RefKind::Object,
        RefKind::Array,
        RefKind::Dictionary,
        RefKind::ArrayBuffer,
    ];

    pub const fn kind(self) -> VarKind {
        match self {
            RefKind::String => VarKind::String,
            RefKind::Object => VarKind::Object,
            RefKind::Array => VarKind::Array,
            RefKind::Dictionary => VarKind::Dictionary,
            RefKind::ArrayBuffer => VarKind::ArrayBuffer,
        }
    }
}

impl From<RefKind> for VarKind {
    fn from(kind: RefKind) -> Self {
        kind.kind()
    }
}

impl TryFrom<VarKind> for RefKind {
    type Error = VarKind;

    fn try_from(kind: VarKind) -> Result<Self, Self::Error> {
        match kind {
            VarKind::String => Ok(RefKind::String),
            VarKind::Object => Ok(RefKind::Object),
            VarKind::Array => Ok(RefKind::Array),
            VarKind::Dictionary => Ok(RefKind::Dictionary),
            VarKind::ArrayBuffer => Ok(RefKind::ArrayBuffer),
            other => Err(other),
        }
    }
}

/// Untagged payload of a variant. The active arm is named by `RawVar::kind`.
#[repr(C)]
#[derive(Clone, Copy)]
pub union RawVarValue {
    /// Host 32-bit boolean: 0 = false, 1 = true
    pub as_bool: i32,
    pub as_int: i32,
    pub as_double: f64,
    /// Opaque identity for the reference kinds
    pub as_id: u64,
}

impl RawVarValue {
    #[inline]
    const fn zeroed() -> Self {
        RawVarValue { as_id: 0 }
    }
}

/// The variant struct exactly as the host declares it.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawVar {
    /// Kind tag (see [`VarKind`]); kept as the raw i32 because the host owns it
    pub kind: i32,
    /// Padding slot, always zero
    pub reserved: i32,
    pub value: RawVarValue,
}

/// Size of RawVar in bytes
pub const RAW_VAR_SIZE: usize = size_of::<RawVar>();

const _: () = assert!(RAW_VAR_SIZE == 16, "RawVar must be 16 bytes");
const _: () = assert!(align_of::<RawVar>() == 8, "RawVar must be 8-byte aligned");
const _: () = assert!(offset_of!(RawVar, reserved) == 4);
const _: () = assert!(offset_of!(RawVar, value) == 8, "payload must start at offset 8");
const _: () = assert!(size_of::<RawVarValue>() == 8);

impl RawVar {
    #[inline]
    const fn with_value(kind: VarKind, value: RawVarValue) -> Self {
        RawVar {
            kind: kind.tag(),
            reserved: 0,
            value,
        }
    }

    /// Raw tag as stored in the struct
    #[inline]
    pub const fn tag(&self) -> i32 {
        self.kind
    }

    /// Decoded kind, or None for a tag outside the closed set
    #[inline]
    pub const fn kind(&self) -> Option<VarKind> {
        VarKind::from_tag(self.kind)
    }

    /// All 64 payload bits, whichever arm is active.
    ///
    /// # Safety
    /// All 8 payload bytes must be initialized. Every encoder here zero-fills
    /// them, but a `RawVarValue { as_bool: .. }` literal writes only four.
    #[inline]
    pub unsafe fn payload_bits(&self) -> u64 {
        unsafe { self.value.as_id }
    }

    /// Low 32 payload bits, initialized under every arm
    #[inline]
    fn low_bits(&self) -> i32 {
        // SAFETY: each arm starts at offset 0 and is at least 4 bytes wide.
        unsafe { self.value.as_int }
    }

    /// Payload bits of the arm the kind names. Bool and Int32 only own four
    /// bytes; unknown tags are read the same way since their width is unknown.
    fn arm_bits(&self) -> u64 {
        match self.kind() {
            Some(VarKind::Undefined | VarKind::Null) => 0,
            Some(VarKind::Bool | VarKind::Int32) | None => self.low_bits() as u32 as u64,
            Some(VarKind::Double) => decode_double(*self).to_bits(),
            Some(_) => decode_reference(*self),
        }
    }
}

impl PartialEq for RawVar {
    /// Equal when the tag, the reserved slot and the bits of the active arm
    /// all match. Double compares bitwise, so NaN equals the same NaN.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.reserved == other.reserved
            && self.arm_bits() == other.arm_bits()
    }
}

impl Eq for RawVar {}

impl fmt::Debug for RawVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(VarKind::Undefined) => write!(f, "Undefined"),
            Some(VarKind::Null) => write!(f, "Null"),
            Some(VarKind::Bool) => write!(f, "Bool({})", decode_bool(*self)),
            Some(VarKind::Int32) => write!(f, "Int32({})", decode_int32(*self)),
            Some(VarKind::Double) => write!(f, "Double({})", decode_double(*self)),
            Some(kind) => write!(f, "{:?}(#{})", kind, decode_reference(*self)),
            None => write!(
                f,
                "RawVar {{ kind: {}, reserved: {}, value: 0x{:08x} }}",
                self.kind,
                self.reserved,
                self.arm_bits()
            ),
        }
    }
}

// =============================================================================
// Encoders / decoders
// =============================================================================

/// The undefined variant (no payload)
#[inline]
pub fn make_undefined() -> RawVar {
    RawVar::with_value(VarKind::Undefined, RawVarValue::zeroed())
}

/// The null variant (no payload)
#[inline]
pub fn make_null() -> RawVar {
    RawVar::with_value(VarKind::Null, RawVarValue::zeroed())
}

#[inline]
pub fn encode_bool(v: bool) -> RawVar {
    let mut value = RawVarValue::zeroed();
    value.as_bool = v as i32;
    RawVar::with_value(VarKind::Bool, value)
}

/// Precondition: `x.kind == Bool`. Any other kind yields an unspecified value.
#[inline]
pub fn decode_bool(x: RawVar) -> bool {
    // SAFETY: plain-data arm over an initialized payload.
    unsafe { x.value.as_bool != 0 }
}

#[inline]
pub fn encode_int32(v: i32) -> RawVar {
    let mut value = RawVarValue::zeroed();
    value.as_int = v;
    RawVar::with_value(VarKind::Int32, value)
}

/// Precondition: `x.kind == Int32`.
#[inline]
pub fn decode_int32(x: RawVar) -> i32 {
    // SAFETY: plain-data arm over an initialized payload.
    unsafe { x.value.as_int }
}

#[inline]
pub fn encode_double(v: f64) -> RawVar {
    RawVar::with_value(VarKind::Double, RawVarValue { as_double: v })
}

/// Precondition: `x.kind == Double`.
#[inline]
pub fn decode_double(x: RawVar) -> f64 {
    // SAFETY: plain-data arm over an initialized payload.
    unsafe { x.value.as_double }
}

/// Wrap a host object identity as a variant of the given reference kind.
#[inline]
pub fn encode_reference(kind: RefKind, id: u64) -> RawVar {
    RawVar::with_value(kind.kind(), RawVarValue { as_id: id })
}

/// Read the opaque identity. The caller must already know the kind is one of
/// the reference kinds; which one is not checked.
#[inline]
pub fn decode_reference(x: RawVar) -> u64 {
    // SAFETY: plain-data arm over an initialized payload.
    unsafe { x.value.as_id }
}

// =============================================================================
// Exported shims (C ABI)
// =============================================================================

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_make_undefined() -> RawVar {
    make_undefined()
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_make_null() -> RawVar {
    make_null()
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_bool_to_var(value: bool) -> RawVar {
    encode_bool(value)
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_bool_from_var(var: RawVar) -> bool {
    decode_bool(var)
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_i32_to_var(value: i32) -> RawVar {
    encode_int32(value)
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_i32_from_var(var: RawVar) -> i32 {
    decode_int32(var)
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_f64_to_var(value: f64) -> RawVar {
    encode_double(value)
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_f64_from_var(var: RawVar) -> f64 {
    decode_double(var)
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_string_id_to_var(id: u64) -> RawVar {
    encode_reference(RefKind::String, id)
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_object_id_to_var(id: u64) -> RawVar {
    encode_reference(RefKind::Object, id)
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_array_id_to_var(id: u64) -> RawVar {
    encode_reference(RefKind::Array, id)
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_dictionary_id_to_var(id: u64) -> RawVar {
    encode_reference(RefKind::Dictionary, id)
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_array_buffer_id_to_var(id: u64) -> RawVar {
    encode_reference(RefKind::ArrayBuffer, id)
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_id_from_var(var: RawVar) -> u64 {
    decode_reference(var)
}
