//! Language-side variant values
//!
//! `Var` is the tagged enum application code works with. It converts to and
//! from the literal [`RawVar`] at the boundary and, unlike the raw decoders,
//! reports a [`DecodeError`] instead of reading a payload arm that the kind
//! does not name.
//!
//! Reference kinds carry a [`HostId`]: an opaque handle into the host's
//! object table. This crate never adds or drops references on those handles;
//! their lifetime belongs to the host.

use crate::abi::{
    self, RawVar, RefKind, VarKind, decode_bool, decode_double, decode_int32, decode_reference,
    encode_bool, encode_double, encode_int32, encode_reference,
};
use std::fmt;

/// Opaque identity of a host-owned object.
///
/// Comparing two `HostId`s compares the numbers only; it says nothing about
/// whether either still names a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(u64);

impl HostId {
    #[inline]
    pub const fn new(id: u64) -> Self {
        HostId(id)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Error converting a variant into a specific Rust type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The raw tag is outside the closed set of kinds
    UnknownKind(i32),
    /// The variant holds a different kind than the accessor reads
    KindMismatch { expected: VarKind, found: VarKind },
    /// A reference kind was required
    NotAReference(VarKind),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownKind(tag) => write!(f, "unknown variant kind tag {}", tag),
            DecodeError::KindMismatch { expected, found } => {
                write!(f, "expected {} variant, found {}", expected, found)
            }
            DecodeError::NotAReference(found) => {
                write!(f, "expected a reference variant, found {}", found)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Var: a boundary value as the language side sees it
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Var {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int32(i32),
    Double(f64),
    String(HostId),
    Object(HostId),
    Array(HostId),
    Dictionary(HostId),
    ArrayBuffer(HostId),
}

impl Var {
    /// Build a reference variant of the given kind
    pub const fn reference(kind: RefKind, id: HostId) -> Var {
        match kind {
            RefKind::String => Var::String(id),
            RefKind::Object => Var::Object(id),
            RefKind::Array => Var::Array(id),
            RefKind::Dictionary => Var::Dictionary(id),
            RefKind::ArrayBuffer => Var::ArrayBuffer(id),
        }
    }

    pub const fn kind(&self) -> VarKind {
        match self {
            Var::Undefined => VarKind::Undefined,
            Var::Null => VarKind::Null,
            Var::Bool(_) => VarKind::Bool,
            Var::Int32(_) => VarKind::Int32,
            Var::Double(_) => VarKind::Double,
            Var::String(_) => VarKind::String,
            Var::Object(_) => VarKind::Object,
            Var::Array(_) => VarKind::Array,
            Var::Dictionary(_) => VarKind::Dictionary,
            Var::ArrayBuffer(_) => VarKind::ArrayBuffer,
        }
    }

    pub const fn is_undefined(&self) -> bool {
        matches!(self, Var::Undefined)
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Var::Null)
    }

    pub const fn is_reference(&self) -> bool {
        self.kind().is_reference()
    }

    /// Decode a boundary value. The tag is checked; the payload is read
    /// through the arm the tag names.
    pub fn from_raw(raw: RawVar) -> Result<Var, DecodeError> {
        let kind = raw.kind().ok_or(DecodeError::UnknownKind(raw.tag()))?;
        let var = match kind {
            VarKind::Undefined => Var::Undefined,
            VarKind::Null => Var::Null,
            VarKind::Bool => Var::Bool(decode_bool(raw)),
            VarKind::Int32 => Var::Int32(decode_int32(raw)),
            VarKind::Double => Var::Double(decode_double(raw)),
            VarKind::String => Var::String(HostId(decode_reference(raw))),
            VarKind::Object => Var::Object(HostId(decode_reference(raw))),
            VarKind::Array => Var::Array(HostId(decode_reference(raw))),
            VarKind::Dictionary => Var::Dictionary(HostId(decode_reference(raw))),
            VarKind::ArrayBuffer => Var::ArrayBuffer(HostId(decode_reference(raw))),
        };
        Ok(var)
    }

    /// Encode for the boundary
    pub fn to_raw(&self) -> RawVar {
        match *self {
            Var::Undefined => abi::make_undefined(),
            Var::Null => abi::make_null(),
            Var::Bool(b) => encode_bool(b),
            Var::Int32(i) => encode_int32(i),
            Var::Double(d) => encode_double(d),
            Var::String(id) => encode_reference(RefKind::String, id.0),
            Var::Object(id) => encode_reference(RefKind::Object, id.0),
            Var::Array(id) => encode_reference(RefKind::Array, id.0),
            Var::Dictionary(id) => encode_reference(RefKind::Dictionary, id.0),
            Var::ArrayBuffer(id) => encode_reference(RefKind::ArrayBuffer, id.0),
        }
    }

    fn mismatch(&self, expected: VarKind) -> DecodeError {
        DecodeError::KindMismatch {
            expected,
            found: self.kind(),
        }
    }

    pub fn as_bool(&self) -> Result<bool, DecodeError> {
        match self {
            Var::Bool(b) => Ok(*b),
            _ => Err(self.mismatch(VarKind::Bool)),
        }
    }

    pub fn as_i32(&self) -> Result<i32, DecodeError> {
        match self {
            Var::Int32(i) => Ok(*i),
            _ => Err(self.mismatch(VarKind::Int32)),
        }
    }

    pub fn as_f64(&self) -> Result<f64, DecodeError> {
        match self {
            Var::Double(d) => Ok(*d),
            _ => Err(self.mismatch(VarKind::Double)),
        }
    }

    /// Kind and identity of a reference variant
    pub fn as_reference(&self) -> Result<(RefKind, HostId), DecodeError> {
        match *self {
            Var::String(id) => Ok((RefKind::String, id)),
            Var::Object(id) => Ok((RefKind::Object, id)),
            Var::Array(id) => Ok((RefKind::Array, id)),
            Var::Dictionary(id) => Ok((RefKind::Dictionary, id)),
            Var::ArrayBuffer(id) => Ok((RefKind::ArrayBuffer, id)),
            _ => Err(DecodeError::NotAReference(self.kind())),
        }
    }

    /// Identity of a reference variant of exactly `kind`
    pub fn expect_reference(&self, kind: RefKind) -> Result<HostId, DecodeError> {
        let (found, id) = self.as_reference()?;
        if found == kind {
            Ok(id)
        } else {
            Err(self.mismatch(kind.kind()))
        }
    }
}

impl TryFrom<RawVar> for Var {
    type Error = DecodeError;

    fn try_from(raw: RawVar) -> Result<Self, Self::Error> {
        Var::from_raw(raw)
    }
}

impl From<Var> for RawVar {
    fn from(var: Var) -> Self {
        var.to_raw()
    }
}

impl From<bool> for Var {
    fn from(b: bool) -> Self {
        Var::Bool(b)
    }
}

// Narrow integers widen to the host's only integer kind.
macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Var {
                fn from(i: $ty) -> Self {
                    Var::Int32(i32::from(i))
                }
            }
        )*
    };
}
impl_from_int!(i8, i16, i32, u8, u16);

impl From<f32> for Var {
    fn from(f: f32) -> Self {
        Var::Double(f64::from(f))
    }
}

impl From<f64> for Var {
    fn from(f: f64) -> Self {
        Var::Double(f)
    }
}

/// `None` crosses as undefined
impl<T: Into<Var>> From<Option<T>> for Var {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Var::Undefined,
        }
    }
}

impl TryFrom<Var> for bool {
    type Error = DecodeError;

    fn try_from(var: Var) -> Result<Self, Self::Error> {
        var.as_bool()
    }
}

impl TryFrom<Var> for i32 {
    type Error = DecodeError;

    fn try_from(var: Var) -> Result<Self, Self::Error> {
        var.as_i32()
    }
}

impl TryFrom<Var> for f64 {
    type Error = DecodeError;

    fn try_from(var: Var) -> Result<Self, Self::Error> {
        var.as_f64()
    }
}
