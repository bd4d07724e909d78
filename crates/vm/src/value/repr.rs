//! NaN-boxed value representation.
//!
//! A [`RawValue`] is a 64-bit word. Ordinary doubles are stored as-is. Quiet
//! NaNs with the bits in [`QNAN`] set carry everything else:
//!
//! ```text
//! sign  exponent + quiet bits                payload (50 bits)
//!  0    111 1111 1111 11                     ...............tag   singleton
//!  1    111 1111 1111 11                     version:18 | index:32  object
//! ```
//!
//! Singletons use the low three bits as a tag. Objects pack the slot index of
//! their [`ObjRef`] in the low 32 bits and its version above that. A slot whose
//! version reaches [`RawValue::is_final_version`] is never reused, so every
//! live handle fits.
//!
//! Doubles whose bits happen to fall in the boxed space (NaNs with the same
//! quiet bits, of either sign) are folded into a single canonical NaN.

use slotmap::{Key, KeyData};
use static_assertions::assert_eq_size;

use super::Value;
use crate::object::ObjRef;

const SIGN_BIT: u64 = 1 << 63;
const QNAN: u64 = 0x7ffc_0000_0000_0000;
const BOXED: u64 = SIGN_BIT | QNAN;
const PAYLOAD_MASK: u64 = !BOXED;

const TAG_MASK: u64 = 0b111;
const TAG_NAN: u64 = 0;
const TAG_NULL: u64 = 1;
const TAG_FALSE: u64 = 2;
const TAG_TRUE: u64 = 3;

const INDEX_MASK: u64 = 0xffff_ffff;
const VERSION_BITS: u32 = 18;
const VERSION_MASK: u64 = (1 << VERSION_BITS) - 1;

assert_eq_size!(RawValue, u64);
assert_eq_size!(ObjRef, u64);

/// A packed [`Value`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawValue(u64);

impl RawValue {
    pub const NULL: RawValue = RawValue(QNAN | TAG_NULL);
    pub const FALSE: RawValue = RawValue(QNAN | TAG_FALSE);
    pub const TRUE: RawValue = RawValue(QNAN | TAG_TRUE);
    /// The canonical NaN every boxed-space double collapses to.
    pub const NAN: RawValue = RawValue(QNAN | TAG_NAN);

    pub const fn from_bits(bits: u64) -> RawValue {
        RawValue(bits)
    }

    pub const fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_number(n: f64) -> RawValue {
        let bits = n.to_bits();
        if bits & QNAN == QNAN {
            RawValue::NAN
        } else {
            RawValue(bits)
        }
    }

    pub const fn from_bool(b: bool) -> RawValue {
        if b {
            RawValue::TRUE
        } else {
            RawValue::FALSE
        }
    }

    pub fn from_object(obj: ObjRef) -> RawValue {
        let ffi = obj.data().as_ffi();
        let index = ffi & INDEX_MASK;
        // Occupied slots always have an odd version, so the low bit is implied.
        let version = (ffi >> 32) >> 1;
        debug_assert!(
            version <= VERSION_MASK,
            "object slot reused too many times to be packed"
        );
        RawValue(BOXED | ((version & VERSION_MASK) << 32) | index)
    }

    /// Whether `obj` carries the last version that still fits in the payload.
    /// Its slot must be retired instead of reused once it is released.
    pub(crate) fn is_final_version(obj: ObjRef) -> bool {
        let version = (obj.data().as_ffi() >> 32) >> 1;
        version >= VERSION_MASK
    }

    pub const fn is_object(self) -> bool {
        self.0 & BOXED == BOXED
    }

    pub fn as_object(self) -> Option<ObjRef> {
        if !self.is_object() {
            return None;
        }
        let payload = self.0 & PAYLOAD_MASK;
        let index = payload & INDEX_MASK;
        let version = ((payload >> 32) << 1) | 1;
        Some(KeyData::from_ffi((version << 32) | index).into())
    }

    pub const fn is_null(self) -> bool {
        self.0 == RawValue::NULL.0
    }
}

impl From<Value> for RawValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => RawValue::NULL,
            Value::Bool(b) => RawValue::from_bool(b),
            Value::Number(n) => RawValue::from_number(n),
            Value::Object(obj) => RawValue::from_object(obj),
        }
    }
}

impl From<RawValue> for Value {
    fn from(v: RawValue) -> Self {
        if let Some(obj) = v.as_object() {
            return Value::Object(obj);
        }
        if v.0 & BOXED == QNAN {
            match v.0 & TAG_MASK {
                TAG_NULL => return Value::Null,
                TAG_FALSE => return Value::Bool(false),
                TAG_TRUE => return Value::Bool(true),
                _ => {}
            }
        }
        Value::Number(f64::from_bits(v.0))
    }
}

impl std::fmt::Debug for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawValue({:#018x} = {:?})", self.0, Value::from(*self))
    }
}
