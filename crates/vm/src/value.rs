mod repr;

pub use self::repr::RawValue;

use crate::object::ObjRef;

/// A Glint value.
///
/// This is the unpacked view used by the API. Values are stored packed into a
/// single word as [`RawValue`], and every `Value` survives the trip through
/// that form, except that NaN payloads are not preserved.
///
/// There is no `PartialEq`. [`Value::same`] compares identity without looking
/// at the heap, while [`Vm::values_eq`](crate::Vm::values_eq) compares contents.
#[derive(Debug, Clone, Copy)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Object(ObjRef),
}

impl Value {
    pub const TRUE: Value = Value::Bool(true);
    pub const FALSE: Value = Value::Bool(false);

    /// Returns `true` if the value is [`Null`].
    ///
    /// [`Null`]: Value::Null
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` if the value is [`Bool`].
    ///
    /// [`Bool`]: Value::Bool
    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(..))
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    /// Returns `true` if the value is [`Number`].
    ///
    /// [`Number`]: Value::Number
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Number(..))
    }

    pub fn as_number(&self) -> Option<f64> {
        if let Self::Number(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    /// Returns `true` if the value is an [`Object`] handle. Whether the object
    /// is still alive is up to the VM.
    ///
    /// [`Object`]: Value::Object
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(..))
    }

    pub fn as_object(&self) -> Option<ObjRef> {
        if let Self::Object(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    /// Identity: true iff both values pack to the same bits.
    ///
    /// Numbers compare by bit pattern, so `0.0` and `-0.0` differ and a NaN is
    /// the same as itself. Objects compare by handle.
    pub fn same(self, other: Value) -> bool {
        RawValue::from(self) == RawValue::from(other)
    }

    /// Pack into a single word.
    pub fn to_raw(self) -> RawValue {
        RawValue::from(self)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<ObjRef> for Value {
    fn from(v: ObjRef) -> Self {
        Value::Object(v)
    }
}
