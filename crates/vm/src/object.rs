//! Heap objects.
//!
//! Objects live in the object table of their [`Vm`](crate::Vm) and are named by
//! an [`ObjRef`]. Every object also sits on an intrusive list threaded through
//! [`ObjHeader::next`], newest first, which the collector walks.

use std::ptr::NonNull;

use crate::buffer::Buffer;
use crate::value::{RawValue, Value};

slotmap::new_key_type! {
    /// Handle to an object owned by a [`Vm`](crate::Vm).
    ///
    /// Handles are versioned: once the object is released, the handle goes
    /// stale and the VM rejects it instead of handing out whatever reused the
    /// slot.
    pub struct ObjRef;
}

/// Bytes charged for the header of every object, whatever its kind.
pub const OBJ_HEADER_SIZE: usize = std::mem::size_of::<Obj>();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjKind {
    String,
    Array,
    Map,
}

impl std::fmt::Display for ObjKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjKind::String => f.write_str("string"),
            ObjKind::Array => f.write_str("array"),
            ObjKind::Map => f.write_str("map"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ObjHeader {
    pub kind: ObjKind,
    /// Mark bit, reserved for the collector.
    pub dark: bool,
    /// The next older object.
    pub next: Option<ObjRef>,
}

#[derive(Debug)]
pub struct Obj {
    pub header: ObjHeader,
    pub body: ObjBody,
}

impl Obj {
    pub fn kind(&self) -> ObjKind {
        self.header.kind
    }
}

#[derive(Debug)]
pub enum ObjBody {
    String(StringObj),
    Array(ArrayObj),
    Map(MapObj),
}

impl ObjBody {
    pub fn kind(&self) -> ObjKind {
        match self {
            ObjBody::String(_) => ObjKind::String,
            ObjBody::Array(_) => ObjKind::Array,
            ObjBody::Map(_) => ObjKind::Map,
        }
    }
}

/// An immutable byte string.
///
/// The bytes need not be valid UTF-8. They are followed by a NUL terminator
/// that does not count towards the length.
pub struct StringObj {
    pub(crate) len: usize,
    pub(crate) data: NonNull<u8>,
}

impl StringObj {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `data` points to `len + 1` initialized bytes owned by this
        // object until it is released.
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// The bytes followed by the NUL terminator.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len + 1) }
    }

    /// Size of the heap block backing this string.
    pub(crate) fn block_size(&self) -> usize {
        self.len + 1
    }
}

impl std::fmt::Debug for StringObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\"", self.as_bytes().escape_ascii())
    }
}

/// A growable sequence of values.
#[derive(Debug)]
pub struct ArrayObj {
    pub(crate) elements: Buffer<RawValue>,
}

impl ArrayObj {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.elements.get(index).map(Value::from)
    }

    /// The packed elements.
    pub fn elements(&self) -> &[RawValue] {
        self.elements.as_slice()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapEntry {
    pub key: RawValue,
    pub value: RawValue,
}

/// A hash map from values to values.
///
/// Only the layout exists for now. Nothing creates maps yet.
#[derive(Debug)]
pub struct MapObj {
    pub(crate) entries: Buffer<MapEntry>,
    pub(crate) count: usize,
}

impl MapObj {
    /// Number of occupied entries.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }
}
