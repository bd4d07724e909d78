
use std::any::Any;

use slotmap::SlotMap;
use tracing::debug;

use crate::buffer::Buffer;
use crate::config::{Configuration, ErrorFn, ErrorReport, WriteFn};
use crate::gc::{AllocError, Heap, HostAllocator, MiMalloc};
use crate::object::{
    ArrayObj, Obj, ObjBody, ObjHeader, ObjKind, ObjRef, StringObj, OBJ_HEADER_SIZE,
};
use crate::value::{RawValue, Value};

/// Errors from operations on objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    /// The handle names an object that has been released.
    #[error("object has already been released")]
    StaleObject,

    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: ObjKind, found: ObjKind },

    #[error("index {index} is out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// A Glint virtual machine: the heap, every object allocated on it, and the
/// host callbacks.
///
/// Dropping the VM releases all of its objects.
pub struct Vm {
    heap: Heap,
    /// `None` marks a retired slot: its version can't grow any further without
    /// overflowing a packed handle, so it stays occupied forever.
    objects: SlotMap<ObjRef, Option<Obj>>,
    retired: usize,
    /// Newest object. The rest follow through [`ObjHeader::next`].
    first_obj: Option<ObjRef>,

    write: Option<WriteFn>,
    on_error: Option<ErrorFn>,
    user_data: Option<Box<dyn Any>>,
}

impl Vm {
    pub fn new(config: Configuration) -> Vm {
        let initial_heap_size = config.initial_heap_size_or_default();
        let min_heap_size = config.min_heap_size_or_default();
        let heap_growth_percent = config.heap_growth_percent_or_default();
        debug!(
            initial_heap_size,
            min_heap_size, heap_growth_percent, "creating vm"
        );

        let host = config
            .reallocate
            .unwrap_or_else(|| Box::new(MiMalloc) as Box<dyn HostAllocator>);
        Vm {
            heap: Heap::new(host, initial_heap_size, min_heap_size, heap_growth_percent),
            objects: SlotMap::with_key(),
            retired: 0,
            first_obj: None,
            write: config.write,
            on_error: config.on_error,
            user_data: config.user_data,
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn collect_garbage(&mut self) {
        self.heap.collect_garbage()
    }

    /// Send `text` to the host's output callback, if any.
    pub fn write_output(&mut self, text: &str) {
        if let Some(write) = &mut self.write {
            write(text);
        }
    }

    /// Send an error to the host's error callback, if any.
    pub fn report_error(&mut self, report: ErrorReport<'_>) {
        if let Some(on_error) = &mut self.on_error {
            on_error(report);
        }
    }

    pub fn user_data(&self) -> Option<&dyn Any> {
        self.user_data.as_deref()
    }

    pub fn user_data_mut(&mut self) -> Option<&mut dyn Any> {
        self.user_data.as_deref_mut()
    }

    /// Allocate a string holding a copy of `bytes`.
    pub fn new_string(&mut self, bytes: &[u8]) -> Result<Value, AllocError> {
        let size = bytes
            .len()
            .checked_add(1)
            .ok_or(AllocError::CapacityOverflow)?;

        // SAFETY: the block is `len + 1` bytes, and is freed with the same size
        // when the string is released.
        let data = unsafe {
            let data = self.heap.allocate(size)?;
            data.as_ptr()
                .copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            data.as_ptr().add(bytes.len()).write(0);
            data
        };

        let string = StringObj {
            len: bytes.len(),
            data,
        };
        Ok(Value::Object(self.register(ObjBody::String(string))))
    }

    /// Allocate an array of `len` nulls.
    pub fn new_array(&mut self, len: usize) -> Result<Value, AllocError> {
        let mut elements = Buffer::new();
        elements.fill(&mut self.heap, RawValue::NULL, len)?;
        let array = ArrayObj { elements };
        Ok(Value::Object(self.register(ObjBody::Array(array))))
    }

    /// Put `body` on the object list and charge its header.
    fn register(&mut self, body: ObjBody) -> ObjRef {
        let header = ObjHeader {
            kind: body.kind(),
            dark: false,
            next: self.first_obj,
        };
        let obj = self.objects.insert(Some(Obj { header, body }));
        self.first_obj = Some(obj);
        self.heap.charge(0, OBJ_HEADER_SIZE);
        obj
    }

    /// Free an object and everything it owns.
    ///
    /// The handle, and every copy of it, goes stale. Releasing it again is an
    /// error instead of a double free.
    pub fn release(&mut self, obj: ObjRef) -> Result<(), HeapError> {
        let removed = if RawValue::is_final_version(obj) {
            let removed = self
                .objects
                .get_mut(obj)
                .and_then(Option::take)
                .ok_or(HeapError::StaleObject)?;
            self.retired += 1;
            debug!(?obj, "retiring object slot");
            removed
        } else {
            self.objects
                .remove(obj)
                .flatten()
                .ok_or(HeapError::StaleObject)?
        };
        self.unlink(obj, removed.header.next);

        match removed.body {
            ObjBody::String(string) => unsafe {
                self.heap.free(string.data, string.block_size());
            },
            ObjBody::Array(mut array) => array.elements.clear(&mut self.heap),
            ObjBody::Map(mut map) => map.entries.clear(&mut self.heap),
        }
        self.heap.charge(OBJ_HEADER_SIZE, 0);
        Ok(())
    }

    fn unlink(&mut self, obj: ObjRef, next: Option<ObjRef>) {
        if self.first_obj == Some(obj) {
            self.first_obj = next;
            return;
        }
        let mut cursor = self.first_obj;
        while let Some(current) = cursor {
            let header = match self.get_mut(current) {
                Some(o) => &mut o.header,
                None => break,
            };
            if header.next == Some(obj) {
                header.next = next;
                return;
            }
            cursor = header.next;
        }
    }

    fn get_mut(&mut self, obj: ObjRef) -> Option<&mut Obj> {
        self.objects.get_mut(obj)?.as_mut()
    }

    pub fn object(&self, obj: ObjRef) -> Option<&Obj> {
        self.objects.get(obj)?.as_ref()
    }

    pub fn object_kind(&self, obj: ObjRef) -> Option<ObjKind> {
        self.object(obj).map(Obj::kind)
    }

    pub fn contains(&self, obj: ObjRef) -> bool {
        self.object(obj).is_some()
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.objects.len() - self.retired
    }

    pub fn first_obj(&self) -> Option<ObjRef> {
        self.first_obj
    }

    /// Walk the object list, newest first.
    pub fn objects(&self) -> Objects<'_> {
        Objects {
            vm: self,
            cursor: self.first_obj,
        }
    }

    pub fn is_dark(&self, obj: ObjRef) -> Option<bool> {
        self.object(obj).map(|o| o.header.dark)
    }

    pub fn set_dark(&mut self, obj: ObjRef, dark: bool) -> Result<(), HeapError> {
        let o = self.get_mut(obj).ok_or(HeapError::StaleObject)?;
        o.header.dark = dark;
        Ok(())
    }

    /// Returns `true` if `value` is a live string.
    pub fn is_string(&self, value: Value) -> bool {
        self.string(value).is_some()
    }

    fn string(&self, value: Value) -> Option<&StringObj> {
        match &self.object(value.as_object()?)?.body {
            ObjBody::String(s) => Some(s),
            _ => None,
        }
    }

    /// The bytes of a string value, without the NUL terminator.
    pub fn string_bytes(&self, value: Value) -> Option<&[u8]> {
        self.string(value).map(StringObj::as_bytes)
    }

    fn array(&self, value: Value) -> Option<&ArrayObj> {
        match &self.object(value.as_object()?)?.body {
            ObjBody::Array(a) => Some(a),
            _ => None,
        }
    }

    fn array_parts_mut(
        &mut self,
        obj: ObjRef,
    ) -> Result<(&mut Buffer<RawValue>, &mut Heap), HeapError> {
        let heap = &mut self.heap;
        match self.objects.get_mut(obj).and_then(Option::as_mut) {
            Some(Obj {
                body: ObjBody::Array(array),
                ..
            }) => Ok((&mut array.elements, heap)),
            Some(other) => Err(HeapError::TypeMismatch {
                expected: ObjKind::Array,
                found: other.kind(),
            }),
            None => Err(HeapError::StaleObject),
        }
    }

    pub fn array_len(&self, value: Value) -> Option<usize> {
        self.array(value).map(ArrayObj::len)
    }

    pub fn array_get(&self, value: Value, index: usize) -> Option<Value> {
        self.array(value)?.get(index)
    }

    pub fn array_set(
        &mut self,
        array: ObjRef,
        index: usize,
        value: Value,
    ) -> Result<(), HeapError> {
        let (elements, _) = self.array_parts_mut(array)?;
        let len = elements.len();
        if elements.set(index, value.to_raw()) {
            Ok(())
        } else {
            Err(HeapError::IndexOutOfBounds { index, len })
        }
    }

    pub fn array_push(&mut self, array: ObjRef, value: Value) -> Result<(), HeapError> {
        let (elements, heap) = self.array_parts_mut(array)?;
        elements.write(heap, value.to_raw())?;
        Ok(())
    }

    /// Structural equality.
    ///
    /// Values that are [`Value::same`] are equal. Beyond that, two strings are
    /// equal if their bytes are, and two arrays are equal if they have the same
    /// length and their elements are pairwise the same. Array elements are
    /// compared by identity, not recursively.
    pub fn values_eq(&self, a: Value, b: Value) -> bool {
        if a.same(b) {
            return true;
        }
        let (a, b) = match (a.as_object(), b.as_object()) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };
        match (self.object(a), self.object(b)) {
            (Some(a), Some(b)) => match (&a.body, &b.body) {
                (ObjBody::String(a), ObjBody::String(b)) => a.as_bytes() == b.as_bytes(),
                (ObjBody::Array(a), ObjBody::Array(b)) => a.elements() == b.elements(),
                _ => false,
            },
            _ => false,
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new(Configuration::default())
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        let objects = self.object_count();
        while let Some(obj) = self.first_obj {
            if self.release(obj).is_err() {
                break;
            }
        }
        debug!(
            objects,
            bytes_leaked = self.heap.bytes_allocated(),
            "dropping vm"
        );
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("heap", &self.heap)
            .field("objects", &self.object_count())
            .field("retired", &self.retired)
            .finish()
    }
}

/// Iterator over the object list of a [`Vm`], newest first.
pub struct Objects<'a> {
    vm: &'a Vm,
    cursor: Option<ObjRef>,
}

impl<'a> Iterator for Objects<'a> {
    type Item = (ObjRef, &'a Obj);

    fn next(&mut self) -> Option<Self::Item> {
        let obj = self.cursor?;
        let o = self.vm.object(obj)?;
        self.cursor = o.header.next;
        Some((obj, o))
    }
}
