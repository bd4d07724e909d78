//! A growable array whose storage is accounted by a [`Heap`].
//!
//! Unlike `Vec`, a [`Buffer`] does not own an allocator. Every call that may
//! touch storage takes the heap explicitly, and the buffer has no `Drop`: its
//! owner must call [`Buffer::clear`] before letting go of it, or the storage
//! leaks.


use std::mem::{align_of, size_of};
use std::ptr::NonNull;

use crate::gc::{AllocError, Heap, MIN_ALIGN};

pub struct Buffer<T: Copy> {
    len: usize,
    capacity: usize,
    /// `None` exactly when `capacity == 0`.
    data: Option<NonNull<T>>,
}

impl<T: Copy> Buffer<T> {
    pub const fn new() -> Self {
        Buffer {
            len: 0,
            capacity: 0,
            data: None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[T] {
        match self.data {
            // SAFETY: the first `len` slots are initialized.
            Some(data) => unsafe { std::slice::from_raw_parts(data.as_ptr(), self.len) },
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self.data {
            Some(data) => unsafe { std::slice::from_raw_parts_mut(data.as_ptr(), self.len) },
            None => &mut [],
        }
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.as_slice().get(index).copied()
    }

    /// Overwrite the element at `index`. Returns `false` if it is out of
    /// bounds.
    pub fn set(&mut self, index: usize, value: T) -> bool {
        match self.as_mut_slice().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Append `count` copies of `value`.
    ///
    /// Capacity grows by doubling, starting at 1, until everything fits. The
    /// storage is reallocated at most once per call, and not at all if it is
    /// already large enough. On failure the buffer is left unchanged.
    pub fn fill(&mut self, heap: &mut Heap, value: T, count: usize) -> Result<(), AllocError> {
        debug_assert!(size_of::<T>() != 0, "zero-sized buffer elements");
        debug_assert!(align_of::<T>() <= MIN_ALIGN, "over-aligned buffer elements");

        if count == 0 {
            return Ok(());
        }
        let needed = self
            .len
            .checked_add(count)
            .ok_or(AllocError::CapacityOverflow)?;
        if needed > self.capacity {
            self.grow_to(heap, needed)?;
        }

        if let Some(data) = self.data {
            for i in self.len..needed {
                // SAFETY: `needed <= capacity`.
                unsafe { data.as_ptr().add(i).write(value) };
            }
            self.len = needed;
        }
        Ok(())
    }

    /// Append one element.
    pub fn write(&mut self, heap: &mut Heap, value: T) -> Result<(), AllocError> {
        self.fill(heap, value, 1)
    }

    /// Append every element of `values`.
    pub fn extend_from_slice(&mut self, heap: &mut Heap, values: &[T]) -> Result<(), AllocError> {
        let needed = self
            .len
            .checked_add(values.len())
            .ok_or(AllocError::CapacityOverflow)?;
        if needed > self.capacity {
            self.grow_to(heap, needed)?;
        }
        if let Some(data) = self.data {
            // SAFETY: `needed <= capacity`, and `values` can't alias storage
            // we hold a unique borrow of.
            unsafe {
                data.as_ptr()
                    .add(self.len)
                    .copy_from_nonoverlapping(values.as_ptr(), values.len())
            };
            self.len = needed;
        }
        Ok(())
    }

    fn grow_to(&mut self, heap: &mut Heap, needed: usize) -> Result<(), AllocError> {
        let mut capacity = self.capacity;
        while capacity < needed {
            capacity = match capacity {
                0 => 1,
                n => n.checked_mul(2).ok_or(AllocError::CapacityOverflow)?,
            };
        }
        let old_size = self.capacity * size_of::<T>();
        let new_size = capacity
            .checked_mul(size_of::<T>())
            .ok_or(AllocError::CapacityOverflow)?;

        let data = unsafe { heap.reallocate(self.data.map(NonNull::cast), old_size, new_size)? };
        self.data = data.map(NonNull::cast);
        self.capacity = capacity;
        Ok(())
    }

    /// Free the storage and reset to the empty state.
    pub fn clear(&mut self, heap: &mut Heap) {
        if let Some(data) = self.data.take() {
            unsafe { heap.free(data.cast(), self.capacity * size_of::<T>()) };
        }
        self.len = 0;
        self.capacity = 0;
    }
}

impl<T: Copy> Default for Buffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + std::fmt::Debug> std::fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}
