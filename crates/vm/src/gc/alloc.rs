use std::ptr::NonNull;

use mimalloc_rust_sys::basic_allocation::{mi_free, mi_realloc};

/// Every pointer handed out by a [`HostAllocator`] must be aligned to at least
/// this many bytes.
pub const MIN_ALIGN: usize = 8;

/// The physical memory hook of a [`Vm`](crate::Vm).
///
/// A single function covers allocation, resizing and freeing, the same way
/// C's `realloc` does. The [`Heap`](super::Heap) sits in front of it and does
/// all the bookkeeping; implementors only need to move bytes around.
pub trait HostAllocator {
    /// Resize the block at `memory` to `new_size` bytes.
    ///
    /// - `memory == None` and `new_size > 0`: allocate a fresh block.
    /// - `memory == Some(_)` and `new_size == 0`: free the block and return
    ///   `None`.
    /// - otherwise: grow or shrink the block, possibly moving it. The prefix
    ///   that fits in both sizes is preserved.
    ///
    /// Returning `None` for a non-zero `new_size` signals an allocation
    /// failure. The original block must then be left untouched.
    ///
    /// # Safety
    ///
    /// `memory` must either be `None` or a block previously returned by this
    /// same allocator that has not been freed since.
    unsafe fn reallocate(
        &mut self,
        memory: Option<NonNull<u8>>,
        new_size: usize,
    ) -> Option<NonNull<u8>>;
}

/// The default host allocator, backed by mimalloc.
#[derive(Debug, Default, Clone, Copy)]
pub struct MiMalloc;

impl HostAllocator for MiMalloc {
    unsafe fn reallocate(
        &mut self,
        memory: Option<NonNull<u8>>,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let ptr = memory.map_or(std::ptr::null_mut(), NonNull::as_ptr);

        if new_size == 0 {
            if !ptr.is_null() {
                mi_free(ptr.cast());
            }
            return None;
        }

        // mimalloc aligns everything to at least 16 bytes, well above MIN_ALIGN.
        NonNull::new(mi_realloc(ptr.cast(), new_size).cast())
    }
}

impl<A: HostAllocator + ?Sized> HostAllocator for Box<A> {
    unsafe fn reallocate(
        &mut self,
        memory: Option<NonNull<u8>>,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        (**self).reallocate(memory, new_size)
    }
}
