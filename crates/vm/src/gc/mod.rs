//! Memory accounting and the collection trigger.
//!
//! Every byte a [`Vm`](crate::Vm) owns goes through [`Heap::reallocate`], which
//! keeps a running total of live bytes and kicks off a collection once that
//! total crosses the current threshold. The collector itself does not reclaim
//! anything yet. It only recomputes the threshold, so objects are freed by
//! explicit release or when the VM is dropped.

pub mod alloc;

use std::ptr::NonNull;

use tracing::{debug, trace};

pub use self::alloc::{HostAllocator, MiMalloc, MIN_ALIGN};

/// Failure to obtain memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// The host allocator refused the request.
    #[error("failed to allocate {requested} bytes")]
    OutOfMemory { requested: usize },

    /// The requested size does not fit in `usize`.
    #[error("requested capacity overflows the address space")]
    CapacityOverflow,
}

/// Byte accounting in front of a [`HostAllocator`].
pub struct Heap {
    host: Box<dyn HostAllocator>,

    /// Bytes currently owned through this heap, object headers included.
    bytes_allocated: usize,

    /// Collection threshold. Recomputed after every collection as
    /// `bytes_allocated * (100 + heap_growth_percent) / 100`, floored at
    /// `min_heap_size`.
    next_gc: usize,

    min_heap_size: usize,
    heap_growth_percent: usize,

    /// Set while a collection is running, so that allocations made by the
    /// collector itself do not start another one.
    collecting: bool,

    collections: usize,
}

impl Heap {
    pub fn new(
        host: Box<dyn HostAllocator>,
        initial_heap_size: usize,
        min_heap_size: usize,
        heap_growth_percent: usize,
    ) -> Heap {
        Heap {
            host,
            bytes_allocated: 0,
            next_gc: initial_heap_size,
            min_heap_size,
            heap_growth_percent,
            collecting: false,
            collections: 0,
        }
    }

    /// Resize `memory` from `old_size` to `new_size` bytes, keeping the live
    /// byte count up to date.
    ///
    /// A collection runs first if the request leaves the heap over its
    /// threshold. Shrinking to zero frees the block and returns `Ok(None)`. On
    /// failure the byte count is restored and `memory` is left untouched.
    ///
    /// # Safety
    ///
    /// `memory` must be `None` (with `old_size == 0`) or a block obtained from
    /// this heap whose current size is exactly `old_size`.
    pub unsafe fn reallocate(
        &mut self,
        memory: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        trace!(old_size, new_size, "reallocate");
        self.charge(old_size, new_size);

        let result = self.host.reallocate(memory, new_size);
        if new_size > 0 {
            match result {
                Some(ptr) => debug_assert_eq!(
                    ptr.as_ptr() as usize % MIN_ALIGN,
                    0,
                    "host allocator returned a misaligned block"
                ),
                None => {
                    self.account(new_size, old_size);
                    return Err(AllocError::OutOfMemory {
                        requested: new_size,
                    });
                }
            }
        }
        Ok(result)
    }

    /// Allocate a fresh block of `size` bytes.
    ///
    /// # Safety
    ///
    /// The block must eventually be returned through [`Heap::free`] or
    /// [`Heap::reallocate`] with the same size.
    pub unsafe fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(size > 0, "zero-sized allocation");
        self.reallocate(None, 0, size)?
            .ok_or(AllocError::OutOfMemory { requested: size })
    }

    /// Free a block of `size` bytes. Never triggers a collection.
    ///
    /// # Safety
    ///
    /// Same as [`Heap::reallocate`] with `old_size == size`.
    pub unsafe fn free(&mut self, memory: NonNull<u8>, size: usize) {
        trace!(size, "free");
        self.account(size, 0);
        self.host.reallocate(Some(memory), 0);
    }

    /// Record an `old_size -> new_size` change for memory that does not go
    /// through the host allocator, such as object headers stored in the
    /// object table.
    pub(crate) fn charge(&mut self, old_size: usize, new_size: usize) {
        self.account(old_size, new_size);
        if new_size > 0 && !self.collecting && self.bytes_allocated > self.next_gc {
            self.collect_garbage();
        }
    }

    fn account(&mut self, old_size: usize, new_size: usize) {
        if new_size >= old_size {
            self.bytes_allocated += new_size - old_size;
        } else {
            let freed = old_size - new_size;
            debug_assert!(
                freed <= self.bytes_allocated,
                "freed {} bytes with only {} allocated",
                freed,
                self.bytes_allocated
            );
            self.bytes_allocated = self.bytes_allocated.saturating_sub(freed);
        }
    }

    /// Run a collection cycle and move the threshold.
    ///
    /// Reentrant calls made while a cycle is running do nothing.
    pub fn collect_garbage(&mut self) {
        if self.collecting {
            return;
        }
        self.collecting = true;
        let before = self.bytes_allocated;

        // No marking or sweeping yet, live objects are only freed on release.

        let grown = self
            .bytes_allocated
            .saturating_add((self.bytes_allocated / 100).saturating_mul(self.heap_growth_percent))
            .saturating_add(self.bytes_allocated % 100 * self.heap_growth_percent / 100);
        self.next_gc = grown.max(self.min_heap_size);
        self.collections += 1;
        self.collecting = false;

        debug!(
            before,
            after = self.bytes_allocated,
            next_gc = self.next_gc,
            "collected garbage"
        );
    }

    /// Bytes currently owned through this heap.
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// The live byte count above which the next collection runs.
    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    /// Number of collection cycles run so far.
    pub fn collections(&self) -> usize {
        self.collections
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("bytes_allocated", &self.bytes_allocated)
            .field("next_gc", &self.next_gc)
            .field("min_heap_size", &self.min_heap_size)
            .field("heap_growth_percent", &self.heap_growth_percent)
            .field("collections", &self.collections)
            .finish()
    }
}
