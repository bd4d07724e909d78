//! Host allocators used by the tests of this crate.

use std::cell::RefCell;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::gc::{HostAllocator, MiMalloc};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AllocStats {
    /// Calls made to the host, frees included.
    pub calls: usize,
    /// Blocks handed out and not yet freed.
    pub live_blocks: usize,
}

/// Forwards to mimalloc while counting calls. Can be told to refuse every
/// request for memory.
#[derive(Debug, Default, Clone)]
pub(crate) struct CountingAllocator {
    stats: Rc<RefCell<AllocStats>>,
    failing: Rc<RefCell<bool>>,
}

impl CountingAllocator {
    pub fn stats(&self) -> AllocStats {
        *self.stats.borrow()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.borrow_mut() = failing;
    }
}

impl HostAllocator for CountingAllocator {
    unsafe fn reallocate(
        &mut self,
        memory: Option<NonNull<u8>>,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let mut stats = self.stats.borrow_mut();
        stats.calls += 1;

        if new_size > 0 && *self.failing.borrow() {
            return None;
        }
        match (memory.is_some(), new_size > 0) {
            (false, true) => stats.live_blocks += 1,
            (true, false) => stats.live_blocks -= 1,
            _ => {}
        }
        MiMalloc.reallocate(memory, new_size)
    }
}
