//! Embedding configuration.

use std::any::Any;

use crate::gc::HostAllocator;

/// Default value of [`Configuration::initial_heap_size`]. 10MiB.
pub const DEFAULT_INITIAL_HEAP_SIZE: usize = 10 * 1024 * 1024;
/// Default value of [`Configuration::min_heap_size`]. 1MiB.
pub const DEFAULT_MIN_HEAP_SIZE: usize = 1024 * 1024;
/// Default value of [`Configuration::heap_growth_percent`].
pub const DEFAULT_HEAP_GROWTH_PERCENT: usize = 50;

/// An error surfaced to the host through [`Configuration::on_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReport<'a> {
    /// A problem in the source text, found while compiling `module`.
    Compile {
        module: &'a str,
        line: u32,
        message: &'a str,
    },
    /// A runtime error. Followed by zero or more [`ErrorReport::StackTrace`]
    /// entries, innermost frame first.
    Runtime { message: &'a str },
    /// One frame of the stack trace of the last runtime error.
    StackTrace {
        module: &'a str,
        line: u32,
        message: &'a str,
    },
}

pub type WriteFn = Box<dyn FnMut(&str)>;
pub type ErrorFn = Box<dyn FnMut(ErrorReport<'_>)>;

/// How to set up a [`Vm`](crate::Vm).
///
/// Every field has a fallback: leaving a callback out, or a size at zero,
/// selects the default behavior.
#[derive(Default)]
pub struct Configuration {
    /// Where memory comes from. Defaults to [`MiMalloc`](crate::gc::MiMalloc).
    pub reallocate: Option<Box<dyn HostAllocator>>,

    /// Receives text printed by scripts. Output is discarded if unset.
    pub write: Option<WriteFn>,

    /// Receives compile and runtime errors. Errors are discarded if unset.
    pub on_error: Option<ErrorFn>,

    /// Live bytes at which the first collection runs.
    pub initial_heap_size: usize,

    /// The collection threshold never drops below this many bytes.
    pub min_heap_size: usize,

    /// How far past the live size the threshold is set after a collection, in
    /// percent. `50` means the heap may grow by half before the next one.
    pub heap_growth_percent: usize,

    /// Arbitrary host data, reachable through
    /// [`Vm::user_data`](crate::Vm::user_data).
    pub user_data: Option<Box<dyn Any>>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allocator(mut self, allocator: impl HostAllocator + 'static) -> Self {
        self.reallocate = Some(Box::new(allocator));
        self
    }

    pub fn with_write(mut self, write: impl FnMut(&str) + 'static) -> Self {
        self.write = Some(Box::new(write));
        self
    }

    pub fn with_error_handler(mut self, on_error: impl FnMut(ErrorReport<'_>) + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    pub fn with_initial_heap_size(mut self, size: usize) -> Self {
        self.initial_heap_size = size;
        self
    }

    pub fn with_min_heap_size(mut self, size: usize) -> Self {
        self.min_heap_size = size;
        self
    }

    pub fn with_heap_growth_percent(mut self, percent: usize) -> Self {
        self.heap_growth_percent = percent;
        self
    }

    pub fn with_user_data(mut self, data: impl Any) -> Self {
        self.user_data = Some(Box::new(data));
        self
    }

    pub(crate) fn initial_heap_size_or_default(&self) -> usize {
        or_default(self.initial_heap_size, DEFAULT_INITIAL_HEAP_SIZE)
    }

    pub(crate) fn min_heap_size_or_default(&self) -> usize {
        or_default(self.min_heap_size, DEFAULT_MIN_HEAP_SIZE)
    }

    pub(crate) fn heap_growth_percent_or_default(&self) -> usize {
        or_default(self.heap_growth_percent, DEFAULT_HEAP_GROWTH_PERCENT)
    }
}

fn or_default(value: usize, default: usize) -> usize {
    if value == 0 {
        default
    } else {
        value
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("reallocate", &self.reallocate.is_some())
            .field("write", &self.write.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("initial_heap_size", &self.initial_heap_size)
            .field("min_heap_size", &self.min_heap_size)
            .field("heap_growth_percent", &self.heap_growth_percent)
            .field("user_data", &self.user_data.is_some())
            .finish()
    }
}
