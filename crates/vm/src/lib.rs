//! The Glint runtime core: accounted memory, NaN-boxed values, and the heap
//! objects they point to.
//!
//! Everything hangs off a [`Vm`]. Objects are allocated through it, named by
//! versioned [`ObjRef`] handles, and released explicitly or when the VM is
//! dropped.

pub mod buffer;
pub mod config;
pub mod gc;
pub mod object;
pub mod value;
pub mod vm;

#[cfg(test)]
mod testing;

pub use buffer::Buffer;
pub use config::{Configuration, ErrorReport};
pub use gc::{AllocError, Heap, HostAllocator, MiMalloc};
pub use object::{ObjKind, ObjRef};
pub use value::{RawValue, Value};
pub use vm::{HeapError, Objects, Vm};
