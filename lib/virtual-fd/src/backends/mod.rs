//! Backends shipped with the crate.

mod mem;

pub use mem::{MemBackend, MEM_SCHEME};
