//! In-process store engines.

mod memory;

pub use memory::MemoryStore;
