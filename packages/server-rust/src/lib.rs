//! Keyset Server — cursor-paginated list API over an indexed vehicle registry.

pub mod indexer;
pub mod network;
pub mod service;
pub mod storage;
pub mod traits;

pub use traits::{PageStore, RowSink};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
