//! List services.
//!
//! 1. **Paginator** (`paginator`): the generic keyset engine over a
//!    [`PageStore`](crate::traits::PageStore)
//! 2. **Domain** (`domain`): one collection, record type and filter per list
//! 3. **Lists** (`lists`): entry points binding a domain filter to the paginator

pub mod config;
pub mod domain;
pub mod lists;
pub mod paginator;

pub use config::ServiceConfig;
pub use lists::ListService;
pub use paginator::{PageContext, Paginator};
