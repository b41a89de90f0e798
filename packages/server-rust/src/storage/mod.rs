//! Store backends for the pagination engine.
//!
//! - [`engines::MemoryStore`]: in-process tables, used by tests and by the
//!   server when no database is configured
//! - [`datastores::PostgresStore`]: `PostgreSQL` via `sqlx` (`postgres`
//!   feature), executing statements rendered by [`sql`]
//!
//! Both implement [`PageStore`](crate::traits::PageStore) and
//! [`RowSink`](crate::traits::RowSink).

pub mod datastores;
pub mod engines;
pub mod sql;

pub use engines::MemoryStore;
pub use sql::SqlStatement;
