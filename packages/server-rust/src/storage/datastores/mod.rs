//! External database backends.
//!
//! Currently includes [`PostgresStore`] behind the `postgres` feature.

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresStore};
