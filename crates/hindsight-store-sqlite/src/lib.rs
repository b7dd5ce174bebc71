//! SQLite backend for the hindsight memory store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on one dedicated
//! connection thread without blocking the async runtime. That thread is the
//! single writer: every call is queued and executed in order.

mod encode;
mod fts;
mod retention;
mod schema;
mod store;
mod transfer;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, StoreStats};
pub use transfer::{EXPORT_FORMAT, ImportFormat, ImportReport};

#[cfg(test)]
mod tests;
