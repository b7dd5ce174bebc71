//! Core types and trait definitions for the hindsight memory subsystem.
//!
//! This crate is deliberately free of database and runtime dependencies.
//! The storage backend, the learning engines and the facade all depend on it;
//! it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod memory;
pub mod record;
pub mod search;
pub mod store;
pub mod table;

pub use error::{Error, Result};
pub use record::{Fields, Filter, Order, Query, Record};
pub use table::Table;
