//! SQLite backend for the Vigil switch store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Each store method runs inside one
//! `call`, and multi-row mutations inside one transaction, which is what
//! gives the engine its atomic generation bumps and compare-and-set trigger.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
