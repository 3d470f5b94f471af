//! Core types and trait definitions for the Vigil dead man's switch.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! store, engine and API crates all depend on it; it depends on nothing
//! proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod beneficiary;
pub mod clock;
pub mod delivery;
pub mod error;
pub mod notify;
pub mod store;
pub mod subject;
pub mod timer;

pub use error::{Error, Result};
