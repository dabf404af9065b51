//! Core types and trait definitions for the spot-check subsystem.
//!
//! This crate is deliberately free of database, HTTP and runtime dependencies.
//! Every other crate depends on it; it performs no I/O of its own.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod check;
pub mod content;
pub mod error;
pub mod key;
pub mod lifecycle;
pub mod mismatch;
pub mod observation;
pub mod reference;
pub mod report;
pub mod scrape;
pub mod service;
pub mod store;

pub use error::{BoxError, Error, Result};
