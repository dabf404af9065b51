//! SQLite backend for the spot-check report repository and reference store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Scrape files live on the filesystem;
//! their rows in the `scrape_files` table are the authority on their state.

mod encode;
mod reference;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use reference::SqliteReferenceStore;
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
