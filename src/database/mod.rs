//! Database scan support via DuckDB
//!
//! [`DuckDbClient`] implements [`crate::source::ScanClient`] over a DuckDB
//! database, so tables can be read through [`crate::source::ScanSource`].

mod client;

pub use client::{DuckDbClient, DuckDbPageFetcher, SharedConnection};
