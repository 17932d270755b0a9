//! Source module
//!
//! The capability set a source plugs into the reader engine, plus the
//! canonical scan-based source built on a storage client.
//!
//! # Overview
//!
//! - [`ReaderSource`] - planning, open/fetch/close hooks called by the engine
//! - [`ScanClient`] - external storage client: connections, row counts and
//!   paginated scans
//! - [`ScanSource`] - a [`ReaderSource`] over any [`ScanClient`]; plans row
//!   ranges and resumes a range after the rows it already consumed
//! - [`MemoryTableClient`] - in-memory [`ScanClient`] for tests and demos

mod memory;
mod scan;

pub use memory::{MemoryPageFetcher, MemoryTableClient};
pub use scan::ScanSource;

use crate::cursor::{PageFetcher, PagedResultCursor};
use crate::error::Result;
use crate::partition::{FilterExpr, PartitionToken, ScanToken};
use crate::record::{Record, RowError};
use async_trait::async_trait;

/// Outcome of one fetch from a source
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// A converted record
    Record(Record),
    /// A raw row that failed conversion
    RowError(RowError),
    /// An empty page arrived but more are pending; nothing to hand over yet
    Pending,
    /// The partition has no more rows
    End,
}

/// Hooks a source implements for the reader engine
#[async_trait]
pub trait ReaderSource: Send + Sync {
    /// Split the configured scan into at least one token
    ///
    /// Never fails; planning errors are deferred into an error token.
    async fn plan_partitions(&self, min_partitions: u32) -> Vec<PartitionToken>;

    /// Job-level setup, called once before any partition opens
    async fn open_job(&mut self) -> Result<()> {
        Ok(())
    }

    /// Prepare to read a partition, resuming after `resume` if given
    async fn open_partition(&mut self, token: &PartitionToken, resume: Option<&[u8]>)
        -> Result<()>;

    /// Fetch the next row of the open partition
    async fn fetch_next(&mut self) -> Result<Fetched>;

    /// Release the open partition
    async fn close_partition(&mut self) -> Result<()>;

    /// Job-level teardown
    async fn close_job(&mut self) -> Result<()> {
        Ok(())
    }

    /// Position marker to store in a checkpoint
    fn resume_token(&self) -> Option<Vec<u8>> {
        None
    }
}

/// External storage client used by [`ScanSource`]
#[async_trait]
pub trait ScanClient: Send + Sync {
    /// An open connection
    type Connection: Send + Sync;
    /// Page fetcher of an executing scan
    type Fetcher: PageFetcher + 'static;

    /// Open a connection
    async fn open_connection(&self) -> Result<Self::Connection>;

    /// Count the rows of `table` matching `filter`
    async fn count_rows(
        &self,
        connection: &Self::Connection,
        table: &str,
        filter: &FilterExpr,
    ) -> Result<u64>;

    /// Start the scan described by a token payload
    async fn execute_scan(
        &self,
        connection: &Self::Connection,
        scan: &ScanToken,
    ) -> Result<PagedResultCursor<Self::Fetcher>>;

    /// Close a connection
    async fn close_connection(&self, _connection: Self::Connection) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests;
