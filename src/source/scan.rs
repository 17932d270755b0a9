//! Scan-based reader source
//!
//! Plans a table scan into contiguous row ranges and reads each range
//! through a [`PagedResultCursor`]. The resume token is the number of rows
//! consumed in the partition, little-endian `u64`.

use super::{Fetched, ReaderSource, ScanClient};
use crate::config::ReaderConfig;
use crate::cursor::{CursorState, PagedResultCursor};
use crate::error::{Error, Result};
use crate::partition::{
    plan_partitions, split_range, PartitionPlanner, PartitionToken, ScanRequest, ScanToken,
    TokenKind,
};
use crate::record::{ColumnSpec, JsonRowConverter, RowConverter};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// [`ReaderSource`] reading row ranges of a scan from a [`ScanClient`]
pub struct ScanSource<C: ScanClient> {
    client: C,
    request: ScanRequest,
    converter: JsonRowConverter,
    connection: Option<C::Connection>,
    cursor: Option<PagedResultCursor<C::Fetcher>>,
    /// Rows taken from the cursor in the current partition, including the
    /// rows skipped on resume
    consumed: Option<u64>,
}

impl<C: ScanClient> ScanSource<C> {
    /// Create a source; the request projection defaults to the non-constant
    /// columns
    pub fn new(client: C, request: ScanRequest, columns: Vec<ColumnSpec>) -> Result<Self> {
        let converter = JsonRowConverter::new(columns)?;
        let mut request = request;
        if request.columns.is_empty() {
            request.columns = converter.source_columns();
        }

        Ok(Self {
            client,
            request,
            converter,
            connection: None,
            cursor: None,
            consumed: None,
        })
    }

    /// Create a source from reader configuration
    pub fn from_config(client: C, config: &ReaderConfig) -> Result<Self> {
        Self::new(client, config.scan_request()?, config.columns.clone())
    }

    /// The scan this source reads
    pub fn request(&self) -> &ScanRequest {
        &self.request
    }

    /// The storage client
    pub fn client(&self) -> &C {
        &self.client
    }

    async fn connection(&mut self) -> Result<&C::Connection> {
        if self.connection.is_none() {
            let connection = self.client.open_connection().await?;
            self.connection = Some(connection);
        }
        self.connection
            .as_ref()
            .ok_or_else(|| Error::connection("connection not open"))
    }
}

#[async_trait]
impl<C: ScanClient> PartitionPlanner for ScanSource<C> {
    async fn plan(&self, request: &ScanRequest) -> Result<Vec<PartitionToken>> {
        let connection = self.client.open_connection().await?;
        let counted = self
            .client
            .count_rows(&connection, &request.table, &request.filter)
            .await;
        if let Err(e) = self.client.close_connection(connection).await {
            warn!(error = %e, "Failed to close planning connection");
        }
        let total = counted?;

        split_range(total, request.min_partitions)
            .into_iter()
            .map(|(offset, limit)| {
                let payload = ScanToken::for_range(request, offset, limit).encode()?;
                Ok(PartitionToken::scan(0, payload))
            })
            .collect()
    }
}

#[async_trait]
impl<C: ScanClient> ReaderSource for ScanSource<C> {
    async fn plan_partitions(&self, min_partitions: u32) -> Vec<PartitionToken> {
        let request = self.request.clone().with_min_partitions(min_partitions);
        plan_partitions(self, &request).await
    }

    async fn open_job(&mut self) -> Result<()> {
        self.connection().await?;
        info!(table = %self.request.table, "Opened scan connection");
        Ok(())
    }

    async fn open_partition(
        &mut self,
        token: &PartitionToken,
        resume: Option<&[u8]>,
    ) -> Result<()> {
        token.ensure_openable()?;
        let skipped = resume.map(decode_resume_token).transpose()?.unwrap_or(0);
        self.consumed = Some(skipped);

        let payload = match &token.kind {
            TokenKind::Scan { payload } => payload,
            _ => {
                debug!(partition = token.index, "Empty partition, nothing to scan");
                self.cursor = None;
                return Ok(());
            }
        };

        let scan = ScanToken::decode(payload)?.resumed_after(skipped);
        debug!(
            partition = token.index,
            offset = scan.offset,
            limit = scan.limit,
            skipped,
            "Opening scan"
        );

        let client = &self.client;
        if self.connection.is_none() {
            self.connection = Some(client.open_connection().await?);
        }
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| Error::connection("connection not open"))?;
        self.cursor = Some(client.execute_scan(connection, &scan).await?);
        Ok(())
    }

    async fn fetch_next(&mut self) -> Result<Fetched> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(Fetched::End);
        };
        match cursor.advance().await? {
            CursorState::Ready => {}
            CursorState::Pending => return Ok(Fetched::Pending),
            CursorState::Exhausted => return Ok(Fetched::End),
        }

        let row = cursor.next()?;
        if let Some(consumed) = self.consumed.as_mut() {
            *consumed += 1;
        }
        Ok(match self.converter.convert(&row) {
            Ok(record) => Fetched::Record(record),
            Err(e) => Fetched::RowError(e),
        })
    }

    async fn close_partition(&mut self) -> Result<()> {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close().await?;
        }
        Ok(())
    }

    async fn close_job(&mut self) -> Result<()> {
        if let Some(connection) = self.connection.take() {
            self.client.close_connection(connection).await?;
            debug!(table = %self.request.table, "Closed scan connection");
        }
        Ok(())
    }

    fn resume_token(&self) -> Option<Vec<u8>> {
        self.consumed.map(|n| n.to_le_bytes().to_vec())
    }
}

fn decode_resume_token(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::state(format!("Invalid resume token of {} bytes", bytes.len())))?;
    Ok(u64::from_le_bytes(raw))
}
