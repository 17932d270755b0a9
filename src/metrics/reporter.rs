//! External metric reporters
//!
//! A reporter ships a worker's final counters to a monitoring system.
//! Reporter failures are logged by the engine and only fail the job when
//! configured to.

use super::accumulator::WorkerId;
use crate::config::ReporterConfig;
use crate::error::{Error, Result};
use crate::types::MetricValues;
use async_trait::async_trait;
use reqwest::Client;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Prefix applied to every exported metric name
pub const METRIC_PREFIX: &str = "solidafy_reader_";

/// Transport for worker metrics
#[async_trait]
pub trait MetricReporter: Send + Sync {
    /// Prepare the transport for one worker
    async fn open(&self, _worker: &WorkerId) -> Result<()> {
        Ok(())
    }

    /// Send the current counter values
    async fn report(&self, worker: &WorkerId, values: &MetricValues) -> Result<()>;

    /// Release the transport
    async fn close(&self, _worker: &WorkerId) -> Result<()> {
        Ok(())
    }
}

/// Build a reporter from configuration
pub fn build_reporter(config: &ReporterConfig) -> Result<Arc<dyn MetricReporter>> {
    match config {
        ReporterConfig::Log => Ok(Arc::new(LogReporter)),
        ReporterConfig::PushGateway {
            url,
            delete_on_close,
        } => Ok(Arc::new(
            PushGatewayReporter::new(url)?.with_delete_on_close(*delete_on_close),
        )),
    }
}

// ============================================================================
// Log Reporter
// ============================================================================

/// Writes the counters to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

#[async_trait]
impl MetricReporter for LogReporter {
    async fn report(&self, worker: &WorkerId, values: &MetricValues) -> Result<()> {
        info!(worker = %worker, metrics = ?values, "Reader metrics");
        Ok(())
    }
}

// ============================================================================
// Push Gateway Reporter
// ============================================================================

/// Pushes counters to a Prometheus push gateway
///
/// Each worker is a separate group under
/// `/metrics/job/{job_name}/instance/{subtask_index}`.
#[derive(Debug, Clone)]
pub struct PushGatewayReporter {
    client: Client,
    base_url: Url,
    delete_on_close: bool,
}

impl PushGatewayReporter {
    /// Create a reporter for the push gateway at `url`
    pub fn new(url: &str) -> Result<Self> {
        let base_url = Url::parse(url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::invalid_value(
                "metrics.reporter.url",
                format!("'{url}' cannot be used as a base URL"),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(format!("solidafy-reader/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            delete_on_close: false,
        })
    }

    /// Delete the worker's metric group when the reporter closes
    #[must_use]
    pub fn with_delete_on_close(mut self, delete: bool) -> Self {
        self.delete_on_close = delete;
        self
    }

    /// Endpoint of a worker's metric group
    pub fn group_url(&self, worker: &WorkerId) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::reporter("push gateway url cannot be a base"))?
            .pop_if_empty()
            .extend([
                "metrics",
                "job",
                worker.job_name.as_str(),
                "instance",
                worker.subtask_index.to_string().as_str(),
            ]);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::http_status(status.as_u16(), body))
    }
}

#[async_trait]
impl MetricReporter for PushGatewayReporter {
    async fn report(&self, worker: &WorkerId, values: &MetricValues) -> Result<()> {
        let url = self.group_url(worker)?;
        debug!(url = %url, "Pushing metrics");

        let response = self
            .client
            .put(url)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(render_text_format(values))
            .send()
            .await?;
        Self::check(response).await
    }

    async fn close(&self, worker: &WorkerId) -> Result<()> {
        if !self.delete_on_close {
            return Ok(());
        }
        let url = self.group_url(worker)?;
        let response = self.client.delete(url).send().await?;
        Self::check(response).await
    }
}

/// Render counters in the Prometheus text exposition format
pub fn render_text_format(values: &MetricValues) -> String {
    let mut body = String::new();
    for (name, value) in values {
        let _ = writeln!(body, "# TYPE {METRIC_PREFIX}{name} counter");
        let _ = writeln!(body, "{METRIC_PREFIX}{name} {value}");
    }
    body
}
