//! Byte rate limiting
//!
//! Uses the governor crate for token bucket rate limiting, with one cell
//! per byte read. The limiter charges bytes after they were read: each
//! `acquire` waits for the bytes read since the previous call.

use crate::metrics::ReaderCounters;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

type DirectLimiter = Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Interval of the throughput sampler
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Throttles one worker to a bytes-per-second ceiling
///
/// The bucket holds one second worth of bytes, so the observed rate never
/// exceeds the ceiling by more than that burst.
pub struct ByteRateLimiter {
    limiter: Arc<DirectLimiter>,
    bytes_per_second: NonZeroU32,
    counters: Arc<ReaderCounters>,
    /// Bytes already paid for
    charged: u64,
    observed_rate: Arc<AtomicU64>,
    sampler: Option<JoinHandle<()>>,
}

impl ByteRateLimiter {
    /// Create a limiter for a positive ceiling
    pub fn new(bytes_per_second: NonZeroU32, counters: Arc<ReaderCounters>) -> Self {
        let quota = Quota::per_second(bytes_per_second);
        let charged = counters.bytes_read();

        Self {
            limiter: Arc::new(Governor::direct(quota)),
            bytes_per_second,
            counters,
            charged,
            observed_rate: Arc::new(AtomicU64::new(0)),
            sampler: None,
        }
    }

    /// Create a limiter from the configured ceiling
    ///
    /// Returns `None` when the ceiling is not positive (throttling disabled).
    pub fn from_config(speed_bytes: i64, counters: Arc<ReaderCounters>) -> Option<Self> {
        if speed_bytes <= 0 {
            return None;
        }
        let capped = u32::try_from(speed_bytes).unwrap_or(u32::MAX);
        NonZeroU32::new(capped).map(|rate| Self::new(rate, counters))
    }

    /// Configured ceiling in bytes per second
    pub fn bytes_per_second(&self) -> u32 {
        self.bytes_per_second.get()
    }

    /// Throughput measured by the sampler over the last interval
    pub fn observed_rate(&self) -> u64 {
        self.observed_rate.load(Ordering::Relaxed)
    }

    /// Begin background accounting
    ///
    /// Bytes already counted (for example restored from a checkpoint) are
    /// not charged.
    pub fn start(&mut self) {
        self.charged = self.counters.bytes_read();
        if self.sampler.is_some() {
            return;
        }

        let counters = Arc::clone(&self.counters);
        let observed = Arc::clone(&self.observed_rate);
        let ceiling = self.bytes_per_second.get();

        self.sampler = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
            ticker.tick().await;
            let mut last = counters.bytes_read();

            loop {
                ticker.tick().await;
                let now = counters.bytes_read();
                let rate = now.saturating_sub(last);
                last = now;
                observed.store(rate, Ordering::Relaxed);
                debug!(bytes_per_second = rate, ceiling, "Reader throughput");
            }
        }));
    }

    /// Wait until the bytes read since the last call fit under the ceiling
    pub async fn acquire(&mut self) {
        let read = self.counters.bytes_read();
        let mut debt = read.saturating_sub(self.charged);
        self.charged = read;

        let burst = u64::from(self.bytes_per_second.get());
        while debt > 0 {
            // A chunk never exceeds the bucket size, so it always fits eventually
            let chunk = debt.min(burst);
            let Some(cells) = u32::try_from(chunk).ok().and_then(NonZeroU32::new) else {
                break;
            };
            if self.limiter.until_n_ready(cells).await.is_err() {
                break;
            }
            debt -= chunk;
        }
    }

    /// Stop background accounting. Safe to call without `start`.
    pub fn stop(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.abort();
        }
    }
}

impl Drop for ByteRateLimiter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ByteRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteRateLimiter")
            .field("bytes_per_second", &self.bytes_per_second)
            .field("charged", &self.charged)
            .finish()
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use super::*;
    use std::time::Instant;

    fn counters() -> Arc<ReaderCounters> {
        Arc::new(ReaderCounters::new())
    }

    #[test]
    fn test_from_config_disabled_for_non_positive() {
        assert!(ByteRateLimiter::from_config(0, counters()).is_none());
        assert!(ByteRateLimiter::from_config(-5, counters()).is_none());
    }

    #[test]
    fn test_from_config_caps_large_ceiling() {
        let limiter = ByteRateLimiter::from_config(i64::MAX, counters()).unwrap();
        assert_eq!(limiter.bytes_per_second(), u32::MAX);
    }

    #[test]
    fn test_stop_without_start() {
        let mut limiter = ByteRateLimiter::from_config(100, counters()).unwrap();
        limiter.stop();
        limiter.stop();
    }

    #[tokio::test]
    async fn test_acquire_within_burst_does_not_wait() {
        let counters = counters();
        let mut limiter = ByteRateLimiter::from_config(1_000_000, Arc::clone(&counters)).unwrap();
        limiter.start();

        let started = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
            counters.add_record(100);
        }
        assert!(started.elapsed() < Duration::from_millis(500));
        limiter.stop();
    }

    #[tokio::test]
    async fn test_start_ignores_restored_bytes() {
        let counters = counters();
        let mut limiter = ByteRateLimiter::from_config(1_000, Arc::clone(&counters)).unwrap();

        // Bytes restored before start are not charged
        counters.add_record(50_000);
        limiter.start();

        let started = Instant::now();
        limiter.acquire().await;
        assert!(started.elapsed() < Duration::from_millis(200));
        limiter.stop();
    }

    #[tokio::test]
    async fn test_sustained_rate_stays_under_ceiling() {
        let counters = counters();
        let mut limiter = ByteRateLimiter::from_config(10_000, Arc::clone(&counters)).unwrap();
        limiter.start();

        let started = Instant::now();
        for _ in 0..25 {
            limiter.acquire().await;
            counters.add_record(1_000);
        }
        let elapsed = started.elapsed().as_secs_f64();

        // 24 000 bytes charged: one second of burst, then 14 000 at 10 000/s
        assert!(elapsed >= 1.2, "finished too fast: {elapsed}s");
        let rate = 24_000.0 / elapsed;
        assert!(rate <= 10_000.0 * 2.0, "rate {rate} above ceiling plus burst");
        limiter.stop();
    }
}
