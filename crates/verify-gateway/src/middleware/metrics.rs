//! Outcome counters for the verification endpoint.
//!
//! Served as JSON on `GET /metrics`. `notify_failed` is the number to watch:
//! each one may be a record consumed without the worker seeing it.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::domain::GatewayOutcome;

/// Gateway metrics
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    pub requests_total: AtomicU64,
    pub invalid_request: AtomicU64,
    pub store_unavailable: AtomicU64,
    pub record_not_found_or_expired: AtomicU64,
    pub notify_failed: AtomicU64,
    pub verified: AtomicU64,
    pub timed_out: AtomicU64,

    // Latency tracking (simplified - no histogram)
    pub total_latency_ms: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub invalid_request: u64,
    pub store_unavailable: u64,
    pub record_not_found_or_expired: u64,
    pub notify_failed: u64,
    pub verified: u64,
    pub timed_out: u64,
    pub average_latency_ms: f64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, outcome: GatewayOutcome) -> &AtomicU64 {
        match outcome {
            GatewayOutcome::InvalidRequest => &self.invalid_request,
            GatewayOutcome::StoreUnavailable => &self.store_unavailable,
            GatewayOutcome::RecordNotFoundOrExpired => &self.record_not_found_or_expired,
            GatewayOutcome::NotifyFailed => &self.notify_failed,
            GatewayOutcome::Verified => &self.verified,
        }
    }

    /// Record a finished request
    pub fn record_outcome(&self, outcome: GatewayOutcome, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.counter(outcome).fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    /// Record a request cut off by the request timeout
    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, outcome: GatewayOutcome) -> u64 {
        self.counter(outcome).load(Ordering::Relaxed)
    }

    /// Get average latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.requests_total.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            invalid_request: self.count(GatewayOutcome::InvalidRequest),
            store_unavailable: self.count(GatewayOutcome::StoreUnavailable),
            record_not_found_or_expired: self.count(GatewayOutcome::RecordNotFoundOrExpired),
            notify_failed: self.count(GatewayOutcome::NotifyFailed),
            verified: self.count(GatewayOutcome::Verified),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            average_latency_ms: self.average_latency_ms(),
        }
    }
}

/// Measures one request and records its outcome on `finish`.
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<GatewayMetrics>,
}

impl RequestTimer {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    pub fn finish(self, outcome: GatewayOutcome) {
        let latency_ms = self.start.elapsed().as_millis() as u64;
        self.metrics.record_outcome(outcome, latency_ms);
    }
}
