//! Runtime metrics for the streaming gateway
//!
//! Plain atomic counters, cheap enough to bump on the streaming hot path,
//! snapshotted for the status endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide gateway counters
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    /// Requests handled, any method or outcome
    total_requests: AtomicU64,
    /// Requests that carried a Range header
    range_requests: AtomicU64,
    /// Bytes emitted to clients
    bytes_streamed: AtomicU64,
    /// Handle refreshes after an expired credential
    credential_refreshes: AtomicU64,
    /// Full-rescan fallbacks after an unexpected invalid offset
    offset_fallbacks: AtomicU64,
    /// Retries after a transient remote failure
    transient_retries: AtomicU64,
    /// Streams that exhausted their retry budget
    failed_streams: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub range_requests: u64,
    pub bytes_streamed: u64,
    pub credential_refreshes: u64,
    pub offset_fallbacks: u64,
    pub transient_retries: u64,
    pub failed_streams: u64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, has_range: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if has_range {
            self.range_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_bytes(&self, n: u64) {
        self.bytes_streamed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_credential_refresh(&self) {
        self.credential_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_offset_fallback(&self) {
        self.offset_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transient_retry(&self) {
        self.transient_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_stream(&self) {
        self.failed_streams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            range_requests: self.range_requests.load(Ordering::Relaxed),
            bytes_streamed: self.bytes_streamed.load(Ordering::Relaxed),
            credential_refreshes: self.credential_refreshes.load(Ordering::Relaxed),
            offset_fallbacks: self.offset_fallbacks.load(Ordering::Relaxed),
            transient_retries: self.transient_retries.load(Ordering::Relaxed),
            failed_streams: self.failed_streams.load(Ordering::Relaxed),
        }
    }
}
