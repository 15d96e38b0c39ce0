// Metrics collection and tracking

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-endpoint request and error counters.
#[derive(Debug, Default)]
pub struct EndpointCounters {
    request_count: AtomicU64,
    error_count: AtomicU64,
}

impl EndpointCounters {
    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EndpointStats {
        EndpointStats {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }
}

/// Counters for the relay's streaming endpoints. Errors counted here
/// include mid-stream upstream failures, which never surface as an
/// HTTP error status.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    pub text: EndpointCounters,
    pub audio: EndpointCounters,
}

impl RelayMetrics {
    pub fn total_requests(&self) -> u64 {
        self.text.snapshot().request_count + self.audio.snapshot().request_count
    }
}

#[derive(Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub endpoints: EndpointMetricsResponse,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
}

#[derive(Serialize)]
pub struct EndpointMetricsResponse {
    pub stream: EndpointStats,
    pub stream_audio: EndpointStats,
}
