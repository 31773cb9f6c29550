//! Lock-free dashboard counters and periodic reporting
//!
//! NOTE: All atomics use Relaxed ordering intentionally - these are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector
pub struct Metrics {
    /// Stream messages received (any frame carrying data)
    messages_received: AtomicU64,
    /// Messages dropped because they did not parse as a payload
    messages_malformed: AtomicU64,
    /// Payloads folded into the display buffer
    payloads_ingested: AtomicU64,
    /// Tag reads across all ingested payloads
    reads_ingested: AtomicU64,
    stream_connects: AtomicU64,
    stream_disconnects: AtomicU64,
    /// Start/stop requests sent to the engine
    control_requests: AtomicU64,
    /// Start/stop requests that failed (rejected or unreachable)
    control_failures: AtomicU64,
    /// Settled control outcomes superseded by a newer request
    stale_outcomes: AtomicU64,
    /// Messages received at the previous report (for rate calculation)
    messages_at_last_report: AtomicU64,
    last_report: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_malformed: AtomicU64::new(0),
            payloads_ingested: AtomicU64::new(0),
            reads_ingested: AtomicU64::new(0),
            stream_connects: AtomicU64::new(0),
            stream_disconnects: AtomicU64::new(0),
            control_requests: AtomicU64::new(0),
            control_failures: AtomicU64::new(0),
            stale_outcomes: AtomicU64::new(0),
            messages_at_last_report: AtomicU64::new(0),
            last_report: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_message_malformed(&self) {
        self.messages_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_payload_ingested(&self, reads: usize) {
        self.payloads_ingested.fetch_add(1, Ordering::Relaxed);
        self.reads_ingested.fetch_add(reads as u64, Ordering::Relaxed);
    }

    pub fn record_stream_connect(&self) {
        self.stream_connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_disconnect(&self) {
        self.stream_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_control_request(&self) {
        self.control_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_control_failure(&self) {
        self.control_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_outcome(&self) {
        self.stale_outcomes.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters; the message rate covers the time since the last call
    pub fn report(&self) -> MetricsSummary {
        let messages_received = self.messages_received.load(Ordering::Relaxed);
        let previous = self.messages_at_last_report.swap(messages_received, Ordering::Relaxed);

        let elapsed_secs = {
            let mut last = self.last_report.lock();
            let elapsed = last.elapsed().as_secs_f64();
            *last = Instant::now();
            elapsed
        };

        let messages_per_sec = if elapsed_secs > 0.0 {
            messages_received.saturating_sub(previous) as f64 / elapsed_secs
        } else {
            0.0
        };

        MetricsSummary {
            messages_per_sec,
            ..self.summary()
        }
    }

    /// Read all counters without resetting the rate window
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_malformed: self.messages_malformed.load(Ordering::Relaxed),
            payloads_ingested: self.payloads_ingested.load(Ordering::Relaxed),
            reads_ingested: self.reads_ingested.load(Ordering::Relaxed),
            stream_connects: self.stream_connects.load(Ordering::Relaxed),
            stream_disconnects: self.stream_disconnects.load(Ordering::Relaxed),
            control_requests: self.control_requests.load(Ordering::Relaxed),
            control_failures: self.control_failures.load(Ordering::Relaxed),
            stale_outcomes: self.stale_outcomes.load(Ordering::Relaxed),
            messages_per_sec: 0.0,
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSummary {
    pub messages_received: u64,
    pub messages_malformed: u64,
    pub payloads_ingested: u64,
    pub reads_ingested: u64,
    pub stream_connects: u64,
    pub stream_disconnects: u64,
    pub control_requests: u64,
    pub control_failures: u64,
    pub stale_outcomes: u64,
    pub messages_per_sec: f64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            messages_received = %self.messages_received,
            messages_per_sec = %format!("{:.1}", self.messages_per_sec),
            messages_malformed = %self.messages_malformed,
            payloads_ingested = %self.payloads_ingested,
            reads_ingested = %self.reads_ingested,
            stream_connects = %self.stream_connects,
            stream_disconnects = %self.stream_disconnects,
            control_requests = %self.control_requests,
            control_failures = %self.control_failures,
            stale_outcomes = %self.stale_outcomes,
            "metrics"
        );
    }
}
