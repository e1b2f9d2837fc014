//! Pipeline metrics sink
//!
//! The pipeline reports what it did through a [`BorderMetrics`] instance
//! handed to it at construction. There is no process-wide registry, so two
//! pipelines (or two tests) never share counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Something the pipeline did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BorderEvent {
    Received,
    RateLimited,
    RejectedMalformed,
    RejectedPolicy,
    EmergencyDetected,
    StirVerified,
    StirVerifyFailed,
    StirSigned,
    StirSigningSkipped,
    Forwarded,
}

impl BorderEvent {
    pub const ALL: [BorderEvent; 10] = [
        BorderEvent::Received,
        BorderEvent::RateLimited,
        BorderEvent::RejectedMalformed,
        BorderEvent::RejectedPolicy,
        BorderEvent::EmergencyDetected,
        BorderEvent::StirVerified,
        BorderEvent::StirVerifyFailed,
        BorderEvent::StirSigned,
        BorderEvent::StirSigningSkipped,
        BorderEvent::Forwarded,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BorderEvent::Received => "received",
            BorderEvent::RateLimited => "rate_limited",
            BorderEvent::RejectedMalformed => "rejected_malformed",
            BorderEvent::RejectedPolicy => "rejected_policy",
            BorderEvent::EmergencyDetected => "emergency_detected",
            BorderEvent::StirVerified => "stir_verified",
            BorderEvent::StirVerifyFailed => "stir_verify_failed",
            BorderEvent::StirSigned => "stir_signed",
            BorderEvent::StirSigningSkipped => "stir_signing_skipped",
            BorderEvent::Forwarded => "forwarded",
        }
    }
}

/// Receives pipeline events
pub trait BorderMetrics: Send + Sync {
    fn record(&self, event: BorderEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl BorderMetrics for NoopMetrics {
    fn record(&self, _event: BorderEvent) {}
}

/// In-memory counters, one per event
#[derive(Debug, Default)]
pub struct CountingMetrics {
    counters: [AtomicU64; BorderEvent::ALL.len()],
}

impl CountingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, event: BorderEvent) -> u64 {
        self.counters[event.index()].load(Ordering::Relaxed)
    }

    /// `(name, count)` for every event
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        BorderEvent::ALL
            .iter()
            .map(|event| (event.as_str(), self.count(*event)))
            .collect()
    }
}

impl BorderMetrics for CountingMetrics {
    fn record(&self, event: BorderEvent) {
        self.counters[event.index()].fetch_add(1, Ordering::Relaxed);
    }
}
