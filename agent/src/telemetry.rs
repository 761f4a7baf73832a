//! Telemetry Sink (§2.7): optional byte-count metric emission at session end.

use std::time::Instant;
use tokio::sync::mpsc;

/// `{name, start_time, bytes, delay}` record emitted when a bridging
/// session direction ends.
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: String,
    pub start_time: Instant,
    pub bytes: u64,
    pub delay_ms: u64,
}

impl Metric {
    pub fn new(name: impl Into<String>, start_time: Instant, bytes: u64) -> Self {
        Self {
            name: name.into(),
            start_time,
            bytes,
            delay_ms: 250,
        }
    }
}

/// Sink owned by the caller; forwarders only ever send into it. Cloning is
/// cheap (wraps an unbounded channel sender).
#[derive(Clone)]
pub struct TelemetrySink {
    tx: Option<mpsc::UnboundedSender<Metric>>,
}

impl TelemetrySink {
    pub fn new(tx: mpsc::UnboundedSender<Metric>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards every metric; used when telemetry is disabled.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, metric: Metric) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(metric);
        }
    }
}
