//! Where finished spans go.
//!
//! The middleware does not ship telemetry anywhere itself. An [`Exporter`]
//! receives each span exactly once, when it finishes, and owns whatever
//! delivery, batching or sampling the application wants.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use tracing::info;

use super::status::SpanStatus;

/// Receives finished spans.
pub trait Exporter: Send + Sync + 'static {
    fn export(&self, span: FinishedSpan);
}

/// Immutable snapshot of a span at the moment it finished.
#[derive(Clone, Debug)]
pub struct FinishedSpan {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub operation: String,
    pub transaction: String,
    pub tags: BTreeMap<String, String>,
    pub status: Option<SpanStatus>,
    pub started_at: SystemTime,
    pub duration: Duration,
}

impl FinishedSpan {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Emits one `tracing` event per finished span on target `tsu_trace::span`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogExporter;

impl Exporter for LogExporter {
    fn export(&self, span: FinishedSpan) {
        info!(
            target: "tsu_trace::span",
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            parent_span_id = span.parent_span_id.as_deref(),
            operation = %span.operation,
            transaction = %span.transaction,
            status = span.status.map_or("unset", SpanStatus::as_str),
            duration_ms = span.duration.as_millis() as u64,
            tags = ?span.tags,
            "span finished"
        );
    }
}

/// Keeps finished spans in memory.
///
/// Clones share the same storage, so keep one clone and hand another to the
/// middleware.
#[derive(Clone, Debug, Default)]
pub struct InMemoryExporter {
    spans: Arc<Mutex<Vec<FinishedSpan>>>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of every span exported so far, in finish order.
    pub fn spans(&self) -> Vec<FinishedSpan> {
        self.spans.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Removes and returns every span exported so far.
    pub fn take(&self) -> Vec<FinishedSpan> {
        std::mem::take(&mut *self.spans.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.spans.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Exporter for InMemoryExporter {
    fn export(&self, span: FinishedSpan) {
        self.spans.lock().unwrap_or_else(PoisonError::into_inner).push(span);
    }
}
