//! Request spans.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Instant, SystemTime};

use tracing::field::Empty;
use uuid::Uuid;

use super::export::{Exporter, FinishedSpan};
use super::sanitize::{TagLimits, sanitize_value, truncate_key};
use super::status::SpanStatus;

/// Handle to one in-flight span.
///
/// Cheap to clone; every clone refers to the same span. A span starts
/// active and moves to finished exactly once, at which point it is handed to
/// its [`Exporter`]. Writes after that are ignored.
///
/// Every tag is cut to the span's [`TagLimits`] on the way in, whoever
/// writes it.
#[derive(Clone)]
pub struct Span {
    inner: Arc<Inner>,
}

struct Inner {
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
    operation: String,
    transaction: String,
    started_at: SystemTime,
    started: Instant,
    tracing: tracing::Span,
    limits: TagLimits,
    exporter: Arc<dyn Exporter>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    tags: BTreeMap<String, String>,
    status: Option<SpanStatus>,
    finished: bool,
}

impl Span {
    /// Starts a span with the default [`TagLimits`]. With a `parent` the new
    /// span joins the parent's trace.
    pub fn start(
        parent: Option<&Span>,
        operation: impl Into<String>,
        transaction: impl Into<String>,
        exporter: Arc<dyn Exporter>,
    ) -> Self {
        Self::start_with_limits(parent, operation, transaction, TagLimits::default(), exporter)
    }

    pub fn start_with_limits(
        parent: Option<&Span>,
        operation: impl Into<String>,
        transaction: impl Into<String>,
        limits: TagLimits,
        exporter: Arc<dyn Exporter>,
    ) -> Self {
        let operation = operation.into();
        let transaction = transaction.into();
        let trace_id = parent.map_or_else(new_trace_id, |p| p.inner.trace_id.clone());
        let span_id = new_span_id();

        let tracing = tracing::info_span!(
            "http.request",
            otel.name = %operation,
            transaction = %transaction,
            trace_id = %trace_id,
            span_id = %span_id,
            otel.status_code = Empty,
        );

        Self {
            inner: Arc::new(Inner {
                trace_id,
                span_id,
                parent_span_id: parent.map(|p| p.inner.span_id.clone()),
                operation,
                transaction,
                started_at: SystemTime::now(),
                started: Instant::now(),
                tracing,
                limits,
                exporter,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn trace_id(&self) -> &str { &self.inner.trace_id }
    pub fn span_id(&self) -> &str { &self.inner.span_id }
    pub fn parent_span_id(&self) -> Option<&str> { self.inner.parent_span_id.as_deref() }
    pub fn operation(&self) -> &str { &self.inner.operation }
    pub fn transaction(&self) -> &str { &self.inner.transaction }

    /// The `tracing` span entered while downstream code runs.
    pub fn tracing_span(&self) -> &tracing::Span { &self.inner.tracing }

    pub fn tag_limits(&self) -> TagLimits {
        self.inner.limits
    }

    /// Sets a tag, replacing any previous value under the same key.
    ///
    /// The key is truncated and the value sanitized to the span's limits.
    pub fn set_tag(&self, key: impl AsRef<str>, value: impl AsRef<str>) {
        let limits = self.inner.limits;
        let key = truncate_key(key.as_ref(), limits.key).to_owned();
        let value = sanitize_value(value.as_ref(), limits.value);
        let mut state = self.state();
        if !state.finished {
            state.tags.insert(key, value);
        }
    }

    pub fn tag(&self, key: &str) -> Option<String> {
        self.state().tags.get(key).cloned()
    }

    pub fn tags(&self) -> BTreeMap<String, String> {
        self.state().tags.clone()
    }

    pub fn set_status(&self, status: SpanStatus) {
        let mut state = self.state();
        if !state.finished {
            state.status = Some(status);
            self.inner.tracing.record("otel.status_code", status.as_str());
        }
    }

    pub fn status(&self) -> Option<SpanStatus> {
        self.state().status
    }

    pub fn is_finished(&self) -> bool {
        self.state().finished
    }

    /// Finishes the span and exports it. Later calls do nothing.
    pub fn finish(&self) {
        let snapshot = {
            let mut state = self.state();
            if state.finished {
                return;
            }
            state.finished = true;
            FinishedSpan {
                trace_id: self.inner.trace_id.clone(),
                span_id: self.inner.span_id.clone(),
                parent_span_id: self.inner.parent_span_id.clone(),
                operation: self.inner.operation.clone(),
                transaction: self.inner.transaction.clone(),
                tags: std::mem::take(&mut state.tags),
                status: state.status,
                started_at: self.inner.started_at,
                duration: self.inner.started.elapsed(),
            }
        };
        self.inner.exporter.export(snapshot);
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Span")
            .field("trace_id", &self.inner.trace_id)
            .field("span_id", &self.inner.span_id)
            .field("operation", &self.inner.operation)
            .finish_non_exhaustive()
    }
}

/// Finishes its span when dropped, whichever way the owning scope exits.
pub struct SpanGuard(Span);

impl SpanGuard {
    pub fn new(span: Span) -> Self {
        Self(span)
    }

    pub fn span(&self) -> &Span {
        &self.0
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn new_span_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::trace::InMemoryExporter;

    #[test]
    fn finish_exports_once_and_freezes_tags() {
        let exporter = InMemoryExporter::new();
        let span = Span::start(None, "HTTP GET /", "HTTP GET /?q=1", Arc::new(exporter.clone()));
        span.set_tag("a", "1");
        span.set_status(SpanStatus::Ok);
        span.finish();
        span.finish();
        span.set_tag("b", "2");

        let spans = exporter.take();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].tag("a"), Some("1"));
        assert_eq!(spans[0].tag("b"), None);
        assert_eq!(spans[0].status, Some(SpanStatus::Ok));
        assert_eq!(spans[0].operation, "HTTP GET /");
        assert_eq!(spans[0].transaction, "HTTP GET /?q=1");
        assert!(span.is_finished());
    }

    #[test]
    fn tags_are_bounded_on_write() {
        let exporter = InMemoryExporter::new();
        let limits = TagLimits { value: 10, key: 4 };
        let span = Span::start_with_limits(None, "op", "txn", limits, Arc::new(exporter.clone()));
        span.set_tag("k".repeat(100), "v\n".repeat(5000));
        span.set_tag("ok", "fits");
        span.finish();

        let spans = exporter.take();
        assert_eq!(spans[0].tag("kkkk"), Some("v v v v..."));
        assert_eq!(spans[0].tag("ok"), Some("fits"));
        assert_eq!(span.tag_limits(), limits);
    }

    #[test]
    fn child_joins_parent_trace() {
        let exporter: Arc<dyn Exporter> = Arc::new(InMemoryExporter::new());
        let parent = Span::start(None, "outer", "outer", Arc::clone(&exporter));
        let child = Span::start(Some(&parent), "inner", "inner", exporter);

        assert_eq!(parent.trace_id().len(), 32);
        assert_eq!(child.span_id().len(), 16);
        assert_eq!(child.trace_id(), parent.trace_id());
        assert_eq!(child.parent_span_id(), Some(parent.span_id()));
        assert_ne!(child.span_id(), parent.span_id());
    }

    #[test]
    fn guard_finishes_on_drop() {
        let exporter = InMemoryExporter::new();
        let span = Span::start(None, "op", "txn", Arc::new(exporter.clone()));
        {
            let _guard = SpanGuard::new(span.clone());
            assert!(!span.is_finished());
        }
        assert!(span.is_finished());
        assert_eq!(exporter.len(), 1);
    }
}
