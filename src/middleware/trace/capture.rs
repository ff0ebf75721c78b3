//! Request and response body capture.
//!
//! The request body is read once up front and replaced by a [`Replay`] of
//! the same frames, so the handler reads exactly what the client sent. The
//! response body is wrapped in a [`CaptureBody`] that copies data frames as
//! they stream past and tags the span when the stream ends.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http::HeaderMap;
use http_body_util::BodyExt;
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use tracing::debug;

use super::span::SpanGuard;
use crate::body::Body;
use crate::error::BoxError;

/// Tag value for a body the body skipper excluded.
pub const EXCLUDED: &str = "[excluded]";

/// Tag value for a request body that could not be read.
pub const READ_ERROR: &str = "[read_error]";

/// Reads `body` to the end.
///
/// Returns the body to hand downstream and the bytes read, or `None` if the
/// stream failed. On failure the returned body replays the bytes read so far
/// and then the same error.
pub(crate) async fn buffer_request(mut body: Body) -> (Body, Option<Bytes>) {
    let mut data = BytesMut::new();
    let mut trailers: Option<HeaderMap> = None;

    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => match frame.into_data() {
                Ok(chunk) => data.extend_from_slice(&chunk),
                Err(frame) => {
                    if let Ok(t) = frame.into_trailers() {
                        trailers.get_or_insert_with(HeaderMap::new).extend(t);
                    }
                }
            },
            Err(err) => {
                debug!(error = %err, read = data.len(), "request body read failed");
                let replay = Replay { data: Some(data.freeze()), trailers, error: Some(err) };
                return (Body::new(replay), None);
            }
        }
    }

    let bytes = data.freeze();
    let replay = Replay { data: Some(bytes.clone()), trailers, error: None };
    (Body::new(replay), Some(bytes))
}

/// A body rebuilt from frames already read: data, then trailers, then the
/// original read error if there was one.
struct Replay {
    data: Option<Bytes>,
    trailers: Option<HeaderMap>,
    error: Option<BoxError>,
}

impl HttpBody for Replay {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        if let Some(data) = self.data.take().filter(|d| !d.is_empty()) {
            return Poll::Ready(Some(Ok(Frame::data(data))));
        }
        if let Some(trailers) = self.trailers.take() {
            return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
        }
        if let Some(err) = self.error.take() {
            return Poll::Ready(Some(Err(err)));
        }
        Poll::Ready(None)
    }

    fn is_end_stream(&self) -> bool {
        self.data.as_ref().is_none_or(Bytes::is_empty)
            && self.trailers.is_none()
            && self.error.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        let len = self.data.as_ref().map_or(0, Bytes::len) as u64;
        if self.error.is_some() {
            SizeHint::default()
        } else {
            SizeHint::with_exact(len)
        }
    }
}

/// Response body decorator.
///
/// Passes every frame through untouched and keeps a copy of the first bytes
/// of data, enough to fill the `resp.body` tag. When the stream ends, fails,
/// or the body is dropped unread, the tag is written and the span finished.
pub struct CaptureBody {
    inner: Body,
    buf: Vec<u8>,
    cap: usize,
    guard: Option<SpanGuard>,
}

impl CaptureBody {
    /// Holds `guard` until the body completes. Only as many bytes as the
    /// span's value limit can show are kept.
    pub(crate) fn new(inner: Body, guard: SpanGuard) -> Self {
        let cap = capture_limit(guard.span().tag_limits().value);
        Self { inner, buf: Vec::new(), cap, guard: Some(guard) }
    }

    fn record(&mut self, data: &Bytes) {
        let room = self.cap.saturating_sub(self.buf.len());
        self.buf.extend_from_slice(&data[..data.len().min(room)]);
    }

    fn complete(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.span().set_tag("resp.body", String::from_utf8_lossy(&self.buf));
        }
    }
}

impl HttpBody for CaptureBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let this = &mut *self;
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.record(data);
                }
                if this.inner.is_end_stream() {
                    this.complete();
                }
            }
            Poll::Ready(Some(Err(_))) | Poll::Ready(None) => this.complete(),
            Poll::Pending => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CaptureBody {
    fn drop(&mut self) {
        self.complete();
    }
}

/// Bytes needed to show `value_max + 1` characters, so the sanitizer can
/// still tell that the value was cut.
fn capture_limit(value_max: usize) -> usize {
    value_max.saturating_add(1).saturating_mul(4)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use super::*;
    use crate::middleware::trace::{InMemoryExporter, Span, TagLimits};

    /// Yields a fixed sequence of frames and errors.
    struct Scripted(VecDeque<Result<Frame<Bytes>, BoxError>>);

    impl HttpBody for Scripted {
        type Data = Bytes;
        type Error = BoxError;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
            Poll::Ready(self.0.pop_front())
        }
    }

    fn data(s: &'static str) -> Result<Frame<Bytes>, BoxError> {
        Ok(Frame::data(Bytes::from_static(s.as_bytes())))
    }

    #[tokio::test]
    async fn request_is_replayed_byte_for_byte() {
        let (body, captured) = buffer_request(Body::from("testBody")).await;
        assert_eq!(captured.as_deref(), Some(&b"testBody"[..]));
        assert_eq!(body.collect_bytes().await.unwrap(), "testBody");
    }

    #[tokio::test]
    async fn trailers_survive_the_replay() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc".parse().unwrap());
        let scripted = Scripted(VecDeque::from([
            data("one "),
            data("two"),
            Ok(Frame::trailers(trailers)),
        ]));

        let (body, captured) = buffer_request(Body::new(scripted)).await;
        assert_eq!(captured.as_deref(), Some(&b"one two"[..]));

        let collected = body.collect().await.unwrap();
        assert_eq!(collected.trailers().and_then(|t| t.get("x-checksum")).unwrap(), "abc");
        assert_eq!(collected.to_bytes(), "one two");
    }

    #[tokio::test]
    async fn failed_read_replays_prefix_then_error() {
        let scripted = Scripted(VecDeque::from([data("part"), Err("connection reset".into())]));
        let (mut body, captured) = buffer_request(Body::new(scripted)).await;
        assert!(captured.is_none());

        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), "part");
        let err = body.frame().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }

    #[tokio::test]
    async fn response_capture_tags_on_end_of_stream() {
        let exporter = InMemoryExporter::new();
        let span = Span::start(None, "op", "txn", Arc::new(exporter.clone()));
        let body = CaptureBody::new(Body::from("x".repeat(300)), SpanGuard::new(span));

        let bytes = Body::new(body).collect_bytes().await.unwrap();
        assert_eq!(bytes.len(), 300);

        let spans = exporter.take();
        assert_eq!(spans.len(), 1);
        let expected = format!("{}...", "x".repeat(197));
        assert_eq!(spans[0].tag("resp.body"), Some(expected.as_str()));
    }

    #[test]
    fn dropping_unread_body_still_finishes() {
        let exporter = InMemoryExporter::new();
        let span = Span::start(None, "op", "txn", Arc::new(exporter.clone()));
        drop(CaptureBody::new(Body::from("ignored"), SpanGuard::new(span)));

        let spans = exporter.take();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].tag("resp.body"), Some(""));
    }

    #[test]
    fn buffer_is_bounded() {
        let exporter = InMemoryExporter::new();
        let limits = TagLimits { value: 10, ..TagLimits::default() };
        let span = Span::start_with_limits(None, "op", "txn", limits, Arc::new(exporter));
        let mut body = CaptureBody::new(Body::empty(), SpanGuard::new(span));
        body.record(&Bytes::from(vec![b'a'; 100]));
        body.record(&Bytes::from(vec![b'b'; 100]));
        assert_eq!(body.buf.len(), capture_limit(10));
    }
}
