//! Streaming tap (§4.7): wraps an upstream byte stream so it can be relayed
//! to the client untouched while a bounded prefix is accumulated off to the
//! side for terminal SSE usage extraction. Never buffers the whole body —
//! once the accumulator is full, bytes still pass through, they're just no
//! longer copied.

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Upper bound on how much of a streamed response is held for usage
/// extraction. SSE usage events appear near the start (`message_start`) or
/// end (`message_delta`, the final `usage` chunk) of the stream, never in the
/// middle of token deltas, so 1 MiB comfortably covers real responses
/// without risking unbounded memory growth on a pathological stream.
pub const ACCUMULATOR_CEILING: usize = 1024 * 1024;

/// Tees an upstream stream: every polled chunk is forwarded unchanged to the
/// caller, and also appended to an internal buffer (up to
/// [`ACCUMULATOR_CEILING`]) for later usage extraction via
/// [`StreamTap::into_accumulated`].
type OnComplete = Box<dyn FnOnce(String) + Send>;

pub struct StreamTap<S> {
    inner: S,
    accumulated: Vec<u8>,
    on_complete: Option<OnComplete>,
}

impl<S> StreamTap<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            accumulated: Vec::new(),
            on_complete: None,
        }
    }

    /// Registers a callback invoked exactly once, with the accumulated text,
    /// when the upstream stream ends — this is how the streaming tap drives
    /// post-hoc usage extraction without delaying a single byte sent to the
    /// client (§4.7).
    pub fn with_on_complete(mut self, callback: impl FnOnce(String) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Consumes the tap, returning everything accumulated so far as UTF-8
    /// (lossy — SSE payloads are text, but a truncated multi-byte sequence at
    /// the ceiling boundary must not panic).
    pub fn into_accumulated_text(self) -> String {
        String::from_utf8_lossy(&self.accumulated).into_owned()
    }
}

impl<S> Stream for StreamTap<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    type Item = reqwest::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.as_mut().get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if this.accumulated.len() < ACCUMULATOR_CEILING {
                    let remaining = ACCUMULATOR_CEILING - this.accumulated.len();
                    let take = remaining.min(chunk.len());
                    this.accumulated.extend_from_slice(&chunk[..take]);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                if let Some(callback) = this.on_complete.take() {
                    let text = String::from_utf8_lossy(&this.accumulated).into_owned();
                    callback(text);
                }
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(err))) => {
                // Usage fields may already have streamed in (e.g. Anthropic's
                // `message_start`) before the upstream connection broke —
                // still extract from whatever was accumulated (§4.7/§5: a log
                // is written if extraction already happened before
                // cancellation).
                if let Some(callback) = this.on_complete.take() {
                    let text = String::from_utf8_lossy(&this.accumulated).into_owned();
                    callback(text);
                }
                Poll::Ready(Some(Err(err)))
            }
            other => other,
        }
    }
}

impl<S> Drop for StreamTap<S> {
    /// A client disconnect drops the tap mid-stream without ever reaching
    /// `Poll::Ready(None)`. Flush `on_complete` with whatever was accumulated
    /// so far rather than silently discarding usage that already arrived.
    fn drop(&mut self) {
        if let Some(callback) = self.on_complete.take() {
            let text = String::from_utf8_lossy(&self.accumulated).into_owned();
            callback(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};

    #[tokio::test]
    async fn forwards_all_chunks_unchanged() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: {\"a\":1}\n")),
            Ok(Bytes::from_static(b"data: {\"b\":2}\n")),
        ];
        let tap = StreamTap::new(stream::iter(chunks));
        let collected: Vec<Bytes> = tap.map(|r| r.unwrap()).collect().await;
        assert_eq!(collected.len(), 2);
    }

    #[tokio::test]
    async fn accumulates_text_for_later_extraction() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: {\"a\":1}\n")),
            Ok(Bytes::from_static(b"data: {\"b\":2}\n")),
        ];
        let mut tap = StreamTap::new(stream::iter(chunks));
        while tap.next().await.is_some() {}
        let text = tap.into_accumulated_text();
        assert!(text.contains("\"a\":1"));
        assert!(text.contains("\"b\":2"));
    }

    #[tokio::test]
    async fn stops_copying_past_ceiling_but_keeps_forwarding() {
        let big = Bytes::from(vec![b'x'; ACCUMULATOR_CEILING + 10]);
        let chunks: Vec<reqwest::Result<Bytes>> = vec![Ok(big.clone()), Ok(Bytes::from_static(b"tail"))];
        let mut tap = StreamTap::new(stream::iter(chunks));
        let mut forwarded = 0usize;
        while let Some(Ok(chunk)) = tap.next().await {
            forwarded += chunk.len();
        }
        assert_eq!(forwarded, big.len() + 4);
        assert_eq!(tap.accumulated.len(), ACCUMULATOR_CEILING);
    }
}
