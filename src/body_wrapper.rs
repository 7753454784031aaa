//! Body buffering and capture utilities.
//!
//! Two ways to look at a body without the downstream consumer noticing:
//!
//! - [`buffer_body`] reads the whole body up front and hands back a replacement body that
//!   yields exactly the same bytes.
//! - [`create_body_capture_stream`] wraps the body so chunks are copied as they flow to their
//!   destination, and resolves the captured text once the stream is finished.
//!
//! Replacement bodies report the same size hint as the original whenever it is known, so the
//! transport picks the same framing (`Content-Length` vs chunked).

use axum::body::{Body, Bytes};
use futures::Future;
use http_body::{Body as _, Frame, SizeHint};
use http_body_util::{BodyExt, Full, StreamBody};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::CaptureError;
use crate::pool::BufferPool;

type FrameResult = Result<Frame<Bytes>, axum::Error>;

type ChunkSender = mpsc::UnboundedSender<Result<Bytes, CaptureError>>;

/// Future resolving to the text of a body captured by [`create_body_capture_stream`].
pub type CapturedBody = Pin<Box<dyn Future<Output = Result<String, CaptureError>> + Send>>;

/// Read `body` to the end into a pooled scratch buffer and decode it as UTF-8 (lossily).
///
/// Returns the body to forward in place of the original along with the capture outcome. The
/// returned body always yields what the original would have:
///
/// - on success, a body with the same bytes (and trailers, if any);
/// - when `limit` is exceeded, the bytes read so far followed by the rest of the original;
/// - when the original fails, the bytes read so far followed by that same error.
///
/// # Examples
///
/// ```rust
/// use axum::body::Body;
/// use http_body_logger::{body_wrapper::buffer_body, BufferPool};
/// use http_body_util::BodyExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = BufferPool::default();
/// let (body, captured) = buffer_body(Body::from("Hello, World!"), &pool, None).await;
///
/// assert_eq!(captured?, "Hello, World!");
/// assert_eq!(body.collect().await?.to_bytes(), "Hello, World!");
/// # Ok(())
/// # }
/// ```
pub async fn buffer_body(
    mut body: Body,
    pool: &BufferPool,
    limit: Option<usize>,
) -> (Body, Result<String, CaptureError>) {
    let mut scratch = pool.acquire();
    let mut trailers = None;

    loop {
        let next = body.frame().await;
        let Some(frame) = next else {
            break;
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Stream error during body capture");
                let captured = Err(CaptureError::Body(e.to_string()));
                let replay: Vec<FrameResult> = read_so_far(&scratch)
                    .into_iter()
                    .map(Ok)
                    .chain([Err(e)])
                    .collect();
                return (
                    Body::new(StreamBody::new(futures::stream::iter(replay))),
                    captured,
                );
            }
        };

        let data = match frame.into_data() {
            Ok(data) => data,
            Err(frame) => {
                trailers = frame.into_trailers().ok();
                continue;
            }
        };

        if let Some(limit) = limit {
            if scratch.len() + data.len() > limit {
                debug!(limit, "Body exceeds capture limit, forwarding the remainder untouched");
                scratch.extend_from_slice(&data);
                let prefix = Bytes::copy_from_slice(&scratch);
                return (
                    Body::new(ReplayBody::new(prefix, body)),
                    Err(CaptureError::LimitExceeded { limit }),
                );
            }
        }

        scratch.extend_from_slice(&data);
    }

    let text = String::from_utf8_lossy(&scratch).into_owned();
    let bytes = Bytes::copy_from_slice(&scratch);
    let body = match trailers {
        None => Body::from(bytes),
        Some(trailers) => Body::new(
            Full::new(bytes).with_trailers(std::future::ready(Some(Ok(trailers)))),
        ),
    };

    (body, Ok(text))
}

fn read_so_far(scratch: &[u8]) -> Vec<Frame<Bytes>> {
    if scratch.is_empty() {
        Vec::new()
    } else {
        vec![Frame::data(Bytes::copy_from_slice(scratch))]
    }
}

/// Bytes already pulled off a body, followed by whatever the body still has.
struct ReplayBody {
    prefix: Option<Bytes>,
    rest: Body,
}

impl ReplayBody {
    fn new(prefix: Bytes, rest: Body) -> Self {
        Self {
            prefix: Some(prefix).filter(|prefix| !prefix.is_empty()),
            rest,
        }
    }
}

impl http_body::Body for ReplayBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if let Some(prefix) = this.prefix.take() {
            return Poll::Ready(Some(Ok(Frame::data(prefix))));
        }
        Pin::new(&mut this.rest).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.prefix.is_none() && self.rest.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        let pending = self.prefix.as_ref().map_or(0, |prefix| prefix.len() as u64);
        let rest = self.rest.size_hint();
        let mut hint = SizeHint::new();
        hint.set_lower(rest.lower() + pending);
        if let Some(upper) = rest.upper() {
            hint.set_upper(upper + pending);
        }
        hint
    }
}

/// Creates a body capture stream that captures chunks as they flow through without blocking.
///
/// This function takes an HTTP body and returns a new body along with a future that resolves
/// to the captured body text. The returned body can be used normally while the capture future
/// collects the chunks into a pooled buffer.
///
/// The future resolves once the returned body is finished or dropped. A body dropped before
/// its end resolves to [`CaptureError::Incomplete`], since the bytes seen so far are not the
/// whole message. Chunks past `limit` are not kept, and the future then resolves to
/// [`CaptureError::LimitExceeded`].
///
/// # Examples
///
/// ```rust
/// use axum::body::Body;
/// use http_body_logger::{body_wrapper::create_body_capture_stream, BufferPool};
/// use http_body_util::BodyExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let original_body = Body::from("Hello, World!");
/// let (new_body, capture_future) =
///     create_body_capture_stream(original_body, BufferPool::default(), None);
///
/// // Use new_body normally in your response
/// let sent = new_body.collect().await?.to_bytes();
/// assert_eq!(sent, "Hello, World!");
///
/// // capture_future resolves to the captured text
/// let captured = capture_future.await?;
/// assert_eq!(captured, "Hello, World!");
/// # Ok(())
/// # }
/// ```
pub fn create_body_capture_stream(
    body: Body,
    pool: BufferPool,
    limit: Option<usize>,
) -> (Body, CapturedBody) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let new_body = Body::new(CaptureBody {
        inner: body,
        tx: Some(tx),
    });

    let capture_future = Box::pin(async move {
        let mut scratch = pool.acquire();
        let mut exceeded = false;
        while let Some(chunk) = rx.recv().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err(e),
            };
            if exceeded {
                continue;
            }
            match limit {
                Some(limit) if scratch.len() + chunk.len() > limit => exceeded = true,
                _ => scratch.extend_from_slice(&chunk),
            }
        }

        match limit {
            Some(limit) if exceeded => Err(CaptureError::LimitExceeded { limit }),
            _ => Ok(String::from_utf8_lossy(&scratch).into_owned()),
        }
    });

    (new_body, capture_future)
}

/// Passes every frame of `inner` through untouched and copies data chunks to `tx`.
///
/// The sender is released on end of stream, on a stream error (after reporting it) and on
/// drop. Dropping it any other way than at the end reports [`CaptureError::Incomplete`].
struct CaptureBody {
    inner: Body,
    tx: Option<ChunkSender>,
}

impl http_body::Body for CaptureBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let (Some(data), Some(tx)) = (frame.data_ref(), &this.tx) {
                    let _ = tx.send(Ok(data.clone()));
                }
            }
            Poll::Ready(Some(Err(e))) => {
                error!(error = %e, "Stream error during body capture");
                if let Some(tx) = this.tx.take() {
                    let _ = tx.send(Err(CaptureError::Body(e.to_string())));
                }
            }
            // Closing the channel completes the capture
            Poll::Ready(None) => this.tx = None,
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
        let Some(tx) = self.tx.take() else {
            return;
        };
        // Transports may stop polling once the body reports its end
        if !self.inner.is_end_stream() {
            debug!("Body dropped before completion");
            let _ = tx.send(Err(CaptureError::Incomplete));
        }
    }
}
