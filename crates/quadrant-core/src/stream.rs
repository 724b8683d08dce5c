//! Directional stream halves bound to a [`CallContext`].
//!
//! [`Inbound`] is the receiving end of a stream, [`Outbound`] the sending end.
//! Both observe the call's deadline and cancellation at every suspension
//! point, so a handler parked in `recv` or backpressured in `send` unblocks
//! with `DeadlineExceeded` or `Cancelled` instead of hanging.
//!
//! Closing rules:
//! - `Outbound` half-closes when the last clone is dropped (or
//!   [`Outbound::close`] consumes it); nothing can be sent afterwards because
//!   the sender no longer exists.
//! - `Inbound` remembers end-of-stream and errors; every later `recv` returns
//!   `Ok(None)`.

use crate::{CallContext, Fault, Result};
use core::{
    pin::Pin,
    task::{Context, Poll},
};
use futures::{Stream, StreamExt, TryStreamExt};
use pin_project_lite::pin_project;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

pub type FaultStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Receiving half of a stream.
pub struct Inbound<T> {
    stream: FaultStream<T>,
    ctx: CallContext,
    closed: bool,
    received: u64,
}

impl<T> Inbound<T> {
    pub fn new<S>(stream: S, ctx: CallContext) -> Self
    where
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
            ctx,
            closed: false,
            received: 0,
        }
    }

    /// Wraps a tonic request or response stream, translating transport
    /// statuses into faults.
    pub fn from_streaming(streaming: tonic::Streaming<T>, ctx: CallContext) -> Self
    where
        T: Send + 'static,
    {
        Self::new(streaming.map_err(Fault::from), ctx)
    }

    /// Receives the next envelope.
    ///
    /// Returns `Ok(None)` on end-of-stream, and again on every call after the
    /// stream closed or failed.
    ///
    /// # Errors
    ///
    /// The sender's fault, or `DeadlineExceeded`/`Cancelled` if the call ends
    /// while waiting.
    pub async fn recv(&mut self) -> Result<Option<T>> {
        if self.closed {
            return Ok(None);
        }

        let Self {
            stream,
            ctx,
            closed,
            received,
        } = self;

        match ctx.run(async { Ok(stream.next().await) }).await {
            Ok(Some(Ok(item))) => {
                *received += 1;
                Ok(Some(item))
            }
            Ok(None) => {
                *closed = true;
                Ok(None)
            }
            Ok(Some(Err(fault))) | Err(fault) => {
                *closed = true;
                Err(fault)
            }
        }
    }

    /// Number of envelopes delivered so far.
    pub const fn received(&self) -> u64 {
        self.received
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Sending half of a stream.
pub struct Outbound<T> {
    tx: mpsc::Sender<Result<T>>,
    ctx: CallContext,
}

impl<T> Clone for Outbound<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

/// Creates a bounded stream for `ctx`. The receiver side is what the
/// transport (or a test) drains.
pub fn channel<T>(ctx: &CallContext, capacity: usize) -> (Outbound<T>, ReceiverStream<Result<T>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Outbound {
            tx,
            ctx: ctx.clone(),
        },
        ReceiverStream::new(rx),
    )
}

impl<T> Outbound<T> {
    /// Sends one envelope, waiting while the receiver is backpressured.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the receiver is gone, `DeadlineExceeded`/`Cancelled` if
    /// the call ends while waiting.
    pub async fn send(&self, item: T) -> Result<()> {
        self.ctx
            .run(async {
                self.tx.send(Ok(item)).await.map_err(|_| {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Receiver dropped before send");
                    Fault::Cancelled
                })
            })
            .await
    }

    /// Best effort to surface `fault` to the receiver, then closes this half.
    ///
    /// Not bound by the call context: a deadline fault still has to reach the
    /// caller after the deadline passed.
    pub async fn fail(self, fault: Fault) {
        if let Err(_e) = self.tx.send(Err(fault)).await {
            #[cfg(feature = "tracing")]
            tracing::debug!("Failed to forward fault: {}", _e);
        }
    }

    /// Half-closes this sender.
    pub fn close(self) {}

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pin_project! {
    /// A response stream that cancels its call when the transport drops it.
    pub struct CallStream<S> {
        #[pin]
        inner: S,
        _guard: DropGuard,
    }
}

impl<S> CallStream<S> {
    pub fn new(inner: S, token: CancellationToken) -> Self {
        Self {
            inner,
            _guard: token.drop_guard(),
        }
    }
}

impl<S: Stream> Stream for CallStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
