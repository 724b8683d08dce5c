//! Client-side driver for client-streaming and bidirectional calls.
//!
//! A [`StreamCoordinator`] runs two paths concurrently inside one call:
//!
//! - the **send path** pulls requests from a caller-supplied stream (finite or
//!   externally fed), sends them one at a time with optional pacing, and
//!   half-closes the request stream when the source is exhausted;
//! - the **receive path** opens the call and drains responses until the peer
//!   ends the response stream.
//!
//! The call completes only when both paths finished. The paths share nothing
//! but the request channel and the [`CallContext`]; the first fault on either
//! path drops the other and is the single fault reported to the caller. There
//! is no internal timeout: a silent peer is bounded by the context deadline
//! alone.

use crate::{CallContext, Result, stream::Inbound};
use core::{future::Future, pin::pin, time::Duration};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Requests buffered between the send path and the transport.
pub const DEFAULT_BUFFER: usize = 16;

/// Message counts of a completed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSummary {
    pub sent: u64,
    pub received: u64,
}

#[derive(Debug, Clone)]
pub struct StreamCoordinator {
    ctx: CallContext,
    pacing: Option<Duration>,
    buffer: usize,
}

impl StreamCoordinator {
    pub fn new(ctx: CallContext) -> Self {
        Self {
            ctx,
            pacing: None,
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Waits `pacing` between consecutive sends. The wait is a suspension
    /// point and gives up when the call ends.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = (!pacing.is_zero()).then_some(pacing);
        self
    }

    #[must_use]
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub const fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Drives one call to completion.
    ///
    /// `call` receives the outgoing request stream and resolves to the
    /// response stream once the peer accepted the call. `on_response` sees
    /// every response in delivery order; returning an error aborts the call.
    ///
    /// # Errors
    ///
    /// The first fault from either path: the peer's status, a fault returned
    /// by `on_response`, or `DeadlineExceeded`/`Cancelled` from the context.
    pub async fn run<Req, Resp, Reqs, C, Fut, Resps, H>(
        &self,
        requests: Reqs,
        call: C,
        mut on_response: H,
    ) -> Result<CallSummary>
    where
        Reqs: Stream<Item = Req>,
        C: FnOnce(ReceiverStream<Req>) -> Fut,
        Fut: Future<Output = Result<Resps>>,
        Resps: Stream<Item = Result<Resp>> + Send + 'static,
        H: FnMut(Resp) -> Result<()>,
    {
        let (tx, rx) = mpsc::channel(self.buffer);

        let send_path = self.send_path(requests, tx);
        let recv_path = async {
            let responses = call(ReceiverStream::new(rx)).await?;
            let mut inbound = Inbound::new(responses, self.ctx.clone());
            while let Some(response) = inbound.recv().await? {
                on_response(response)?;
            }
            Ok(inbound.received())
        };

        let (sent, received) = self
            .ctx
            .run(async { tokio::try_join!(send_path, recv_path) })
            .await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(sent, received, "Streaming call complete");

        Ok(CallSummary { sent, received })
    }

    /// Like [`run`](Self::run), collecting every response.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn collect<Req, Resp, Reqs, C, Fut, Resps>(
        &self,
        requests: Reqs,
        call: C,
    ) -> Result<Vec<Resp>>
    where
        Reqs: Stream<Item = Req>,
        C: FnOnce(ReceiverStream<Req>) -> Fut,
        Fut: Future<Output = Result<Resps>>,
        Resps: Stream<Item = Result<Resp>> + Send + 'static,
    {
        let mut responses = Vec::new();
        self.run(requests, call, |response| {
            responses.push(response);
            Ok(())
        })
        .await?;
        Ok(responses)
    }

    /// Sends every request, then drops `tx` to half-close.
    ///
    /// If the peer stops reading (it rejected the call or already answered),
    /// the path ends quietly: the receive path surfaces the peer's status.
    async fn send_path<Req, Reqs>(&self, requests: Reqs, tx: mpsc::Sender<Req>) -> Result<u64>
    where
        Reqs: Stream<Item = Req>,
    {
        let mut requests = pin!(requests);
        let mut sent = 0;

        while let Some(request) = self.ctx.run(async { Ok(requests.next().await) }).await? {
            if sent > 0
                && let Some(pacing) = self.pacing
            {
                self.ctx.sleep(pacing).await?;
            }

            if tx.send(request).await.is_err() {
                #[cfg(feature = "tracing")]
                tracing::debug!("Peer closed the request stream after {} sends", sent);
                break;
            }
            sent += 1;
        }

        Ok(sent)
    }
}
