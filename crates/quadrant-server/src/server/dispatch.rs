//! Per-call binding between tonic and the handlers.
//!
//! tonic's generated router already picks the service method from the
//! request path. The [`Dispatcher`] takes over from there: every handler entry
//! point goes through the shape-specific method matching its [`Method`], which
//!
//! - refuses the call with `Unavailable` once shutdown has started;
//! - builds a fresh [`CallContext`] from the request metadata, with a token
//!   derived from the server shutdown token;
//! - runs streaming handlers on their own tokio task;
//! - turns handler panics into `Internal` faults;
//! - forwards the first fault to the caller and then closes the outbound
//!   stream;
//! - cancels the call when the transport drops its response stream.

use crate::server::{
    lifecycle::Lifecycle,
    telemetry::{
        decrement_calls_inflight, increment_call_faults, increment_calls_inflight,
        increment_calls_started, increment_messages_sent, record_call_duration,
    },
};
use core::{any::Any, future::Future, panic::AssertUnwindSafe, pin::Pin};
use futures::{FutureExt, Stream, TryStreamExt};
use quadrant_core::{
    CallContext, Fault,
    stream::{self, CallStream, Inbound, Outbound},
};
use std::{sync::Arc, time::Instant};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

pub type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Unary,
    ServerStreaming,
    ClientStreaming,
    Bidi,
}

/// Every method served by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Sum,
    SquareRoot,
    PrimeDecompose,
    ComputeAverage,
    FindMaximum,
    Greet,
    GreetManyTimes,
    LongGreet,
    GreetEveryone,
    GreetWithDeadline,
    CreateBlog,
    ReadBlog,
    UpdateBlog,
    DeleteBlog,
    ListBlog,
}

impl Method {
    /// The gRPC path, used as the `rpc.method` label.
    pub const fn path(self) -> &'static str {
        match self {
            Self::Sum => "/calculator.CalculatorService/Sum",
            Self::SquareRoot => "/calculator.CalculatorService/SquareRoot",
            Self::PrimeDecompose => "/calculator.CalculatorService/PrimeDecompose",
            Self::ComputeAverage => "/calculator.CalculatorService/ComputeAverage",
            Self::FindMaximum => "/calculator.CalculatorService/FindMaximum",
            Self::Greet => "/greet.GreetService/Greet",
            Self::GreetManyTimes => "/greet.GreetService/GreetManyTimes",
            Self::LongGreet => "/greet.GreetService/LongGreet",
            Self::GreetEveryone => "/greet.GreetService/GreetEveryone",
            Self::GreetWithDeadline => "/greet.GreetService/GreetWithDeadline",
            Self::CreateBlog => "/blog.BlogService/CreateBlog",
            Self::ReadBlog => "/blog.BlogService/ReadBlog",
            Self::UpdateBlog => "/blog.BlogService/UpdateBlog",
            Self::DeleteBlog => "/blog.BlogService/DeleteBlog",
            Self::ListBlog => "/blog.BlogService/ListBlog",
        }
    }

    pub const fn shape(self) -> Shape {
        match self {
            Self::PrimeDecompose | Self::GreetManyTimes | Self::ListBlog => Shape::ServerStreaming,
            Self::ComputeAverage | Self::LongGreet => Shape::ClientStreaming,
            Self::FindMaximum | Self::GreetEveryone => Shape::Bidi,
            Self::Sum
            | Self::SquareRoot
            | Self::Greet
            | Self::GreetWithDeadline
            | Self::CreateBlog
            | Self::ReadBlog
            | Self::UpdateBlog
            | Self::DeleteBlog => Shape::Unary,
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    lifecycle: Arc<Lifecycle>,
    buffer: usize,
}

/// One admitted call. Dropping it releases the in-flight slot.
struct Call {
    method: Method,
    ctx: CallContext,
    started: Instant,
    lifecycle: Arc<Lifecycle>,
}

impl Call {
    fn finish(self, fault: Option<&Fault>) {
        let Some(fault) = fault else {
            return;
        };
        increment_call_faults(self.method.path(), fault.kind());

        #[cfg(feature = "tracing")]
        match fault {
            Fault::Internal { .. } => {
                tracing::warn!(method = self.method.path(), "Call failed: {}", fault);
            }
            _ => {
                tracing::debug!(method = self.method.path(), "Call faulted: {}", fault);
            }
        }
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        let method = self.method.path();
        record_call_duration(method, self.started.elapsed().as_secs_f64() * 1000.0);
        decrement_calls_inflight(method);
        self.lifecycle.leave();
    }
}

impl Dispatcher {
    /// `buffer` is the response buffer capacity of streaming calls.
    pub fn new(lifecycle: Arc<Lifecycle>, buffer: usize) -> Self {
        Self {
            lifecycle,
            buffer: buffer.max(1),
        }
    }

    #[cfg(test)]
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    fn admit<T>(
        &self,
        method: Method,
        request: &Request<T>,
    ) -> Result<(Call, CancellationToken), Status> {
        if let Err(fault) = self.lifecycle.enter() {
            increment_call_faults(method.path(), fault.kind());
            #[cfg(feature = "tracing")]
            tracing::debug!(method = method.path(), "Refusing call during shutdown");
            return Err(fault.into());
        }

        increment_calls_started(method.path());
        increment_calls_inflight(method.path());

        let token = self.lifecycle.token().child_token();
        let ctx = CallContext::from_request(request, &token);

        #[cfg(feature = "tracing")]
        tracing::trace!(
            method = method.path(),
            deadline_ms = ctx.remaining().map(|d| d.as_millis() as u64),
            "Call admitted"
        );

        let call = Call {
            method,
            ctx,
            started: Instant::now(),
            lifecycle: Arc::clone(&self.lifecycle),
        };
        Ok((call, token))
    }

    /// One request, one response.
    pub async fn unary<Req, Resp, F, Fut>(
        &self,
        method: Method,
        request: Request<Req>,
        handler: F,
    ) -> Result<Response<Resp>, Status>
    where
        Req: Send,
        Resp: Send,
        F: FnOnce(CallContext, Req) -> Fut + Send,
        Fut: Future<Output = quadrant_core::Result<Resp>> + Send,
    {
        debug_assert_eq!(method.shape(), Shape::Unary);
        let (call, token) = self.admit(method, &request)?;
        let _cancel_on_drop = token.drop_guard();

        let ctx = call.ctx.clone();
        let req = request.into_inner();
        let outcome = guarded(method, async move { ctx.run(handler(ctx.clone(), req)).await }).await;

        call.finish(outcome.as_ref().err());
        outcome.map(Response::new).map_err(Status::from)
    }

    /// One request, a lazily produced stream of responses.
    pub fn server_streaming<Req, Resp, F, Fut>(
        &self,
        method: Method,
        request: Request<Req>,
        handler: F,
    ) -> Result<Response<ResponseStream<Resp>>, Status>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: FnOnce(CallContext, Req, Outbound<Resp>) -> Fut + Send + 'static,
        Fut: Future<Output = quadrant_core::Result<()>> + Send + 'static,
    {
        debug_assert_eq!(method.shape(), Shape::ServerStreaming);
        let (call, token) = self.admit(method, &request)?;

        let req = request.into_inner();
        let (outbound, rx) = stream::channel(&call.ctx, self.buffer);
        spawn_streaming(call, outbound, move |ctx, out| handler(ctx, req, out));

        Ok(Response::new(respond(method, rx, token)))
    }

    /// A stream of requests, one aggregated response.
    pub async fn client_streaming<Req, Resp, F, Fut>(
        &self,
        method: Method,
        request: Request<Streaming<Req>>,
        handler: F,
    ) -> Result<Response<Resp>, Status>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: FnOnce(CallContext, Inbound<Req>) -> Fut + Send + 'static,
        Fut: Future<Output = quadrant_core::Result<Resp>> + Send + 'static,
    {
        debug_assert_eq!(method.shape(), Shape::ClientStreaming);
        let (call, token) = self.admit(method, &request)?;

        let inbound = Inbound::from_streaming(request.into_inner(), call.ctx.clone());
        aggregate(call, token, inbound, handler)
            .await
            .map(Response::new)
            .map_err(Status::from)
    }

    /// Independent request and response streams on one call.
    pub fn bidi<Req, Resp, F, Fut>(
        &self,
        method: Method,
        request: Request<Streaming<Req>>,
        handler: F,
    ) -> Result<Response<ResponseStream<Resp>>, Status>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: FnOnce(CallContext, Inbound<Req>, Outbound<Resp>) -> Fut + Send + 'static,
        Fut: Future<Output = quadrant_core::Result<()>> + Send + 'static,
    {
        debug_assert_eq!(method.shape(), Shape::Bidi);
        let (call, token) = self.admit(method, &request)?;

        let inbound = Inbound::from_streaming(request.into_inner(), call.ctx.clone());
        let (outbound, rx) = stream::channel(&call.ctx, self.buffer);
        spawn_streaming(call, outbound, move |ctx, out| handler(ctx, inbound, out));

        Ok(Response::new(respond(method, rx, token)))
    }
}

/// Runs a client-streaming handler on its own task and waits for its answer.
/// The task owns the call, so the in-flight slot is released only once the
/// handler has returned, even when the transport drops this future first.
async fn aggregate<Req, Resp, F, Fut>(
    call: Call,
    token: CancellationToken,
    inbound: Inbound<Req>,
    handler: F,
) -> quadrant_core::Result<Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    F: FnOnce(CallContext, Inbound<Req>) -> Fut + Send + 'static,
    Fut: Future<Output = quadrant_core::Result<Resp>> + Send + 'static,
{
    let _cancel_on_drop = token.drop_guard();
    let method = call.method;
    let ctx = call.ctx.clone();

    let task = async move {
        let handler_ctx = call.ctx.clone();
        let outcome = guarded(method, async move {
            handler_ctx.run(handler(handler_ctx.clone(), inbound)).await
        })
        .await;
        call.finish(outcome.as_ref().err());
        outcome
    };
    let handle = tokio::spawn(instrumented(method, task));

    // The deadline fault has to be ready on the same poll that fires the
    // transport's `grpc-timeout` timer, not one task hop later.
    ctx.run(async move {
        handle.await.unwrap_or_else(|e| {
            Err(Fault::internal(format!("{} task failed: {e}", method.path())))
        })
    })
    .await
}

/// Runs a streaming handler on its own task. The handler owns a clone of
/// `outbound`; once it returns, the first fault (if any) is forwarded and the
/// stream is closed.
fn spawn_streaming<Resp, F, Fut>(call: Call, outbound: Outbound<Resp>, handler: F)
where
    Resp: Send + 'static,
    F: FnOnce(CallContext, Outbound<Resp>) -> Fut + Send + 'static,
    Fut: Future<Output = quadrant_core::Result<()>> + Send + 'static,
{
    let method = call.method;
    let task = async move {
        let ctx = call.ctx.clone();
        let out = outbound.clone();
        let outcome = guarded(method, async move { ctx.run(handler(ctx.clone(), out)).await }).await;

        match &outcome {
            Ok(()) => outbound.close(),
            Err(fault) => outbound.fail(fault.clone()).await,
        }
        call.finish(outcome.err().as_ref());
    };

    tokio::spawn(instrumented(method, task));
}

fn respond<T>(
    method: Method,
    rx: ReceiverStream<quadrant_core::Result<T>>,
    token: CancellationToken,
) -> ResponseStream<T>
where
    T: Send + 'static,
{
    let stream = rx
        .inspect_ok(move |_| increment_messages_sent(method.path()))
        .map_err(Status::from);
    Box::pin(CallStream::new(stream, token))
}

/// Converts a panic inside `fut` into an `Internal` fault.
async fn guarded<T, F>(method: Method, fut: F) -> quadrant_core::Result<T>
where
    F: Future<Output = quadrant_core::Result<T>>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(panic_fault(method, panic.as_ref())))
}

fn panic_fault(method: Method, panic: &(dyn Any + Send)) -> Fault {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());

    #[cfg(feature = "tracing")]
    tracing::error!(method = method.path(), "Handler panicked: {}", detail);

    Fault::internal(format!("{} handler panicked: {detail}", method.path()))
}

#[cfg(feature = "tracing")]
fn instrumented<F: Future>(method: Method, fut: F) -> tracing::instrument::Instrumented<F> {
    use tracing::Instrument;
    fut.instrument(tracing::info_span!(
        "call",
        method = method.path(),
        shape = ?method.shape()
    ))
}

#[cfg(not(feature = "tracing"))]
const fn instrumented<F>(_method: Method, fut: F) -> F {
    fut
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use futures::StreamExt;
    use quadrant_core::context::{CallDeadline, GRPC_TIMEOUT_HEADER};
    use tokio::sync::oneshot;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(Lifecycle::new(Duration::from_secs(1))), 4)
    }

    #[tokio::test]
    async fn unary_success_releases_slot() {
        let dispatcher = dispatcher();
        let response = dispatcher
            .unary(Method::Sum, Request::new(20_i64), |_ctx, n| async move {
                Ok(n + 22)
            })
            .await
            .unwrap();

        assert_eq!(response.into_inner(), 42);
        assert_eq!(dispatcher.lifecycle().in_flight(), 0);
    }

    #[tokio::test]
    async fn handler_panic_becomes_internal() {
        let dispatcher = dispatcher();
        let status = dispatcher
            .unary(Method::Greet, Request::new(()), |_ctx, ()| async move {
                if true {
                    panic!("boom");
                }
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::Internal);
        assert!(status.message().contains("boom"));
        assert_eq!(dispatcher.lifecycle().in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn grpc_timeout_header_bounds_the_handler() {
        let dispatcher = dispatcher();
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(GRPC_TIMEOUT_HEADER, "100m".parse().unwrap());

        let status = dispatcher
            .unary(Method::GreetWithDeadline, request, |ctx, ()| async move {
                ctx.sleep(Duration::from_secs(3)).await?;
                Ok("late")
            })
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn refuses_calls_after_shutdown() {
        let dispatcher = dispatcher();
        dispatcher.lifecycle().shutdown().await;

        let status = dispatcher
            .unary(Method::Sum, Request::new(()), |_ctx, ()| async move { Ok(()) })
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);

        let refused = dispatcher.server_streaming(
            Method::ListBlog,
            Request::new(()),
            |_ctx, (), _out: Outbound<u8>| async move { Ok(()) },
        );
        assert!(matches!(refused, Err(status) if status.code() == tonic::Code::Unavailable));
    }

    #[tokio::test]
    async fn streaming_fault_follows_sent_items_then_closes() {
        let dispatcher = dispatcher();
        let response = dispatcher
            .server_streaming(
                Method::PrimeDecompose,
                Request::new(3_u32),
                |_ctx, n, out| async move {
                    for i in 0..n {
                        out.send(i).await?;
                    }
                    Err(Fault::invalid_argument("stop"))
                },
            )
            .unwrap();

        let items: Vec<_> = response.into_inner().collect().await;
        assert_eq!(items.len(), 4);
        assert_eq!(items[2].as_ref().unwrap(), &2);
        let status = items[3].as_ref().unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert_eq!(status.message(), "stop");
    }

    #[tokio::test]
    async fn streaming_handler_panic_reaches_caller() {
        let dispatcher = dispatcher();
        let response = dispatcher
            .server_streaming(
                Method::GreetManyTimes,
                Request::new(()),
                |_ctx, (), out: Outbound<u8>| async move {
                    out.send(1).await?;
                    if true {
                        panic!("stream boom");
                    }
                    Ok(())
                },
            )
            .unwrap();

        let items: Vec<_> = response.into_inner().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].as_ref().unwrap_err().code(), tonic::Code::Internal);
    }

    #[tokio::test]
    async fn dropping_response_stream_cancels_handler() {
        let dispatcher = dispatcher();
        let (ctx_tx, ctx_rx) = oneshot::channel();

        let response = dispatcher
            .server_streaming(
                Method::ListBlog,
                Request::new(()),
                |ctx, (), _out: Outbound<u8>| async move {
                    let _ = ctx_tx.send(ctx.clone());
                    Err(ctx.done().await)
                },
            )
            .unwrap();

        let ctx = ctx_rx.await.unwrap();
        assert!(!ctx.is_cancelled());
        assert_eq!(dispatcher.lifecycle().in_flight(), 1);

        drop(response);
        assert!(ctx.is_cancelled());

        tokio::time::timeout(Duration::from_secs(1), async {
            while dispatcher.lifecycle().in_flight() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn dropped_client_stream_holds_slot_until_handler_returns() {
        let dispatcher = dispatcher();
        let (call, token) = dispatcher
            .admit(Method::LongGreet, &Request::new(()))
            .unwrap();
        let inbound = Inbound::new(futures::stream::pending(), call.ctx.clone());
        let (entered_tx, entered_rx) = oneshot::channel();

        let mut aggregating = Box::pin(aggregate(
            call,
            token,
            inbound,
            |_ctx, _inbound: Inbound<u8>| async move {
                let _ = entered_tx.send(());
                core::future::pending::<quadrant_core::Result<u8>>().await
            },
        ));
        tokio::select! {
            _ = &mut aggregating => panic!("handler never returns"),
            entered = entered_rx => entered.unwrap(),
        }

        drop(aggregating);
        assert_eq!(dispatcher.lifecycle().in_flight(), 1);

        tokio::time::timeout(Duration::from_secs(1), async {
            while dispatcher.lifecycle().in_flight() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stamped_deadline_wins_over_later_header_parse() {
        let dispatcher = dispatcher();
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(GRPC_TIMEOUT_HEADER, "5S".parse().unwrap());
        request.extensions_mut().insert(CallDeadline(
            tokio::time::Instant::now() + Duration::from_millis(100),
        ));

        let status = dispatcher
            .unary(Method::GreetWithDeadline, request, |ctx, ()| async move {
                ctx.sleep(Duration::from_secs(1)).await?;
                Ok("late")
            })
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn shutdown_cancels_streaming_calls() {
        let dispatcher = Dispatcher::new(Arc::new(Lifecycle::new(Duration::ZERO)), 1);
        let response = dispatcher
            .server_streaming(
                Method::GreetManyTimes,
                Request::new(()),
                |ctx, (), _out: Outbound<u8>| async move { Err(ctx.done().await) },
            )
            .unwrap();

        dispatcher.lifecycle().shutdown().await;

        let items: Vec<_> = response.into_inner().collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap_err().code(), tonic::Code::Cancelled);
    }
}
