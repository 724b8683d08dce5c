//! Typed call helpers over the generated tonic clients.
//!
//! Every helper binds its call to a [`CallContext`]: the remaining budget
//! travels as `grpc-timeout`, the context metadata travels as ASCII metadata,
//! and the deadline is also enforced locally. A caller therefore sees
//! `DeadlineExceeded` at its own deadline even when the server is slow to
//! notice.
//!
//! Unary and server-streaming helpers take the context directly. Client-stream
//! and bidi helpers take a [`StreamCoordinator`](crate::coordinator::StreamCoordinator),
//! which owns the context plus pacing and buffering for the send path.

pub mod blog;
pub mod calculator;
pub mod greet;

use crate::{CallContext, Fault, Result, stream::Inbound};
use core::future::Future;
use tonic::{
    Request, Response, Status, Streaming,
    transport::{Channel, Endpoint},
};

/// Opens a channel to `addr` (e.g. `http://127.0.0.1:50051`).
///
/// # Errors
///
/// `InvalidArgument` for a malformed address, `Unavailable` if the connection
/// cannot be established.
pub async fn connect(addr: impl Into<String>) -> Result<Channel> {
    let addr = addr.into();
    let endpoint = Endpoint::from_shared(addr.clone())
        .map_err(|e| Fault::invalid_argument(format!("invalid address `{addr}`: {e}")))?;
    endpoint.connect().await.map_err(|e| Fault::Unavailable {
        reason: format!("failed to connect to `{addr}`: {e}"),
    })
}

/// Wraps `message` in a request carrying `ctx`'s budget and metadata.
pub(crate) fn request<T>(ctx: &CallContext, message: T) -> Result<Request<T>> {
    let mut request = Request::new(message);
    ctx.apply_to(&mut request)?;
    Ok(request)
}

/// Awaits a single response under `ctx`.
pub(crate) async fn unary<T, F>(ctx: &CallContext, call: F) -> Result<T>
where
    F: Future<Output = core::result::Result<Response<T>, Status>>,
{
    ctx.run(async {
        call.await
            .map(Response::into_inner)
            .map_err(Fault::from)
    })
    .await
}

/// Opens a server-streaming call and hands every response to `on_item` in
/// order. Returns the number of responses received.
pub(crate) async fn server_streaming<T, F, H>(
    ctx: &CallContext,
    call: F,
    mut on_item: H,
) -> Result<u64>
where
    T: Send + 'static,
    F: Future<Output = core::result::Result<Response<Streaming<T>>, Status>>,
    H: FnMut(T) -> Result<()>,
{
    let streaming = unary(ctx, call).await?;
    let mut inbound = Inbound::from_streaming(streaming, ctx.clone());
    while let Some(item) = inbound.recv().await? {
        on_item(item)?;
    }
    Ok(inbound.received())
}
