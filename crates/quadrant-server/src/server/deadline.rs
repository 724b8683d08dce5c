//! Stamps every incoming request with its absolute deadline.
//!
//! tonic's transport arms its own `grpc-timeout` timer as soon as this stack
//! returns its response future, and answers `Cancelled` if that timer fires
//! while the call is still pending. Anchoring the deadline here, ahead of
//! routing and message decoding, keeps the handler's deadline at or before
//! that timer so the caller sees `DeadlineExceeded`.

use core::task::{Context, Poll};
use quadrant_core::context::{CallDeadline, GRPC_TIMEOUT_HEADER};
use tonic::codegen::http;
use tower::{Layer, Service};

#[derive(Debug, Clone, Copy, Default)]
pub struct DeadlineLayer;

impl<S> Layer<S> for DeadlineLayer {
    type Service = StampDeadline<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StampDeadline { inner }
    }
}

#[derive(Debug, Clone)]
pub struct StampDeadline<S> {
    inner: S,
}

impl<S, B> Service<http::Request<B>> for StampDeadline<S>
where
    S: Service<http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        let deadline = req
            .headers()
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(CallDeadline::from_grpc_timeout);
        if let Some(deadline) = deadline {
            req.extensions_mut().insert(deadline);
        }
        self.inner.call(req)
    }
}
