//! Per-call deadline, cancellation and metadata.
//!
//! A [`CallContext`] is created when a call starts and dropped when it ends.
//! Handlers only read it: cancellation is signalled from outside through the
//! [`CancellationToken`] the context was built with, and observed inside at
//! every suspension point via [`CallContext::run`], [`CallContext::sleep`] or
//! the stream halves in [`crate::stream`].
//!
//! Clones share the same deadline, token and metadata.

use crate::{Fault, Result};
use core::{future::Future, time::Duration};
use std::{collections::BTreeMap, sync::Arc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::{
    Request,
    metadata::{Ascii, KeyAndValueRef, MetadataKey, MetadataValue},
};

/// Header carrying the caller's remaining budget, as defined by the gRPC
/// HTTP/2 protocol.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Absolute deadline of an incoming call, stamped into the request
/// extensions when the request enters the server. Takes precedence over the
/// `grpc-timeout` header, which would otherwise be measured from the moment
/// the handler starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallDeadline(pub Instant);

impl CallDeadline {
    /// Reads a raw `grpc-timeout` value and anchors it at now.
    pub fn from_grpc_timeout(raw: &str) -> Option<Self> {
        parse_grpc_timeout(raw).map(|timeout| Self(Instant::now() + timeout))
    }
}

#[derive(Clone, Debug, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    token: CancellationToken,
    metadata: Arc<BTreeMap<String, String>>,
}

impl CallContext {
    /// A context with no deadline, a fresh token and no metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the server-side context for an incoming call.
    ///
    /// The deadline is the stamped [`CallDeadline`] when present, otherwise
    /// the `grpc-timeout` header measured from now. ASCII metadata entries are
    /// copied, and the token is a child of `parent`, so cancelling the parent
    /// (server shutdown) cancels the call.
    pub fn from_request<T>(request: &Request<T>, parent: &CancellationToken) -> Self {
        let metadata = request.metadata();
        let deadline = request
            .extensions()
            .get::<CallDeadline>()
            .copied()
            .or_else(|| {
                metadata
                    .get(GRPC_TIMEOUT_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(CallDeadline::from_grpc_timeout)
            })
            .map(|CallDeadline(deadline)| deadline);

        let entries = metadata
            .iter()
            .filter_map(|entry| match entry {
                KeyAndValueRef::Ascii(key, value) => value
                    .to_str()
                    .ok()
                    .map(|value| (key.as_str().to_string(), value.to_string())),
                KeyAndValueRef::Binary(..) => None,
            })
            .filter(|(key, _)| key != GRPC_TIMEOUT_HEADER)
            .collect();

        Self {
            deadline,
            token: parent.child_token(),
            metadata: Arc::new(entries),
        }
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Binds the context to an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.metadata).insert(key.into(), value.into());
        self
    }

    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when the call is unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Non-suspending check: fails if the call is already cancelled or past its
    /// deadline.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Fault::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Fault::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Resolves with the fault that ends the call: `DeadlineExceeded` once the
    /// deadline passes, `Cancelled` once the token fires. Pending forever for
    /// an unbounded, uncancelled call.
    pub async fn done(&self) -> Fault {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => Fault::Cancelled,
                    () = tokio::time::sleep_until(deadline) => Fault::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Fault::Cancelled
            }
        }
    }

    /// Drives `fut` unless the call ends first.
    ///
    /// When the deadline and `fut` complete on the same poll the fault wins: a
    /// late result is never reported as a success.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            fault = self.done() => Err(fault),
            res = fut => res,
        }
    }

    /// A pacing delay that gives up as soon as the call ends.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    /// Writes the remaining budget and the metadata entries onto an outgoing
    /// request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a metadata key or value is not valid ASCII
    /// metadata.
    pub fn apply_to<T>(&self, request: &mut Request<T>) -> Result<()> {
        if let Some(remaining) = self.remaining() {
            request.set_timeout(remaining);
        }

        for (name, value) in self.metadata.iter() {
            let key = MetadataKey::<Ascii>::from_bytes(name.as_bytes())
                .map_err(|_| Fault::invalid_argument(format!("invalid metadata key `{name}`")))?;
            let value = MetadataValue::try_from(value.as_str()).map_err(|_| {
                Fault::invalid_argument(format!("invalid metadata value for `{name}`"))
            })?;
            request.metadata_mut().insert(key, value);
        }

        Ok(())
    }
}

/// Parses a `grpc-timeout` value: at most eight ASCII digits followed by a
/// unit (`H`, `M`, `S`, `m`, `u`, `n`).
pub fn parse_grpc_timeout(raw: &str) -> Option<Duration> {
    if raw.len() < 2 || !raw.is_ascii() {
        return None;
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;

    let duration = match unit {
        "H" => Duration::from_secs(value * 60 * 60),
        "M" => Duration::from_secs(value * 60),
        "S" => Duration::from_secs(value),
        "m" => Duration::from_millis(value),
        "u" => Duration::from_micros(value),
        "n" => Duration::from_nanos(value),
        _ => return None,
    };
    Some(duration)
}
