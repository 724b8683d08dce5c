//! Fault taxonomy shared by every handler, the dispatcher and the client.
//!
//! [`Fault`] is the only error type that crosses a call boundary. It converts
//! into [`tonic::Status`] on the way out of the server and back out of a
//! `Status` on the client, so callers branch on the same variants the handler
//! produced.
//!
//! ## Variants
//! - `InvalidArgument`: malformed or out-of-domain input (negative square
//!   root, unparsable identifier, empty average).
//! - `NotFound`: lookup miss in the document store.
//! - `DeadlineExceeded`: the call's deadline passed before completion.
//! - `Cancelled`: the caller aborted or went away.
//! - `Unavailable`: the server is draining and refuses new calls.
//! - `Internal`: collaborator, transport or handler failure (including panics).

use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Fault>;

/// A typed, call-level failure.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Input outside the method's domain.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The referenced document does not exist.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// The call context's deadline expired.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// The call was cancelled by its caller (or the peer disconnected).
    #[error("Call cancelled")]
    Cancelled,

    /// The server is shutting down.
    #[error("Unavailable: {reason}")]
    Unavailable { reason: String },

    /// Anything else: transport, collaborator or handler failure.
    #[error("Internal error: {context}")]
    Internal { context: String },
}

impl Fault {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
        }
    }

    /// The gRPC status code this fault travels as.
    pub const fn code(&self) -> Code {
        match self {
            Self::InvalidArgument { .. } => Code::InvalidArgument,
            Self::NotFound { .. } => Code::NotFound,
            Self::DeadlineExceeded => Code::DeadlineExceeded,
            Self::Cancelled => Code::Cancelled,
            Self::Unavailable { .. } => Code::Unavailable,
            Self::Internal { .. } => Code::Internal,
        }
    }

    /// Short, stable label used for metric attributes and log fields.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::NotFound { .. } => "not_found",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Cancelled => "cancelled",
            Self::Unavailable { .. } => "unavailable",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<Fault> for Status {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::InvalidArgument { reason } => Status::invalid_argument(reason),
            Fault::NotFound { what } => Status::not_found(what),
            Fault::DeadlineExceeded => Status::deadline_exceeded("Deadline exceeded"),
            Fault::Cancelled => Status::cancelled("Call was cancelled"),
            Fault::Unavailable { reason } => Status::unavailable(reason),
            Fault::Internal { context } => Status::internal(context),
        }
    }
}

impl From<Status> for Fault {
    fn from(status: Status) -> Self {
        let detail = status.message().to_string();
        match status.code() {
            Code::InvalidArgument | Code::OutOfRange => Fault::InvalidArgument { reason: detail },
            Code::NotFound => Fault::NotFound { what: detail },
            Code::DeadlineExceeded => Fault::DeadlineExceeded,
            Code::Cancelled => Fault::Cancelled,
            Code::Unavailable => Fault::Unavailable { reason: detail },
            code => Fault::Internal {
                context: format!("{code:?}: {detail}"),
            },
        }
    }
}
