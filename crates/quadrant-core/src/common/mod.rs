//! Types shared by the server, the client and the generated stubs.
//!
//! - [`error`]: the [`Fault`] taxonomy and its `tonic::Status` mapping.
//! - [`context`]: per-call deadline, cancellation and metadata.
//! - [`messages`]: the request/response envelopes for every service.

pub mod context;
pub mod error;
pub mod messages;

pub use context::CallContext;
pub use error::{Fault, Result};
