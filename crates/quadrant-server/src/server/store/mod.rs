//! Document storage behind the blog service.
//!
//! The service only needs create/read/update/delete by identifier and a full
//! listing, so that is the whole [`DocumentStore`] surface. Identifiers are
//! assigned by the store and treated as opaque strings everywhere else.

pub mod memory;

use quadrant_core::{Result, proto::Blog, stream::FaultStream};

#[tonic::async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Stores `blog` under a freshly assigned id and returns the stored
    /// document. Any id already set on `blog` is ignored.
    async fn create(&self, blog: Blog) -> Result<Blog>;

    /// # Errors
    ///
    /// `InvalidArgument` if `id` is malformed, `NotFound` if it is absent.
    async fn read(&self, id: &str) -> Result<Blog>;

    /// Replaces the fields of the document stored under `blog.id`.
    async fn update(&self, blog: Blog) -> Result<Blog>;

    /// Removes the document and returns its id.
    async fn delete(&self, id: &str) -> Result<String>;

    /// Every stored document, in id order.
    async fn list(&self) -> Result<FaultStream<Blog>>;
}
