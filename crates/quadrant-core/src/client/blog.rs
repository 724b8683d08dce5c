use super::{request, server_streaming, unary};
use crate::{
    CallContext, Fault, Result,
    proto::{
        Blog, CreateBlogRequest, DeleteBlogRequest, ListBlogRequest, ReadBlogRequest,
        UpdateBlogRequest, blog_service_client::BlogServiceClient,
    },
};
use tonic::transport::Channel;

pub type Client = BlogServiceClient<Channel>;

fn document(blog: Option<Blog>, method: &str) -> Result<Blog> {
    blog.ok_or_else(|| Fault::internal(format!("{method} returned no document")))
}

/// Stores `blog` and returns it with the id the server assigned. Any id set
/// on `blog` is ignored.
pub async fn create_blog(client: &mut Client, ctx: &CallContext, blog: Blog) -> Result<Blog> {
    let req = request(ctx, CreateBlogRequest { blog: Some(blog) })?;
    document(unary(ctx, client.create_blog(req)).await?.blog, "CreateBlog")
}

/// # Errors
///
/// `InvalidArgument` for a malformed id, `NotFound` if nothing is stored
/// under it.
pub async fn read_blog(client: &mut Client, ctx: &CallContext, blog_id: &str) -> Result<Blog> {
    let req = request(
        ctx,
        ReadBlogRequest {
            blog_id: blog_id.to_string(),
        },
    )?;
    document(unary(ctx, client.read_blog(req)).await?.blog, "ReadBlog")
}

/// Replaces the stored fields of the document whose id is `blog.id`.
///
/// # Errors
///
/// See [`read_blog`].
pub async fn update_blog(client: &mut Client, ctx: &CallContext, blog: Blog) -> Result<Blog> {
    let req = request(ctx, UpdateBlogRequest { blog: Some(blog) })?;
    document(unary(ctx, client.update_blog(req)).await?.blog, "UpdateBlog")
}

/// Returns the id of the deleted document.
///
/// # Errors
///
/// See [`read_blog`].
pub async fn delete_blog(client: &mut Client, ctx: &CallContext, blog_id: &str) -> Result<String> {
    let req = request(
        ctx,
        DeleteBlogRequest {
            blog_id: blog_id.to_string(),
        },
    )?;
    Ok(unary(ctx, client.delete_blog(req)).await?.blog_id)
}

pub async fn list_blogs(client: &mut Client, ctx: &CallContext) -> Result<Vec<Blog>> {
    let req = request(ctx, ListBlogRequest {})?;
    let mut blogs = Vec::new();
    server_streaming(ctx, client.list_blog(req), |response| {
        blogs.push(document(response.blog, "ListBlog")?);
        Ok(())
    })
    .await?;
    Ok(blogs)
}
