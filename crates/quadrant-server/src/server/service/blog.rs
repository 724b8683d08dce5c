//! Blog service: CRUD and listing over a [`DocumentStore`].

use crate::server::{
    dispatch::{Dispatcher, Method, ResponseStream},
    store::DocumentStore,
};
use quadrant_core::{
    CallContext, Fault,
    proto::{
        Blog, CreateBlogRequest, CreateBlogResponse, DeleteBlogRequest, DeleteBlogResponse,
        ListBlogRequest, ListBlogResponse, ReadBlogRequest, ReadBlogResponse, UpdateBlogRequest,
        UpdateBlogResponse, blog_service_server::BlogService,
    },
    stream::{Inbound, Outbound},
};
use std::sync::Arc;
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct BlogHandler {
    dispatcher: Dispatcher,
    store: Arc<dyn DocumentStore>,
}

impl BlogHandler {
    pub fn new(dispatcher: Dispatcher, store: Arc<dyn DocumentStore>) -> Self {
        Self { dispatcher, store }
    }
}

#[tonic::async_trait]
impl BlogService for BlogHandler {
    type ListBlogStream = ResponseStream<ListBlogResponse>;

    async fn create_blog(
        &self,
        request: Request<CreateBlogRequest>,
    ) -> Result<Response<CreateBlogResponse>, Status> {
        let store = Arc::clone(&self.store);
        self.dispatcher
            .unary(Method::CreateBlog, request, |_ctx, req| async move {
                create_blog(store.as_ref(), req).await
            })
            .await
    }

    async fn read_blog(
        &self,
        request: Request<ReadBlogRequest>,
    ) -> Result<Response<ReadBlogResponse>, Status> {
        let store = Arc::clone(&self.store);
        self.dispatcher
            .unary(Method::ReadBlog, request, |_ctx, req| async move {
                read_blog(store.as_ref(), req).await
            })
            .await
    }

    async fn update_blog(
        &self,
        request: Request<UpdateBlogRequest>,
    ) -> Result<Response<UpdateBlogResponse>, Status> {
        let store = Arc::clone(&self.store);
        self.dispatcher
            .unary(Method::UpdateBlog, request, |_ctx, req| async move {
                update_blog(store.as_ref(), req).await
            })
            .await
    }

    async fn delete_blog(
        &self,
        request: Request<DeleteBlogRequest>,
    ) -> Result<Response<DeleteBlogResponse>, Status> {
        let store = Arc::clone(&self.store);
        self.dispatcher
            .unary(Method::DeleteBlog, request, |_ctx, req| async move {
                delete_blog(store.as_ref(), req).await
            })
            .await
    }

    async fn list_blog(
        &self,
        request: Request<ListBlogRequest>,
    ) -> Result<Response<Self::ListBlogStream>, Status> {
        let store = Arc::clone(&self.store);
        self.dispatcher
            .server_streaming(Method::ListBlog, request, move |ctx, _req, out| async move {
                list_blog(ctx, store.as_ref(), out).await
            })
    }
}

fn document(blog: Option<Blog>) -> quadrant_core::Result<Blog> {
    blog.ok_or_else(|| Fault::invalid_argument("request carries no blog"))
}

pub async fn create_blog(
    store: &dyn DocumentStore,
    req: CreateBlogRequest,
) -> quadrant_core::Result<CreateBlogResponse> {
    let blog = store.create(document(req.blog)?).await?;
    Ok(CreateBlogResponse { blog: Some(blog) })
}

pub async fn read_blog(
    store: &dyn DocumentStore,
    req: ReadBlogRequest,
) -> quadrant_core::Result<ReadBlogResponse> {
    let blog = store.read(&req.blog_id).await?;
    Ok(ReadBlogResponse { blog: Some(blog) })
}

pub async fn update_blog(
    store: &dyn DocumentStore,
    req: UpdateBlogRequest,
) -> quadrant_core::Result<UpdateBlogResponse> {
    let blog = store.update(document(req.blog)?).await?;
    Ok(UpdateBlogResponse { blog: Some(blog) })
}

pub async fn delete_blog(
    store: &dyn DocumentStore,
    req: DeleteBlogRequest,
) -> quadrant_core::Result<DeleteBlogResponse> {
    let blog_id = store.delete(&req.blog_id).await?;
    Ok(DeleteBlogResponse { blog_id })
}

/// Streams every stored document, one per response.
pub async fn list_blog(
    ctx: CallContext,
    store: &dyn DocumentStore,
    out: Outbound<ListBlogResponse>,
) -> quadrant_core::Result<()> {
    let mut documents = Inbound::new(store.list().await?, ctx);
    while let Some(blog) = documents.recv().await? {
        out.send(ListBlogResponse { blog: Some(blog) }).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::store::memory::MemoryStore;
    use core::time::Duration;
    use futures::StreamExt;
    use quadrant_core::stream::channel;

    fn draft(title: &str) -> Blog {
        Blog {
            id: String::new(),
            author_id: "grace".to_string(),
            title: title.to_string(),
            content: "compilers".to_string(),
        }
    }

    async fn create(store: &MemoryStore, title: &str) -> Blog {
        create_blog(
            store,
            CreateBlogRequest {
                blog: Some(draft(title)),
            },
        )
        .await
        .unwrap()
        .blog
        .unwrap()
    }

    #[tokio::test]
    async fn create_read_update_delete() {
        let store = MemoryStore::new();
        let created = create(&store, "first").await;

        let read = read_blog(
            &store,
            ReadBlogRequest {
                blog_id: created.id.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(read.blog.as_ref(), Some(&created));

        let updated = update_blog(
            &store,
            UpdateBlogRequest {
                blog: Some(Blog {
                    content: "linkers".to_string(),
                    ..created.clone()
                }),
            },
        )
        .await
        .unwrap()
        .blog
        .unwrap();
        assert_eq!(updated.content, "linkers");

        let deleted = delete_blog(
            &store,
            DeleteBlogRequest {
                blog_id: created.id.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(deleted.blog_id, created.id);

        let res = read_blog(
            &store,
            ReadBlogRequest {
                blog_id: created.id,
            },
        )
        .await;
        assert!(matches!(res, Err(Fault::NotFound { .. })));
    }

    #[tokio::test]
    async fn missing_blog_is_invalid() {
        let store = MemoryStore::new();
        let res = create_blog(&store, CreateBlogRequest { blog: None }).await;
        assert!(matches!(res, Err(Fault::InvalidArgument { .. })));

        let res = update_blog(&store, UpdateBlogRequest { blog: None }).await;
        assert!(matches!(res, Err(Fault::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn list_streams_every_document() {
        let store = MemoryStore::new();
        let mut titles = Vec::new();
        for title in ["one", "two", "three"] {
            titles.push(create(&store, title).await.title);
        }

        let ctx = CallContext::new();
        let (out, rx) = channel(&ctx, 1);
        let (outcome, listed) = tokio::join!(
            list_blog(ctx, &store, out),
            rx.map(|item| item.unwrap().blog.unwrap().title)
                .collect::<Vec<_>>()
        );

        outcome.unwrap();
        assert_eq!(listed, titles);
    }

    #[tokio::test(start_paused = true)]
    async fn unread_listing_stops_at_deadline() {
        let store = MemoryStore::new();
        for title in ["one", "two", "three"] {
            create(&store, title).await;
        }

        let ctx = CallContext::new().with_timeout(Duration::from_millis(100));
        let (out, mut rx) = channel(&ctx, 1);

        assert_eq!(
            list_blog(ctx, &store, out).await,
            Err(Fault::DeadlineExceeded)
        );
        let first = rx.next().await.unwrap().unwrap();
        assert_eq!(first.blog.unwrap().title, "one");
    }
}
