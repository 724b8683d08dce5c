//! End-to-end calls over a loopback TCP listener.

use crate::server::{
    config::{GreetSettings, ServerConfig},
    lifecycle::Lifecycle,
};
use bytes::{BufMut, Bytes, BytesMut};
use core::time::Duration;
use futures::stream;
use http_body_util::{BodyExt, Full};
use hyper::header::CONTENT_TYPE;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use prost::Message;
use quadrant_core::{
    CallContext, Fault,
    client::{self, blog, calculator, greet},
    context::GRPC_TIMEOUT_HEADER,
    coordinator::StreamCoordinator,
    proto::{
        Blog, GreetWithDeadlineRequest, Greeting, blog_service_client::BlogServiceClient,
        calculator_service_client::CalculatorServiceClient,
        greet_service_client::GreetServiceClient,
    },
};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Channel;

struct TestServer {
    addr: SocketAddr,
    channel: Channel,
    lifecycle: Arc<Lifecycle>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start(greet: GreetSettings) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig {
            server_addr: addr.to_string(),
            uds: false,
            stream_buffer_size: 8,
            shutdown_timeout: Duration::from_millis(500),
            greet,
        };

        let lifecycle = Arc::new(Lifecycle::new(config.shutdown_timeout));
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn({
            let lifecycle = Arc::clone(&lifecycle);
            async move {
                crate::serve(
                    TcpListenerStream::new(listener),
                    &config,
                    Arc::clone(&lifecycle),
                    |_health| async move {
                        let _ = stopped.await;
                        lifecycle.shutdown().await;
                    },
                )
                .await
            }
        });

        let channel = client::connect(format!("http://{addr}")).await.unwrap();
        Self {
            addr,
            channel,
            lifecycle,
            stop,
            handle,
        }
    }

    async fn stop(self) {
        let Self {
            addr: _,
            channel,
            lifecycle,
            stop,
            handle,
        } = self;
        drop(channel);

        let _ = stop.send(());
        handle.await.unwrap().unwrap();
        assert_eq!(lifecycle.in_flight(), 0);
    }

    fn calculator(&self) -> calculator::Client {
        CalculatorServiceClient::new(self.channel.clone())
    }

    fn greet(&self) -> greet::Client {
        GreetServiceClient::new(self.channel.clone())
    }

    fn blog(&self) -> blog::Client {
        BlogServiceClient::new(self.channel.clone())
    }
}

/// Sends one unary call as raw HTTP/2 frames. Unlike tonic's client, nothing
/// here arms a local timer for `grpc-timeout`, so the returned code is the
/// one the server produced.
async fn raw_unary_code(
    addr: SocketAddr,
    path: &str,
    message: impl Message,
    timeout: &str,
) -> tonic::Code {
    let len = message.encoded_len();
    let mut body = BytesMut::with_capacity(5 + len);
    body.put_u8(0);
    body.put_u32(u32::try_from(len).unwrap());
    message.encode(&mut body).unwrap();

    let request = hyper::Request::post(format!("http://{addr}{path}"))
        .header(CONTENT_TYPE, "application/grpc")
        .header("te", "trailers")
        .header(GRPC_TIMEOUT_HEADER, timeout)
        .body(Full::<Bytes>::new(body.freeze()))
        .unwrap();

    let client = Client::builder(TokioExecutor::new())
        .http2_only(true)
        .build_http();
    let response = client.request(request).await.unwrap();

    // Errors usually arrive as a trailers-only response.
    if let Some(status) = response.headers().get("grpc-status") {
        return tonic::Code::from_bytes(status.as_bytes());
    }
    let trailers = response
        .into_body()
        .collect()
        .await
        .unwrap()
        .trailers()
        .cloned()
        .unwrap();
    tonic::Code::from_bytes(trailers.get("grpc-status").unwrap().as_bytes())
}

fn quick_greetings() -> GreetSettings {
    GreetSettings {
        many_times_count: 3,
        many_times_interval: Duration::from_millis(10),
        deadline_steps: 3,
        deadline_step: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn calculator_unary_and_server_streaming() {
    let server = TestServer::start(quick_greetings()).await;
    let mut client = server.calculator();
    let ctx = CallContext::new().with_timeout(Duration::from_secs(5));

    assert_eq!(calculator::sum(&mut client, &ctx, 3, 10).await, Ok(13));
    assert_eq!(
        calculator::square_root(&mut client, &ctx, 16.0).await,
        Ok(4.0)
    );
    assert_eq!(
        calculator::square_root(&mut client, &ctx, -10.0).await,
        Err(Fault::invalid_argument("received a negative number -10"))
    );
    assert_eq!(
        calculator::prime_decompose(&mut client, &ctx, 120).await,
        Ok(vec![2, 2, 2, 3, 5])
    );
    assert_eq!(
        calculator::prime_decompose(&mut client, &ctx, 0).await,
        Ok(Vec::new())
    );
    assert!(matches!(
        calculator::prime_decompose(&mut client, &ctx, -8).await,
        Err(Fault::InvalidArgument { .. })
    ));

    server.stop().await;
}

#[tokio::test]
async fn calculator_client_streaming_and_bidi() {
    let server = TestServer::start(quick_greetings()).await;
    let client = server.calculator();
    let ctx = CallContext::new().with_timeout(Duration::from_secs(5));
    let coordinator = StreamCoordinator::new(ctx).with_pacing(Duration::from_millis(5));

    let average =
        calculator::compute_average(&client, &coordinator, stream::iter([1.0, 2.0, 3.0, 4.0]))
            .await;
    assert_eq!(average, Ok(2.5));

    let empty = calculator::compute_average(&client, &coordinator, stream::empty()).await;
    assert!(matches!(empty, Err(Fault::InvalidArgument { .. })));

    let mut maxima = Vec::new();
    let summary = calculator::find_maximum(
        &client,
        &coordinator,
        stream::iter([1, 5, 3, 6, 2, 20]),
        |max| maxima.push(max),
    )
    .await
    .unwrap();
    assert_eq!(maxima, vec![1, 5, 6, 20]);
    assert_eq!(summary.sent, 6);
    assert_eq!(summary.received, 4);

    server.stop().await;
}

#[tokio::test]
async fn greet_every_shape() {
    let server = TestServer::start(quick_greetings()).await;
    let mut client = server.greet();
    let ctx = CallContext::new().with_timeout(Duration::from_secs(5));
    let ada = Greeting::new("Ada", "Lovelace");

    assert_eq!(
        greet::greet(&mut client, &ctx, ada.clone()).await,
        Ok("Hello Ada".to_string())
    );

    let mut many = Vec::new();
    let count = greet::greet_many_times(&mut client, &ctx, ada.clone(), |reply| many.push(reply))
        .await
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(many[2], "Hello Ada number 2");

    let coordinator = StreamCoordinator::new(ctx.clone());
    let names = ["Ada", "Grace"].map(|name| Greeting::new(name, ""));
    assert_eq!(
        greet::long_greet(&client, &coordinator, stream::iter(names.clone())).await,
        Ok("Hello Ada! Hello Grace! ".to_string())
    );

    let mut replies = Vec::new();
    greet::greet_everyone(&client, &coordinator, stream::iter(names), |reply| {
        replies.push(reply)
    })
    .await
    .unwrap();
    assert_eq!(replies, vec!["Hello Ada! ", "Hello Grace! "]);

    server.stop().await;
}

#[tokio::test]
async fn greet_with_deadline_honours_caller_budget() {
    let server = TestServer::start(quick_greetings()).await;
    let mut client = server.greet();
    let ada = Greeting::new("Ada", "Lovelace");

    let hurried = CallContext::new().with_timeout(Duration::from_millis(100));
    assert_eq!(
        greet::greet_with_deadline(&mut client, &hurried, ada.clone()).await,
        Err(Fault::DeadlineExceeded)
    );

    let patient = CallContext::new().with_timeout(Duration::from_secs(5));
    assert_eq!(
        greet::greet_with_deadline(&mut client, &patient, ada).await,
        Ok("Hello Ada".to_string())
    );

    server.stop().await;
}

#[tokio::test]
async fn expired_deadline_is_reported_by_the_server() {
    let server = TestServer::start(quick_greetings()).await;
    let request = GreetWithDeadlineRequest::from(Greeting::new("Ada", "Lovelace"));

    for _ in 0..10 {
        let code = raw_unary_code(
            server.addr,
            "/greet.GreetService/GreetWithDeadline",
            request.clone(),
            "100m",
        )
        .await;
        assert_eq!(code, tonic::Code::DeadlineExceeded);
    }

    let code = raw_unary_code(
        server.addr,
        "/greet.GreetService/GreetWithDeadline",
        request,
        "5S",
    )
    .await;
    assert_eq!(code, tonic::Code::Ok);

    server.stop().await;
}

#[tokio::test]
async fn blog_crud_and_listing() {
    let server = TestServer::start(quick_greetings()).await;
    let mut client = server.blog();
    let ctx = CallContext::new().with_timeout(Duration::from_secs(5));

    let draft = Blog {
        id: String::new(),
        author_id: "ada".to_string(),
        title: "Notes".to_string(),
        content: "On the analytical engine".to_string(),
    };
    let created = blog::create_blog(&mut client, &ctx, draft).await.unwrap();
    assert!(!created.id.is_empty());
    assert_eq!(
        blog::read_blog(&mut client, &ctx, &created.id).await,
        Ok(created.clone())
    );

    let updated = blog::update_blog(
        &mut client,
        &ctx,
        Blog {
            title: "Notes, revised".to_string(),
            ..created.clone()
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.title, "Notes, revised");

    let listed = blog::list_blogs(&mut client, &ctx).await.unwrap();
    assert_eq!(listed, vec![updated]);

    assert_eq!(
        blog::delete_blog(&mut client, &ctx, &created.id).await,
        Ok(created.id.clone())
    );
    assert!(matches!(
        blog::read_blog(&mut client, &ctx, &created.id).await,
        Err(Fault::NotFound { .. })
    ));
    assert!(matches!(
        blog::read_blog(&mut client, &ctx, "not-an-id").await,
        Err(Fault::InvalidArgument { .. })
    ));

    server.stop().await;
}

#[tokio::test]
async fn calls_after_shutdown_are_unavailable() {
    let server = TestServer::start(quick_greetings()).await;
    let mut client = server.calculator();
    let ctx = CallContext::new().with_timeout(Duration::from_secs(5));

    server.lifecycle.shutdown().await;
    assert!(matches!(
        calculator::sum(&mut client, &ctx, 1, 2).await,
        Err(Fault::Unavailable { .. })
    ));

    server.stop().await;
}
