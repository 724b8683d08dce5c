#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use core::future::Future;
use futures::Stream;
use quadrant_core::proto::{
    blog_service_server::BlogServiceServer, calculator_service_server::CalculatorServiceServer,
    greet_service_server::GreetServiceServer,
};
use server::config::{CliArgs, ServerConfig};
use server::deadline::DeadlineLayer;
use server::dispatch::Dispatcher;
use server::lifecycle::Lifecycle;
use server::service::{
    Handlers, blog::BlogHandler, calculator::CalculatorHandler, greet::GreetHandler,
};
use server::store::{DocumentStore, memory::MemoryStore};
use server::telemetry::{TelemetryProviders, init_telemetry};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &config);
            let res = run_server_with_incoming(providers, incoming, config).await;
            // Best effort: a panic can still leave the socket file behind.
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &config);
        run_server_with_incoming(providers, incoming, config).await
    }
}

async fn run_server_with_incoming<I, IO, IE>(
    providers: TelemetryProviders,
    incoming: I,
    config: ServerConfig,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let lifecycle = Arc::new(Lifecycle::new(config.shutdown_timeout));
    let drain = Arc::clone(&lifecycle);

    serve(incoming, &config, lifecycle, move |health_reporter| {
        shutdown_signal(drain, health_reporter, providers)
    })
    .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");
    Ok(())
}

/// Serves the calculator, greet and blog services (plus health) on
/// `incoming`. `shutdown` receives the health reporter and resolves when the
/// server should stop accepting connections.
async fn serve<I, IO, IE, S, F>(
    incoming: I,
    config: &ServerConfig,
    lifecycle: Arc<Lifecycle>,
    shutdown: S,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
    S: FnOnce(HealthReporter) -> F,
    F: Future<Output = ()>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    set_serving(&health_reporter).await;

    let dispatcher = Dispatcher::new(lifecycle, config.stream_buffer_size);
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let handlers = Handlers::new(dispatcher, config.greet, store);

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                // Outermost, so the deadline is anchored before anything else runs
                .layer(DeadlineLayer)
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(build_calculator_service(handlers.calculator))
        .add_service(build_greet_service(handlers.greet))
        .add_service(build_blog_service(handlers.blog))
        .serve_with_incoming_shutdown(incoming, shutdown(health_reporter))
        .await?;

    Ok(())
}

fn log_startup_info(_addr: &str, _config: &ServerConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting quadrant services on {} with full config: {:#?}",
            _addr,
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting quadrant services on {} with a stream buffer of {}",
            _addr,
            _config.stream_buffer_size
        );
    }
}

macro_rules! compressed {
    ($server:expr) => {
        $server
            .send_compressed(CompressionEncoding::Zstd)
            .send_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Deflate)
            .accept_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Deflate)
    };
}

fn build_calculator_service(handler: CalculatorHandler) -> CalculatorServiceServer<CalculatorHandler> {
    compressed!(CalculatorServiceServer::new(handler))
}

fn build_greet_service(handler: GreetHandler) -> GreetServiceServer<GreetHandler> {
    compressed!(GreetServiceServer::new(handler))
}

fn build_blog_service(handler: BlogHandler) -> BlogServiceServer<BlogHandler> {
    compressed!(BlogServiceServer::new(handler))
}

async fn set_serving(health_reporter: &HealthReporter) {
    health_reporter
        .set_serving::<CalculatorServiceServer<CalculatorHandler>>()
        .await;
    health_reporter
        .set_serving::<GreetServiceServer<GreetHandler>>()
        .await;
    health_reporter
        .set_serving::<BlogServiceServer<BlogHandler>>()
        .await;
}

async fn set_not_serving(health_reporter: &HealthReporter) {
    health_reporter
        .set_not_serving::<CalculatorServiceServer<CalculatorHandler>>()
        .await;
    health_reporter
        .set_not_serving::<GreetServiceServer<GreetHandler>>()
        .await;
    health_reporter
        .set_not_serving::<BlogServiceServer<BlogHandler>>()
        .await;
}

async fn shutdown_signal(
    lifecycle: Arc<Lifecycle>,
    health_reporter: HealthReporter,
    providers: TelemetryProviders,
) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to install SIGTERM handler: {}", _e);
                core::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = core::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to install Ctrl+C handler: {}", _e);
            core::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    set_not_serving(&health_reporter).await;

    // 2. Refuse new calls, drain, then cancel whatever is left
    let _abandoned = lifecycle.shutdown().await;
    #[cfg(feature = "tracing")]
    if _abandoned > 0 {
        tracing::warn!("Cancelled {} calls still running at the drain timeout", _abandoned);
    }

    // 3. Flush telemetry
    providers.shutdown();
}
