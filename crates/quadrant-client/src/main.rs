#![doc = include_str!("../README.md")]

use clap::{Parser, Subcommand};
use core::time::Duration;
use futures::stream;
use quadrant_core::{
    CallContext,
    client::{self, blog, calculator, greet},
    coordinator::StreamCoordinator,
    proto::{
        Blog, Greeting, blog_service_client::BlogServiceClient,
        calculator_service_client::CalculatorServiceClient,
        greet_service_client::GreetServiceClient,
    },
};
use tonic::codec::CompressionEncoding;

#[derive(Parser, Debug)]
#[command(
    name = "quadrant-client",
    version,
    about = "Calls the quadrant calculator, greet and blog services"
)]
struct Cli {
    /// Server URI.
    ///
    /// Environment variable: `QUADRANT_ADDR`
    #[arg(long, env = "QUADRANT_ADDR", default_value_t = String::from("http://127.0.0.1:50051"))]
    addr: String,

    /// Deadline for the whole call, in milliseconds. Zero means unbounded.
    ///
    /// Environment variable: `TIMEOUT_MS`
    #[arg(long, env = "TIMEOUT_MS", default_value_t = 5000)]
    timeout_ms: u64,

    /// Delay between two sends of a client-streaming or bidirectional call,
    /// in milliseconds.
    ///
    /// Environment variable: `PACING_MS`
    #[arg(long, env = "PACING_MS", default_value_t = 100)]
    pacing_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Adds two integers.
    Sum {
        #[arg(allow_negative_numbers = true)]
        first: i64,
        #[arg(allow_negative_numbers = true)]
        last: i64,
    },
    /// Square root of a non-negative number.
    SquareRoot {
        #[arg(allow_negative_numbers = true)]
        number: f64,
    },
    /// Streams the prime factors of a positive integer.
    PrimeDecompose {
        #[arg(allow_negative_numbers = true)]
        number: i64,
    },
    /// Streams numbers and prints their mean.
    ComputeAverage {
        #[arg(allow_negative_numbers = true)]
        numbers: Vec<f64>,
    },
    /// Streams numbers and prints every new running maximum.
    FindMaximum {
        #[arg(allow_negative_numbers = true)]
        numbers: Vec<i64>,
    },
    Greet {
        first_name: String,
        #[arg(default_value_t = String::new())]
        last_name: String,
    },
    GreetManyTimes {
        first_name: String,
    },
    /// Sends one greeting per name and prints the combined answer.
    LongGreet {
        names: Vec<String>,
    },
    /// Sends one greeting per name and prints each reply as it arrives.
    GreetEveryone {
        names: Vec<String>,
    },
    /// Slow greeting; fails with `DeadlineExceeded` under a short --timeout-ms.
    GreetWithDeadline {
        first_name: String,
    },
    CreateBlog {
        author_id: String,
        title: String,
        content: String,
    },
    ReadBlog {
        id: String,
    },
    UpdateBlog {
        id: String,
        author_id: String,
        title: String,
        content: String,
    },
    DeleteBlog {
        id: String,
    },
    ListBlogs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    #[cfg(feature = "tracing")]
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let mut ctx = CallContext::new();
    if cli.timeout_ms > 0 {
        ctx = ctx.with_timeout(Duration::from_millis(cli.timeout_ms));
    }
    let coordinator =
        StreamCoordinator::new(ctx.clone()).with_pacing(Duration::from_millis(cli.pacing_ms));
    let channel = client::connect(cli.addr).await?;

    match cli.command {
        Command::Sum { .. }
        | Command::SquareRoot { .. }
        | Command::PrimeDecompose { .. }
        | Command::ComputeAverage { .. }
        | Command::FindMaximum { .. } => {
            let client = CalculatorServiceClient::new(channel)
                .send_compressed(CompressionEncoding::Zstd)
                .accept_compressed(CompressionEncoding::Zstd)
                .accept_compressed(CompressionEncoding::Gzip);
            run_calculator(client, &ctx, &coordinator, cli.command).await
        }
        Command::Greet { .. }
        | Command::GreetManyTimes { .. }
        | Command::LongGreet { .. }
        | Command::GreetEveryone { .. }
        | Command::GreetWithDeadline { .. } => {
            let client = GreetServiceClient::new(channel)
                .accept_compressed(CompressionEncoding::Zstd)
                .accept_compressed(CompressionEncoding::Gzip);
            run_greet(client, &ctx, &coordinator, cli.command).await
        }
        Command::CreateBlog { .. }
        | Command::ReadBlog { .. }
        | Command::UpdateBlog { .. }
        | Command::DeleteBlog { .. }
        | Command::ListBlogs => {
            let client = BlogServiceClient::new(channel)
                .accept_compressed(CompressionEncoding::Zstd)
                .accept_compressed(CompressionEncoding::Gzip);
            run_blog(client, &ctx, cli.command).await
        }
    }
}

async fn run_calculator(
    mut client: calculator::Client,
    ctx: &CallContext,
    coordinator: &StreamCoordinator,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Sum { first, last } => {
            println!("{}", calculator::sum(&mut client, ctx, first, last).await?);
        }
        Command::SquareRoot { number } => {
            println!(
                "{}",
                calculator::square_root(&mut client, ctx, number).await?
            );
        }
        Command::PrimeDecompose { number } => {
            for factor in calculator::prime_decompose(&mut client, ctx, number).await? {
                println!("{factor}");
            }
        }
        Command::ComputeAverage { numbers } => {
            let mean =
                calculator::compute_average(&client, coordinator, stream::iter(numbers)).await?;
            println!("{mean}");
        }
        Command::FindMaximum { numbers } => {
            let summary =
                calculator::find_maximum(&client, coordinator, stream::iter(numbers), |max| {
                    println!("{max}");
                })
                .await?;
            eprintln!("sent {}, received {}", summary.sent, summary.received);
        }
        other => anyhow::bail!("{other:?} is not a calculator method"),
    }
    Ok(())
}

async fn run_greet(
    mut client: greet::Client,
    ctx: &CallContext,
    coordinator: &StreamCoordinator,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Greet {
            first_name,
            last_name,
        } => {
            let greeting = Greeting::new(first_name, last_name);
            println!("{}", greet::greet(&mut client, ctx, greeting).await?);
        }
        Command::GreetManyTimes { first_name } => {
            greet::greet_many_times(&mut client, ctx, Greeting::new(first_name, ""), |reply| {
                println!("{reply}");
            })
            .await?;
        }
        Command::LongGreet { names } => {
            let greetings = stream::iter(names.into_iter().map(|name| Greeting::new(name, "")));
            println!(
                "{}",
                greet::long_greet(&client, coordinator, greetings).await?
            );
        }
        Command::GreetEveryone { names } => {
            let greetings = stream::iter(names.into_iter().map(|name| Greeting::new(name, "")));
            greet::greet_everyone(&client, coordinator, greetings, |reply| {
                println!("{reply}");
            })
            .await?;
        }
        Command::GreetWithDeadline { first_name } => {
            let greeting = Greeting::new(first_name, "");
            println!(
                "{}",
                greet::greet_with_deadline(&mut client, ctx, greeting).await?
            );
        }
        other => anyhow::bail!("{other:?} is not a greet method"),
    }
    Ok(())
}

async fn run_blog(
    mut client: blog::Client,
    ctx: &CallContext,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::CreateBlog {
            author_id,
            title,
            content,
        } => {
            let draft = Blog {
                id: String::new(),
                author_id,
                title,
                content,
            };
            print_blog(&blog::create_blog(&mut client, ctx, draft).await?);
        }
        Command::ReadBlog { id } => {
            print_blog(&blog::read_blog(&mut client, ctx, &id).await?);
        }
        Command::UpdateBlog {
            id,
            author_id,
            title,
            content,
        } => {
            let replacement = Blog {
                id,
                author_id,
                title,
                content,
            };
            print_blog(&blog::update_blog(&mut client, ctx, replacement).await?);
        }
        Command::DeleteBlog { id } => {
            println!("{}", blog::delete_blog(&mut client, ctx, &id).await?);
        }
        Command::ListBlogs => {
            for document in blog::list_blogs(&mut client, ctx).await? {
                print_blog(&document);
            }
        }
        other => anyhow::bail!("{other:?} is not a blog method"),
    }
    Ok(())
}

fn print_blog(blog: &Blog) {
    println!(
        "{}\t{}\t{}\t{}",
        blog.id, blog.author_id, blog.title, blog.content
    );
}
