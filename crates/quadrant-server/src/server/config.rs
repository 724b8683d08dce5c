use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `quadrant-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for local use.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "quadrant-server",
    version,
    about = "gRPC calculator, greet and blog services over all four call shapes"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/quadrant.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Capacity of each call's response buffer.
    ///
    /// A handler suspends on send once this many responses are waiting for
    /// the transport.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight calls to finish on shutdown before they
    /// are cancelled.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Number of greetings streamed back by `GreetManyTimes`.
    ///
    /// Environment variable: `GREET_MANY_TIMES_COUNT`
    #[arg(long, env = "GREET_MANY_TIMES_COUNT", default_value_t = 10)]
    pub greet_many_times_count: u32,

    /// Delay between two `GreetManyTimes` responses, in milliseconds.
    ///
    /// Environment variable: `GREET_MANY_TIMES_INTERVAL_MS`
    #[arg(long, env = "GREET_MANY_TIMES_INTERVAL_MS", default_value_t = 1000)]
    pub greet_many_times_interval_ms: u64,

    /// Number of delay steps `GreetWithDeadline` waits before answering.
    ///
    /// Environment variable: `GREET_DEADLINE_STEPS`
    #[arg(long, env = "GREET_DEADLINE_STEPS", default_value_t = 3)]
    pub greet_deadline_steps: u32,

    /// Length of one `GreetWithDeadline` step, in milliseconds.
    ///
    /// Environment variable: `GREET_DEADLINE_STEP_MS`
    #[arg(long, env = "GREET_DEADLINE_STEP_MS", default_value_t = 1000)]
    pub greet_deadline_step_ms: u64,
}

/// Pacing of the greet handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreetSettings {
    pub many_times_count: u32,
    pub many_times_interval: Duration,
    pub deadline_steps: u32,
    pub deadline_step: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
    pub greet: GreetSettings,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.greet_deadline_steps == 0 {
            bail!("GREET_DEADLINE_STEPS must be greater than 0");
        }

        if args.server_addr.trim().is_empty() {
            bail!("SERVER_ADDR must not be empty");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            greet: GreetSettings {
                many_times_count: args.greet_many_times_count,
                many_times_interval: Duration::from_millis(args.greet_many_times_interval_ms),
                deadline_steps: args.greet_deadline_steps,
                deadline_step: Duration::from_millis(args.greet_deadline_step_ms),
            },
        })
    }
}
