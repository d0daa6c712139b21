use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use numstream_core::types::MAX_QUANTITY;

/// Runtime configuration for the `numstream-server` binary.
///
/// All values are parsed from CLI arguments or environment variables. By
/// default one value is emitted per second and sessions are kept for 30
/// seconds after their last access.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "numstream-server",
    version,
    about = "A gRPC service streaming resumable big-integer sequences"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:9090"))]
    pub server_addr: String,

    /// Largest quantity a single request may ask for.
    ///
    /// Doubling sequences grow by one bit per value, so memory use is
    /// quadratic in this limit.
    ///
    /// Environment variable: `MAX_QUANTITY`
    #[arg(long, env = "MAX_QUANTITY", default_value_t = MAX_QUANTITY)]
    pub max_quantity: i64,

    /// Pause between two emitted values, in milliseconds.
    ///
    /// Environment variable: `EMIT_INTERVAL_MS`
    #[arg(long, env = "EMIT_INTERVAL_MS", default_value_t = 1_000)]
    pub emit_interval_ms: u64,

    /// How long a resumable session is kept after its last access.
    ///
    /// Environment variable: `SESSION_TTL_SECS`
    #[arg(long, env = "SESSION_TTL_SECS", default_value_t = 30)]
    pub session_ttl_secs: u64,

    /// How often idle sessions are swept, in milliseconds.
    ///
    /// Environment variable: `SWEEP_INTERVAL_MS`
    #[arg(long, env = "SWEEP_INTERVAL_MS", default_value_t = 1_000)]
    pub sweep_interval_ms: u64,

    /// Capacity of the buffer between a producer and its gRPC stream.
    ///
    /// Kept small so the cursor never runs far ahead of what the client has
    /// actually been sent.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 1)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight streams during shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub max_quantity: i64,
    pub emit_interval: Duration,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("0.0.0.0:9090"),
            max_quantity: MAX_QUANTITY,
            emit_interval: Duration::from_secs(1),
            session_ttl: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
            stream_buffer_size: 1,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_quantity < 0 {
            bail!("MAX_QUANTITY must not be negative");
        }

        if args.emit_interval_ms == 0 {
            bail!("EMIT_INTERVAL_MS must be greater than 0");
        }

        if args.session_ttl_secs == 0 {
            bail!("SESSION_TTL_SECS must be greater than 0");
        }

        if args.sweep_interval_ms == 0 {
            bail!("SWEEP_INTERVAL_MS must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            max_quantity: args.max_quantity,
            emit_interval: Duration::from_millis(args.emit_interval_ms),
            session_ttl: Duration::from_secs(args.session_ttl_secs),
            sweep_interval: Duration::from_millis(args.sweep_interval_ms),
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
        })
    }
}
