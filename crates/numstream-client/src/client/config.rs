use anyhow::bail;
use clap::{Parser, Subcommand};
use core::time::Duration;
use numstream_core::{
    Strategy,
    types::{MAX_QUANTITY, MAX_SEED},
};
use rand::Rng;

/// Command line of the `numstream-client` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "numstream-client",
    version,
    about = "Consume a resumable big-integer sequence and verify its checksum"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Server URI to connect to.
    ///
    /// Environment variable: `NUMSTREAM_DSN`
    #[arg(
        short = 'd',
        long,
        env = "NUMSTREAM_DSN",
        default_value = "http://localhost:9090",
        global = true
    )]
    pub dsn: String,

    /// How many values to request. Chosen at random when omitted.
    #[arg(short = 'n', long = "qty", global = true)]
    pub qty: Option<i64>,

    /// Do not send a client identifier; reconnects start a new sequence.
    #[arg(short = 's', long, global = true)]
    pub stateless: bool,

    /// Client identifier to resume under. A random UUID when omitted.
    #[arg(short = 'c', long, global = true)]
    pub client_id: Option<String>,

    /// Seconds to keep trying to reconnect after the stream is lost.
    ///
    /// Environment variable: `RECONNECT_TIMEOUT_SECS`
    #[arg(long, env = "RECONNECT_TIMEOUT_SECS", default_value_t = 300, global = true)]
    pub reconnect_timeout_secs: u64,

    /// Attempts made to open a call before giving up on a transient status.
    #[arg(long, default_value_t = 5, global = true)]
    pub max_call_retries: usize,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Request a doubling sequence: seed, seed x 2, seed x 4, ...
    Doubling {
        /// First value of the sequence. Zero picks one at random.
        #[arg(short = 'a', long)]
        seed: Option<u64>,
    },
    /// Request a sequence of random values.
    Random,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub dsn: String,
    pub strategy: Strategy,
    pub quantity: i64,
    pub seed: u64,
    pub client_id: Option<String>,
    pub reconnect_timeout: Duration,
    pub max_call_retries: usize,
}

impl ClientConfig {
    /// Whether calls carry a client identifier and can be resumed.
    pub const fn is_resumable(&self) -> bool {
        self.client_id.is_some()
    }
}

impl TryFrom<CliArgs> for ClientConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let mut rng = rand::rng();

        let quantity = match args.qty {
            Some(qty) => qty,
            None => rng.random_range(1..MAX_QUANTITY),
        };
        if !(0..=MAX_QUANTITY).contains(&quantity) {
            bail!("--qty must be between 0 and {MAX_QUANTITY}");
        }

        let (strategy, seed) = match args.command {
            Command::Doubling { seed: Some(seed) } if seed != 0 => (Strategy::Doubling, seed),
            Command::Doubling { .. } => (Strategy::Doubling, rng.random_range(0..MAX_SEED)),
            Command::Random => (Strategy::Random, 0),
        };

        let client_id = if args.stateless {
            None
        } else {
            Some(
                args.client_id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            )
        };

        if args.reconnect_timeout_secs == 0 {
            bail!("RECONNECT_TIMEOUT_SECS must be greater than 0");
        }

        if args.max_call_retries == 0 {
            bail!("--max-call-retries must be greater than 0");
        }

        Ok(Self {
            dsn: args.dsn,
            strategy,
            quantity,
            seed,
            client_id,
            reconnect_timeout: Duration::from_secs(args.reconnect_timeout_secs),
            max_call_retries: args.max_call_retries,
        })
    }
}
