//! Server configuration parsed from the command line and environment

use clap::builder::RangedU64ValueParser;
use clap::Parser;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_STALE_THRESHOLD_SECS: u64 = 10;
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

/// Command line arguments for the relay server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Real-time player state relay over WebSockets")]
pub struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Seconds between liveness sweeps
    #[arg(
        long,
        default_value_t = DEFAULT_SWEEP_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sweep_interval_secs: u64,

    /// Seconds of silence after which a player is evicted
    #[arg(long, default_value_t = DEFAULT_STALE_THRESHOLD_SECS)]
    pub stale_threshold_secs: u64,

    /// Frames buffered per connection before new frames are dropped
    #[arg(
        long,
        default_value_t = DEFAULT_OUTBOUND_QUEUE,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub outbound_queue: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub sweep_interval: Duration,
    pub stale_threshold: Duration,
    pub outbound_queue: usize,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Rejects settings the sweep timer or the outbound queues cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_interval.is_zero() {
            return Err("sweep interval must be greater than zero".to_string());
        }
        if self.outbound_queue == 0 {
            return Err("outbound queue must hold at least one frame".to_string());
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            stale_threshold: Duration::from_secs(DEFAULT_STALE_THRESHOLD_SECS),
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
        }
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
            stale_threshold: Duration::from_secs(args.stale_threshold_secs),
            outbound_queue: args.outbound_queue,
        }
    }
}
