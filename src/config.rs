// src/config.rs
//! CLI configuration for both pipelines, via clap.

use std::net::Ipv4Addr;

use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;

use crate::types::MAX_DEPTH;

#[derive(Parser, Debug)]
#[command(name = "feedrelay", version)]
#[command(about = "Consumes exchange multicast feeds, maintains L2 books, republishes processed updates")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Per-order feed: length-prefixed messages keyed by order reference.
    Itch(ItchConfig),
    /// Price-level feed: SBE packets with a separate snapshot group for
    /// gap recovery.
    Mdp(MdpConfig),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Publish a quote or trade tick per inbound event.
    Tick,
    /// Batch updates and publish dirty books at a fixed interval.
    Conflated,
}

#[derive(Parser, Debug, Clone)]
pub struct ItchConfig {
    #[arg(long, value_enum, default_value_t = Mode::Tick)]
    pub mode: Mode,

    /// Conflation interval in milliseconds (conflated mode).
    #[arg(long, default_value_t = 100)]
    pub conflation_interval_ms: u64,

    /// Book depth carried in snapshots.
    #[arg(long, default_value_t = 10)]
    pub book_depth: usize,

    #[arg(long, default_value = "239.1.1.1")]
    pub input_group: Ipv4Addr,
    #[arg(long, default_value_t = 30001)]
    pub input_port: u16,
    #[arg(long, default_value = "239.1.1.2")]
    pub output_group: Ipv4Addr,
    #[arg(long, default_value_t = 30002)]
    pub output_port: u16,

    /// Local interface for the multicast join.
    #[arg(long, default_value = "0.0.0.0")]
    pub interface: Ipv4Addr,

    #[arg(long, default_value_t = 1)]
    pub output_ttl: u32,

    #[arg(long, default_value_t = 10)]
    pub stats_interval_sec: u64,

    /// Cap on resting orders across all books; oldest evicted beyond it.
    #[arg(long, default_value_t = 1_000_000)]
    pub max_live_orders: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct MdpConfig {
    #[arg(long, default_value = "239.2.1.1")]
    pub incremental_group: Ipv4Addr,
    #[arg(long, default_value_t = 40001)]
    pub incremental_port: u16,
    #[arg(long, default_value = "239.2.1.2")]
    pub snapshot_group: Ipv4Addr,
    #[arg(long, default_value_t = 40002)]
    pub snapshot_port: u16,
    #[arg(long, default_value = "239.2.1.3")]
    pub output_group: Ipv4Addr,
    #[arg(long, default_value_t = 40003)]
    pub output_port: u16,

    /// Local interface for the multicast joins.
    #[arg(long, default_value = "0.0.0.0")]
    pub interface: Ipv4Addr,

    #[arg(long, default_value_t = 1)]
    pub output_ttl: u32,

    /// Conflation interval in milliseconds.
    #[arg(long, default_value_t = 100)]
    pub conflation_interval_ms: u64,

    /// Book depth carried in published snapshots.
    #[arg(long, default_value_t = 10)]
    pub book_depth: usize,

    /// How long to wait on the snapshot feed before logging a retry.
    #[arg(long, default_value_t = 5000)]
    pub recovery_timeout_ms: u64,

    #[arg(long, default_value_t = 10)]
    pub stats_interval_sec: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("book depth {0} out of range, must be between 1 and the compile-time maximum")]
    BadDepth(usize),
    #[error("conflation interval must be at least 1 ms")]
    BadInterval,
}

impl ItchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.book_depth == 0 || self.book_depth > MAX_DEPTH {
            return Err(ConfigError::BadDepth(self.book_depth));
        }
        if self.conflation_interval_ms == 0 {
            return Err(ConfigError::BadInterval);
        }
        Ok(())
    }
}

impl MdpConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.book_depth == 0 || self.book_depth > MAX_DEPTH {
            return Err(ConfigError::BadDepth(self.book_depth));
        }
        if self.conflation_interval_ms == 0 {
            return Err(ConfigError::BadInterval);
        }
        Ok(())
    }
}
