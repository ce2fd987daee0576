// src/main.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use feedrelay::config::{Cli, Cmd};
use feedrelay::itch_feed::ItchFeed;
use feedrelay::mdp_feed::MdpFeed;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let cli = Cli::parse();

    // Signal translator: ctrl-c flips the flag, the run loop finishes its
    // current iteration and exits.
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                running.store(false, Ordering::Relaxed);
            }
        });
    }

    match cli.cmd {
        Cmd::Itch(cfg) => {
            cfg.validate().context("invalid configuration")?;
            let mut feed = ItchFeed::new(cfg, running).context("start per-order pipeline")?;
            tokio::task::spawn_blocking(move || feed.run()).await?;
        }
        Cmd::Mdp(cfg) => {
            cfg.validate().context("invalid configuration")?;
            let mut feed = MdpFeed::new(cfg, running).context("start price-level pipeline")?;
            tokio::task::spawn_blocking(move || feed.run()).await?;
        }
    }

    Ok(())
}
