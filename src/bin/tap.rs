// src/bin/tap.rs
//! Joins a republish group and prints one JSON object per decoded envelope.
//! Pass `--dialect mdp` for the price-level pipeline's SBE output.

use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::json;

use feedrelay::l2sbe::{self, L2Message};
use feedrelay::net::McastReceiver;
use feedrelay::wire::{self, Body};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Dialect {
    /// Length-prefixed envelopes from the per-order pipeline.
    Itch,
    /// SBE envelopes from the price-level pipeline.
    Mdp,
}

#[derive(Parser, Debug)]
#[command(name = "tap", version, about = "Pretty-prints a feedrelay output group as JSON lines")]
struct Cli {
    #[arg(long, value_enum, default_value_t = Dialect::Itch)]
    dialect: Dialect,

    #[arg(long, default_value = "239.1.1.2")]
    group: Ipv4Addr,
    #[arg(long, default_value_t = 30002)]
    port: u16,
    #[arg(long, default_value = "0.0.0.0")]
    interface: Ipv4Addr,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let rx = McastReceiver::join(cli.group, cli.port, cli.interface)
        .context("join output group")?;
    let mut buf = vec![0u8; 65536];

    loop {
        let Some(n) = rx.poll(&mut buf, Duration::from_secs(1))? else {
            continue;
        };
        let line = match cli.dialect {
            Dialect::Itch => render_itch(&buf[..n]),
            Dialect::Mdp => render_mdp(&buf[..n]),
        };
        println!("{line}");
    }
}

fn render_itch(datagram: &[u8]) -> String {
    match wire::decode(datagram) {
        Ok(env) => match env.body {
            Body::Heartbeat => json!({
                "type": "heartbeat",
                "ts": env.timestamp,
            })
            .to_string(),
            Body::Snapshot(snap) => {
                let mut v = serde_json::to_value(&snap).unwrap_or_default();
                v["type"] = json!("snapshot");
                v.to_string()
            }
            Body::Quote(quote) => {
                let mut v = serde_json::to_value(&quote).unwrap_or_default();
                v["type"] = json!("quote");
                v.to_string()
            }
            Body::Trade(t) => json!({
                "type": "trade",
                "symbol": t.symbol.trimmed(),
                "ts": t.timestamp,
                "seq": t.sequence,
                "price": t.price,
                "qty": t.qty,
                "side": (t.side as char).to_string(),
                "match": t.match_number,
            })
            .to_string(),
        },
        Err(e) => json!({ "type": "error", "error": e.to_string() }).to_string(),
    }
}

fn render_mdp(datagram: &[u8]) -> String {
    match l2sbe::decode(datagram) {
        Ok(L2Message::Heartbeat(hb)) => {
            json!({ "type": "heartbeat", "ts": hb.timestamp, "seq": hb.sequence }).to_string()
        }
        Ok(L2Message::Snapshot(snap)) => {
            let mut v = serde_json::to_value(&snap).unwrap_or_default();
            v["type"] = json!("snapshot");
            v.to_string()
        }
        Err(e) => json!({ "type": "error", "error": e.to_string() }).to_string(),
    }
}
