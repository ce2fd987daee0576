//! # feedrelay - Market Data Feed Handler
//!
//! Consumes exchange-published order-book events on UDP multicast, maintains
//! a normalized Level-2 book per instrument, and republishes processed
//! updates on a second multicast group.
//!
//! ## Architecture
//!
//! Two independent pipelines share the outbound message types:
//!
//! - **Per-order** ([`itch_feed`]): length-prefixed messages keyed by a
//!   64-bit order reference feed a book that derives price levels from
//!   individual orders. Publishes tick-by-tick quotes and trades, or
//!   conflated snapshots.
//! - **Price-level** ([`mdp_feed`]): SBE packets carrying aggregated level
//!   updates feed fixed-depth ladders, gated per security by a gap-detection
//!   state machine that resynchronizes from a separate snapshot feed.
//!   Publishes conflated SBE snapshots.
//!
//! Each pipeline is a single cooperative loop: the bounded multicast poll is
//! the only suspension point, and book mutation, recovery transitions and
//! publishing all happen on that thread.
//!
//! ## Example
//!
//! ```rust
//! use feedrelay::book::OrderBook;
//! use feedrelay::types::{Side, Symbol};
//!
//! let mut book = OrderBook::new(Symbol::from("ACME"), 10);
//! book.add(1, Side::Buy, 1_000_000 /* $100.0000 */, 500);
//!
//! let bbo = book.bbo(0, 1);
//! assert_eq!(bbo.bid_price, 1_000_000);
//! assert_eq!(bbo.bid_qty, 500);
//! ```

pub mod book;
pub mod config;
pub mod itch;
pub mod itch_feed;
pub mod l2sbe;
pub mod ladder;
pub mod mdp;
pub mod mdp_feed;
pub mod metrics;
pub mod net;
pub mod recovery;
pub mod types;
pub mod wire;
