// src/itch_feed.rs
//! Per-order pipeline: multicast in, frame decode, book apply, publish.
//!
//! One cooperative loop does everything. The only suspension point is the
//! bounded multicast poll; all updates from a datagram are applied in arrival
//! order before any publish decision, and publishes are single-threaded, so
//! the outbound `sequence` is strictly increasing per process.
//!
//! [`ItchEngine`] is the transport-free core (decode, apply, encode); the
//! surrounding [`ItchFeed`] owns the sockets and the timers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use bytes::Bytes;
use tracing::{info, warn};

use crate::book::BookManager;
use crate::config::{ItchConfig, Mode};
use crate::itch::{self, Message};
use crate::metrics::Metrics;
use crate::net::{McastReceiver, McastSender};
use crate::types::{now_ns, Symbol, TradeTick};
use crate::wire;

/// Decode-and-apply core of the per-order pipeline. Encoded envelopes are
/// pushed to the caller's output queue so the loop (or a test) decides when
/// and where they go.
pub struct ItchEngine {
    mode: Mode,
    books: BookManager,
    metrics: Arc<Metrics>,
    sequence: u64,
}

impl ItchEngine {
    pub fn new(cfg: &ItchConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            mode: cfg.mode,
            books: BookManager::new(cfg.book_depth, cfg.max_live_orders),
            metrics,
            sequence: 0,
        }
    }

    pub fn books(&self) -> &BookManager {
        &self.books
    }

    #[inline]
    fn next_seq(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Applies every frame of one datagram, in order.
    pub fn on_datagram(&mut self, data: &[u8], out: &mut Vec<Bytes>) {
        for body in itch::frames(data) {
            match itch::decode(body) {
                Some(msg) => self.on_message(msg, out),
                None => self.metrics.inc_decode_error(),
            }
        }
    }

    fn on_message(&mut self, msg: Message, out: &mut Vec<Bytes>) {
        match msg {
            Message::SystemEvent { .. } => {}

            Message::StockDirectory { stock, .. } => self.books.ensure(stock),

            Message::AddOrder {
                timestamp,
                order_ref,
                side,
                shares,
                stock,
                price,
            } => {
                let outcome = self.books.add(order_ref, stock, side, price, shares);
                if !outcome.applied {
                    self.metrics.inc_anomaly();
                    return;
                }
                self.metrics.inc_add();
                if outcome.evicted > 0 {
                    self.metrics.add_evicted(outcome.evicted as u64);
                }
                if self.mode == Mode::Tick && outcome.top_changed {
                    self.push_quote(stock, timestamp, out);
                }
            }

            Message::OrderReplace {
                timestamp,
                old_ref,
                new_ref,
                shares,
                price,
            } => {
                if let Some((stock, top_changed)) =
                    self.books.replace(old_ref, new_ref, price, shares)
                {
                    if self.mode == Mode::Tick && top_changed {
                        self.push_quote(stock, timestamp, out);
                    }
                }
            }

            Message::OrderDelete { order_ref, .. } => {
                self.metrics.inc_delete();
                self.books.delete(order_ref);
            }

            Message::OrderCancel {
                order_ref, shares, ..
            } => {
                self.metrics.inc_delete();
                self.books.cancel(order_ref, shares);
            }

            Message::OrderExecuted {
                timestamp,
                order_ref,
                shares,
                match_number,
            } => {
                self.metrics.inc_execution();
                if let Some((stock, exec)) = self.books.execute(order_ref, shares, None) {
                    if self.mode == Mode::Tick {
                        let tick = TradeTick {
                            symbol: stock,
                            timestamp,
                            sequence: self.next_seq(),
                            price: exec.price,
                            qty: exec.qty,
                            side: exec.aggressor.as_byte(),
                            match_number,
                        };
                        out.push(wire::encode_trade(&tick));
                    }
                }
            }

            Message::OrderExecutedWithPrice {
                timestamp,
                order_ref,
                shares,
                match_number,
                price,
            } => {
                self.metrics.inc_execution();
                if let Some((stock, exec)) = self.books.execute(order_ref, shares, Some(price)) {
                    if self.mode == Mode::Tick {
                        let tick = TradeTick {
                            symbol: stock,
                            timestamp,
                            sequence: self.next_seq(),
                            price: exec.price,
                            qty: exec.qty,
                            side: exec.aggressor.as_byte(),
                            match_number,
                        };
                        out.push(wire::encode_trade(&tick));
                    }
                }
            }

            Message::Trade {
                timestamp,
                side,
                shares,
                stock,
                price,
                match_number,
            } => {
                self.metrics.inc_trade();
                self.books.record_trade(stock, price, shares);
                if self.mode == Mode::Tick {
                    let tick = TradeTick {
                        symbol: stock,
                        timestamp,
                        sequence: self.next_seq(),
                        price,
                        qty: shares,
                        side: side.as_byte(),
                        match_number,
                    };
                    out.push(wire::encode_trade(&tick));
                }
            }

            Message::CrossTrade {
                timestamp,
                shares,
                stock,
                price,
                match_number,
            } => {
                self.metrics.inc_trade();
                let qty = shares.min(u64::from(u32::MAX)) as u32;
                self.books.record_trade(stock, price, qty);
                if self.mode == Mode::Tick {
                    let tick = TradeTick {
                        symbol: stock,
                        timestamp,
                        sequence: self.next_seq(),
                        price,
                        qty,
                        side: b'X',
                        match_number,
                    };
                    out.push(wire::encode_trade(&tick));
                }
            }
        }
    }

    fn push_quote(&mut self, symbol: Symbol, timestamp: u64, out: &mut Vec<Bytes>) {
        let seq = self.next_seq();
        if let Some(quote) = self.books.bbo(symbol, timestamp, seq) {
            out.push(wire::encode_quote(&quote));
        }
    }

    /// Drains the dirty set into snapshot envelopes. An interval with nothing
    /// dirty produces a heartbeat so downstream can tell idle from dead.
    pub fn publish_conflated(&mut self, now: u64, out: &mut Vec<Bytes>) {
        let mut published = false;
        for symbol in self.books.drain_dirty() {
            let seq = self.next_seq();
            if let Some(snap) = self.books.snapshot(symbol, now, seq) {
                out.push(wire::encode_snapshot(&snap));
                published = true;
            }
        }
        if !published {
            out.push(wire::encode_heartbeat(now));
        }
    }
}

/// The per-order pipeline with its transport attached.
pub struct ItchFeed {
    cfg: ItchConfig,
    rx: McastReceiver,
    tx: McastSender,
    engine: ItchEngine,
    metrics: Arc<Metrics>,
    running: Arc<AtomicBool>,
}

impl ItchFeed {
    /// Binds the sockets; any failure here is a startup failure.
    pub fn new(cfg: ItchConfig, running: Arc<AtomicBool>) -> anyhow::Result<Self> {
        let rx = McastReceiver::join(cfg.input_group, cfg.input_port, cfg.interface)
            .context("join input group")?;
        let tx = McastSender::open(cfg.output_group, cfg.output_port, cfg.output_ttl)
            .context("open output sender")?;
        let metrics = Arc::new(Metrics::new());
        let engine = ItchEngine::new(&cfg, metrics.clone());
        Ok(Self {
            cfg,
            rx,
            tx,
            engine,
            metrics,
            running,
        })
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Blocking run loop; returns once the cancellation flag drops.
    pub fn run(&mut self) {
        let poll_timeout =
            Duration::from_millis(self.cfg.conflation_interval_ms.min(100).max(1));
        let conflation = Duration::from_millis(self.cfg.conflation_interval_ms);
        let stats_every = Duration::from_secs(self.cfg.stats_interval_sec.max(1));
        let mut buf = vec![0u8; 65536];
        let mut out: Vec<Bytes> = Vec::new();
        let mut last_publish = Instant::now();
        let mut last_stats = Instant::now();

        info!(
            mode = ?self.cfg.mode,
            input = %self.cfg.input_group,
            output = %self.cfg.output_group,
            "per-order pipeline started"
        );

        while self.running.load(Ordering::Relaxed) {
            match self.rx.poll(&mut buf, poll_timeout) {
                Ok(Some(n)) => {
                    self.metrics.received(n);
                    self.engine.on_datagram(&buf[..n], &mut out);
                    self.flush(&mut out);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "input receive failed"),
            }

            if self.cfg.mode == Mode::Conflated && last_publish.elapsed() >= conflation {
                self.engine.publish_conflated(now_ns(), &mut out);
                self.flush(&mut out);
                last_publish = Instant::now();
            }

            if last_stats.elapsed() >= stats_every {
                self.log_stats();
                last_stats = Instant::now();
            }
        }

        info!("per-order pipeline stopped");
        self.log_stats();
    }

    fn flush(&mut self, out: &mut Vec<Bytes>) {
        for frame in out.drain(..) {
            match self.tx.send(&frame) {
                Ok(n) => self.metrics.sent(n),
                Err(e) => warn!(error = %e, "output send failed"),
            }
        }
    }

    fn log_stats(&self) {
        let m = self.metrics.load();
        info!(
            received = m.messages_received,
            sent = m.messages_sent,
            rx_bytes = m.bytes_received,
            tx_bytes = m.bytes_sent,
            adds = m.add_orders,
            deletes = m.delete_orders,
            executions = m.executions,
            trades = m.trades,
            errors = m.decode_errors,
            anomalies = m.anomalies,
            evicted = m.evicted_orders,
            live_orders = self.engine.books().live_orders(),
            "stats"
        );
    }
}
