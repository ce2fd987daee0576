// src/mdp_feed.rs
//! Price-level pipeline: incremental feed in, snapshot feed for recovery,
//! conflated SBE snapshots out.
//!
//! The incremental feed drives the ladders through the recovery gate: each
//! entry is admitted or refused per security before it touches a book. The
//! snapshot feed is drained every loop iteration so the socket never backs
//! up, but its packets are only parsed while some security actually needs
//! recovery. Securities that are mid-recovery are skipped at publish time;
//! their next snapshot marks them dirty again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::MdpConfig;
use crate::l2sbe;
use crate::ladder::LadderManager;
use crate::mdp::{self, EntryKind, Message, UpdateAction};
use crate::metrics::Metrics;
use crate::net::{McastReceiver, McastSender};
use crate::recovery::{Phase, RecoveryManager};
use crate::types::now_ns;

/// Transport-free core of the price-level pipeline.
pub struct MdpEngine {
    depth: usize,
    ladders: LadderManager,
    recovery: RecoveryManager,
    metrics: Arc<Metrics>,
    sequence: u64,
    last_packet_seq: Option<u32>,
}

impl MdpEngine {
    pub fn new(cfg: &MdpConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            depth: cfg.book_depth,
            ladders: LadderManager::new(),
            recovery: RecoveryManager::new(),
            metrics,
            sequence: 0,
            last_packet_seq: None,
        }
    }

    pub fn ladders(&self) -> &LadderManager {
        &self.ladders
    }

    pub fn recovery(&self) -> &RecoveryManager {
        &self.recovery
    }

    #[inline]
    pub fn needs_recovery(&self) -> bool {
        self.recovery.needs_recovery()
    }

    #[inline]
    fn next_seq(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Applies one incremental-feed datagram.
    pub fn on_incremental_datagram(&mut self, data: &[u8]) {
        let Some((header, messages)) = mdp::packet(data) else {
            self.metrics.inc_decode_error();
            return;
        };

        // Channel-wide packet gaps are observed but not acted on; recovery is
        // per security via rpt_seq.
        if let Some(prev) = self.last_packet_seq {
            if header.seq != prev.wrapping_add(1) {
                self.metrics.inc_packet_gap();
                debug!(expected = prev.wrapping_add(1), got = header.seq, "packet gap");
            }
        }
        self.last_packet_seq = Some(header.seq);

        for msg in messages {
            match msg {
                Message::SecurityDefinition {
                    security_id,
                    symbol,
                    ..
                } => {
                    info!(security_id, %symbol, "security definition");
                    self.ladders.define(security_id, symbol);
                    self.recovery.init_security(security_id, 1);
                }

                Message::IncrementalRefresh { entries, .. } => {
                    for entry in &entries {
                        if entry.size < 0 {
                            self.metrics.inc_anomaly();
                            continue;
                        }
                        if !self.recovery.on_incremental(entry.security_id, entry.rpt_seq) {
                            continue;
                        }
                        self.ladders.apply(entry);
                        match entry.action {
                            UpdateAction::New => self.metrics.inc_add(),
                            UpdateAction::Delete
                            | UpdateAction::DeleteThru
                            | UpdateAction::DeleteFrom => self.metrics.inc_delete(),
                            _ => {}
                        }
                        if entry.kind == EntryKind::Trade {
                            self.metrics.inc_trade();
                        }
                    }
                }

                Message::ChannelReset { .. } => {
                    info!("channel reset");
                    self.ladders.reset_all();
                    self.recovery.channel_reset();
                }

                Message::Heartbeat { .. } => {}

                // Full refreshes belong to the snapshot feed; stray ones here
                // are ignored.
                Message::SnapshotFullRefresh { .. } => {}
            }
        }
    }

    /// Applies one snapshot-feed datagram.
    pub fn on_snapshot_datagram(&mut self, data: &[u8]) {
        let Some((_, messages)) = mdp::packet(data) else {
            self.metrics.inc_decode_error();
            return;
        };

        for msg in messages {
            if let Message::SnapshotFullRefresh {
                security_id,
                rpt_seq,
                entries,
                ..
            } = msg
            {
                if self.recovery.on_snapshot(security_id, rpt_seq) {
                    self.ladders.apply_snapshot(security_id, rpt_seq, &entries);
                    self.recovery.complete_recovery(security_id, rpt_seq);
                    info!(security_id, rpt_seq, "recovery complete");
                }
            }
        }
    }

    /// Drains the dirty set into SBE snapshot envelopes, skipping securities
    /// still waiting on recovery. Idle intervals produce a heartbeat.
    pub fn publish_conflated(&mut self, now: u64, out: &mut Vec<Bytes>) {
        let mut published = false;
        for security_id in self.ladders.drain_dirty() {
            if self.recovery.phase(security_id) != Phase::Normal {
                continue;
            }
            let seq = self.next_seq();
            if let Some(mut snap) = self.ladders.snapshot(security_id, now, seq) {
                snap.bids.truncate(self.depth);
                snap.asks.truncate(self.depth);
                out.push(l2sbe::encode_snapshot(&snap));
                published = true;
            }
        }
        if !published {
            let seq = self.next_seq();
            out.push(l2sbe::encode_heartbeat(now, seq));
        }
    }

    /// Sweeps recovery timers; returns the securities whose wait exceeded the
    /// timeout this sweep.
    pub fn check_timeouts(&mut self, now: u64, timeout_ns: u64) -> Vec<u32> {
        self.recovery.check_timeouts(now, timeout_ns)
    }
}

/// The price-level pipeline with its transports attached.
pub struct MdpFeed {
    cfg: MdpConfig,
    incremental_rx: McastReceiver,
    snapshot_rx: McastReceiver,
    tx: McastSender,
    engine: MdpEngine,
    metrics: Arc<Metrics>,
    running: Arc<AtomicBool>,
}

impl MdpFeed {
    /// Binds all three sockets; any failure here is a startup failure.
    pub fn new(cfg: MdpConfig, running: Arc<AtomicBool>) -> anyhow::Result<Self> {
        let incremental_rx =
            McastReceiver::join(cfg.incremental_group, cfg.incremental_port, cfg.interface)
                .context("join incremental group")?;
        let snapshot_rx =
            McastReceiver::join(cfg.snapshot_group, cfg.snapshot_port, cfg.interface)
                .context("join snapshot group")?
                .into_nonblocking()
                .context("snapshot socket mode")?;
        let tx = McastSender::open(cfg.output_group, cfg.output_port, cfg.output_ttl)
            .context("open output sender")?;
        let metrics = Arc::new(Metrics::new());
        let engine = MdpEngine::new(&cfg, metrics.clone());
        Ok(Self {
            cfg,
            incremental_rx,
            snapshot_rx,
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
        let timeout_ns = self.cfg.recovery_timeout_ms * 1_000_000;
        let mut buf = vec![0u8; 65536];
        let mut out: Vec<Bytes> = Vec::new();
        let mut last_publish = Instant::now();
        let mut last_stats = Instant::now();

        info!(
            incremental = %self.cfg.incremental_group,
            snapshot = %self.cfg.snapshot_group,
            output = %self.cfg.output_group,
            "price-level pipeline started"
        );

        while self.running.load(Ordering::Relaxed) {
            match self.incremental_rx.poll(&mut buf, poll_timeout) {
                Ok(Some(n)) => {
                    self.metrics.received(n);
                    self.engine.on_incremental_datagram(&buf[..n]);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "incremental receive failed"),
            }

            // Keep the snapshot socket drained even when nothing needs
            // recovery, so stale packets never queue up.
            loop {
                match self.snapshot_rx.try_recv(&mut buf) {
                    Ok(Some(n)) => {
                        self.metrics.received(n);
                        if self.engine.needs_recovery() {
                            self.engine.on_snapshot_datagram(&buf[..n]);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "snapshot receive failed");
                        break;
                    }
                }
            }

            if last_publish.elapsed() >= conflation {
                self.engine.publish_conflated(now_ns(), &mut out);
                self.flush(&mut out);
                last_publish = Instant::now();
            }

            for security_id in self.engine.check_timeouts(now_ns(), timeout_ns) {
                warn!(security_id, "recovery timeout, waiting for next snapshot cycle");
            }

            if last_stats.elapsed() >= stats_every {
                self.log_stats();
                last_stats = Instant::now();
            }
        }

        info!("price-level pipeline stopped");
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
        let r = self.engine.recovery().stats();
        let recovering = self.engine.recovery().recovering();
        info!(
            received = m.messages_received,
            sent = m.messages_sent,
            rx_bytes = m.bytes_received,
            tx_bytes = m.bytes_sent,
            adds = m.add_orders,
            deletes = m.delete_orders,
            trades = m.trades,
            errors = m.decode_errors,
            anomalies = m.anomalies,
            packet_gaps = m.packet_gaps,
            gaps = r.gaps_detected,
            recoveries = r.recoveries_completed,
            dropped = r.messages_dropped,
            books = self.engine.ladders().security_ids().len(),
            recovering = recovering.len(),
            "stats"
        );
    }
}
