//! Engine-level pipeline tests: synthetic inbound datagrams through the
//! decode-and-apply cores, with the emitted envelopes decoded back and
//! checked. Exercises framing, routing, conflation, tick publication,
//! recovery gating and output sequencing without touching sockets.

mod common;

use std::sync::Arc;

use common::*;
use feedrelay::config::{ItchConfig, MdpConfig, Mode};
use feedrelay::itch_feed::ItchEngine;
use feedrelay::l2sbe::{self, L2Message};
use feedrelay::mdp_feed::MdpEngine;
use feedrelay::metrics::Metrics;
use feedrelay::recovery::Phase;
use feedrelay::types::Symbol;
use feedrelay::wire::{self, Body};

use clap::Parser;

fn itch_engine(mode: Mode) -> (ItchEngine, Arc<Metrics>) {
    let mut cfg = ItchConfig::parse_from(["itch"]);
    cfg.mode = mode;
    let metrics = Arc::new(Metrics::new());
    (ItchEngine::new(&cfg, metrics.clone()), metrics)
}

fn mdp_engine() -> (MdpEngine, Arc<Metrics>) {
    let cfg = MdpConfig::parse_from(["mdp"]);
    let metrics = Arc::new(Metrics::new());
    (MdpEngine::new(&cfg, metrics.clone()), metrics)
}

fn sequences(frames: &[bytes::Bytes]) -> Vec<u64> {
    frames
        .iter()
        .map(|f| match wire::decode(f).unwrap().body {
            Body::Snapshot(s) => s.sequence,
            Body::Quote(q) => q.sequence,
            Body::Trade(t) => t.sequence,
            Body::Heartbeat => panic!("heartbeat carries no sequence"),
        })
        .collect()
}

#[test]
fn tick_mode_emits_quotes_and_trades_in_order() {
    let (mut engine, metrics) = itch_engine(Mode::Tick);
    let mut out = Vec::new();

    let datagram = itch_datagram(&[
        add_order(10, 1, b'B', 500, "ACME", 1_000_000),
        add_order(11, 2, b'S', 300, "ACME", 1_020_000),
        order_executed(12, 1, 200, 900),
    ]);
    engine.on_datagram(&datagram, &mut out);

    assert_eq!(out.len(), 3);
    let seqs = sequences(&out);
    assert!(seqs.windows(2).all(|w| w[1] > w[0]), "sequences must rise: {seqs:?}");

    let Body::Quote(q1) = wire::decode(&out[0]).unwrap().body else {
        panic!("expected quote");
    };
    assert_eq!(q1.bid_price, 1_000_000);
    assert_eq!(q1.bid_qty, 500);
    assert_eq!(q1.ask_price, 0);

    let Body::Quote(q2) = wire::decode(&out[1]).unwrap().body else {
        panic!("expected quote");
    };
    assert_eq!(q2.ask_price, 1_020_000);
    assert_eq!(q2.ask_qty, 300);

    // Execute against the resting buy prints with the aggressor on the other
    // side.
    let Body::Trade(t) = wire::decode(&out[2]).unwrap().body else {
        panic!("expected trade");
    };
    assert_eq!(t.symbol, Symbol::from("ACME"));
    assert_eq!(t.price, 1_000_000);
    assert_eq!(t.qty, 200);
    assert_eq!(t.side, b'S');
    assert_eq!(t.match_number, 900);

    let m = metrics.load();
    assert_eq!(m.add_orders, 2);
    assert_eq!(m.executions, 1);
}

#[test]
fn tick_mode_skips_quotes_that_leave_the_top_alone() {
    let (mut engine, _metrics) = itch_engine(Mode::Tick);
    let mut out = Vec::new();

    engine.on_datagram(
        &itch_datagram(&[add_order(1, 1, b'B', 500, "ACME", 1_000_000)]),
        &mut out,
    );
    assert_eq!(out.len(), 1);
    out.clear();

    // A bid below the best moves nothing at the top.
    engine.on_datagram(
        &itch_datagram(&[add_order(2, 2, b'B', 100, "ACME", 990_000)]),
        &mut out,
    );
    assert!(out.is_empty());
}

#[test]
fn tick_mode_prints_trades_and_follows_replaces() {
    let (mut engine, metrics) = itch_engine(Mode::Tick);
    let mut out = Vec::new();

    engine.on_datagram(
        &itch_datagram(&[
            add_order(1, 1, b'B', 500, "ACME", 1_000_000),
            // Replace moves the top of book: a fresh quote follows.
            order_replace(2, 1, 9, 500, 1_010_000),
            // Off-book print and a cross.
            trade(3, b'B', 40, "ACME", 1_005_000, 7),
            cross_trade(4, 1_000, "ACME", 1_002_000, 8),
            // Cancel the replaced order down to nothing.
            order_cancel(5, 9, 500),
        ]),
        &mut out,
    );

    assert_eq!(out.len(), 4); // quote, quote, trade, trade
    let Body::Quote(q) = wire::decode(&out[1]).unwrap().body else {
        panic!("expected quote");
    };
    assert_eq!(q.bid_price, 1_010_000);

    let Body::Trade(print) = wire::decode(&out[2]).unwrap().body else {
        panic!("expected trade");
    };
    assert_eq!((print.price, print.qty, print.side), (1_005_000, 40, b'B'));

    let Body::Trade(cross) = wire::decode(&out[3]).unwrap().body else {
        panic!("expected trade");
    };
    assert_eq!((cross.price, cross.qty, cross.side), (1_002_000, 1_000, b'X'));

    // The cancel emptied the book.
    assert_eq!(engine.books().live_orders(), 0);
    let m = metrics.load();
    assert_eq!(m.trades, 2);
    assert_eq!(m.delete_orders, 1);
}

#[test]
fn conflated_mode_batches_by_dirty_symbol() {
    let (mut engine, _metrics) = itch_engine(Mode::Conflated);
    let mut out = Vec::new();

    engine.on_datagram(
        &itch_datagram(&[
            add_order(1, 1, b'B', 500, "ACME", 1_000_000),
            add_order(2, 2, b'B', 100, "ZORK", 2_000_000),
            add_order(3, 3, b'B', 50, "ACME", 1_010_000),
        ]),
        &mut out,
    );
    // No tick output in conflated mode.
    assert!(out.is_empty());

    engine.publish_conflated(1_000, &mut out);
    assert_eq!(out.len(), 2);

    let mut symbols: Vec<String> = out
        .iter()
        .map(|f| match wire::decode(f).unwrap().body {
            Body::Snapshot(s) => s.symbol.trimmed().to_string(),
            other => panic!("expected snapshot, got {other:?}"),
        })
        .collect();
    symbols.sort();
    assert_eq!(symbols, ["ACME", "ZORK"]);

    // Dirty set was drained: an idle interval heartbeats instead.
    out.clear();
    engine.publish_conflated(2_000, &mut out);
    assert_eq!(out.len(), 1);
    assert_eq!(wire::decode(&out[0]).unwrap().body, Body::Heartbeat);
}

#[test]
fn datagram_updates_apply_before_any_publish() {
    let (mut engine, _metrics) = itch_engine(Mode::Conflated);
    let mut out = Vec::new();

    // Add and delete in one datagram: the publish sees only the final state.
    engine.on_datagram(
        &itch_datagram(&[
            add_order(1, 1, b'B', 500, "ACME", 1_000_000),
            add_order(2, 2, b'B', 700, "ACME", 1_010_000),
            order_delete(3, 2),
        ]),
        &mut out,
    );
    engine.publish_conflated(1_000, &mut out);

    let Body::Snapshot(snap) = wire::decode(&out[0]).unwrap().body else {
        panic!("expected snapshot");
    };
    assert_eq!(snap.bids.len(), 1);
    assert_eq!(snap.bids[0].price, 1_000_000);
}

#[test]
fn short_bodies_count_as_decode_errors_and_are_skipped() {
    let (mut engine, metrics) = itch_engine(Mode::Conflated);
    let mut out = Vec::new();

    let mut short_add = add_order(1, 1, b'B', 500, "ACME", 1_000_000);
    short_add.truncate(20);
    let datagram = itch_datagram(&[
        short_add,
        add_order(2, 2, b'B', 100, "ACME", 990_000),
    ]);
    engine.on_datagram(&datagram, &mut out);

    let m = metrics.load();
    assert_eq!(m.decode_errors, 1);
    assert_eq!(m.add_orders, 1);
}

#[test]
fn truncated_frame_discards_the_datagram_remainder() {
    let (mut engine, metrics) = itch_engine(Mode::Conflated);
    let mut out = Vec::new();

    let mut datagram = itch_datagram(&[add_order(1, 1, b'B', 500, "ACME", 1_000_000)]);
    // A declared length that overruns the datagram.
    datagram.extend_from_slice(&100u16.to_be_bytes());
    datagram.extend_from_slice(&[0u8; 10]);
    engine.on_datagram(&datagram, &mut out);

    assert_eq!(metrics.load().add_orders, 1);
}

#[test]
fn mdp_pipeline_builds_and_publishes_ladders() {
    let (mut engine, metrics) = mdp_engine();
    let mut out = Vec::new();

    engine.on_incremental_datagram(&mdp_packet(
        1,
        100,
        &[
            security_definition(1001, "ESH26"),
            incremental_refresh(
                101,
                &[
                    // Overlay bid levels 1 and 2, then a New at the top.
                    (1_000_000_000, 10, 1001, 1, 0, 5, 1, 1),
                    (990_000_000, 20, 1001, 2, 0, 5, 2, 1),
                    (1_010_000_000, 5, 1001, 3, 0, 0, 1, 1),
                ],
            ),
        ],
    ));

    engine.publish_conflated(500, &mut out);
    assert_eq!(out.len(), 1);
    let L2Message::Snapshot(snap) = l2sbe::decode(&out[0]).unwrap() else {
        panic!("expected snapshot");
    };
    assert_eq!(snap.symbol, Symbol::from("ESH26"));
    assert_eq!(snap.bids.len(), 3);
    assert_eq!(snap.bids[0].price, 1_010_000_000);
    assert_eq!(snap.bids[0].qty, 5);
    assert_eq!(snap.bids[1].price, 1_000_000_000);
    assert_eq!(snap.bids[2].price, 990_000_000);

    assert_eq!(metrics.load().add_orders, 1); // one New action
}

#[test]
fn mdp_gap_blocks_publishing_until_snapshot_recovery() {
    let (mut engine, _metrics) = mdp_engine();
    let mut out = Vec::new();

    engine.on_incremental_datagram(&mdp_packet(
        1,
        100,
        &[incremental_refresh(101, &[(1_000_000_000, 10, 1001, 1, 0, 5, 1, 1)])],
    ));
    out.clear();

    // rpt_seq jumps 2 -> 5: gap; the entry must not reach the book.
    engine.on_incremental_datagram(&mdp_packet(
        2,
        200,
        &[incremental_refresh(201, &[(1_020_000_000, 9, 1001, 5, 0, 0, 1, 1)])],
    ));
    assert_eq!(engine.recovery().phase(1001), Phase::GapDetected);
    assert!(engine.needs_recovery());

    engine.publish_conflated(300, &mut out);
    // The gapped security is withheld; the interval heartbeats.
    assert_eq!(out.len(), 1);
    assert!(matches!(
        l2sbe::decode(&out[0]).unwrap(),
        L2Message::Heartbeat(_)
    ));
    out.clear();

    // Snapshot feed resynchronizes the book.
    engine.on_snapshot_datagram(&mdp_packet(
        50,
        400,
        &[snapshot_full_refresh(
            2,
            1001,
            6,
            401,
            &[
                (1_030_000_000, 7, 0, 1, 1),
                (1_020_000_000, 3, 0, 2, 1),
                (1_040_000_000, 4, 1, 1, 1),
            ],
        )],
    ));
    assert_eq!(engine.recovery().phase(1001), Phase::Normal);
    assert!(!engine.needs_recovery());

    engine.publish_conflated(500, &mut out);
    let L2Message::Snapshot(snap) = l2sbe::decode(&out[0]).unwrap() else {
        panic!("expected snapshot");
    };
    assert_eq!(snap.bids.len(), 2);
    assert_eq!(snap.bids[0].price, 1_030_000_000);
    assert_eq!(snap.asks.len(), 1);
    assert_eq!(snap.asks[0].price, 1_040_000_000);

    // Post-recovery, the stream resumes at rpt_seq 7.
    engine.on_incremental_datagram(&mdp_packet(
        3,
        600,
        &[incremental_refresh(601, &[(1_030_000_000, 8, 1001, 7, 0, 1, 1, 1)])],
    ));
    assert_eq!(engine.recovery().phase(1001), Phase::Normal);
}

#[test]
fn mdp_channel_reset_empties_books_and_restarts_sequencing() {
    let (mut engine, _metrics) = mdp_engine();
    let mut out = Vec::new();

    engine.on_incremental_datagram(&mdp_packet(
        1,
        100,
        &[
            security_definition(1001, "ESH26"),
            incremental_refresh(101, &[(1_000_000_000, 10, 1001, 1, 0, 5, 1, 1)]),
        ],
    ));
    engine.publish_conflated(200, &mut out);
    out.clear();

    engine.on_incremental_datagram(&mdp_packet(2, 300, &[channel_reset(301)]));
    assert_eq!(engine.ladders().book(1001).unwrap().bid_count(), 0);

    // Books are empty and clean: nothing to publish but a heartbeat.
    engine.publish_conflated(400, &mut out);
    assert!(matches!(
        l2sbe::decode(&out[0]).unwrap(),
        L2Message::Heartbeat(_)
    ));
    out.clear();

    // rpt_seq 1 applies after the reset.
    engine.on_incremental_datagram(&mdp_packet(
        3,
        500,
        &[incremental_refresh(501, &[(990_000_000, 4, 1001, 1, 0, 5, 1, 1)])],
    ));
    engine.publish_conflated(600, &mut out);
    let L2Message::Snapshot(snap) = l2sbe::decode(&out[0]).unwrap() else {
        panic!("expected snapshot");
    };
    assert_eq!(snap.bids.len(), 1);
    assert_eq!(snap.bids[0].price, 990_000_000);
}

#[test]
fn mdp_counts_packet_gaps_and_anomalies() {
    let (mut engine, metrics) = mdp_engine();

    engine.on_incremental_datagram(&mdp_packet(1, 100, &[mdp_heartbeat(0)]));
    engine.on_incremental_datagram(&mdp_packet(5, 200, &[mdp_heartbeat(0)]));
    assert_eq!(metrics.load().packet_gaps, 1);

    // Negative size never reaches the book; it is counted instead.
    engine.on_incremental_datagram(&mdp_packet(
        6,
        300,
        &[incremental_refresh(301, &[(1_000_000_000, -5, 1001, 1, 0, 5, 1, 1)])],
    ));
    assert_eq!(metrics.load().anomalies, 1);
    assert!(engine.ladders().book(1001).is_none());

    // A datagram shorter than the packet header is an error, not a panic.
    engine.on_incremental_datagram(&[1, 2, 3]);
    assert_eq!(metrics.load().decode_errors, 1);
}

#[test]
fn mdp_output_sequences_rise_across_snapshots_and_heartbeats() {
    let (mut engine, _metrics) = mdp_engine();
    let mut out = Vec::new();

    engine.on_incremental_datagram(&mdp_packet(
        1,
        100,
        &[incremental_refresh(
            101,
            &[
                (1_000_000_000, 10, 1001, 1, 0, 5, 1, 1),
                (2_000_000_000, 10, 1002, 1, 0, 5, 1, 1),
            ],
        )],
    ));
    engine.publish_conflated(200, &mut out);
    engine.publish_conflated(300, &mut out); // heartbeat
    engine.on_incremental_datagram(&mdp_packet(
        2,
        400,
        &[incremental_refresh(401, &[(1_010_000_000, 4, 1001, 2, 0, 0, 1, 1)])],
    ));
    engine.publish_conflated(500, &mut out);

    let seqs: Vec<u64> = out
        .iter()
        .map(|f| match l2sbe::decode(f).unwrap() {
            L2Message::Snapshot(s) => s.sequence,
            L2Message::Heartbeat(h) => h.sequence,
        })
        .collect();
    assert_eq!(seqs.len(), 4);
    assert!(seqs.windows(2).all(|w| w[1] > w[0]), "sequences must rise: {seqs:?}");
}
