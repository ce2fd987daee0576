//! Byte-exact round trips through both outbound codecs, plus the decode
//! error paths.

use feedrelay::l2sbe::{self, L2Message};
use feedrelay::types::{Level, Quote, Snapshot, Symbol, TradeTick};
use feedrelay::wire::{self, Body, WireError};

fn sample_snapshot() -> Snapshot {
    Snapshot {
        symbol: Symbol::from("ACME"),
        timestamp: 1_234_567_890,
        sequence: 42,
        bids: vec![
            Level { price: 1_010_000, qty: 100, orders: 2 },
            Level { price: 1_000_000, qty: 500, orders: 1 },
        ],
        asks: vec![Level { price: 1_020_000, qty: 50, orders: 3 }],
        last_price: 1_010_000,
        last_qty: 25,
        total_volume: 12_345,
    }
}

#[test]
fn snapshot_envelope_round_trips() {
    let snap = sample_snapshot();
    let frame = wire::encode_snapshot(&snap);

    // Declared length covers the whole envelope.
    let declared = u16::from_le_bytes([frame[0], frame[1]]) as usize;
    assert_eq!(declared, frame.len());

    let env = wire::decode(&frame).unwrap();
    assert_eq!(env.timestamp, snap.timestamp);
    assert_eq!(env.body, Body::Snapshot(snap));
}

#[test]
fn empty_sided_snapshot_round_trips() {
    let snap = Snapshot {
        bids: Vec::new(),
        asks: Vec::new(),
        ..sample_snapshot()
    };
    let frame = wire::encode_snapshot(&snap);
    let env = wire::decode(&frame).unwrap();
    assert_eq!(env.body, Body::Snapshot(snap));
}

#[test]
fn quote_envelope_round_trips() {
    let quote = Quote {
        symbol: Symbol::from("ACME"),
        timestamp: 77,
        sequence: 3,
        bid_price: 1_000_000,
        bid_qty: 500,
        ask_price: 0,
        ask_qty: 0,
    };
    let env = wire::decode(&wire::encode_quote(&quote)).unwrap();
    assert_eq!(env.body, Body::Quote(quote));
}

#[test]
fn trade_envelope_round_trips() {
    let tick = TradeTick {
        symbol: Symbol::from("ACME"),
        timestamp: 99,
        sequence: 4,
        price: 1_000_000,
        qty: 200,
        side: b'S',
        match_number: 555,
    };
    let env = wire::decode(&wire::encode_trade(&tick)).unwrap();
    assert_eq!(env.body, Body::Trade(tick));
}

#[test]
fn heartbeat_envelope_round_trips() {
    let frame = wire::encode_heartbeat(123);
    assert_eq!(frame.len(), wire::HEADER_LEN);
    let env = wire::decode(&frame).unwrap();
    assert_eq!(env.timestamp, 123);
    assert_eq!(env.body, Body::Heartbeat);
}

#[test]
fn decode_rejects_short_and_unknown_envelopes() {
    assert!(matches!(
        wire::decode(&[0u8; 4]),
        Err(WireError::Truncated { .. })
    ));

    let mut frame = wire::encode_heartbeat(1).to_vec();
    frame[2] = 9; // unknown type
    assert_eq!(wire::decode(&frame), Err(WireError::UnknownType(9)));

    // Declared length beyond the buffer.
    let mut frame = wire::encode_heartbeat(1).to_vec();
    frame[0] = 200;
    assert!(matches!(
        wire::decode(&frame),
        Err(WireError::BadLength { .. })
    ));
}

#[test]
fn decode_rejects_oversized_level_counts() {
    let mut frame = wire::encode_snapshot(&sample_snapshot()).to_vec();
    // The bid count byte sits right after the body's symbol, ts, seq fields.
    frame[wire::HEADER_LEN + 24] = 100;
    assert_eq!(wire::decode(&frame), Err(WireError::BadCount(100)));
}

#[test]
fn l2_snapshot_round_trips_with_price_upconversion() {
    let snap = sample_snapshot();
    let frame = l2sbe::encode_snapshot(&snap);

    let L2Message::Snapshot(decoded) = l2sbe::decode(&frame).unwrap() else {
        panic!("expected snapshot");
    };

    assert_eq!(decoded.symbol, snap.symbol);
    assert_eq!(decoded.timestamp, snap.timestamp);
    assert_eq!(decoded.sequence, snap.sequence);
    // 4dp mantissas cross the SBE boundary as 7dp mantissas.
    assert_eq!(decoded.last_price, i64::from(snap.last_price) * 1000);
    assert_eq!(decoded.last_qty, snap.last_qty);
    assert_eq!(decoded.total_volume, snap.total_volume);

    assert_eq!(decoded.bids.len(), 2);
    assert_eq!(decoded.bids[0].level, 1);
    assert_eq!(decoded.bids[0].price, 10_100_000_000);
    assert_eq!(decoded.bids[0].qty, 100);
    assert_eq!(decoded.bids[0].orders, 2);
    assert_eq!(decoded.bids[1].level, 2);

    assert_eq!(decoded.asks.len(), 1);
    assert_eq!(decoded.asks[0].price, 10_200_000_000);
}

#[test]
fn l2_heartbeat_round_trips() {
    let frame = l2sbe::encode_heartbeat(555, 7);
    let L2Message::Heartbeat(hb) = l2sbe::decode(&frame).unwrap() else {
        panic!("expected heartbeat");
    };
    assert_eq!(hb.timestamp, 555);
    assert_eq!(hb.sequence, 7);
}

#[test]
fn l2_decode_rejects_truncated_groups() {
    let frame = l2sbe::encode_snapshot(&sample_snapshot());
    let cut = &frame[..frame.len() - 4];
    assert!(matches!(
        l2sbe::decode(cut),
        Err(WireError::Truncated { .. })
    ));
}
