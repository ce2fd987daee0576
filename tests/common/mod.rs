//! Inbound wire builders shared by the integration tests. These produce the
//! exact byte layouts the decoders consume: big-endian length-prefixed frames
//! for the per-order dialect, little-endian SBE packets for the price-level
//! dialect.

#![allow(dead_code)]

// ---------------------------------------------------------------------------
// Per-order dialect
// ---------------------------------------------------------------------------

pub fn sym8(s: &str) -> [u8; 8] {
    let mut buf = [b' '; 8];
    buf[..s.len()].copy_from_slice(s.as_bytes());
    buf
}

/// Wraps message bodies into one length-prefixed datagram.
pub fn itch_datagram(bodies: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for body in bodies {
        out.extend_from_slice(&(body.len() as u16).to_be_bytes());
        out.extend_from_slice(body);
    }
    out
}

fn itch_header(code: u8, ts: u64) -> Vec<u8> {
    let mut v = vec![code];
    v.extend_from_slice(&0u16.to_be_bytes()); // stock locate
    v.extend_from_slice(&0u16.to_be_bytes()); // tracking number
    v.extend_from_slice(&(ts << 16).to_be_bytes());
    v
}

pub fn add_order(ts: u64, order_ref: u64, side: u8, shares: u32, stock: &str, price: u32) -> Vec<u8> {
    let mut v = itch_header(b'A', ts);
    v.extend_from_slice(&order_ref.to_be_bytes());
    v.push(side);
    v.extend_from_slice(&shares.to_be_bytes());
    v.extend_from_slice(&sym8(stock));
    v.extend_from_slice(&price.to_be_bytes());
    v
}

pub fn order_executed(ts: u64, order_ref: u64, shares: u32, match_number: u64) -> Vec<u8> {
    let mut v = itch_header(b'E', ts);
    v.extend_from_slice(&order_ref.to_be_bytes());
    v.extend_from_slice(&shares.to_be_bytes());
    v.extend_from_slice(&match_number.to_be_bytes());
    v
}

pub fn order_executed_px(
    ts: u64,
    order_ref: u64,
    shares: u32,
    match_number: u64,
    price: u32,
) -> Vec<u8> {
    let mut v = order_executed(ts, order_ref, shares, match_number);
    v[0] = b'C';
    v.push(b'Y');
    v.extend_from_slice(&price.to_be_bytes());
    v
}

pub fn order_cancel(ts: u64, order_ref: u64, shares: u32) -> Vec<u8> {
    let mut v = itch_header(b'X', ts);
    v.extend_from_slice(&order_ref.to_be_bytes());
    v.extend_from_slice(&shares.to_be_bytes());
    v
}

pub fn order_delete(ts: u64, order_ref: u64) -> Vec<u8> {
    let mut v = itch_header(b'D', ts);
    v.extend_from_slice(&order_ref.to_be_bytes());
    v
}

pub fn order_replace(ts: u64, old_ref: u64, new_ref: u64, shares: u32, price: u32) -> Vec<u8> {
    let mut v = itch_header(b'U', ts);
    v.extend_from_slice(&old_ref.to_be_bytes());
    v.extend_from_slice(&new_ref.to_be_bytes());
    v.extend_from_slice(&shares.to_be_bytes());
    v.extend_from_slice(&price.to_be_bytes());
    v
}

pub fn trade(ts: u64, side: u8, shares: u32, stock: &str, price: u32, match_number: u64) -> Vec<u8> {
    let mut v = itch_header(b'P', ts);
    v.extend_from_slice(&0u64.to_be_bytes()); // order ref, unused for prints
    v.push(side);
    v.extend_from_slice(&shares.to_be_bytes());
    v.extend_from_slice(&sym8(stock));
    v.extend_from_slice(&price.to_be_bytes());
    v.extend_from_slice(&match_number.to_be_bytes());
    v
}

pub fn cross_trade(ts: u64, shares: u64, stock: &str, price: u32, match_number: u64) -> Vec<u8> {
    let mut v = itch_header(b'Q', ts);
    v.extend_from_slice(&shares.to_be_bytes());
    v.extend_from_slice(&sym8(stock));
    v.extend_from_slice(&price.to_be_bytes());
    v.extend_from_slice(&match_number.to_be_bytes());
    v.push(b'O');
    v
}

// ---------------------------------------------------------------------------
// Price-level dialect
// ---------------------------------------------------------------------------

/// One SBE packet: 12-byte packet header plus back-to-back messages.
pub fn mdp_packet(seq: u32, sending_time: u64, msgs: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&seq.to_le_bytes());
    out.extend_from_slice(&sending_time.to_le_bytes());
    for m in msgs {
        out.extend_from_slice(m);
    }
    out
}

fn sbe_header(block_length: u16, template_id: u16) -> Vec<u8> {
    let mut v = Vec::with_capacity(8);
    v.extend_from_slice(&block_length.to_le_bytes());
    v.extend_from_slice(&template_id.to_le_bytes());
    v.extend_from_slice(&1u16.to_le_bytes()); // schema id
    v.extend_from_slice(&9u16.to_le_bytes()); // schema version
    v
}

pub fn channel_reset(transact_time: u64) -> Vec<u8> {
    let mut v = sbe_header(8, 4);
    v.extend_from_slice(&transact_time.to_le_bytes());
    v
}

pub fn mdp_heartbeat(last_seq: u64) -> Vec<u8> {
    let mut v = sbe_header(8, 12);
    v.extend_from_slice(&last_seq.to_le_bytes());
    v
}

pub fn security_definition(security_id: u32, symbol: &str) -> Vec<u8> {
    let mut v = sbe_header(37, 27);
    v.extend_from_slice(&security_id.to_le_bytes());
    let mut name = [0u8; 20];
    name[..symbol.len()].copy_from_slice(symbol.as_bytes());
    v.extend_from_slice(&name);
    v.extend_from_slice(&25_000_000i64.to_le_bytes()); // tick
    v.extend_from_slice(&100u32.to_le_bytes()); // display factor
    v.push(2); // trading status
    v
}

/// (price, size, security_id, rpt_seq, entry_type, update_action, level, orders)
pub type RawIncEntry = (i64, i32, u32, u32, u8, u8, u8, u8);

pub fn incremental_refresh(transact_time: u64, entries: &[RawIncEntry]) -> Vec<u8> {
    let mut v = sbe_header(8, 32);
    v.extend_from_slice(&transact_time.to_le_bytes());
    v.extend_from_slice(&24u16.to_le_bytes());
    v.push(entries.len() as u8);
    for &(px, size, sec, rpt, kind, action, level, orders) in entries {
        v.extend_from_slice(&px.to_le_bytes());
        v.extend_from_slice(&size.to_le_bytes());
        v.extend_from_slice(&sec.to_le_bytes());
        v.extend_from_slice(&rpt.to_le_bytes());
        v.push(kind);
        v.push(action);
        v.push(level);
        v.push(orders);
    }
    v
}

/// (price, size, entry_type, level, orders)
pub type RawSnapEntry = (i64, i32, u8, u8, u8);

pub fn snapshot_full_refresh(
    last_packet_seq: u32,
    security_id: u32,
    rpt_seq: u32,
    transact_time: u64,
    entries: &[RawSnapEntry],
) -> Vec<u8> {
    let mut v = sbe_header(20, 38);
    v.extend_from_slice(&last_packet_seq.to_le_bytes());
    v.extend_from_slice(&security_id.to_le_bytes());
    v.extend_from_slice(&rpt_seq.to_le_bytes());
    v.extend_from_slice(&transact_time.to_le_bytes());
    v.extend_from_slice(&16u16.to_le_bytes());
    v.push(entries.len() as u8);
    for &(px, size, kind, level, orders) in entries {
        v.extend_from_slice(&px.to_le_bytes());
        v.extend_from_slice(&size.to_le_bytes());
        v.push(kind);
        v.push(level);
        v.push(orders);
        v.push(0);
    }
    v
}
