// src/l2sbe.rs
//! Outbound SBE codec for the price-level pipeline (schema 1, version 1).
//!
//! Layout, all little-endian:
//!
//! ```text
//! header   8B   block_length, template_id, schema_id, version
//! root    46B   symbol[8] (NUL-padded), timestamp u64, sequence u64,
//!               last_trade_price i64 (7dp), last_trade_qty u32,
//!               total_volume u64, bid_count u8, ask_count u8
//! bids     3B   group header: entry_block_length=15, num_in_group
//!         15B each: level u8, price i64 (7dp), quantity u32, num_orders u16
//! asks          same shape as bids
//! ```
//!
//! A heartbeat (template 1) carries a 16-byte root of timestamp and sequence.
//! Book state crosses this boundary in the canonical 4dp form and is
//! up-converted to the 7dp mantissa on encode.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::types::{px4_to_px7, Level, Px7, Snapshot, Symbol, MAX_DEPTH};
use crate::wire::WireError;

pub const SCHEMA_ID: u16 = 1;
pub const SCHEMA_VERSION: u16 = 1;

pub const TPL_HEARTBEAT: u16 = 1;
pub const TPL_L2_SNAPSHOT: u16 = 2;

pub const SBE_HEADER_LEN: usize = 8;
const SNAPSHOT_ROOT_LEN: usize = 46;
const HEARTBEAT_ROOT_LEN: usize = 16;
const GROUP_HEADER_LEN: usize = 3;
const ENTRY_LEN: usize = 15;

/// One published level, 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct L2Level {
    pub level: u8,
    pub price: Px7,
    pub qty: u32,
    pub orders: u16,
}

/// Decoded L2 snapshot message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct L2Snapshot {
    pub symbol: Symbol,
    pub timestamp: u64,
    pub sequence: u64,
    pub last_price: Px7,
    pub last_qty: u32,
    pub total_volume: u64,
    pub bids: Vec<L2Level>,
    pub asks: Vec<L2Level>,
}

/// Decoded heartbeat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct L2Heartbeat {
    pub timestamp: u64,
    pub sequence: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum L2Message {
    Heartbeat(L2Heartbeat),
    Snapshot(L2Snapshot),
}

fn put_header(buf: &mut BytesMut, block_length: u16, template_id: u16) {
    buf.put_u16_le(block_length);
    buf.put_u16_le(template_id);
    buf.put_u16_le(SCHEMA_ID);
    buf.put_u16_le(SCHEMA_VERSION);
}

// The SBE symbol field is NUL-padded where the envelope dialect pads with
// spaces; the canonical form converts on the way out.
fn put_symbol(buf: &mut BytesMut, symbol: Symbol) {
    let trimmed = symbol.trimmed().as_bytes();
    buf.put_slice(trimmed);
    buf.put_bytes(0, Symbol::LEN - trimmed.len());
}

fn put_group(buf: &mut BytesMut, levels: &[Level]) {
    buf.put_u16_le(ENTRY_LEN as u16);
    buf.put_u8(levels.len() as u8);
    for (i, lv) in levels.iter().enumerate() {
        buf.put_u8(i as u8 + 1);
        buf.put_i64_le(px4_to_px7(lv.price));
        buf.put_u32_le(lv.qty);
        buf.put_u16_le(lv.orders.min(u32::from(u16::MAX)) as u16);
    }
}

pub fn encode_snapshot(snap: &Snapshot) -> Bytes {
    let n_bids = snap.bids.len().min(MAX_DEPTH);
    let n_asks = snap.asks.len().min(MAX_DEPTH);
    let total = SBE_HEADER_LEN
        + SNAPSHOT_ROOT_LEN
        + 2 * GROUP_HEADER_LEN
        + (n_bids + n_asks) * ENTRY_LEN;
    let mut buf = BytesMut::with_capacity(total);

    put_header(&mut buf, SNAPSHOT_ROOT_LEN as u16, TPL_L2_SNAPSHOT);
    put_symbol(&mut buf, snap.symbol);
    buf.put_u64_le(snap.timestamp);
    buf.put_u64_le(snap.sequence);
    buf.put_i64_le(px4_to_px7(snap.last_price));
    buf.put_u32_le(snap.last_qty);
    buf.put_u64_le(snap.total_volume);
    buf.put_u8(n_bids as u8);
    buf.put_u8(n_asks as u8);

    put_group(&mut buf, &snap.bids[..n_bids]);
    put_group(&mut buf, &snap.asks[..n_asks]);

    buf.freeze()
}

pub fn encode_heartbeat(timestamp: u64, sequence: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(SBE_HEADER_LEN + HEARTBEAT_ROOT_LEN);
    put_header(&mut buf, HEARTBEAT_ROOT_LEN as u16, TPL_HEARTBEAT);
    buf.put_u64_le(timestamp);
    buf.put_u64_le(sequence);
    buf.freeze()
}

/// Decodes one outbound SBE message.
pub fn decode(datagram: &[u8]) -> Result<L2Message, WireError> {
    if datagram.len() < SBE_HEADER_LEN {
        return Err(WireError::Truncated {
            need: SBE_HEADER_LEN,
            have: datagram.len(),
        });
    }
    let mut buf = datagram;
    let _block_length = buf.get_u16_le();
    let template_id = buf.get_u16_le();
    let _schema_id = buf.get_u16_le();
    let _version = buf.get_u16_le();

    match template_id {
        TPL_HEARTBEAT => decode_heartbeat(buf).map(L2Message::Heartbeat),
        TPL_L2_SNAPSHOT => decode_snapshot_body(buf).map(L2Message::Snapshot),
        other => Err(WireError::UnknownType(other as u8)),
    }
}

fn decode_heartbeat(mut buf: &[u8]) -> Result<L2Heartbeat, WireError> {
    if buf.len() < HEARTBEAT_ROOT_LEN {
        return Err(WireError::Truncated {
            need: HEARTBEAT_ROOT_LEN,
            have: buf.len(),
        });
    }
    Ok(L2Heartbeat {
        timestamp: buf.get_u64_le(),
        sequence: buf.get_u64_le(),
    })
}

fn decode_snapshot_body(mut buf: &[u8]) -> Result<L2Snapshot, WireError> {
    if buf.len() < SNAPSHOT_ROOT_LEN {
        return Err(WireError::Truncated {
            need: SNAPSHOT_ROOT_LEN,
            have: buf.len(),
        });
    }
    let symbol = Symbol::from_wire(&buf[..Symbol::LEN]);
    buf.advance(Symbol::LEN);
    let timestamp = buf.get_u64_le();
    let sequence = buf.get_u64_le();
    let last_price = buf.get_i64_le();
    let last_qty = buf.get_u32_le();
    let total_volume = buf.get_u64_le();
    let _bid_count = buf.get_u8();
    let _ask_count = buf.get_u8();

    let bids = decode_group(&mut buf)?;
    let asks = decode_group(&mut buf)?;

    Ok(L2Snapshot {
        symbol,
        timestamp,
        sequence,
        last_price,
        last_qty,
        total_volume,
        bids,
        asks,
    })
}

fn decode_group(buf: &mut &[u8]) -> Result<Vec<L2Level>, WireError> {
    if buf.len() < GROUP_HEADER_LEN {
        return Err(WireError::Truncated {
            need: GROUP_HEADER_LEN,
            have: buf.len(),
        });
    }
    let stride = buf.get_u16_le() as usize;
    let count = buf.get_u8() as usize;
    if stride < ENTRY_LEN {
        return Err(WireError::BadLength {
            declared: stride,
            have: ENTRY_LEN,
        });
    }
    if count > MAX_DEPTH {
        return Err(WireError::BadCount(count as u8));
    }
    if buf.len() < count * stride {
        return Err(WireError::Truncated {
            need: count * stride,
            have: buf.len(),
        });
    }

    let mut levels = Vec::with_capacity(count);
    for i in 0..count {
        let entry = &buf[i * stride..];
        levels.push(L2Level {
            level: entry[0],
            price: i64::from_le_bytes(entry[1..9].try_into().unwrap()),
            qty: u32::from_le_bytes(entry[9..13].try_into().unwrap()),
            orders: u16::from_le_bytes(entry[13..15].try_into().unwrap()),
        });
    }
    buf.advance(count * stride);
    Ok(levels)
}
