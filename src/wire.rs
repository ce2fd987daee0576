// src/wire.rs
//! Outbound envelope codec for the per-order pipeline.
//!
//! Every message is wrapped in a fixed 12-byte header:
//!
//! ```text
//! u16 length      total bytes including this header
//! u8  type        0 heartbeat, 1 snapshot, 2 trade, 3 quote
//! u8  flags
//! u64 timestamp   nanoseconds since epoch
//! ```
//!
//! All integers are little-endian. Symbols are 8 bytes, space-padded. Level
//! arrays are marshalled as a count byte followed by that many 12-byte
//! records, one side after the other, so a snapshot body reads
//! `symbol, timestamp, sequence, bids, asks, last_price, last_qty,
//! total_volume`. Counts above [`MAX_DEPTH`] do not occur on encode and are
//! rejected on decode.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::types::{Level, Quote, Snapshot, Symbol, TradeTick, MAX_DEPTH};

pub const HEADER_LEN: usize = 12;
const LEVEL_LEN: usize = 12;

pub const TYPE_HEARTBEAT: u8 = 0;
pub const TYPE_SNAPSHOT: u8 = 1;
pub const TYPE_TRADE: u8 = 2;
pub const TYPE_QUOTE: u8 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("envelope truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("declared length {declared} disagrees with buffer of {have} bytes")]
    BadLength { declared: usize, have: usize },
    #[error("unknown envelope type {0}")]
    UnknownType(u8),
    #[error("level count {0} exceeds depth cap")]
    BadCount(u8),
}

/// A decoded envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub flags: u8,
    pub timestamp: u64,
    pub body: Body,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    Heartbeat,
    Snapshot(Snapshot),
    Trade(TradeTick),
    Quote(Quote),
}

fn finish(mut buf: BytesMut) -> Bytes {
    let len = buf.len() as u16;
    buf[..2].copy_from_slice(&len.to_le_bytes());
    buf.freeze()
}

fn put_header(buf: &mut BytesMut, msg_type: u8, timestamp: u64) {
    buf.put_u16_le(0); // patched by finish()
    buf.put_u8(msg_type);
    buf.put_u8(0);
    buf.put_u64_le(timestamp);
}

fn put_levels(buf: &mut BytesMut, levels: &[Level]) {
    debug_assert!(levels.len() <= MAX_DEPTH);
    buf.put_u8(levels.len() as u8);
    for lv in levels {
        buf.put_u32_le(lv.price);
        buf.put_u32_le(lv.qty);
        buf.put_u32_le(lv.orders);
    }
}

pub fn encode_snapshot(snap: &Snapshot) -> Bytes {
    let body = 8 + 8 + 8 + 2 + (snap.bids.len() + snap.asks.len()) * LEVEL_LEN + 4 + 4 + 8;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body);
    put_header(&mut buf, TYPE_SNAPSHOT, snap.timestamp);
    buf.put_slice(snap.symbol.as_bytes());
    buf.put_u64_le(snap.timestamp);
    buf.put_u64_le(snap.sequence);
    put_levels(&mut buf, &snap.bids);
    put_levels(&mut buf, &snap.asks);
    buf.put_u32_le(snap.last_price);
    buf.put_u32_le(snap.last_qty);
    buf.put_u64_le(snap.total_volume);
    finish(buf)
}

pub fn encode_trade(trade: &TradeTick) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + 45);
    put_header(&mut buf, TYPE_TRADE, trade.timestamp);
    buf.put_slice(trade.symbol.as_bytes());
    buf.put_u64_le(trade.timestamp);
    buf.put_u64_le(trade.sequence);
    buf.put_u32_le(trade.price);
    buf.put_u32_le(trade.qty);
    buf.put_u8(trade.side);
    buf.put_u64_le(trade.match_number);
    finish(buf)
}

pub fn encode_quote(quote: &Quote) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + 40);
    put_header(&mut buf, TYPE_QUOTE, quote.timestamp);
    buf.put_slice(quote.symbol.as_bytes());
    buf.put_u64_le(quote.timestamp);
    buf.put_u64_le(quote.sequence);
    buf.put_u32_le(quote.bid_price);
    buf.put_u32_le(quote.bid_qty);
    buf.put_u32_le(quote.ask_price);
    buf.put_u32_le(quote.ask_qty);
    finish(buf)
}

pub fn encode_heartbeat(timestamp: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN);
    put_header(&mut buf, TYPE_HEARTBEAT, timestamp);
    finish(buf)
}

/// Decodes one envelope from a datagram.
pub fn decode(datagram: &[u8]) -> Result<Envelope, WireError> {
    if datagram.len() < HEADER_LEN {
        return Err(WireError::Truncated {
            need: HEADER_LEN,
            have: datagram.len(),
        });
    }
    let declared = u16::from_le_bytes([datagram[0], datagram[1]]) as usize;
    if declared < HEADER_LEN || declared > datagram.len() {
        return Err(WireError::BadLength {
            declared,
            have: datagram.len(),
        });
    }
    let msg_type = datagram[2];
    let flags = datagram[3];
    let timestamp = u64::from_le_bytes(datagram[4..12].try_into().unwrap());
    let mut body = &datagram[HEADER_LEN..declared];

    let body = match msg_type {
        TYPE_HEARTBEAT => Body::Heartbeat,
        TYPE_SNAPSHOT => Body::Snapshot(get_snapshot(&mut body)?),
        TYPE_TRADE => Body::Trade(get_trade(&mut body)?),
        TYPE_QUOTE => Body::Quote(get_quote(&mut body)?),
        other => return Err(WireError::UnknownType(other)),
    };

    Ok(Envelope {
        flags,
        timestamp,
        body,
    })
}

fn need(buf: &[u8], n: usize) -> Result<(), WireError> {
    if buf.remaining() < n {
        Err(WireError::Truncated {
            need: n,
            have: buf.remaining(),
        })
    } else {
        Ok(())
    }
}

fn get_symbol(buf: &mut &[u8]) -> Symbol {
    let sym = Symbol::from_wire(&buf[..Symbol::LEN]);
    buf.advance(Symbol::LEN);
    sym
}

fn get_levels(buf: &mut &[u8]) -> Result<Vec<Level>, WireError> {
    need(*buf, 1)?;
    let count = buf.get_u8();
    if count as usize > MAX_DEPTH {
        return Err(WireError::BadCount(count));
    }
    need(*buf, count as usize * LEVEL_LEN)?;
    let mut levels = Vec::with_capacity(count as usize);
    for _ in 0..count {
        levels.push(Level {
            price: buf.get_u32_le(),
            qty: buf.get_u32_le(),
            orders: buf.get_u32_le(),
        });
    }
    Ok(levels)
}

fn get_snapshot(buf: &mut &[u8]) -> Result<Snapshot, WireError> {
    need(*buf, 8 + 8 + 8)?;
    let symbol = get_symbol(buf);
    let timestamp = buf.get_u64_le();
    let sequence = buf.get_u64_le();
    let bids = get_levels(buf)?;
    let asks = get_levels(buf)?;
    need(*buf, 4 + 4 + 8)?;
    Ok(Snapshot {
        symbol,
        timestamp,
        sequence,
        bids,
        asks,
        last_price: buf.get_u32_le(),
        last_qty: buf.get_u32_le(),
        total_volume: buf.get_u64_le(),
    })
}

fn get_trade(buf: &mut &[u8]) -> Result<TradeTick, WireError> {
    need(*buf, 8 + 8 + 8 + 4 + 4 + 1 + 8)?;
    Ok(TradeTick {
        symbol: get_symbol(buf),
        timestamp: buf.get_u64_le(),
        sequence: buf.get_u64_le(),
        price: buf.get_u32_le(),
        qty: buf.get_u32_le(),
        side: buf.get_u8(),
        match_number: buf.get_u64_le(),
    })
}

fn get_quote(buf: &mut &[u8]) -> Result<Quote, WireError> {
    need(*buf, 8 + 8 + 8 + 4 * 4)?;
    Ok(Quote {
        symbol: get_symbol(buf),
        timestamp: buf.get_u64_le(),
        sequence: buf.get_u64_le(),
        bid_price: buf.get_u32_le(),
        bid_qty: buf.get_u32_le(),
        ask_price: buf.get_u32_le(),
        ask_qty: buf.get_u32_le(),
    })
}
