// src/types.rs
//! Shared market-data primitives used by both pipelines: sides, symbols,
//! fixed-point prices, aggregated levels and the outbound message payloads.
//!
//! Prices are integral fixed-point throughout. The canonical form is a u32
//! mantissa with 4 implied decimals (1 unit = 0.0001). The price-level dialect
//! carries an i64 mantissa with 7 implied decimals; the two convert exactly by
//! a factor of 1000.

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Hard cap on the number of levels per side carried in outbound snapshots.
/// Configured depths are validated against this at startup.
pub const MAX_DEPTH: usize = 10;

/// Canonical fixed-point price: u32 mantissa, 4 implied decimals.
pub type Px4 = u32;

/// Price-level dialect price: i64 mantissa, 7 implied decimals.
pub type Px7 = i64;

#[inline]
pub fn px4_to_px7(px: Px4) -> Px7 {
    i64::from(px) * 1000
}

#[inline]
pub fn px7_to_px4(px: Px7) -> Px4 {
    (px / 1000) as Px4
}

/// Resting-order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            Side::Buy => b'B',
            Side::Sell => b'S',
        }
    }

    #[inline]
    pub fn from_byte(b: u8) -> Option<Side> {
        match b {
            b'B' => Some(Side::Buy),
            b'S' => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Instrument symbol, canonically 8 bytes of space-padded ASCII.
///
/// Inbound fields may be space- or NUL-padded; both normalize to the same
/// canonical value so map lookups and wire output agree.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol([u8; 8]);

impl Symbol {
    pub const LEN: usize = 8;

    /// Builds a symbol from raw wire bytes, taking at most 8 and normalizing
    /// trailing padding (spaces or NULs) to spaces.
    pub fn from_wire(raw: &[u8]) -> Symbol {
        let mut buf = [b' '; 8];
        for (dst, &src) in buf.iter_mut().zip(raw.iter()) {
            if src == 0 {
                break;
            }
            *dst = src;
        }
        Symbol(buf)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Symbol text with trailing padding removed.
    pub fn trimmed(&self) -> &str {
        let end = self
            .0
            .iter()
            .rposition(|&b| b != b' ')
            .map_or(0, |i| i + 1);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }

    /// Fallback name for securities known only by numeric id.
    pub fn from_security_id(id: u32) -> Symbol {
        let mut buf = [b' '; 8];
        buf[..3].copy_from_slice(b"SEC");
        let digits = format!("{id}");
        let take = digits.len().min(5);
        buf[3..3 + take].copy_from_slice(&digits.as_bytes()[..take]);
        Symbol(buf)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Symbol {
        Symbol::from_wire(s.as_bytes())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.trimmed())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.trimmed())
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.trimmed())
    }
}

/// One aggregated price level as carried in outbound snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Level {
    pub price: Px4,
    pub qty: u32,
    pub orders: u32,
}

/// Full book snapshot, the conflated publish payload of both pipelines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub symbol: Symbol,
    pub timestamp: u64,
    pub sequence: u64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub last_price: Px4,
    pub last_qty: u32,
    pub total_volume: u64,
}

/// Top-of-book update, published tick-by-tick. Empty sides are zeros.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub timestamp: u64,
    pub sequence: u64,
    pub bid_price: Px4,
    pub bid_qty: u32,
    pub ask_price: Px4,
    pub ask_qty: u32,
}

/// Trade tick. `side` is the aggressor side byte (`B`, `S`, or `X` for
/// cross trades).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TradeTick {
    pub symbol: Symbol,
    pub timestamp: u64,
    pub sequence: u64,
    pub price: Px4,
    pub qty: u32,
    pub side: u8,
    pub match_number: u64,
}

/// Wall-clock nanoseconds since the epoch, stamped on outbound envelopes.
#[inline]
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
