// src/ladder.rs
//! Fixed-depth price-level book for the price-level dialect.
//!
//! Each side is a dense array addressed by 1-based protocol level; level `n`
//! lives at index `n - 1`. Updates shift neighbouring slots the way the
//! dialect prescribes: New inserts and pushes the tail off the end, Delete
//! closes the hole, DeleteThru wipes from the top down through the level,
//! DeleteFrom wipes from the level to the bottom, Change and Overlay write in
//! place. Entries addressing level 0 or beyond the depth cap are ignored.

use crate::mdp::{EntryKind, IncEntry, SnapEntry, UpdateAction};
use crate::types::{px7_to_px4, Level, Px7, Side, Snapshot, Symbol, MAX_DEPTH};

/// One slot of a ladder side. Zeroed slots are vacant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rung {
    pub price: Px7,
    pub qty: u32,
    pub orders: u8,
}

/// Price-level book for a single security.
pub struct LadderBook {
    security_id: u32,
    symbol: Symbol,
    bids: [Rung; MAX_DEPTH],
    asks: [Rung; MAX_DEPTH],
    bid_count: u8,
    ask_count: u8,
    last_price: Px7,
    last_qty: u32,
    total_volume: u64,
    last_rpt_seq: u32,
}

impl LadderBook {
    pub fn new(security_id: u32, symbol: Symbol) -> Self {
        Self {
            security_id,
            symbol,
            bids: [Rung::default(); MAX_DEPTH],
            asks: [Rung::default(); MAX_DEPTH],
            bid_count: 0,
            ask_count: 0,
            last_price: 0,
            last_qty: 0,
            total_volume: 0,
            last_rpt_seq: 0,
        }
    }

    #[inline]
    pub fn security_id(&self) -> u32 {
        self.security_id
    }

    #[inline]
    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub fn set_symbol(&mut self, symbol: Symbol) {
        self.symbol = symbol;
    }

    #[inline]
    pub fn last_rpt_seq(&self) -> u32 {
        self.last_rpt_seq
    }

    pub fn set_last_rpt_seq(&mut self, rpt_seq: u32) {
        self.last_rpt_seq = rpt_seq;
    }

    #[inline]
    pub fn bid_count(&self) -> u8 {
        self.bid_count
    }

    #[inline]
    pub fn ask_count(&self) -> u8 {
        self.ask_count
    }

    pub fn bids(&self) -> &[Rung] {
        &self.bids[..self.bid_count as usize]
    }

    pub fn asks(&self) -> &[Rung] {
        &self.asks[..self.ask_count as usize]
    }

    /// Empties both sides. Trade state and sequence tracking survive a clear;
    /// a channel reset recreates the book instead.
    pub fn clear(&mut self) {
        self.bids = [Rung::default(); MAX_DEPTH];
        self.asks = [Rung::default(); MAX_DEPTH];
        self.bid_count = 0;
        self.ask_count = 0;
    }

    /// Applies one incremental entry. Trade entries update the trade state;
    /// bid and offer entries (implied included) mutate their side.
    pub fn apply(&mut self, entry: &IncEntry) {
        match entry.kind.side() {
            Some(Side::Buy) => {
                apply_side(
                    &mut self.bids,
                    &mut self.bid_count,
                    entry.action,
                    entry.level,
                    Rung {
                        price: entry.price,
                        qty: entry.size.max(0) as u32,
                        orders: entry.orders,
                    },
                );
            }
            Some(Side::Sell) => {
                apply_side(
                    &mut self.asks,
                    &mut self.ask_count,
                    entry.action,
                    entry.level,
                    Rung {
                        price: entry.price,
                        qty: entry.size.max(0) as u32,
                        orders: entry.orders,
                    },
                );
            }
            None => self.record_trade(entry.price, entry.size.max(0) as u32),
        }

        if entry.rpt_seq > self.last_rpt_seq {
            self.last_rpt_seq = entry.rpt_seq;
        }
    }

    /// Replaces the book with a full snapshot. Entries write at their
    /// indicated levels with overlay semantics; trade entries are ignored.
    pub fn apply_snapshot(&mut self, entries: &[SnapEntry]) {
        self.clear();
        for entry in entries {
            if entry.level == 0 || entry.level as usize > MAX_DEPTH {
                continue;
            }
            let idx = entry.level as usize - 1;
            let rung = Rung {
                price: entry.price,
                qty: entry.size.max(0) as u32,
                orders: entry.orders,
            };
            match entry.kind {
                EntryKind::Bid => {
                    self.bids[idx] = rung;
                    self.bid_count = self.bid_count.max(entry.level);
                }
                EntryKind::Offer => {
                    self.asks[idx] = rung;
                    self.ask_count = self.ask_count.max(entry.level);
                }
                _ => {}
            }
        }
    }

    pub fn record_trade(&mut self, price: Px7, qty: u32) {
        self.last_price = price;
        self.last_qty = qty;
        self.total_volume += u64::from(qty);
    }

    /// Snapshot in the shared canonical form (prices down-converted to 4dp).
    pub fn snapshot(&self, timestamp: u64, sequence: u64) -> Snapshot {
        let to_level = |r: &Rung| Level {
            price: px7_to_px4(r.price),
            qty: r.qty,
            orders: u32::from(r.orders),
        };
        Snapshot {
            symbol: self.symbol,
            timestamp,
            sequence,
            bids: self.bids().iter().map(to_level).collect(),
            asks: self.asks().iter().map(to_level).collect(),
            last_price: px7_to_px4(self.last_price),
            last_qty: self.last_qty,
            total_volume: self.total_volume,
        }
    }
}

// The shift arithmetic is identical for both sides; ordering is the feed's
// contract, not enforced here.
fn apply_side(
    arr: &mut [Rung; MAX_DEPTH],
    count: &mut u8,
    action: UpdateAction,
    level: u8,
    rung: Rung,
) {
    if level == 0 || level as usize > MAX_DEPTH {
        return;
    }
    let idx = level as usize - 1;

    match action {
        UpdateAction::New => {
            arr.copy_within(idx..MAX_DEPTH - 1, idx + 1);
            arr[idx] = rung;
            *count = (*count + 1).min(MAX_DEPTH as u8);
        }
        UpdateAction::Change => {
            arr[idx] = rung;
        }
        UpdateAction::Delete => {
            arr.copy_within(idx + 1..MAX_DEPTH, idx);
            arr[MAX_DEPTH - 1] = Rung::default();
            *count = count.saturating_sub(1);
        }
        UpdateAction::DeleteThru => {
            for slot in arr[..=idx].iter_mut() {
                *slot = Rung::default();
            }
            *count = 0;
        }
        UpdateAction::DeleteFrom => {
            for slot in arr[idx..].iter_mut() {
                *slot = Rung::default();
            }
            *count = idx as u8;
        }
        UpdateAction::Overlay => {
            arr[idx] = rung;
            *count = (*count).max(level);
        }
    }
}

/// Keyed registry of ladder books plus the dirty set and the security-id to
/// symbol mapping learned from security definitions.
pub struct LadderManager {
    books: hashbrown::HashMap<u32, LadderBook>,
    names: hashbrown::HashMap<u32, Symbol>,
    dirty: hashbrown::HashSet<u32>,
}

impl LadderManager {
    pub fn new() -> Self {
        Self {
            books: hashbrown::HashMap::new(),
            names: hashbrown::HashMap::new(),
            dirty: hashbrown::HashSet::new(),
        }
    }

    /// Registers a security definition: remembers the symbol and creates the
    /// book if needed.
    pub fn define(&mut self, security_id: u32, symbol: Symbol) {
        self.names.insert(security_id, symbol);
        self.book_mut(security_id).set_symbol(symbol);
    }

    fn book_mut(&mut self, security_id: u32) -> &mut LadderBook {
        let symbol = self
            .names
            .get(&security_id)
            .copied()
            .unwrap_or_else(|| Symbol::from_security_id(security_id));
        self.books
            .entry(security_id)
            .or_insert_with(|| LadderBook::new(security_id, symbol))
    }

    pub fn book(&self, security_id: u32) -> Option<&LadderBook> {
        self.books.get(&security_id)
    }

    pub fn apply(&mut self, entry: &IncEntry) {
        self.book_mut(entry.security_id).apply(entry);
        self.dirty.insert(entry.security_id);
    }

    pub fn apply_snapshot(&mut self, security_id: u32, rpt_seq: u32, entries: &[SnapEntry]) {
        let book = self.book_mut(security_id);
        book.apply_snapshot(entries);
        book.set_last_rpt_seq(rpt_seq);
        self.dirty.insert(security_id);
    }

    pub fn snapshot(&self, security_id: u32, timestamp: u64, sequence: u64) -> Option<Snapshot> {
        self.books
            .get(&security_id)
            .map(|b| b.snapshot(timestamp, sequence))
    }

    /// Securities mutated since the last drain.
    pub fn drain_dirty(&mut self) -> Vec<u32> {
        self.dirty.drain().collect()
    }

    pub fn security_ids(&self) -> Vec<u32> {
        self.books.keys().copied().collect()
    }

    /// Channel reset: every known book is emptied in place, trade state
    /// included; the registry itself survives.
    pub fn reset_all(&mut self) {
        for book in self.books.values_mut() {
            let symbol = book.symbol();
            let id = book.security_id();
            *book = LadderBook::new(id, symbol);
        }
        self.dirty.clear();
    }
}

impl Default for LadderManager {
    fn default() -> Self {
        Self::new()
    }
}
