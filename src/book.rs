// src/book.rs
//! Per-order book engine.
//!
//! Tracks individual resting orders by 64-bit reference and derives aggregated
//! price levels from them. Level bookkeeping is exact: a level's quantity is
//! the sum of `remaining_qty` over its live orders and its order count is the
//! number of those orders, so partial cancels and executions never skew the
//! count.
//!
//! Operations on unknown references are no-ops; feeds routinely deliver
//! executes for orders the handler never saw. Quantity reductions clamp to the
//! order's remainder, and an order whose remainder reaches zero is removed
//! along with its level contribution.
//!
//! [`BookManager`] owns all books of one pipeline, keyed by symbol. Because
//! cancel, execute and delete carry only the order reference on the wire, the
//! manager maintains an `order_ref -> symbol` index populated at add time and
//! routes per-reference operations through it. The index doubles as the
//! eviction ledger: when the live-order population exceeds the configured cap,
//! the oldest references are evicted first.

use std::collections::{BTreeMap, VecDeque};

use crate::types::{Level, Px4, Quote, Side, Snapshot, Symbol};

/// A live resting order.
#[derive(Clone, Copy, Debug)]
pub struct Order {
    pub side: Side,
    pub price: Px4,
    pub remaining: u32,
}

#[derive(Clone, Copy, Debug, Default)]
struct LevelAgg {
    qty: u32,
    orders: u32,
}

/// Trade resulting from an execute; the aggressor is opposite the resting side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Execution {
    pub price: Px4,
    pub qty: u32,
    pub aggressor: Side,
}

/// Outcome of a replace, as seen by the reference index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Old reference unknown, nothing changed.
    Ignored,
    /// Old order removed, no new order inserted (zero quantity).
    Removed,
    /// Old order removed and the new reference is live.
    Replaced,
}

/// Order book for a single symbol.
pub struct OrderBook {
    symbol: Symbol,
    depth: usize,
    orders: hashbrown::HashMap<u64, Order>,
    bids: BTreeMap<Px4, LevelAgg>,
    asks: BTreeMap<Px4, LevelAgg>,
    last_price: Px4,
    last_qty: u32,
    total_volume: u64,
}

impl OrderBook {
    pub fn new(symbol: Symbol, depth: usize) -> Self {
        Self {
            symbol,
            depth,
            orders: hashbrown::HashMap::new(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_price: 0,
            last_qty: 0,
            total_volume: 0,
        }
    }

    #[inline]
    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn order_refs(&self) -> Vec<u64> {
        self.orders.keys().copied().collect()
    }

    /// Inserts a new order. Zero-quantity adds are ignored. An add that reuses
    /// a live reference first removes the old order's contribution.
    pub fn add(&mut self, order_ref: u64, side: Side, price: Px4, qty: u32) -> bool {
        if qty == 0 {
            return false;
        }
        if let Some(old) = self.orders.remove(&order_ref) {
            self.level_sub(old.side, old.price, old.remaining, true);
        }
        self.orders.insert(
            order_ref,
            Order {
                side,
                price,
                remaining: qty,
            },
        );
        self.level_add(side, price, qty);
        true
    }

    /// Removes an order outright. Returns whether the reference was live.
    pub fn delete(&mut self, order_ref: u64) -> bool {
        match self.orders.remove(&order_ref) {
            Some(order) => {
                self.level_sub(order.side, order.price, order.remaining, true);
                true
            }
            None => false,
        }
    }

    /// Cancels quantity from an order, clamped to its remainder.
    /// Returns `Some(removed)` when the reference was live.
    pub fn cancel(&mut self, order_ref: u64, qty: u32) -> Option<bool> {
        let order = self.orders.get_mut(&order_ref)?;
        let take = qty.min(order.remaining);
        order.remaining -= take;
        let (side, price, removed) = (order.side, order.price, order.remaining == 0);
        if removed {
            self.orders.remove(&order_ref);
        }
        self.level_sub(side, price, take, removed);
        Some(removed)
    }

    /// Executes quantity against an order at its resting price.
    pub fn execute(&mut self, order_ref: u64, qty: u32) -> Option<(Execution, bool)> {
        self.execute_inner(order_ref, qty, None)
    }

    /// Executes quantity against an order, printing the trade at `price`
    /// (execute-with-price semantics).
    pub fn execute_at(
        &mut self,
        order_ref: u64,
        qty: u32,
        price: Px4,
    ) -> Option<(Execution, bool)> {
        self.execute_inner(order_ref, qty, Some(price))
    }

    fn execute_inner(
        &mut self,
        order_ref: u64,
        qty: u32,
        trade_price: Option<Px4>,
    ) -> Option<(Execution, bool)> {
        let order = self.orders.get_mut(&order_ref)?;
        let take = qty.min(order.remaining);
        order.remaining -= take;
        let (side, price, removed) = (order.side, order.price, order.remaining == 0);
        if removed {
            self.orders.remove(&order_ref);
        }
        self.level_sub(side, price, take, removed);

        let exec = Execution {
            price: trade_price.unwrap_or(price),
            qty: take,
            aggressor: side.opposite(),
        };
        self.record_trade(exec.price, exec.qty);
        Some((exec, removed))
    }

    /// Replaces an order: the old reference is removed and a new order is
    /// inserted under `new_ref` at the given price and quantity, keeping the
    /// original side.
    pub fn replace(&mut self, old_ref: u64, new_ref: u64, price: Px4, qty: u32) -> ReplaceOutcome {
        let Some(old) = self.orders.remove(&old_ref) else {
            return ReplaceOutcome::Ignored;
        };
        self.level_sub(old.side, old.price, old.remaining, true);
        if qty == 0 {
            return ReplaceOutcome::Removed;
        }
        self.orders.insert(
            new_ref,
            Order {
                side: old.side,
                price,
                remaining: qty,
            },
        );
        self.level_add(old.side, price, qty);
        ReplaceOutcome::Replaced
    }

    /// Records an off-book trade print (trade and cross-trade messages).
    pub fn record_trade(&mut self, price: Px4, qty: u32) {
        self.last_price = price;
        self.last_qty = qty;
        self.total_volume += u64::from(qty);
    }

    /// Top of book; zeros for empty sides.
    pub fn bbo(&self, timestamp: u64, sequence: u64) -> Quote {
        let (bid_price, bid_qty) = self
            .bids
            .iter()
            .next_back()
            .map_or((0, 0), |(&px, agg)| (px, agg.qty));
        let (ask_price, ask_qty) = self
            .asks
            .iter()
            .next()
            .map_or((0, 0), |(&px, agg)| (px, agg.qty));
        Quote {
            symbol: self.symbol,
            timestamp,
            sequence,
            bid_price,
            bid_qty,
            ask_price,
            ask_qty,
        }
    }

    /// Full snapshot truncated to the configured depth, bids descending and
    /// asks ascending.
    pub fn snapshot(&self, timestamp: u64, sequence: u64) -> Snapshot {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(self.depth)
            .map(|(&price, agg)| Level {
                price,
                qty: agg.qty,
                orders: agg.orders,
            })
            .collect();
        let asks = self
            .asks
            .iter()
            .take(self.depth)
            .map(|(&price, agg)| Level {
                price,
                qty: agg.qty,
                orders: agg.orders,
            })
            .collect();
        Snapshot {
            symbol: self.symbol,
            timestamp,
            sequence,
            bids,
            asks,
            last_price: self.last_price,
            last_qty: self.last_qty,
            total_volume: self.total_volume,
        }
    }

    #[inline]
    fn top(&self) -> (Option<(Px4, u32)>, Option<(Px4, u32)>) {
        (
            self.bids.iter().next_back().map(|(&px, agg)| (px, agg.qty)),
            self.asks.iter().next().map(|(&px, agg)| (px, agg.qty)),
        )
    }

    fn level_add(&mut self, side: Side, price: Px4, qty: u32) {
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let agg = levels.entry(price).or_default();
        agg.qty = agg.qty.saturating_add(qty);
        agg.orders += 1;
    }

    fn level_sub(&mut self, side: Side, price: Px4, qty: u32, order_gone: bool) {
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if let Some(agg) = levels.get_mut(&price) {
            agg.qty = agg.qty.saturating_sub(qty);
            if order_gone {
                agg.orders = agg.orders.saturating_sub(1);
            }
            if agg.qty == 0 {
                levels.remove(&price);
            }
        }
    }

    /// Test hook: checks every structural invariant against the order map.
    pub fn assert_invariants(&self) {
        let mut agg_bids: hashbrown::HashMap<Px4, LevelAgg> = hashbrown::HashMap::new();
        let mut agg_asks: hashbrown::HashMap<Px4, LevelAgg> = hashbrown::HashMap::new();
        for o in self.orders.values() {
            assert!(o.remaining > 0, "zero-remainder order retained");
            let map = match o.side {
                Side::Buy => &mut agg_bids,
                Side::Sell => &mut agg_asks,
            };
            let e = map.entry(o.price).or_default();
            e.qty += o.remaining;
            e.orders += 1;
        }

        assert_eq!(self.bids.len(), agg_bids.len(), "bid level count mismatch");
        assert_eq!(self.asks.len(), agg_asks.len(), "ask level count mismatch");
        for (&px, agg) in &self.bids {
            let exp = agg_bids.get(&px).copied().unwrap_or_default();
            assert_eq!(agg.qty, exp.qty, "bid qty mismatch at px={px}");
            assert_eq!(agg.orders, exp.orders, "bid order count mismatch at px={px}");
            assert!(agg.qty > 0, "zero bid level at px={px}");
        }
        for (&px, agg) in &self.asks {
            let exp = agg_asks.get(&px).copied().unwrap_or_default();
            assert_eq!(agg.qty, exp.qty, "ask qty mismatch at px={px}");
            assert_eq!(agg.orders, exp.orders, "ask order count mismatch at px={px}");
            assert!(agg.qty > 0, "zero ask level at px={px}");
        }
    }
}

/// Outcome of a manager-level add or replace.
#[derive(Clone, Copy, Debug, Default)]
pub struct AddOutcome {
    pub applied: bool,
    pub top_changed: bool,
    pub evicted: usize,
}

/// Keyed registry of per-order books plus the dirty set and the
/// reference-routing index.
pub struct BookManager {
    depth: usize,
    max_live_orders: usize,
    books: hashbrown::HashMap<Symbol, OrderBook>,
    ref_index: hashbrown::HashMap<u64, Symbol>,
    arrival: VecDeque<u64>,
    dirty: hashbrown::HashSet<Symbol>,
}

impl BookManager {
    pub fn new(depth: usize, max_live_orders: usize) -> Self {
        Self {
            depth,
            max_live_orders,
            books: hashbrown::HashMap::new(),
            ref_index: hashbrown::HashMap::new(),
            arrival: VecDeque::new(),
            dirty: hashbrown::HashSet::new(),
        }
    }

    /// Creates the book for `symbol` if it does not exist yet.
    pub fn ensure(&mut self, symbol: Symbol) {
        let depth = self.depth;
        self.books
            .entry(symbol)
            .or_insert_with(|| OrderBook::new(symbol, depth));
    }

    pub fn add(
        &mut self,
        order_ref: u64,
        symbol: Symbol,
        side: Side,
        price: Px4,
        qty: u32,
    ) -> AddOutcome {
        // A reused live reference is routed as a delete of the old order first.
        if self.ref_index.contains_key(&order_ref) {
            self.delete(order_ref);
        }

        self.ensure(symbol);
        let book = self.books.get_mut(&symbol).unwrap();
        let before = book.top();
        if !book.add(order_ref, side, price, qty) {
            return AddOutcome::default();
        }
        let top_changed = book.top() != before;

        self.ref_index.insert(order_ref, symbol);
        self.arrival.push_back(order_ref);
        self.dirty.insert(symbol);

        let evicted = self.enforce_cap();
        self.compact_arrival();
        AddOutcome {
            applied: true,
            top_changed,
            evicted,
        }
    }

    pub fn delete(&mut self, order_ref: u64) -> bool {
        let Some(&symbol) = self.ref_index.get(&order_ref) else {
            return false;
        };
        let book = self.books.get_mut(&symbol).unwrap();
        if book.delete(order_ref) {
            self.ref_index.remove(&order_ref);
            self.dirty.insert(symbol);
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self, order_ref: u64, qty: u32) -> bool {
        let Some(&symbol) = self.ref_index.get(&order_ref) else {
            return false;
        };
        let book = self.books.get_mut(&symbol).unwrap();
        match book.cancel(order_ref, qty) {
            Some(removed) => {
                if removed {
                    self.ref_index.remove(&order_ref);
                }
                self.dirty.insert(symbol);
                true
            }
            None => false,
        }
    }

    /// Executes against an order; returns the symbol and trade details for
    /// tick publication. `price` overrides the resting price when the message
    /// carries an execution price.
    pub fn execute(
        &mut self,
        order_ref: u64,
        qty: u32,
        price: Option<Px4>,
    ) -> Option<(Symbol, Execution)> {
        let &symbol = self.ref_index.get(&order_ref)?;
        let book = self.books.get_mut(&symbol)?;
        let (exec, removed) = match price {
            Some(px) => book.execute_at(order_ref, qty, px)?,
            None => book.execute(order_ref, qty)?,
        };
        if removed {
            self.ref_index.remove(&order_ref);
        }
        self.dirty.insert(symbol);
        Some((symbol, exec))
    }

    /// Replaces an order, routing through the reference index. Returns the
    /// owning symbol and whether the top of book moved.
    pub fn replace(
        &mut self,
        old_ref: u64,
        new_ref: u64,
        price: Px4,
        qty: u32,
    ) -> Option<(Symbol, bool)> {
        let &symbol = self.ref_index.get(&old_ref)?;
        let book = self.books.get_mut(&symbol).unwrap();
        let before = book.top();
        let outcome = book.replace(old_ref, new_ref, price, qty);
        if outcome == ReplaceOutcome::Ignored {
            return None;
        }
        let top_changed = book.top() != before;

        self.ref_index.remove(&old_ref);
        if outcome == ReplaceOutcome::Replaced {
            self.ref_index.insert(new_ref, symbol);
            self.arrival.push_back(new_ref);
        }
        self.dirty.insert(symbol);
        Some((symbol, top_changed))
    }

    /// Records a trade print against the symbol's book, creating it on first
    /// reference.
    pub fn record_trade(&mut self, symbol: Symbol, price: Px4, qty: u32) {
        self.ensure(symbol);
        self.books.get_mut(&symbol).unwrap().record_trade(price, qty);
        self.dirty.insert(symbol);
    }

    pub fn bbo(&self, symbol: Symbol, timestamp: u64, sequence: u64) -> Option<Quote> {
        self.books.get(&symbol).map(|b| b.bbo(timestamp, sequence))
    }

    pub fn snapshot(&self, symbol: Symbol, timestamp: u64, sequence: u64) -> Option<Snapshot> {
        self.books
            .get(&symbol)
            .map(|b| b.snapshot(timestamp, sequence))
    }

    pub fn book(&self, symbol: Symbol) -> Option<&OrderBook> {
        self.books.get(&symbol)
    }

    #[inline]
    pub fn live_orders(&self) -> usize {
        self.ref_index.len()
    }

    /// Symbols mutated since the last drain, in unspecified order.
    pub fn drain_dirty(&mut self) -> Vec<Symbol> {
        self.dirty.drain().collect()
    }

    pub fn clear_all(&mut self) {
        self.books.clear();
        self.ref_index.clear();
        self.arrival.clear();
        self.dirty.clear();
    }

    // Oldest-first eviction once the live population exceeds the cap. The
    // arrival queue may hold references that already died; those are skipped.
    fn enforce_cap(&mut self) -> usize {
        let mut evicted = 0;
        while self.ref_index.len() > self.max_live_orders {
            let Some(order_ref) = self.arrival.pop_front() else {
                break;
            };
            if self.ref_index.contains_key(&order_ref) && self.delete(order_ref) {
                evicted += 1;
            }
        }
        evicted
    }

    // Drops dead references from the arrival queue once it outgrows the live
    // population by a wide margin, so the queue stays bounded.
    fn compact_arrival(&mut self) {
        if self.arrival.len() > self.ref_index.len() * 2 + 1024 {
            let index = &self.ref_index;
            self.arrival.retain(|r| index.contains_key(r));
        }
    }
}
