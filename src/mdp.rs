// src/mdp.rs
//! Price-level dialect decoder.
//!
//! A datagram is one packet: a 12-byte packet header (channel-wide sequence
//! plus sending time) followed by back-to-back SBE messages. Each message
//! starts with an 8-byte header (block_length, template_id, schema_id,
//! version); templates with a repeating group place a 3-byte group header
//! (entry_block_length, num_in_group) after the root block. All integers are
//! little-endian. Prices are i64 mantissas with 7 implied decimals.
//!
//! Unknown templates are skipped by `8 + block_length`. A group whose entries
//! would overrun the datagram ends parsing for that datagram.

use crate::types::{Px7, Side, Symbol};

pub const TPL_CHANNEL_RESET: u16 = 4;
pub const TPL_HEARTBEAT: u16 = 12;
pub const TPL_SECURITY_DEFINITION: u16 = 27;
pub const TPL_INCREMENTAL_REFRESH: u16 = 32;
pub const TPL_SNAPSHOT_FULL_REFRESH: u16 = 38;

pub const PACKET_HEADER_LEN: usize = 12;
pub const SBE_HEADER_LEN: usize = 8;
pub const GROUP_HEADER_LEN: usize = 3;

const INC_ENTRY_LEN: usize = 24;
const SNAP_ENTRY_LEN: usize = 16;
const SECDEF_ROOT_LEN: usize = 37;
const SNAP_ROOT_LEN: usize = 20;

/// Entry classification within an update or snapshot group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Bid,
    Offer,
    Trade,
    ImpliedBid,
    ImpliedOffer,
}

impl EntryKind {
    pub fn from_raw(raw: u8) -> Option<EntryKind> {
        match raw {
            0 => Some(EntryKind::Bid),
            1 => Some(EntryKind::Offer),
            2 => Some(EntryKind::Trade),
            b'E' => Some(EntryKind::ImpliedBid),
            b'F' => Some(EntryKind::ImpliedOffer),
            _ => None,
        }
    }

    /// Book side this entry addresses; `None` for trades.
    pub fn side(self) -> Option<Side> {
        match self {
            EntryKind::Bid | EntryKind::ImpliedBid => Some(Side::Buy),
            EntryKind::Offer | EntryKind::ImpliedOffer => Some(Side::Sell),
            EntryKind::Trade => None,
        }
    }
}

/// Level mutation verb carried by an incremental entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateAction {
    New,
    Change,
    Delete,
    DeleteThru,
    DeleteFrom,
    Overlay,
}

impl UpdateAction {
    pub fn from_raw(raw: u8) -> Option<UpdateAction> {
        match raw {
            0 => Some(UpdateAction::New),
            1 => Some(UpdateAction::Change),
            2 => Some(UpdateAction::Delete),
            3 => Some(UpdateAction::DeleteThru),
            4 => Some(UpdateAction::DeleteFrom),
            5 => Some(UpdateAction::Overlay),
            _ => None,
        }
    }
}

/// One entry of an incremental refresh group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IncEntry {
    pub price: Px7,
    pub size: i32,
    pub security_id: u32,
    pub rpt_seq: u32,
    pub kind: EntryKind,
    pub action: UpdateAction,
    pub level: u8,
    pub orders: u8,
}

/// One entry of a snapshot group. The message-level rpt_seq applies to all
/// entries of a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapEntry {
    pub price: Px7,
    pub size: i32,
    pub kind: EntryKind,
    pub level: u8,
    pub orders: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    ChannelReset {
        transact_time: u64,
    },
    Heartbeat {
        last_seq: u64,
    },
    SecurityDefinition {
        security_id: u32,
        symbol: Symbol,
        min_price_increment: i64,
        display_factor: u32,
        trading_status: u8,
    },
    IncrementalRefresh {
        transact_time: u64,
        entries: Vec<IncEntry>,
    },
    SnapshotFullRefresh {
        last_packet_seq: u32,
        security_id: u32,
        rpt_seq: u32,
        transact_time: u64,
        entries: Vec<SnapEntry>,
    },
}

/// Channel-wide packet header, one per datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    pub seq: u32,
    pub sending_time: u64,
}

#[inline]
fn le_u16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(b[at..at + 2].try_into().unwrap())
}

#[inline]
fn le_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(b[at..at + 4].try_into().unwrap())
}

#[inline]
fn le_u64(b: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(b[at..at + 8].try_into().unwrap())
}

#[inline]
fn le_i32(b: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(b[at..at + 4].try_into().unwrap())
}

#[inline]
fn le_i64(b: &[u8], at: usize) -> i64 {
    i64::from_le_bytes(b[at..at + 8].try_into().unwrap())
}

/// Splits a datagram into its packet header and message iterator.
/// Returns `None` when the datagram is shorter than the packet header;
/// the caller counts that as an error and discards.
pub fn packet(datagram: &[u8]) -> Option<(PacketHeader, Messages<'_>)> {
    if datagram.len() < PACKET_HEADER_LEN {
        return None;
    }
    let header = PacketHeader {
        seq: le_u32(datagram, 0),
        sending_time: le_u64(datagram, 4),
    };
    Some((
        header,
        Messages {
            buf: datagram,
            offset: PACKET_HEADER_LEN,
        },
    ))
}

/// Iterator over the SBE messages of one packet.
pub struct Messages<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Messages<'a> {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        loop {
            if self.offset + SBE_HEADER_LEN > self.buf.len() {
                return None;
            }
            let block_length = le_u16(self.buf, self.offset) as usize;
            let template_id = le_u16(self.buf, self.offset + 2);
            let body_at = self.offset + SBE_HEADER_LEN;
            let body = &self.buf[body_at..];
            if body.len() < block_length {
                return None;
            }
            let root = &body[..block_length];

            match template_id {
                TPL_CHANNEL_RESET => {
                    if block_length < 8 {
                        return None;
                    }
                    self.offset = body_at + block_length;
                    return Some(Message::ChannelReset {
                        transact_time: le_u64(root, 0),
                    });
                }

                TPL_HEARTBEAT => {
                    if block_length < 8 {
                        return None;
                    }
                    self.offset = body_at + block_length;
                    return Some(Message::Heartbeat {
                        last_seq: le_u64(root, 0),
                    });
                }

                TPL_SECURITY_DEFINITION => {
                    if block_length < SECDEF_ROOT_LEN {
                        return None;
                    }
                    self.offset = body_at + block_length;
                    return Some(Message::SecurityDefinition {
                        security_id: le_u32(root, 0),
                        symbol: Symbol::from_wire(&root[4..12]),
                        min_price_increment: le_i64(root, 24),
                        display_factor: le_u32(root, 32),
                        trading_status: root[36],
                    });
                }

                TPL_INCREMENTAL_REFRESH => {
                    if block_length < 8 {
                        return None;
                    }
                    let transact_time = le_u64(root, 0);
                    let (entries, consumed) =
                        decode_group(&body[block_length..], INC_ENTRY_LEN, decode_inc_entry)?;
                    self.offset = body_at + block_length + consumed;
                    return Some(Message::IncrementalRefresh {
                        transact_time,
                        entries,
                    });
                }

                TPL_SNAPSHOT_FULL_REFRESH => {
                    if block_length < SNAP_ROOT_LEN {
                        return None;
                    }
                    let (entries, consumed) =
                        decode_group(&body[block_length..], SNAP_ENTRY_LEN, decode_snap_entry)?;
                    self.offset = body_at + block_length + consumed;
                    return Some(Message::SnapshotFullRefresh {
                        last_packet_seq: le_u32(root, 0),
                        security_id: le_u32(root, 4),
                        rpt_seq: le_u32(root, 8),
                        transact_time: le_u64(root, 12),
                        entries,
                    });
                }

                _ => {
                    // Unknown template: skip header plus declared root block.
                    self.offset = body_at + block_length;
                }
            }
        }
    }
}

/// Decodes a repeating group. Entries with an unmapped kind or action are
/// dropped. Returns `None` when the declared entries overrun `buf` or the
/// declared stride is shorter than the fields read.
fn decode_group<T>(
    buf: &[u8],
    min_entry_len: usize,
    decode_entry: fn(&[u8]) -> Option<T>,
) -> Option<(Vec<T>, usize)> {
    if buf.len() < GROUP_HEADER_LEN {
        return None;
    }
    let stride = le_u16(buf, 0) as usize;
    let count = buf[2] as usize;
    if stride < min_entry_len {
        return None;
    }
    let total = GROUP_HEADER_LEN + count * stride;
    if buf.len() < total {
        return None;
    }

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let at = GROUP_HEADER_LEN + i * stride;
        if let Some(e) = decode_entry(&buf[at..at + stride]) {
            entries.push(e);
        }
    }
    Some((entries, total))
}

fn decode_inc_entry(b: &[u8]) -> Option<IncEntry> {
    Some(IncEntry {
        price: le_i64(b, 0),
        size: le_i32(b, 8),
        security_id: le_u32(b, 12),
        rpt_seq: le_u32(b, 16),
        kind: EntryKind::from_raw(b[20])?,
        action: UpdateAction::from_raw(b[21])?,
        level: b[22],
        orders: b[23],
    })
}

fn decode_snap_entry(b: &[u8]) -> Option<SnapEntry> {
    Some(SnapEntry {
        price: le_i64(b, 0),
        size: le_i32(b, 8),
        kind: EntryKind::from_raw(b[12])?,
        level: b[13],
        orders: b[14],
    })
}
