//! Core domain types

use margin_layout::{encode, DecodedEntity, Pubkey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger slot; strictly increasing per address for applied updates
pub type Slot = u64;

/// An account payload as delivered by the transport, before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAccount {
    pub address: Pubkey,
    pub slot: Slot,
    pub type_tag: u8,
    pub data: Vec<u8>,
}

impl RawAccount {
    pub fn new(address: Pubkey, slot: Slot, type_tag: u8, data: Vec<u8>) -> Self {
        Self {
            address,
            slot,
            type_tag,
            data,
        }
    }

    pub fn from_entity(address: Pubkey, slot: Slot, entity: &DecodedEntity) -> Self {
        Self::new(address, slot, entity.type_tag(), encode(entity))
    }
}

/// Transport connection as seen by the router
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Resyncing,
    /// Reconnect attempts exhausted; waits for an explicit resync
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Resyncing => write!(f, "resyncing"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// The part an address plays in a margin account's aggregate view
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DependencyRole {
    MarginAccount,
    Group,
    RootBank { token_index: usize },
    Oracle { market_index: usize },
    OpenOrders { market_index: usize },
    PerpMarket { market_index: usize },
}

impl fmt::Display for DependencyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyRole::MarginAccount => write!(f, "margin account"),
            DependencyRole::Group => write!(f, "group"),
            DependencyRole::RootBank { token_index } => write!(f, "root bank #{}", token_index),
            DependencyRole::Oracle { market_index } => write!(f, "oracle #{}", market_index),
            DependencyRole::OpenOrders { market_index } => write!(f, "open orders #{}", market_index),
            DependencyRole::PerpMarket { market_index } => write!(f, "perp market #{}", market_index),
        }
    }
}

/// Inclusive range of slots a composed value was observed at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotRange {
    pub min: Slot,
    pub max: Slot,
}

impl SlotRange {
    pub fn new(slot: Slot) -> Self {
        Self { min: slot, max: slot }
    }

    pub fn include(&mut self, slot: Slot) {
        self.min = self.min.min(slot);
        self.max = self.max.max(slot);
    }

    /// Zero for a hand-built range with `min > max`
    pub fn spread(&self) -> u64 {
        self.max.saturating_sub(self.min)
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_range_spread() {
        let mut range = SlotRange::new(10);
        range.include(7);
        range.include(12);
        assert_eq!(range, SlotRange { min: 7, max: 12 });
        assert_eq!(range.spread(), 5);
    }

    #[test]
    fn test_inverted_range_has_no_spread() {
        let range = SlotRange { min: 9, max: 4 };
        assert_eq!(range.spread(), 0);
    }
}
