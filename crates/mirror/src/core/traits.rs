//! Core trait abstractions (Ports in Hexagonal Architecture)

use async_trait::async_trait;
use futures::Stream;
use margin_layout::Pubkey;
use std::pin::Pin;

use super::error::MirrorResult;
use super::types::{RawAccount, Slot};

/// Account update stream type. Changes only, never the initial value.
pub type AccountStream = Pin<Box<dyn Stream<Item = MirrorResult<RawAccount>> + Send>>;

/// Slot heartbeat stream type
pub type SlotStream = Pin<Box<dyn Stream<Item = MirrorResult<Slot>> + Send>>;

/// Transport port - the only way the mirror talks to the ledger.
///
/// A lost connection surfaces as an `Err(MirrorError::Disconnected)` item (or
/// the stream ending); the router owns reconnection and resync.
#[async_trait]
pub trait AccountTransport: Send + Sync {
    /// Point-in-time read of one account
    async fn get_account(&self, address: &Pubkey) -> MirrorResult<RawAccount>;

    /// Subscribe to changes of one account
    async fn subscribe(&self, address: &Pubkey) -> MirrorResult<AccountStream>;

    /// Heartbeat of slots whose updates have all been delivered.
    /// Transports without one return `None`.
    async fn subscribe_slots(&self) -> MirrorResult<Option<SlotStream>> {
        Ok(None)
    }
}
