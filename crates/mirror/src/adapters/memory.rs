//! In-process ledger transport for tests and simulations
//!
//! Accounts are written at the current slot and pushed to every live
//! subscription at once. `advance_slot` confirms the current slot on the
//! heartbeat stream before moving on, so a heartbeat for slot `N` always
//! follows every update written at `N`.

use crate::core::{
    AccountStream, AccountTransport, MirrorError, MirrorResult, RawAccount, Slot, SlotStream,
};
use async_trait::async_trait;
use margin_layout::{DecodedEntity, Pubkey};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

type AccountSender = mpsc::UnboundedSender<MirrorResult<RawAccount>>;
type SlotSender = mpsc::UnboundedSender<MirrorResult<Slot>>;

struct LedgerState {
    slot: Slot,
    accounts: HashMap<Pubkey, RawAccount>,
    subscribers: HashMap<Pubkey, Vec<AccountSender>>,
    slot_subscribers: Vec<SlotSender>,
    reachable: bool,
    heartbeats: bool,
}

pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                slot: 1,
                accounts: HashMap::new(),
                subscribers: HashMap::new(),
                slot_subscribers: Vec::new(),
                reachable: true,
                heartbeats: true,
            }),
        }
    }

    /// A ledger that offers no slot heartbeat stream
    pub fn without_heartbeats() -> Self {
        let ledger = Self::new();
        ledger.lock().heartbeats = false;
        ledger
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn slot(&self) -> Slot {
        self.lock().slot
    }

    /// Write `entity` at the current slot. Returns that slot.
    pub fn set_account(&self, address: Pubkey, entity: impl Into<DecodedEntity>) -> Slot {
        let entity = entity.into();
        let slot = self.slot();
        self.publish(RawAccount::from_entity(address, slot, &entity))
    }

    /// Write raw bytes at the current slot, valid or not
    pub fn set_raw(&self, address: Pubkey, type_tag: u8, data: Vec<u8>) -> Slot {
        let slot = self.slot();
        self.publish(RawAccount::new(address, slot, type_tag, data))
    }

    fn publish(&self, raw: RawAccount) -> Slot {
        let mut state = self.lock();
        let slot = raw.slot;
        if let Some(senders) = state.subscribers.get_mut(&raw.address) {
            senders.retain(|sender| sender.send(Ok(raw.clone())).is_ok());
        }
        debug!(address = %raw.address, slot, "Ledger account written");
        state.accounts.insert(raw.address, raw);
        slot
    }

    pub fn remove_account(&self, address: &Pubkey) -> Option<RawAccount> {
        self.lock().accounts.remove(address)
    }

    /// Confirm the current slot on the heartbeat stream and move to the next.
    /// Returns the new current slot.
    pub fn advance_slot(&self) -> Slot {
        let mut state = self.lock();
        let confirmed = state.slot;
        state
            .slot_subscribers
            .retain(|sender| sender.send(Ok(confirmed)).is_ok());
        state.slot += 1;
        state.slot
    }

    /// Break every open subscription with an explicit disconnect
    pub fn disconnect(&self) {
        let mut state = self.lock();
        for (_, senders) in state.subscribers.drain() {
            for sender in senders {
                let _ = sender.send(Err(MirrorError::Disconnected("ledger connection dropped".to_string())));
            }
        }
        for sender in state.slot_subscribers.drain(..) {
            let _ = sender.send(Err(MirrorError::Disconnected("ledger connection dropped".to_string())));
        }
        debug!("Ledger dropped every subscription");
    }

    /// While unreachable every request fails with a disconnect
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Open subscriptions for `address`
    pub fn subscriber_count(&self, address: &Pubkey) -> usize {
        self.lock()
            .subscribers
            .get(address)
            .map(|senders| senders.iter().filter(|sender| !sender.is_closed()).count())
            .unwrap_or(0)
    }

    /// Open account subscriptions across all addresses
    pub fn total_subscribers(&self) -> usize {
        self.lock()
            .subscribers
            .values()
            .flatten()
            .filter(|sender| !sender.is_closed())
            .count()
    }

    fn ensure_reachable(state: &LedgerState) -> MirrorResult<()> {
        if state.reachable {
            Ok(())
        } else {
            Err(MirrorError::Disconnected("ledger unreachable".to_string()))
        }
    }
}

#[async_trait]
impl AccountTransport for InMemoryLedger {
    async fn get_account(&self, address: &Pubkey) -> MirrorResult<RawAccount> {
        let state = self.lock();
        Self::ensure_reachable(&state)?;
        state
            .accounts
            .get(address)
            .cloned()
            .ok_or(MirrorError::AccountNotFound { address: *address })
    }

    async fn subscribe(&self, address: &Pubkey) -> MirrorResult<AccountStream> {
        let mut state = self.lock();
        Self::ensure_reachable(&state)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let senders = state.subscribers.entry(*address).or_default();
        senders.retain(|existing| !existing.is_closed());
        senders.push(sender);
        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }

    async fn subscribe_slots(&self) -> MirrorResult<Option<SlotStream>> {
        let mut state = self.lock();
        Self::ensure_reachable(&state)?;
        if !state.heartbeats {
            return Ok(None);
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        state.slot_subscribers.push(sender);
        Ok(Some(Box::pin(UnboundedReceiverStream::new(receiver))))
    }
}
