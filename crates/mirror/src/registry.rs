//! Entity registry: the single source of truth for decoded account state
//!
//! Entries are keyed by address and stamped with the slot they were written at
//! and the resync epoch they were last observed in. Writes to one address are
//! serialized by the map's entry lock; reads never block writers of other
//! addresses.

use crate::core::Slot;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use futures::Stream;
use margin_layout::{DecodedEntity, Pubkey};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

/// A registry entry as seen by readers
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub entity: DecodedEntity,
    /// Slot the stored payload was written at
    pub slot: Slot,
    /// Latest slot through which the payload is known to be current
    pub observed_slot: Slot,
    pub updated_at: DateTime<Utc>,
}

/// Result of a `put`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Stored; `previous` is the slot it replaced
    Applied { previous: Option<Slot> },
    /// An entry invalidated by a resync was observed again at its own slot
    Revalidated,
    /// Not newer than what is stored; nothing changed
    Stale { stored: Slot },
}

impl PutOutcome {
    /// Whether the entry is now current
    pub fn is_observed(&self) -> bool {
        !matches!(self, PutOutcome::Stale { .. })
    }
}

/// Broadcast to the push trigger whenever observable state moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    Updated { address: Pubkey, slot: Slot },
    SlotConfirmed { slot: Slot },
    Invalidated { epoch: u64 },
}

struct RegistryEntry {
    entity: DecodedEntity,
    slot: Slot,
    updated_at: DateTime<Utc>,
    epoch: u64,
}

pub struct EntityRegistry {
    entries: DashMap<Pubkey, RegistryEntry>,
    watchers: DashMap<Pubkey, watch::Sender<Option<Versioned>>>,
    /// Addresses with a live transport subscription
    live: DashSet<Pubkey>,
    epoch: AtomicU64,
    confirmed_slot: AtomicU64,
    events: broadcast::Sender<RegistryEvent>,
}

impl EntityRegistry {
    pub fn new(event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            entries: DashMap::new(),
            watchers: DashMap::new(),
            live: DashSet::new(),
            epoch: AtomicU64::new(0),
            confirmed_slot: AtomicU64::new(0),
            events,
        }
    }

    /// Store `entity` if `slot` is newer than what is held for `address`
    pub fn put(&self, address: Pubkey, entity: DecodedEntity, slot: Slot) -> PutOutcome {
        let epoch = self.epoch.load(Ordering::Acquire);
        let now = Utc::now();

        let outcome = match self.entries.entry(address) {
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get_mut();
                if slot > stored.slot {
                    let previous = stored.slot;
                    *stored = RegistryEntry {
                        entity,
                        slot,
                        updated_at: now,
                        epoch,
                    };
                    PutOutcome::Applied {
                        previous: Some(previous),
                    }
                } else if slot == stored.slot && stored.epoch != epoch {
                    stored.epoch = epoch;
                    stored.updated_at = now;
                    PutOutcome::Revalidated
                } else {
                    PutOutcome::Stale {
                        stored: stored.slot,
                    }
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(RegistryEntry {
                    entity,
                    slot,
                    updated_at: now,
                    epoch,
                });
                PutOutcome::Applied { previous: None }
            }
        };

        if outcome.is_observed() {
            debug!(%address, slot, ?outcome, "Registry entry observed");
            self.notify(&address);
            let _ = self.events.send(RegistryEvent::Updated { address, slot });
        }
        outcome
    }

    /// Current entry; `None` if unknown or not re-observed since the last resync
    pub fn get(&self, address: &Pubkey) -> Option<Versioned> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let entry = self.entries.get(address)?;
        if entry.epoch != epoch {
            return None;
        }
        Some(self.versioned(address, &entry, true))
    }

    /// Entry regardless of epoch, with whether it is fresh
    pub fn peek(&self, address: &Pubkey) -> Option<(Versioned, bool)> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let entry = self.entries.get(address)?;
        let fresh = entry.epoch == epoch;
        Some((self.versioned(address, &entry, fresh), fresh))
    }

    fn versioned(&self, address: &Pubkey, entry: &RegistryEntry, fresh: bool) -> Versioned {
        let observed_slot = if fresh && self.live.contains(address) {
            entry.slot.max(self.confirmed_slot.load(Ordering::Acquire))
        } else {
            entry.slot
        };
        Versioned {
            entity: entry.entity.clone(),
            slot: entry.slot,
            observed_slot,
            updated_at: entry.updated_at,
        }
    }

    fn notify(&self, address: &Pubkey) {
        let Some(sender) = self.watchers.get(address) else {
            return;
        };
        let Some(current) = self.get(address) else {
            return;
        };
        sender.send_if_modified(|held| match held {
            Some(existing) if existing.slot > current.slot => false,
            _ => {
                *held = Some(current);
                true
            }
        });
    }

    /// Latest-wins stream of one address, starting from its current value.
    /// Ends once the address is unsubscribed or removed.
    pub fn subscribe(&self, address: Pubkey) -> EntityStream {
        let current = self.get(&address);
        let receiver = self
            .watchers
            .entry(address)
            .or_insert_with(|| watch::channel(current).0)
            .subscribe();
        EntityStream {
            inner: WatchStream::new(receiver),
        }
    }

    /// Close every stream of `address`
    pub fn unsubscribe(&self, address: &Pubkey) {
        self.watchers.remove(address);
    }

    pub fn remove(&self, address: &Pubkey) -> Option<Versioned> {
        self.unsubscribe(address);
        self.live.remove(address);
        let (_, entry) = self.entries.remove(address)?;
        Some(Versioned {
            observed_slot: entry.slot,
            slot: entry.slot,
            updated_at: entry.updated_at,
            entity: entry.entity,
        })
    }

    /// Mark every entry stale until observed again. Returns the new epoch.
    pub fn invalidate_all(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.confirmed_slot.store(0, Ordering::Release);
        self.live.clear();
        let _ = self.events.send(RegistryEvent::Invalidated { epoch });
        epoch
    }

    /// Slot heartbeat: every update up to `slot` has been delivered
    pub fn confirm_slot(&self, slot: Slot) {
        let previous = self.confirmed_slot.fetch_max(slot, Ordering::AcqRel);
        if slot > previous {
            let _ = self.events.send(RegistryEvent::SlotConfirmed { slot });
        }
    }

    /// Whether `address` is covered by a live transport subscription
    pub fn set_live(&self, address: Pubkey, live: bool) {
        if live {
            self.live.insert(address);
        } else {
            self.live.remove(&address);
        }
    }

    pub fn events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn confirmed_slot(&self) -> Slot {
        self.confirmed_slot.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Stream of registry updates for one address
pub struct EntityStream {
    inner: WatchStream<Option<Versioned>>,
}

impl Stream for EntityStream {
    type Item = Versioned;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Some(versioned))) => return Poll::Ready(Some(versioned)),
                Poll::Ready(Some(None)) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use margin_layout::RootBank;
    use tokio_stream::StreamExt;

    fn bank(last_updated: u64) -> DecodedEntity {
        RootBank {
            last_updated,
            ..RootBank::default()
        }
        .into()
    }

    #[test]
    fn test_only_newer_slots_apply() {
        let registry = EntityRegistry::default();
        let address = Pubkey::new_unique();

        assert_eq!(registry.put(address, bank(1), 10), PutOutcome::Applied { previous: None });
        assert_eq!(registry.put(address, bank(2), 10), PutOutcome::Stale { stored: 10 });
        assert_eq!(registry.put(address, bank(3), 9), PutOutcome::Stale { stored: 10 });
        assert_eq!(
            registry.put(address, bank(4), 11),
            PutOutcome::Applied { previous: Some(10) }
        );

        let current = registry.get(&address).unwrap();
        assert_eq!(current.slot, 11);
        assert_eq!(current.entity, bank(4));
    }

    #[test]
    fn test_invalidation_and_revalidation() {
        let registry = EntityRegistry::default();
        let address = Pubkey::new_unique();
        registry.put(address, bank(1), 10);

        registry.invalidate_all();
        assert!(registry.get(&address).is_none());
        let (peeked, fresh) = registry.peek(&address).unwrap();
        assert!(!fresh);
        assert_eq!(peeked.slot, 10);

        // unchanged while disconnected
        assert_eq!(registry.put(address, bank(1), 10), PutOutcome::Revalidated);
        assert_eq!(registry.get(&address).unwrap().slot, 10);
        // a second observation at the same slot is just stale
        assert_eq!(registry.put(address, bank(1), 10), PutOutcome::Stale { stored: 10 });
    }

    #[test]
    fn test_heartbeat_extends_live_entries_only() {
        let registry = EntityRegistry::default();
        let live = Pubkey::new_unique();
        let idle = Pubkey::new_unique();
        registry.put(live, bank(1), 5);
        registry.put(idle, bank(1), 5);
        registry.set_live(live, true);

        registry.confirm_slot(8);
        assert_eq!(registry.get(&live).unwrap().observed_slot, 8);
        assert_eq!(registry.get(&idle).unwrap().observed_slot, 5);

        registry.invalidate_all();
        registry.put(live, bank(1), 5);
        assert_eq!(registry.get(&live).unwrap().observed_slot, 5);
    }

    #[tokio::test]
    async fn test_subscription_is_restartable_and_closes() {
        let registry = EntityRegistry::default();
        let address = Pubkey::new_unique();
        registry.put(address, bank(1), 1);

        let mut stream = registry.subscribe(address);
        assert_eq!(stream.next().await.unwrap().slot, 1);

        registry.put(address, bank(2), 2);
        registry.put(address, bank(3), 3);
        // latest wins
        assert_eq!(stream.next().await.unwrap().slot, 3);

        let mut late = registry.subscribe(address);
        assert_eq!(late.next().await.unwrap().slot, 3);

        registry.unsubscribe(&address);
        assert!(stream.next().await.is_none());
        assert!(late.next().await.is_none());
    }

    #[tokio::test]
    async fn test_events_broadcast() {
        let registry = EntityRegistry::default();
        let mut events = registry.events();
        let address = Pubkey::new_unique();

        registry.put(address, bank(1), 4);
        registry.put(address, bank(1), 3);
        registry.confirm_slot(4);

        assert_eq!(events.recv().await.unwrap(), RegistryEvent::Updated { address, slot: 4 });
        assert_eq!(events.recv().await.unwrap(), RegistryEvent::SlotConfirmed { slot: 4 });
    }
}
