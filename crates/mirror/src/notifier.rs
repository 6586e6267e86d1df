//! Change notifier: latest-wins delivery of risk snapshots to watchers
//!
//! Each watched margin account owns one `watch` channel. Producers never
//! block; a slow consumer simply sees the newest snapshot when it next polls.

use crate::risk::RiskSnapshot;
use dashmap::DashMap;
use futures::Stream;
use margin_layout::Pubkey;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

pub struct ChangeNotifier {
    channels: DashMap<Pubkey, watch::Sender<Option<Arc<RiskSnapshot>>>>,
    /// Addresses whose last watcher went away
    released: mpsc::UnboundedSender<Pubkey>,
}

impl ChangeNotifier {
    /// Create a notifier and the receiving end of its release notifications
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Pubkey>) {
        let (released, released_rx) = mpsc::unbounded_channel();
        let notifier = Arc::new(Self {
            channels: DashMap::new(),
            released,
        });
        (notifier, released_rx)
    }

    /// Stream of snapshots for `address`, starting with the latest one if any
    pub fn subscribe(self: &Arc<Self>, address: Pubkey) -> RiskStream {
        let receiver = self
            .channels
            .entry(address)
            .or_insert_with(|| watch::channel(None).0)
            .subscribe();
        debug!(%address, "Risk stream opened");
        RiskStream {
            address,
            inner: Some(WatchStream::new(receiver)),
            notifier: Arc::clone(self),
        }
    }

    /// Offer a new snapshot. Returns whether anyone is watching `address`.
    /// Snapshots equal to the held one apart from their timestamp are not
    /// re-delivered.
    pub fn publish(&self, address: &Pubkey, snapshot: RiskSnapshot) -> bool {
        let Some(sender) = self.channels.get(address) else {
            return false;
        };
        let snapshot = Arc::new(snapshot);
        let delivered = sender.send_if_modified(|held| match held {
            Some(existing) if existing.same_state(&snapshot) => false,
            _ => {
                *held = Some(snapshot);
                true
            }
        });
        if delivered {
            debug!(%address, "Risk snapshot published");
        }
        sender.receiver_count() > 0
    }

    /// Drop every held snapshot without waking open streams. Late subscribers
    /// then wait for the next successful composition.
    pub fn invalidate(&self) {
        for entry in self.channels.iter() {
            entry.value().send_if_modified(|held| {
                *held = None;
                false
            });
        }
        debug!(channels = self.channels.len(), "Held risk snapshots withdrawn");
    }

    /// Drop the held snapshot of `address` without waking its streams
    pub fn withdraw(&self, address: &Pubkey) {
        if let Some(sender) = self.channels.get(address) {
            sender.send_if_modified(|held| {
                *held = None;
                false
            });
        }
    }

    pub fn latest(&self, address: &Pubkey) -> Option<Arc<RiskSnapshot>> {
        self.channels.get(address)?.borrow().clone()
    }

    pub fn is_watched(&self, address: &Pubkey) -> bool {
        self.channels
            .get(address)
            .is_some_and(|sender| sender.receiver_count() > 0)
    }

    /// Number of open streams for `address`
    pub fn watcher_count(&self, address: &Pubkey) -> usize {
        self.channels
            .get(address)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Watched addresses
    pub fn watched(&self) -> Vec<Pubkey> {
        self.channels
            .iter()
            .filter(|entry| entry.value().receiver_count() > 0)
            .map(|entry| *entry.key())
            .collect()
    }

    fn release(&self, address: &Pubkey) {
        let removed = self
            .channels
            .remove_if(address, |_, sender| sender.receiver_count() == 0);
        if removed.is_some() {
            debug!(%address, "Last risk stream closed");
            let _ = self.released.send(*address);
        }
    }
}

/// Latest-wins stream of snapshots for one margin account.
/// Dropping it releases the registration once no other stream remains.
pub struct RiskStream {
    address: Pubkey,
    inner: Option<WatchStream<Option<Arc<RiskSnapshot>>>>,
    notifier: Arc<ChangeNotifier>,
}

impl RiskStream {
    pub fn address(&self) -> Pubkey {
        self.address
    }
}

impl Stream for RiskStream {
    type Item = Arc<RiskSnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        loop {
            match Pin::new(&mut *inner).poll_next(cx) {
                Poll::Ready(Some(Some(snapshot))) => return Poll::Ready(Some(snapshot)),
                Poll::Ready(Some(None)) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for RiskStream {
    fn drop(&mut self) {
        // the receiver must be gone before the count is checked
        drop(self.inner.take());
        self.notifier.release(&self.address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SlotRange;
    use crate::risk::{HealthType, Leverage, Verdict};
    use chrono::Utc;
    use fixed::types::I80F48;
    use tokio_stream::StreamExt;

    fn snapshot(address: Pubkey, slot: u64, collateral: i64) -> RiskSnapshot {
        RiskSnapshot {
            margin_account: address,
            slot_range: SlotRange::new(slot),
            health_type: HealthType::Maintenance,
            collateral: I80F48::from_num(collateral),
            liabilities: I80F48::ZERO,
            health: I80F48::from_num(collateral),
            leverage: Leverage::Defined(I80F48::ZERO),
            verdict: Verdict::Safe {
                headroom: I80F48::from_num(collateral),
            },
            positions: Vec::new(),
            computed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_latest_wins_for_slow_consumer() {
        let (notifier, _released) = ChangeNotifier::new();
        let address = Pubkey::new_unique();
        let mut stream = notifier.subscribe(address);

        for slot in 1..=5 {
            assert!(notifier.publish(&address, snapshot(address, slot, slot as i64)));
        }

        let received = stream.next().await.unwrap();
        assert_eq!(received.slot_range.max, 5);
    }

    #[tokio::test]
    async fn test_identical_snapshot_not_redelivered() {
        let (notifier, _released) = ChangeNotifier::new();
        let address = Pubkey::new_unique();
        let mut stream = notifier.subscribe(address);

        notifier.publish(&address, snapshot(address, 1, 10));
        assert!(stream.next().await.is_some());
        notifier.publish(&address, snapshot(address, 1, 10));

        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(20), stream.next()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_last_drop_releases() {
        let (notifier, mut released) = ChangeNotifier::new();
        let address = Pubkey::new_unique();
        let first = notifier.subscribe(address);
        let second = notifier.subscribe(address);
        assert_eq!(notifier.watcher_count(&address), 2);

        drop(first);
        assert!(notifier.is_watched(&address));
        assert!(released.try_recv().is_err());

        drop(second);
        assert!(!notifier.is_watched(&address));
        assert_eq!(released.try_recv().unwrap(), address);
        assert!(!notifier.publish(&address, snapshot(address, 1, 1)));
    }

    #[tokio::test]
    async fn test_invalidated_snapshot_is_not_replayed() {
        let (notifier, _released) = ChangeNotifier::new();
        let address = Pubkey::new_unique();
        let other = Pubkey::new_unique();
        let mut stream = notifier.subscribe(address);
        let _other_stream = notifier.subscribe(other);

        notifier.publish(&address, snapshot(address, 3, 10));
        notifier.publish(&other, snapshot(other, 3, 10));
        assert!(stream.next().await.is_some());

        notifier.invalidate();
        assert!(notifier.latest(&address).is_none());
        assert!(notifier.latest(&other).is_none());
        assert!(notifier.is_watched(&address));

        let mut late = notifier.subscribe(address);
        let quiet = tokio::time::timeout(std::time::Duration::from_millis(20), late.next()).await;
        assert!(quiet.is_err());
        let quiet = tokio::time::timeout(std::time::Duration::from_millis(20), stream.next()).await;
        assert!(quiet.is_err());

        // the same state is delivered again once recomposed
        notifier.publish(&address, snapshot(address, 3, 10));
        assert_eq!(late.next().await.unwrap().slot_range.max, 3);
        assert_eq!(stream.next().await.unwrap().slot_range.max, 3);
    }

    #[tokio::test]
    async fn test_withdraw_single_account() {
        let (notifier, _released) = ChangeNotifier::new();
        let address = Pubkey::new_unique();
        let other = Pubkey::new_unique();
        let _keep = notifier.subscribe(address);
        let _keep_other = notifier.subscribe(other);
        notifier.publish(&address, snapshot(address, 1, 1));
        notifier.publish(&other, snapshot(other, 1, 1));

        notifier.withdraw(&address);
        assert!(notifier.latest(&address).is_none());
        assert!(notifier.latest(&other).is_some());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_latest() {
        let (notifier, _released) = ChangeNotifier::new();
        let address = Pubkey::new_unique();
        let _keep = notifier.subscribe(address);
        notifier.publish(&address, snapshot(address, 7, 3));

        let mut late = notifier.subscribe(address);
        assert_eq!(late.next().await.unwrap().slot_range.max, 7);
        assert_eq!(notifier.latest(&address).unwrap().slot_range.max, 7);
    }
}
