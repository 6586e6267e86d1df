//! Subscription router: multiplexes transport streams into the registry
//!
//! One task owns every transport subscription. Account updates are decoded and
//! written to the registry in arrival order; undecodable frames are logged and
//! dropped without interrupting the stream. A lost connection invalidates the
//! registry and triggers a reconnect followed by a full resync, so nothing
//! observed before the gap is trusted until it is observed again.

use crate::config::TransportConfig;
use crate::core::{
    AccountStream, AccountTransport, ConnectionState, MirrorError, MirrorResult, RawAccount, Slot,
    SlotStream,
};
use crate::registry::{EntityRegistry, PutOutcome};
use margin_layout::{decode, LayoutError, Pubkey};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, error, info, warn};

/// What happened to one raw account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Stored(PutOutcome),
    Dropped(LayoutError),
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Default)]
pub struct RouterStats {
    applied: AtomicU64,
    revalidated: AtomicU64,
    stale: AtomicU64,
    malformed: AtomicU64,
    unknown: AtomicU64,
    heartbeats: AtomicU64,
    disconnects: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStatsSnapshot {
    pub applied: u64,
    pub revalidated: u64,
    pub stale: u64,
    pub malformed: u64,
    pub unknown: u64,
    pub heartbeats: u64,
    pub disconnects: u64,
}

impl RouterStats {
    fn record(&self, outcome: &RouteOutcome) {
        let counter = match outcome {
            RouteOutcome::Stored(PutOutcome::Applied { .. }) => &self.applied,
            RouteOutcome::Stored(PutOutcome::Revalidated) => &self.revalidated,
            RouteOutcome::Stored(PutOutcome::Stale { .. }) => &self.stale,
            RouteOutcome::Dropped(LayoutError::MalformedLayout { .. }) => &self.malformed,
            RouteOutcome::Dropped(LayoutError::UnknownType(_)) => &self.unknown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            revalidated: self.revalidated.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Commands & Handle
// ============================================================================

#[derive(Debug)]
pub enum RouterCommand {
    /// Subscribe and fetch; `ack` reports the fetch result
    Track {
        address: Pubkey,
        ack: Option<oneshot::Sender<MirrorResult<()>>>,
    },
    Untrack {
        address: Pubkey,
    },
    Resync {
        ack: oneshot::Sender<MirrorResult<()>>,
    },
    Shutdown,
}

#[derive(Clone)]
pub struct RouterHandle {
    commands: mpsc::Sender<RouterCommand>,
    state: watch::Receiver<ConnectionState>,
    stats: Arc<RouterStats>,
}

impl RouterHandle {
    /// Track `address` and wait until its current value has been fetched
    pub async fn track(&self, address: Pubkey) -> MirrorResult<()> {
        let (ack, done) = oneshot::channel();
        self.send(RouterCommand::Track {
            address,
            ack: Some(ack),
        })
        .await?;
        done.await
            .map_err(|_| MirrorError::ChannelClosed("router acknowledgement"))?
    }

    /// Track `address` without waiting for the fetch
    pub async fn request_track(&self, address: Pubkey) -> MirrorResult<()> {
        self.send(RouterCommand::Track { address, ack: None }).await
    }

    pub async fn untrack(&self, address: Pubkey) -> MirrorResult<()> {
        self.send(RouterCommand::Untrack { address }).await
    }

    /// Invalidate everything and refetch every tracked address
    pub async fn resync(&self) -> MirrorResult<()> {
        let (ack, done) = oneshot::channel();
        self.send(RouterCommand::Resync { ack }).await?;
        done.await
            .map_err(|_| MirrorError::ChannelClosed("router acknowledgement"))?
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(RouterCommand::Shutdown).await;
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }

    async fn send(&self, command: RouterCommand) -> MirrorResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| MirrorError::ChannelClosed("router commands"))
    }
}

// ============================================================================
// Router Task
// ============================================================================

pub struct SubscriptionRouter {
    transport: Arc<dyn AccountTransport>,
    registry: Arc<EntityRegistry>,
    config: TransportConfig,
    stats: Arc<RouterStats>,
    state: watch::Sender<ConnectionState>,
    commands: mpsc::Receiver<RouterCommand>,
    streams: StreamMap<Pubkey, AccountStream>,
    slots: Option<SlotStream>,
    tracked: HashSet<Pubkey>,
    reconnect_at: Option<Instant>,
    attempts: u32,
}

impl SubscriptionRouter {
    /// Connect and spawn the router task
    pub async fn spawn(
        transport: Arc<dyn AccountTransport>,
        registry: Arc<EntityRegistry>,
        config: TransportConfig,
    ) -> (RouterHandle, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::channel(config.command_buffer);
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        let stats = Arc::new(RouterStats::default());

        let mut router = Self {
            transport,
            registry,
            config,
            stats: stats.clone(),
            state,
            commands,
            streams: StreamMap::new(),
            slots: None,
            tracked: HashSet::new(),
            reconnect_at: None,
            attempts: 0,
        };
        router.reconnect().await;

        let handle = RouterHandle {
            commands: commands_tx,
            state: state_rx,
            stats,
        };
        (handle, tokio::spawn(router.run()))
    }

    /// Decode one raw account and store it. Decode failures drop the record.
    pub fn ingest(registry: &EntityRegistry, stats: &RouterStats, raw: RawAccount) -> RouteOutcome {
        let outcome = match decode(raw.type_tag, &raw.data) {
            Ok(entity) => RouteOutcome::Stored(registry.put(raw.address, entity, raw.slot)),
            Err(err) => {
                warn!(
                    address = %raw.address,
                    slot = raw.slot,
                    type_tag = raw.type_tag,
                    error = %err,
                    "Dropping undecodable account update"
                );
                RouteOutcome::Dropped(err)
            }
        };
        stats.record(&outcome);
        outcome
    }

    async fn run(mut self) {
        info!("Subscription router started");

        loop {
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(RouterCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some((address, item)) = self.streams.next(), if !self.streams.is_empty() => {
                    self.handle_account(address, item);
                }
                item = next_slot(&mut self.slots), if self.slots.is_some() => {
                    self.handle_slot(item);
                }
                _ = sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                    self.reconnect().await;
                }
            }
        }

        self.drop_streams();
        info!("Subscription router stopped");
    }

    async fn handle_command(&mut self, command: RouterCommand) {
        match command {
            RouterCommand::Track { address, ack } => {
                let result = self.track(address).await;
                if let Err(err) = &result {
                    debug!(%address, error = %err, "Track did not fetch a value");
                }
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
            }
            RouterCommand::Untrack { address } => {
                if self.tracked.remove(&address) {
                    self.streams.remove(&address);
                    self.registry.remove(&address);
                    debug!(%address, "Untracked address");
                }
            }
            RouterCommand::Resync { ack } => {
                let _ = ack.send(self.resync().await);
            }
            RouterCommand::Shutdown => {}
        }
    }

    async fn track(&mut self, address: Pubkey) -> MirrorResult<()> {
        self.tracked.insert(address);
        if self.state() != ConnectionState::Connected {
            // picked up by the next resync
            return Ok(());
        }

        let result = if self.streams.contains_key(&address) {
            if self.registry.get(&address).is_some() {
                return Ok(());
            }
            self.fetch(address).await
        } else {
            self.open(address).await
        };

        if let Err(err) = &result {
            if err.is_disconnect() {
                self.on_disconnect(err.to_string());
            }
        }
        result
    }

    /// Subscribe first, then fetch, so no change can fall between the two
    async fn open(&mut self, address: Pubkey) -> MirrorResult<()> {
        let stream = self.transport.subscribe(&address).await?;
        let ended = tokio_stream::once(Err(MirrorError::Disconnected(format!(
            "stream for {} ended",
            address
        ))));
        let stream: AccountStream = Box::pin(stream.chain(ended));
        self.streams.insert(address, stream);
        self.registry.set_live(address, true);
        self.fetch(address).await
    }

    async fn fetch(&mut self, address: Pubkey) -> MirrorResult<()> {
        let raw = self.transport.get_account(&address).await?;
        Self::ingest(&self.registry, &self.stats, raw);
        Ok(())
    }

    fn handle_account(&mut self, address: Pubkey, item: MirrorResult<RawAccount>) {
        match item {
            Ok(raw) => {
                Self::ingest(&self.registry, &self.stats, raw);
            }
            Err(err) if err.is_disconnect() => self.on_disconnect(err.to_string()),
            Err(err) => error!(%address, error = %err, "Account stream error"),
        }
    }

    fn handle_slot(&mut self, item: Option<MirrorResult<Slot>>) {
        match item {
            Some(Ok(slot)) => {
                self.stats.heartbeats.fetch_add(1, Ordering::Relaxed);
                self.registry.confirm_slot(slot);
            }
            Some(Err(err)) if err.is_disconnect() => self.on_disconnect(err.to_string()),
            Some(Err(err)) => error!(error = %err, "Slot stream error"),
            None => self.on_disconnect("slot stream ended".to_string()),
        }
    }

    fn on_disconnect(&mut self, reason: String) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        warn!(%reason, tracked = self.tracked.len(), "Transport disconnected, invalidating registry");
        self.drop_streams();
        self.registry.invalidate_all();
        self.set_state(ConnectionState::Disconnected);
        self.stats.disconnects.fetch_add(1, Ordering::Relaxed);
        self.attempts = 0;
        self.reconnect_at = Some(Instant::now() + self.config.reconnect_delay());
    }

    async fn reconnect(&mut self) {
        self.reconnect_at = None;
        self.attempts += 1;
        self.set_state(ConnectionState::Resyncing);

        match self.connect().await {
            Ok(()) => {
                info!(
                    tracked = self.tracked.len(),
                    attempt = self.attempts,
                    "Transport connected and resynchronized"
                );
                self.attempts = 0;
                self.set_state(ConnectionState::Connected);
            }
            Err(err) => {
                self.drop_streams();
                self.registry.invalidate_all();
                if self.attempts >= self.config.max_reconnect_attempts {
                    error!(attempts = self.attempts, error = %err, "Giving up on transport until resync");
                    self.set_state(ConnectionState::Failed);
                } else {
                    warn!(
                        attempt = self.attempts,
                        error = %err,
                        "Reconnect failed, retrying in {:?}",
                        self.config.reconnect_delay()
                    );
                    self.set_state(ConnectionState::Disconnected);
                    self.reconnect_at = Some(Instant::now() + self.config.reconnect_delay());
                }
            }
        }
    }

    /// Heartbeat plus subscribe-and-fetch of every tracked address
    async fn connect(&mut self) -> MirrorResult<()> {
        self.slots = self.transport.subscribe_slots().await?;

        let addresses: Vec<Pubkey> = self.tracked.iter().copied().collect();
        for address in addresses {
            match self.open(address).await {
                Ok(()) => {}
                Err(MirrorError::AccountNotFound { .. }) => {
                    debug!(%address, "Tracked address not on ledger yet");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn resync(&mut self) -> MirrorResult<()> {
        info!(tracked = self.tracked.len(), "Full resync requested");
        self.drop_streams();
        self.registry.invalidate_all();
        self.attempts = 0;
        self.reconnect().await;

        match self.state() {
            ConnectionState::Connected => Ok(()),
            state => Err(MirrorError::Disconnected(format!("resync left transport {}", state))),
        }
    }

    fn drop_streams(&mut self) {
        let addresses: Vec<Pubkey> = self.streams.keys().copied().collect();
        for address in addresses {
            self.streams.remove(&address);
        }
        self.slots = None;
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }
}

async fn next_slot(slots: &mut Option<SlotStream>) -> Option<MirrorResult<Slot>> {
    match slots {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
