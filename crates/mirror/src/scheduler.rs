//! Push trigger: recomposes watched margin accounts when their inputs move
//!
//! The scheduler listens to registry events, maps each changed address to the
//! watched accounts whose views depend on it, and recomposes every dirty
//! account once per coalescing window. Dependencies are reference counted
//! across watched accounts; an address nobody references any more is released
//! according to the idle policy.

use crate::config::{IdlePolicy, SyncConfig};
use crate::core::{MirrorError, MirrorResult};
use crate::notifier::ChangeNotifier;
use crate::registry::{EntityRegistry, RegistryEvent};
use crate::risk::RiskCalculator;
use crate::router::RouterHandle;
use crate::view::ViewBuilder;
use dashmap::DashSet;
use margin_layout::Pubkey;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum TriggerCommand {
    Watch { address: Pubkey },
    Shutdown,
}

#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<TriggerCommand>,
}

impl SchedulerHandle {
    /// Start pushing snapshots of `address` to its notifier channel
    pub async fn watch(&self, address: Pubkey) -> MirrorResult<()> {
        self.commands
            .send(TriggerCommand::Watch { address })
            .await
            .map_err(|_| MirrorError::ChannelClosed("scheduler commands"))
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(TriggerCommand::Shutdown).await;
    }
}

/// Everything the scheduler needs from the rest of the mirror
pub struct SchedulerParts {
    pub registry: Arc<EntityRegistry>,
    pub builder: Arc<ViewBuilder>,
    pub calculator: Arc<RiskCalculator>,
    pub notifier: Arc<ChangeNotifier>,
    pub released: mpsc::UnboundedReceiver<Pubkey>,
    pub router: RouterHandle,
    /// Addresses loaded on demand; never released by the scheduler
    pub pinned: Arc<DashSet<Pubkey>>,
}

pub struct PushScheduler {
    builder: Arc<ViewBuilder>,
    calculator: Arc<RiskCalculator>,
    notifier: Arc<ChangeNotifier>,
    router: RouterHandle,
    pinned: Arc<DashSet<Pubkey>>,
    window: Duration,
    idle_policy: IdlePolicy,
    commands: mpsc::Receiver<TriggerCommand>,
    released: mpsc::UnboundedReceiver<Pubkey>,
    events: broadcast::Receiver<RegistryEvent>,
    watched: HashSet<Pubkey>,
    /// Watched account -> addresses its view needs
    dependencies: HashMap<Pubkey, HashSet<Pubkey>>,
    /// Address -> watched accounts that need it
    dependents: HashMap<Pubkey, HashSet<Pubkey>>,
    /// Addresses this scheduler asked the router to track
    tracked: HashSet<Pubkey>,
    dirty: HashSet<Pubkey>,
    /// Accounts whose last composition failed and should retry on the next heartbeat
    pending: HashSet<Pubkey>,
    flush_at: Option<Instant>,
    idle: HashMap<Pubkey, Instant>,
}

impl PushScheduler {
    pub fn spawn(parts: SchedulerParts, config: &SyncConfig) -> (SchedulerHandle, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::channel(64);
        let scheduler = Self {
            builder: parts.builder,
            calculator: parts.calculator,
            notifier: parts.notifier,
            router: parts.router,
            pinned: parts.pinned,
            window: config.coalescing_window(),
            idle_policy: config.idle_policy,
            commands,
            released: parts.released,
            events: parts.registry.events(),
            watched: HashSet::new(),
            dependencies: HashMap::new(),
            dependents: HashMap::new(),
            tracked: HashSet::new(),
            dirty: HashSet::new(),
            pending: HashSet::new(),
            flush_at: None,
            idle: HashMap::new(),
        };
        let handle = SchedulerHandle {
            commands: commands_tx,
        };
        (handle, tokio::spawn(scheduler.run()))
    }

    async fn run(mut self) {
        info!(window = ?self.window, policy = ?self.idle_policy, "Push scheduler started");

        loop {
            let flush_at = self.flush_at;
            let idle_at = self.idle.values().min().copied();
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(TriggerCommand::Watch { address }) => self.watch(address).await,
                    Some(TriggerCommand::Shutdown) | None => break,
                },
                Some(address) = self.released.recv() => {
                    self.unwatch(address).await;
                }
                event = self.events.recv() => match event {
                    Ok(event) => self.on_event(event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Registry events lagged, recomposing every watched account");
                        let all: Vec<Pubkey> = self.watched.iter().copied().collect();
                        self.mark_dirty(all);
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
                    self.flush().await;
                }
                _ = sleep_until(idle_at.unwrap_or_else(Instant::now)), if idle_at.is_some() => {
                    self.expire_idle().await;
                }
            }
        }

        info!(watched = self.watched.len(), "Push scheduler stopped");
    }

    async fn watch(&mut self, address: Pubkey) {
        if self.watched.insert(address) {
            debug!(%address, "Watching margin account");
            let requirements = self.requirement_addresses(&address);
            self.set_dependencies(address, requirements).await;
        }
        // a channel recreated after a release starts empty
        self.mark_dirty([address]);
    }

    async fn unwatch(&mut self, address: Pubkey) {
        // a fresh subscriber may have raced in after the release was sent
        if self.notifier.is_watched(&address) || !self.watched.remove(&address) {
            return;
        }
        debug!(%address, "Margin account no longer watched");
        self.dirty.remove(&address);
        self.pending.remove(&address);
        self.set_dependencies(address, HashSet::new()).await;
    }

    fn on_event(&mut self, event: RegistryEvent) {
        match event {
            RegistryEvent::Updated { address, .. } => {
                if let Some(accounts) = self.dependents.get(&address) {
                    let accounts: Vec<Pubkey> = accounts.iter().copied().collect();
                    self.mark_dirty(accounts);
                }
            }
            RegistryEvent::SlotConfirmed { .. } => {
                let pending: Vec<Pubkey> = self.pending.iter().copied().collect();
                self.mark_dirty(pending);
            }
            RegistryEvent::Invalidated { epoch } => {
                debug!(epoch, "Registry invalidated");
                // nothing composed before the gap may reach a new watcher
                self.notifier.invalidate();
                let all: Vec<Pubkey> = self.watched.iter().copied().collect();
                self.mark_dirty(all);
            }
        }
    }

    fn mark_dirty(&mut self, accounts: impl IntoIterator<Item = Pubkey>) {
        let before = self.dirty.len();
        self.dirty.extend(accounts);
        if self.dirty.len() > before && self.flush_at.is_none() {
            self.flush_at = Some(Instant::now() + self.window);
        }
    }

    /// Recompose every dirty account once
    async fn flush(&mut self) {
        self.flush_at = None;
        let dirty: Vec<Pubkey> = self.dirty.drain().collect();

        for address in dirty {
            if !self.watched.contains(&address) {
                continue;
            }
            match self.builder.build(&address) {
                Ok(view) => {
                    self.pending.remove(&address);
                    let snapshot = self.calculator.evaluate(&view);
                    debug!(
                        %address,
                        slots = %view.slot_range,
                        leverage = ?snapshot.leverage,
                        "Recomposed margin account"
                    );
                    self.notifier.publish(&address, snapshot);
                    let dependencies = view.dependencies().into_iter().collect();
                    self.set_dependencies(address, dependencies).await;
                }
                Err(err) => {
                    if err.is_transient() {
                        debug!(%address, error = %err, "Composition deferred");
                    } else {
                        warn!(%address, error = %err, "Composition failed");
                    }
                    self.notifier.withdraw(&address);
                    self.pending.insert(address);
                    // failures only widen the set; a missing entity hides what lies behind it
                    let mut requirements = self.requirement_addresses(&address);
                    if let Some(previous) = self.dependencies.get(&address) {
                        requirements.extend(previous.iter().copied());
                    }
                    self.set_dependencies(address, requirements).await;
                }
            }
        }
    }

    fn requirement_addresses(&self, address: &Pubkey) -> HashSet<Pubkey> {
        self.builder
            .requirements(address)
            .into_iter()
            .map(|requirement| requirement.address)
            .collect()
    }

    /// Replace the dependency set of `account`, tracking new addresses and
    /// releasing ones nobody references any more
    async fn set_dependencies(&mut self, account: Pubkey, next: HashSet<Pubkey>) {
        let previous = self.dependencies.remove(&account).unwrap_or_default();

        for address in next.difference(&previous) {
            self.dependents.entry(*address).or_default().insert(account);
            self.idle.remove(address);
            if self.tracked.insert(*address) {
                if let Err(err) = self.router.request_track(*address).await {
                    warn!(%address, error = %err, "Could not track dependency");
                    self.tracked.remove(address);
                }
            }
        }

        for address in previous.difference(&next) {
            let unreferenced = match self.dependents.get_mut(address) {
                Some(accounts) => {
                    accounts.remove(&account);
                    accounts.is_empty()
                }
                None => true,
            };
            if unreferenced {
                self.dependents.remove(address);
                self.release(*address).await;
            }
        }

        if !next.is_empty() {
            self.dependencies.insert(account, next);
        }
    }

    async fn release(&mut self, address: Pubkey) {
        if !self.tracked.contains(&address) || self.pinned.contains(&address) {
            return;
        }
        match self.idle_policy {
            IdlePolicy::Never => {}
            IdlePolicy::Immediate => self.untrack(address).await,
            IdlePolicy::AfterIdle { secs } => {
                self.idle
                    .insert(address, Instant::now() + Duration::from_secs(secs));
            }
        }
    }

    async fn expire_idle(&mut self) {
        let now = Instant::now();
        let expired: Vec<Pubkey> = self
            .idle
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(address, _)| *address)
            .collect();
        for address in expired {
            self.idle.remove(&address);
            if !self.dependents.contains_key(&address) && !self.pinned.contains(&address) {
                self.untrack(address).await;
            }
        }
    }

    async fn untrack(&mut self, address: Pubkey) {
        self.tracked.remove(&address);
        debug!(%address, "Releasing idle subscription");
        if let Err(err) = self.router.untrack(address).await {
            warn!(%address, error = %err, "Could not release subscription");
        }
    }
}
