//! Public entry point wiring router, registry, builder, calculator and notifier

use crate::config::MirrorConfig;
use crate::core::{AccountTransport, ConnectionState, MirrorError, MirrorResult};
use crate::notifier::{ChangeNotifier, RiskStream};
use crate::registry::EntityRegistry;
use crate::risk::{RiskCalculator, RiskSnapshot};
use crate::router::{RouterHandle, RouterStatsSnapshot, SubscriptionRouter};
use crate::scheduler::{PushScheduler, SchedulerHandle, SchedulerParts};
use crate::view::{AggregateView, ViewBuilder};
use dashmap::DashSet;
use margin_layout::{DecodedEntity, Pubkey};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Each round can only reveal the next layer of references
/// (account, group, then per-market entities), so a handful suffices.
const MAX_LOAD_ROUNDS: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct MirrorStats {
    pub router: RouterStatsSnapshot,
    pub connection: ConnectionState,
    pub registry_entries: usize,
    pub epoch: u64,
    pub confirmed_slot: u64,
    pub watched: usize,
}

pub struct MarginMirror {
    registry: Arc<EntityRegistry>,
    builder: Arc<ViewBuilder>,
    calculator: Arc<RiskCalculator>,
    notifier: Arc<ChangeNotifier>,
    router: RouterHandle,
    scheduler: SchedulerHandle,
    pinned: Arc<DashSet<Pubkey>>,
    tasks: Vec<JoinHandle<()>>,
}

impl MarginMirror {
    /// Validate `config`, connect the transport and start the background tasks
    pub async fn start(transport: Arc<dyn AccountTransport>, config: MirrorConfig) -> MirrorResult<Self> {
        config.validate()?;

        let registry = Arc::new(EntityRegistry::new(config.sync.change_buffer));
        let (router, router_task) =
            SubscriptionRouter::spawn(transport, registry.clone(), config.transport.clone()).await;

        let builder = Arc::new(ViewBuilder::new(
            registry.clone(),
            config.sync.staleness_tolerance_slots,
        ));
        let calculator = Arc::new(RiskCalculator::from_config(&config.risk));
        let (notifier, released) = ChangeNotifier::new();
        let pinned = Arc::new(DashSet::new());

        let (scheduler, scheduler_task) = PushScheduler::spawn(
            SchedulerParts {
                registry: registry.clone(),
                builder: builder.clone(),
                calculator: calculator.clone(),
                notifier: notifier.clone(),
                released,
                router: router.clone(),
                pinned: pinned.clone(),
            },
            &config.sync,
        );

        info!(
            tolerance = config.sync.staleness_tolerance_slots,
            window_ms = config.sync.coalescing_window_ms,
            health_type = ?config.risk.health_type,
            connection = %router.state(),
            "Margin mirror started"
        );

        Ok(Self {
            registry,
            builder,
            calculator,
            notifier,
            router,
            scheduler,
            pinned,
            tasks: vec![router_task, scheduler_task],
        })
    }

    /// Current decoded value of `address`, fetching and tracking it if unknown
    pub async fn resolve(&self, address: &Pubkey) -> MirrorResult<DecodedEntity> {
        if let Some(versioned) = self.registry.get(address) {
            return Ok(versioned.entity);
        }
        self.track(*address).await?;
        self.registry
            .get(address)
            .map(|versioned| versioned.entity)
            .ok_or_else(|| self.unavailable(*address))
    }

    /// Track everything the view of `margin_account` needs and compose it
    pub async fn load(&self, margin_account: &Pubkey) -> MirrorResult<AggregateView> {
        let mut last_error = None;

        for round in 0..MAX_LOAD_ROUNDS {
            match self.builder.build(margin_account) {
                Ok(view) => return Ok(view),
                Err(err) if err.is_transient() => {
                    let missing: Vec<Pubkey> = self
                        .builder
                        .requirements(margin_account)
                        .into_iter()
                        .map(|requirement| requirement.address)
                        .filter(|address| self.registry.get(address).is_none())
                        .collect();
                    if missing.is_empty() {
                        return Err(err);
                    }
                    debug!(%margin_account, round, missing = missing.len(), "Loading dependencies");
                    for address in missing {
                        self.track(address).await?;
                    }
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        match self.builder.build(margin_account) {
            Ok(view) => Ok(view),
            Err(err) => Err(last_error.unwrap_or(err)),
        }
    }

    /// Compose from what is already mirrored, without fetching
    pub fn build_view(&self, margin_account: &Pubkey) -> MirrorResult<AggregateView> {
        self.builder.build(margin_account)
    }

    pub fn evaluate(&self, margin_account: &Pubkey) -> MirrorResult<RiskSnapshot> {
        let view = self.builder.build(margin_account)?;
        Ok(self.calculator.evaluate(&view))
    }

    /// Snapshots of `margin_account` whenever its valuation changes.
    /// Dropping the stream releases the watch.
    pub async fn watch(&self, margin_account: Pubkey) -> MirrorResult<RiskStream> {
        let stream = self.notifier.subscribe(margin_account);
        self.scheduler.watch(margin_account).await?;
        Ok(stream)
    }

    /// Last snapshot pushed to watchers of `margin_account`, if still current
    pub fn latest(&self, margin_account: &Pubkey) -> Option<Arc<RiskSnapshot>> {
        self.notifier.latest(margin_account)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.router.state()
    }

    pub fn connection_changes(&self) -> watch::Receiver<ConnectionState> {
        self.router.state_changes()
    }

    pub fn stats(&self) -> MirrorStats {
        MirrorStats {
            router: self.router.stats(),
            connection: self.router.state(),
            registry_entries: self.registry.len(),
            epoch: self.registry.epoch(),
            confirmed_slot: self.registry.confirmed_slot(),
            watched: self.notifier.watched().len(),
        }
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn calculator(&self) -> &RiskCalculator {
        &self.calculator
    }

    /// Invalidate everything and refetch every tracked address
    pub async fn resync(&self) -> MirrorResult<()> {
        self.router.resync().await
    }

    pub async fn shutdown(self) {
        info!("Shutting down margin mirror");
        self.scheduler.shutdown().await;
        self.router.shutdown().await;
        for task in self.tasks {
            let _ = task.await;
        }
    }

    async fn track(&self, address: Pubkey) -> MirrorResult<()> {
        self.pinned.insert(address);
        self.router.track(address).await
    }

    fn unavailable(&self, address: Pubkey) -> MirrorError {
        match self.router.state() {
            ConnectionState::Connected => MirrorError::AccountNotFound { address },
            state => MirrorError::Disconnected(format!("transport {}", state)),
        }
    }
}
