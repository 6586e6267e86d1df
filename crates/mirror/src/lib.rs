//! Margin account mirror
//!
//! Keeps a consistent in-process model of a margin-trading protocol's on-chain
//! accounts and derives solvency metrics from it as they change.
//!
//! Data flows one way:
//! transport → [`router`] → [`registry`] → [`view`] → [`risk`] → [`notifier`] → caller,
//! with [`scheduler`] deciding when a watched account is recomposed and
//! [`engine::MarginMirror`] tying the pieces together.

pub mod adapters;
pub mod config;
pub mod core;
pub mod engine;
pub mod notifier;
pub mod registry;
pub mod risk;
pub mod router;
pub mod scheduler;
pub mod telemetry;
pub mod view;

// Re-export commonly used types
pub use crate::adapters::InMemoryLedger;
pub use crate::config::{IdlePolicy, MirrorConfig};
pub use crate::core::{
    AccountStream, AccountTransport, ConnectionState, DependencyRole, MirrorError, MirrorResult,
    RawAccount, Slot, SlotRange, SlotStream,
};
pub use engine::{MarginMirror, MirrorStats};
pub use notifier::{ChangeNotifier, RiskStream};
pub use registry::{EntityRegistry, PutOutcome, RegistryEvent, Versioned};
pub use risk::{HealthType, Leverage, RiskCalculator, RiskSnapshot, UndefinedReason, Verdict};
pub use router::{RouteOutcome, RouterHandle, RouterStats, RouterStatsSnapshot, SubscriptionRouter};
pub use scheduler::{PushScheduler, SchedulerHandle};
pub use view::{AggregateView, Observed, ViewBuilder};

pub use margin_layout;
