//! Aggregate view builder
//!
//! Resolves everything a margin account's valuation depends on from the
//! registry and checks that the pieces were observed close enough in time to
//! be combined. It never fetches; missing pieces come back as typed errors so
//! the caller can track them and retry.

use crate::core::{DependencyRole, MirrorError, MirrorResult, Slot, SlotRange};
use crate::registry::EntityRegistry;
use chrono::{DateTime, Utc};
use margin_layout::{
    AccountKind, DecodedEntity, Group, MarginAccount, OpenOrders, OraclePrice, PerpMarket, Pubkey,
    RootBank, MAX_PAIRS, MAX_TOKENS,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A registry value together with where and when it was observed
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<T> {
    pub address: Pubkey,
    pub slot: Slot,
    pub value: Arc<T>,
}

/// Entity types the builder can pull out of a [`DecodedEntity`]
pub trait FromEntity: Sized {
    const KIND: AccountKind;

    fn from_entity(entity: &DecodedEntity) -> Option<&Arc<Self>>;
}

macro_rules! impl_from_entity {
    ($($ty:ident => $accessor:ident),* $(,)?) => {
        $(
            impl FromEntity for $ty {
                const KIND: AccountKind = AccountKind::$ty;

                fn from_entity(entity: &DecodedEntity) -> Option<&Arc<Self>> {
                    entity.$accessor()
                }
            }
        )*
    };
}

impl_from_entity!(
    Group => as_group,
    MarginAccount => as_margin_account,
    RootBank => as_root_bank,
    PerpMarket => as_perp_market,
    OpenOrders => as_open_orders,
    OraclePrice => as_oracle_price,
);

/// One address a composed view needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub address: Pubkey,
    pub role: DependencyRole,
}

/// Immutable bundle of everything needed to value one margin account.
/// Maps are keyed by token or market index.
#[derive(Debug, Clone)]
pub struct AggregateView {
    pub margin_account: Observed<MarginAccount>,
    pub group: Observed<Group>,
    pub root_banks: BTreeMap<usize, Observed<RootBank>>,
    pub oracles: BTreeMap<usize, Observed<OraclePrice>>,
    pub open_orders: BTreeMap<usize, Observed<OpenOrders>>,
    pub perp_markets: BTreeMap<usize, Observed<PerpMarket>>,
    pub slot_range: SlotRange,
    pub composed_at: DateTime<Utc>,
}

impl AggregateView {
    pub fn address(&self) -> Pubkey {
        self.margin_account.address
    }

    /// Every address this view was composed from, the margin account included
    pub fn dependencies(&self) -> Vec<Pubkey> {
        let mut addresses = vec![self.margin_account.address, self.group.address];
        addresses.extend(self.root_banks.values().map(|o| o.address));
        addresses.extend(self.oracles.values().map(|o| o.address));
        addresses.extend(self.open_orders.values().map(|o| o.address));
        addresses.extend(self.perp_markets.values().map(|o| o.address));
        addresses
    }
}

/// Market indexes the account has any exposure in
pub(crate) fn participates(account: &MarginAccount, market_index: usize) -> bool {
    account.has_balance(market_index)
        || account.basket_open_orders(market_index).is_some()
        || account.perp_account(market_index).is_some()
}

/// Addresses a margin account's view needs beyond the account and its group
pub fn plan(account: &MarginAccount, group: &Group) -> Vec<Requirement> {
    let mut requirements = Vec::new();

    for token_index in 0..MAX_TOKENS {
        if account.has_balance(token_index) {
            requirements.push(Requirement {
                address: group.tokens[token_index].root_bank,
                role: DependencyRole::RootBank { token_index },
            });
        }
    }

    for market_index in 0..MAX_PAIRS {
        if !participates(account, market_index) {
            continue;
        }
        requirements.push(Requirement {
            address: group.oracle(market_index).unwrap_or_default(),
            role: DependencyRole::Oracle { market_index },
        });
        if let Some(address) = account.basket_open_orders(market_index) {
            requirements.push(Requirement {
                address,
                role: DependencyRole::OpenOrders { market_index },
            });
        }
        if account.perp_account(market_index).is_some() {
            requirements.push(Requirement {
                address: group.perp_markets[market_index].perp_market,
                role: DependencyRole::PerpMarket { market_index },
            });
        }
    }

    requirements
}

pub struct ViewBuilder {
    registry: Arc<EntityRegistry>,
    staleness_tolerance: u64,
}

impl ViewBuilder {
    pub fn new(registry: Arc<EntityRegistry>, staleness_tolerance: u64) -> Self {
        Self {
            registry,
            staleness_tolerance,
        }
    }

    pub fn staleness_tolerance(&self) -> u64 {
        self.staleness_tolerance
    }

    /// Compose the view for `margin_account` from current registry state
    pub fn build(&self, margin_account: &Pubkey) -> MirrorResult<AggregateView> {
        let account: Observed<MarginAccount> =
            self.resolve(*margin_account, DependencyRole::MarginAccount)?;
        let group: Observed<Group> = self.resolve(account.value.group, DependencyRole::Group)?;

        let mut range = SlotRange::new(account.slot);
        range.include(group.slot);

        let mut root_banks = BTreeMap::new();
        let mut oracles = BTreeMap::new();
        let mut open_orders = BTreeMap::new();
        let mut perp_markets = BTreeMap::new();

        for requirement in plan(&account.value, &group.value) {
            match requirement.role {
                DependencyRole::RootBank { token_index } => {
                    let observed: Observed<RootBank> = self.resolve(requirement.address, requirement.role)?;
                    range.include(observed.slot);
                    root_banks.insert(token_index, observed);
                }
                DependencyRole::Oracle { market_index } => {
                    let observed: Observed<OraclePrice> = self.resolve(requirement.address, requirement.role)?;
                    range.include(observed.slot);
                    oracles.insert(market_index, observed);
                }
                DependencyRole::OpenOrders { market_index } => {
                    let observed: Observed<OpenOrders> = self.resolve(requirement.address, requirement.role)?;
                    range.include(observed.slot);
                    open_orders.insert(market_index, observed);
                }
                DependencyRole::PerpMarket { market_index } => {
                    let observed: Observed<PerpMarket> = self.resolve(requirement.address, requirement.role)?;
                    range.include(observed.slot);
                    perp_markets.insert(market_index, observed);
                }
                DependencyRole::MarginAccount | DependencyRole::Group => {}
            }
        }

        if range.spread() > self.staleness_tolerance {
            return Err(MirrorError::StaleComposition {
                min: range.min,
                max: range.max,
                tolerance: self.staleness_tolerance,
            });
        }

        Ok(AggregateView {
            margin_account: account,
            group,
            root_banks,
            oracles,
            open_orders,
            perp_markets,
            slot_range: range,
            composed_at: Utc::now(),
        })
    }

    /// Every address the view for `margin_account` is known to need so far.
    /// Stops expanding where a missing entity hides further references.
    pub fn requirements(&self, margin_account: &Pubkey) -> Vec<Requirement> {
        let mut requirements = vec![Requirement {
            address: *margin_account,
            role: DependencyRole::MarginAccount,
        }];

        let account = match self.resolve::<MarginAccount>(*margin_account, DependencyRole::MarginAccount) {
            Ok(account) => account,
            Err(_) => return requirements,
        };
        requirements.push(Requirement {
            address: account.value.group,
            role: DependencyRole::Group,
        });

        if let Ok(group) = self.resolve::<Group>(account.value.group, DependencyRole::Group) {
            requirements.extend(
                plan(&account.value, &group.value)
                    .into_iter()
                    .filter(|r| r.address != Pubkey::default()),
            );
        }
        requirements
    }

    fn resolve<T: FromEntity>(&self, address: Pubkey, role: DependencyRole) -> MirrorResult<Observed<T>> {
        if address == Pubkey::default() {
            return Err(MirrorError::MissingDependency { address, role });
        }
        let versioned = self
            .registry
            .get(&address)
            .ok_or(MirrorError::MissingDependency { address, role })?;
        let value = T::from_entity(&versioned.entity)
            .cloned()
            .ok_or(MirrorError::WrongEntityType {
                address,
                expected: T::KIND,
                found: versioned.entity.kind(),
            })?;
        Ok(Observed {
            address,
            slot: versioned.observed_slot,
            value,
        })
    }
}
