//! Tag-dispatched decoding into a closed set of entity variants

use crate::error::LayoutResult;
use crate::kind::AccountKind;
use crate::layout::AccountLayout;
use crate::{Group, MarginAccount, OpenOrders, OraclePrice, PerpMarket, RootBank, SpotMarket};
use std::sync::Arc;

/// A decoded account. Payloads are shared so registry reads never copy them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEntity {
    Group(Arc<Group>),
    MarginAccount(Arc<MarginAccount>),
    RootBank(Arc<RootBank>),
    PerpMarket(Arc<PerpMarket>),
    SpotMarket(Arc<SpotMarket>),
    OpenOrders(Arc<OpenOrders>),
    OraclePrice(Arc<OraclePrice>),
}

impl DecodedEntity {
    pub fn kind(&self) -> AccountKind {
        match self {
            DecodedEntity::Group(_) => AccountKind::Group,
            DecodedEntity::MarginAccount(_) => AccountKind::MarginAccount,
            DecodedEntity::RootBank(_) => AccountKind::RootBank,
            DecodedEntity::PerpMarket(_) => AccountKind::PerpMarket,
            DecodedEntity::SpotMarket(_) => AccountKind::SpotMarket,
            DecodedEntity::OpenOrders(_) => AccountKind::OpenOrders,
            DecodedEntity::OraclePrice(_) => AccountKind::OraclePrice,
        }
    }

    pub fn type_tag(&self) -> u8 {
        self.kind().tag()
    }

    pub fn as_group(&self) -> Option<&Arc<Group>> {
        match self {
            DecodedEntity::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_margin_account(&self) -> Option<&Arc<MarginAccount>> {
        match self {
            DecodedEntity::MarginAccount(account) => Some(account),
            _ => None,
        }
    }

    pub fn as_root_bank(&self) -> Option<&Arc<RootBank>> {
        match self {
            DecodedEntity::RootBank(bank) => Some(bank),
            _ => None,
        }
    }

    pub fn as_perp_market(&self) -> Option<&Arc<PerpMarket>> {
        match self {
            DecodedEntity::PerpMarket(market) => Some(market),
            _ => None,
        }
    }

    pub fn as_spot_market(&self) -> Option<&Arc<SpotMarket>> {
        match self {
            DecodedEntity::SpotMarket(market) => Some(market),
            _ => None,
        }
    }

    pub fn as_open_orders(&self) -> Option<&Arc<OpenOrders>> {
        match self {
            DecodedEntity::OpenOrders(open_orders) => Some(open_orders),
            _ => None,
        }
    }

    pub fn as_oracle_price(&self) -> Option<&Arc<OraclePrice>> {
        match self {
            DecodedEntity::OraclePrice(price) => Some(price),
            _ => None,
        }
    }
}

macro_rules! impl_from_layout {
    ($($ty:ident),*) => {
        $(
            impl From<$ty> for DecodedEntity {
                fn from(value: $ty) -> Self {
                    DecodedEntity::$ty(Arc::new(value))
                }
            }
        )*
    };
}

impl_from_layout!(Group, MarginAccount, RootBank, PerpMarket, SpotMarket, OpenOrders, OraclePrice);

/// Decode a payload according to its transport type tag.
///
/// Unknown tags fail with `UnknownType`; length, marker or field errors fail
/// with `MalformedLayout`. Neither outcome is fatal to the caller's stream.
pub fn decode(type_tag: u8, data: &[u8]) -> LayoutResult<DecodedEntity> {
    let entity = match AccountKind::try_from(type_tag)? {
        AccountKind::Group => Group::unpack(data)?.into(),
        AccountKind::MarginAccount => MarginAccount::unpack(data)?.into(),
        AccountKind::RootBank => RootBank::unpack(data)?.into(),
        AccountKind::PerpMarket => PerpMarket::unpack(data)?.into(),
        AccountKind::SpotMarket => SpotMarket::unpack(data)?.into(),
        AccountKind::OpenOrders => OpenOrders::unpack(data)?.into(),
        AccountKind::OraclePrice => OraclePrice::unpack(data)?.into(),
    };
    Ok(entity)
}

/// Exact inverse of [`decode`] for every entity it produces
pub fn encode(entity: &DecodedEntity) -> Vec<u8> {
    match entity {
        DecodedEntity::Group(value) => value.pack(),
        DecodedEntity::MarginAccount(value) => value.pack(),
        DecodedEntity::RootBank(value) => value.pack(),
        DecodedEntity::PerpMarket(value) => value.pack(),
        DecodedEntity::SpotMarket(value) => value.pack(),
        DecodedEntity::OpenOrders(value) => value.pack(),
        DecodedEntity::OraclePrice(value) => value.pack(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LayoutError;

    #[test]
    fn test_unknown_tag() {
        assert_eq!(decode(3, &[]), Err(LayoutError::UnknownType(3)));
    }

    #[test]
    fn test_tag_mismatch_fails_closed() {
        // a root bank payload delivered with the perp market tag
        let bytes = RootBank::default().pack();
        let err = decode(AccountKind::PerpMarket.tag(), &bytes).unwrap_err();
        assert_eq!(err.kind(), Some(AccountKind::PerpMarket));
    }

    #[test]
    fn test_decode_dispatch() {
        let entity = decode(AccountKind::RootBank.tag(), &RootBank::default().pack()).unwrap();
        assert_eq!(entity.kind(), AccountKind::RootBank);
        assert!(entity.as_root_bank().is_some());
        assert!(entity.as_group().is_none());
        assert_eq!(encode(&entity), RootBank::default().pack());
    }
}
