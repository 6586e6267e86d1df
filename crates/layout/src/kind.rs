//! Account kinds and their wire type tags

use crate::error::LayoutError;
use crate::layout::AccountLayout;
use crate::{Group, MarginAccount, OpenOrders, OraclePrice, PerpMarket, RootBank, SpotMarket};
use std::fmt;

/// Every account kind the codec can decode.
///
/// The discriminant is the type tag the transport attaches to a raw account.
/// Protocol-owned kinds reuse the program's own metadata `data_type` values;
/// serum and pyth accounts live in a separate tag range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AccountKind {
    Group = 0,
    MarginAccount = 1,
    RootBank = 2,
    PerpMarket = 4,
    OpenOrders = 32,
    SpotMarket = 33,
    OraclePrice = 48,
}

impl AccountKind {
    pub const ALL: [AccountKind; 7] = [
        AccountKind::Group,
        AccountKind::MarginAccount,
        AccountKind::RootBank,
        AccountKind::PerpMarket,
        AccountKind::OpenOrders,
        AccountKind::SpotMarket,
        AccountKind::OraclePrice,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Exact payload length for this kind
    pub fn payload_len(self) -> usize {
        match self {
            AccountKind::Group => Group::LEN,
            AccountKind::MarginAccount => MarginAccount::LEN,
            AccountKind::RootBank => RootBank::LEN,
            AccountKind::PerpMarket => PerpMarket::LEN,
            AccountKind::OpenOrders => OpenOrders::LEN,
            AccountKind::SpotMarket => SpotMarket::LEN,
            AccountKind::OraclePrice => OraclePrice::LEN,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AccountKind::Group => "group",
            AccountKind::MarginAccount => "margin account",
            AccountKind::RootBank => "root bank",
            AccountKind::PerpMarket => "perp market",
            AccountKind::OpenOrders => "open orders",
            AccountKind::SpotMarket => "spot market",
            AccountKind::OraclePrice => "oracle price",
        }
    }
}

impl TryFrom<u8> for AccountKind {
    type Error = LayoutError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        AccountKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or(LayoutError::UnknownType(tag))
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        for kind in AccountKind::ALL {
            assert_eq!(AccountKind::try_from(kind.tag()), Ok(kind));
        }
    }

    #[test]
    fn test_unmirrored_protocol_kinds_are_unknown() {
        // node bank, bids, asks, cache, event queue
        for tag in [3u8, 5, 6, 7, 8, 255] {
            assert_eq!(AccountKind::try_from(tag), Err(LayoutError::UnknownType(tag)));
        }
    }

    #[test]
    fn test_fixed_lengths() {
        assert_eq!(AccountKind::Group.payload_len(), 6032);
        assert_eq!(AccountKind::MarginAccount.payload_len(), 4296);
        assert_eq!(AccountKind::RootBank.payload_len(), 424);
        assert_eq!(AccountKind::PerpMarket.payload_len(), 320);
        assert_eq!(AccountKind::OpenOrders.payload_len(), 3228);
        assert_eq!(AccountKind::SpotMarket.payload_len(), 388);
        assert_eq!(AccountKind::OraclePrice.payload_len(), 3312);
    }
}
