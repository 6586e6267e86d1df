//! Fixed binary layouts for the margin-trading protocol accounts
//!
//! Every account kind the mirror understands has exactly one fixed-size schema,
//! versioned in lock-step with the on-chain program. Decoding is pure: bytes in,
//! typed structures out, and any mismatch in length or embedded marker fails
//! closed with [`LayoutError::MalformedLayout`] instead of guessing.
//!
//! The general approach is:
//! * each kind implements [`AccountLayout`] with a `read`/`write` pair over a
//!   bounds-checked [`Reader`]/[`Writer`];
//! * [`decode`] dispatches on the transport-supplied type tag and wraps the
//!   result in a [`DecodedEntity`];
//! * [`encode`] is the exact inverse for every valid entity.

pub mod constants;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod group;
pub mod kind;
pub mod layout;
pub mod margin_account;
pub mod metadata;
pub mod oracle;
pub mod perp_market;
pub mod root_bank;
pub mod serum;
pub mod units;

// Re-export commonly used types
pub use constants::*;
pub use cursor::{Packed, Reader, Writer};
pub use entity::{decode, encode, DecodedEntity};
pub use error::{LayoutError, LayoutResult};
pub use group::{Group, PerpMarketInfo, SpotMarketInfo, TokenInfo};
pub use kind::AccountKind;
pub use layout::AccountLayout;
pub use margin_account::{MarginAccount, PerpAccount, PerpOpenOrder, Side};
pub use metadata::DataType;
pub use oracle::{OraclePrice, PriceComponent, PriceInfo, PriceStatus};
pub use perp_market::{LiquidityMiningInfo, PerpMarket};
pub use root_bank::RootBank;
pub use serum::{AccountFlags, OpenOrders, SerumOrderSlot, SpotMarket};

pub use fixed::types::I80F48;
pub use solana_program::pubkey::Pubkey;
