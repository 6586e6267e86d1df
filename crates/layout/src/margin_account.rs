//! Margin account: one trader's balances, positions and resting perp orders

use crate::constants::{
    FREE_ORDER_SLOT, INFO_LEN, MARGIN_ACCOUNT_VERSIONS, MAX_PAIRS, MAX_PERP_OPEN_ORDERS, MAX_TOKENS,
};
use crate::cursor::{Packed, Reader, Writer};
use crate::error::LayoutResult;
use crate::kind::AccountKind;
use crate::layout::AccountLayout;
use crate::metadata::{self, DataType};
use fixed::types::I80F48;
use solana_program::pubkey::Pubkey;

// ============================================================================
// Perp Positions
// ============================================================================

/// Position in one perp market, in lots (base) and native quote units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerpAccount {
    pub base_position: i64,
    pub quote_position: I80F48,
    pub long_settled_funding: I80F48,
    pub short_settled_funding: I80F48,
    pub bids_quantity: i64,
    pub asks_quantity: i64,
    pub taker_base: i64,
    pub taker_quote: i64,
    pub mngo_accrued: u64,
}

impl PerpAccount {
    /// True when there is nothing to value in this market
    pub fn is_empty(&self) -> bool {
        self.base_position == 0
            && self.quote_position == I80F48::ZERO
            && self.bids_quantity == 0
            && self.asks_quantity == 0
            && self.taker_base == 0
            && self.taker_quote == 0
    }
}

impl Packed for PerpAccount {
    const SIZE: usize = 96;

    fn read_from(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        Ok(Self {
            base_position: reader.i64()?,
            quote_position: reader.i80f48()?,
            long_settled_funding: reader.i80f48()?,
            short_settled_funding: reader.i80f48()?,
            bids_quantity: reader.i64()?,
            asks_quantity: reader.i64()?,
            taker_base: reader.i64()?,
            taker_quote: reader.i64()?,
            mngo_accrued: reader.u64()?,
        })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.put_i64(self.base_position);
        writer.put_i80f48(self.quote_position);
        writer.put_i80f48(self.long_settled_funding);
        writer.put_i80f48(self.short_settled_funding);
        writer.put_i64(self.bids_quantity);
        writer.put_i64(self.asks_quantity);
        writer.put_i64(self.taker_base);
        writer.put_i64(self.taker_quote);
        writer.put_u64(self.mngo_accrued);
    }
}

// ============================================================================
// Perp Orders
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    Bid = 0,
    Ask = 1,
}

/// An occupied perp order slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerpOpenOrder {
    pub slot: u8,
    pub market_index: u8,
    pub side: Side,
    pub order_id: i128,
    pub client_order_id: u64,
}

// ============================================================================
// Margin Account
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginAccount {
    pub version: u8,
    pub group: Pubkey,
    pub owner: Pubkey,
    pub in_margin_basket: [bool; MAX_PAIRS],
    pub num_in_margin_basket: u8,
    pub deposits: [I80F48; MAX_TOKENS],
    pub borrows: [I80F48; MAX_TOKENS],
    pub spot_open_orders: [Pubkey; MAX_PAIRS],
    pub perp_accounts: [PerpAccount; MAX_PAIRS],
    /// Occupied order slots only, ascending by slot
    pub perp_orders: Vec<PerpOpenOrder>,
    pub msrm_amount: u64,
    pub being_liquidated: bool,
    pub is_bankrupt: bool,
    pub info: [u8; INFO_LEN],
    pub advanced_orders: Pubkey,
    pub not_upgradable: bool,
    pub delegate: Pubkey,
}

impl Default for MarginAccount {
    fn default() -> Self {
        Self {
            version: 0,
            group: Pubkey::default(),
            owner: Pubkey::default(),
            in_margin_basket: [false; MAX_PAIRS],
            num_in_margin_basket: 0,
            deposits: [I80F48::ZERO; MAX_TOKENS],
            borrows: [I80F48::ZERO; MAX_TOKENS],
            spot_open_orders: [Pubkey::default(); MAX_PAIRS],
            perp_accounts: [PerpAccount::default(); MAX_PAIRS],
            perp_orders: Vec::new(),
            msrm_amount: 0,
            being_liquidated: false,
            is_bankrupt: false,
            info: [0; INFO_LEN],
            advanced_orders: Pubkey::default(),
            not_upgradable: false,
            delegate: Pubkey::default(),
        }
    }
}

impl MarginAccount {
    /// Open orders account for market `index` if it is in the margin basket
    pub fn basket_open_orders(&self, index: usize) -> Option<Pubkey> {
        if !self.in_margin_basket.get(index).copied().unwrap_or(false) {
            return None;
        }
        self.spot_open_orders
            .get(index)
            .copied()
            .filter(|address| *address != Pubkey::default())
    }

    /// Whether the token at `index` carries a deposit or a borrow
    pub fn has_balance(&self, index: usize) -> bool {
        self.deposits.get(index).is_some_and(|v| *v != I80F48::ZERO)
            || self.borrows.get(index).is_some_and(|v| *v != I80F48::ZERO)
    }

    pub fn perp_account(&self, index: usize) -> Option<&PerpAccount> {
        self.perp_accounts.get(index).filter(|account| !account.is_empty())
    }
}

impl AccountLayout for MarginAccount {
    const KIND: AccountKind = AccountKind::MarginAccount;
    const LEN: usize = 4296;

    fn read(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        let version = metadata::read_header(reader, DataType::MarginAccount, MARGIN_ACCOUNT_VERSIONS)?;
        let group = reader.pubkey()?;
        let owner = reader.pubkey()?;
        let in_margin_basket = reader.read_array()?;
        let num_in_margin_basket = reader.u8()?;
        let deposits = reader.read_array()?;
        let borrows = reader.read_array()?;
        let spot_open_orders = reader.read_array()?;
        let perp_accounts = reader.read_array()?;

        let order_market = reader.fixed::<MAX_PERP_OPEN_ORDERS>()?;
        let side_start = reader.offset();
        let order_side = reader.fixed::<MAX_PERP_OPEN_ORDERS>()?;
        let mut order_ids = [0i128; MAX_PERP_OPEN_ORDERS];
        for id in order_ids.iter_mut() {
            *id = reader.i128()?;
        }
        let mut client_ids = [0u64; MAX_PERP_OPEN_ORDERS];
        for id in client_ids.iter_mut() {
            *id = reader.u64()?;
        }

        let mut perp_orders = Vec::new();
        for slot in 0..MAX_PERP_OPEN_ORDERS {
            let market_index = order_market[slot];
            if market_index == FREE_ORDER_SLOT {
                continue;
            }
            if market_index as usize >= MAX_PAIRS {
                return Err(reader.malformed(format!(
                    "order slot {} references market {}",
                    slot, market_index
                )));
            }
            let side = match order_side[slot] {
                0 => Side::Bid,
                1 => Side::Ask,
                other => {
                    return Err(reader.malformed(format!(
                        "order slot {} has side {} (side array starts at {})",
                        slot, other, side_start
                    )))
                }
            };
            perp_orders.push(PerpOpenOrder {
                slot: slot as u8,
                market_index,
                side,
                order_id: order_ids[slot],
                client_order_id: client_ids[slot],
            });
        }

        let msrm_amount = reader.u64()?;
        let being_liquidated = reader.bool()?;
        let is_bankrupt = reader.bool()?;
        let info = reader.fixed::<INFO_LEN>()?;
        let advanced_orders = reader.pubkey()?;
        let not_upgradable = reader.bool()?;
        let delegate = reader.pubkey()?;
        reader.skip(5)?;

        Ok(Self {
            version,
            group,
            owner,
            in_margin_basket,
            num_in_margin_basket,
            deposits,
            borrows,
            spot_open_orders,
            perp_accounts,
            perp_orders,
            msrm_amount,
            being_liquidated,
            is_bankrupt,
            info,
            advanced_orders,
            not_upgradable,
            delegate,
        })
    }

    fn write(&self, writer: &mut Writer) {
        metadata::write_header(writer, DataType::MarginAccount, self.version);
        writer.put_pubkey(&self.group);
        writer.put_pubkey(&self.owner);
        writer.write_all(&self.in_margin_basket);
        writer.put_u8(self.num_in_margin_basket);
        writer.write_all(&self.deposits);
        writer.write_all(&self.borrows);
        writer.write_all(&self.spot_open_orders);
        writer.write_all(&self.perp_accounts);

        let mut order_market = [FREE_ORDER_SLOT; MAX_PERP_OPEN_ORDERS];
        let mut order_side = [0u8; MAX_PERP_OPEN_ORDERS];
        let mut order_ids = [0i128; MAX_PERP_OPEN_ORDERS];
        let mut client_ids = [0u64; MAX_PERP_OPEN_ORDERS];
        for order in &self.perp_orders {
            let slot = order.slot as usize;
            if slot >= MAX_PERP_OPEN_ORDERS {
                continue;
            }
            order_market[slot] = order.market_index;
            order_side[slot] = order.side as u8;
            order_ids[slot] = order.order_id;
            client_ids[slot] = order.client_order_id;
        }
        writer.put_bytes(&order_market);
        writer.put_bytes(&order_side);
        for id in order_ids {
            writer.put_i128(id);
        }
        for id in client_ids {
            writer.put_u64(id);
        }

        writer.put_u64(self.msrm_amount);
        writer.put_bool(self.being_liquidated);
        writer.put_bool(self.is_bankrupt);
        writer.put_bytes(&self.info);
        writer.put_pubkey(&self.advanced_orders);
        writer.put_bool(self.not_upgradable);
        writer.put_pubkey(&self.delegate);
        writer.put_zeros(5);
    }
}
