//! Serum DEX accounts referenced by margin accounts: spot markets and open orders

use crate::constants::{SERUM_HEAD, SERUM_ORDER_SLOTS, SERUM_TAIL};
use crate::cursor::{Reader, Writer};
use crate::error::LayoutResult;
use crate::kind::AccountKind;
use crate::layout::AccountLayout;
use solana_program::pubkey::Pubkey;
use std::fmt;

// ============================================================================
// Account Flags
// ============================================================================

/// Serum's account-flags bitfield
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AccountFlags(pub u64);

impl AccountFlags {
    pub const INITIALIZED: u64 = 1;
    pub const MARKET: u64 = 1 << 1;
    pub const OPEN_ORDERS: u64 = 1 << 2;
    pub const REQUEST_QUEUE: u64 = 1 << 3;
    pub const EVENT_QUEUE: u64 = 1 << 4;
    pub const BIDS: u64 = 1 << 5;
    pub const ASKS: u64 = 1 << 6;
    pub const DISABLED: u64 = 1 << 7;

    pub fn contains(self, flags: u64) -> bool {
        self.0 & flags == flags
    }

    pub fn is_disabled(self) -> bool {
        self.contains(Self::DISABLED)
    }
}

impl fmt::Debug for AccountFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountFlags({:#010b})", self.0)
    }
}

fn read_flags(reader: &mut Reader<'_>, required: u64) -> LayoutResult<AccountFlags> {
    reader.expect(SERUM_HEAD, "serum head")?;
    let flags = AccountFlags(reader.u64()?);
    if !flags.contains(required) {
        return Err(reader.malformed(format!("account flags {:?} missing {:#b}", flags, required)));
    }
    Ok(flags)
}

// ============================================================================
// Spot Market
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpotMarket {
    pub account_flags: AccountFlags,
    pub own_address: Pubkey,
    pub vault_signer_nonce: u64,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub base_deposits_total: u64,
    pub base_fees_accrued: u64,
    pub quote_vault: Pubkey,
    pub quote_deposits_total: u64,
    pub quote_fees_accrued: u64,
    pub quote_dust_threshold: u64,
    pub request_queue: Pubkey,
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub base_lot_size: u64,
    pub quote_lot_size: u64,
    pub fee_rate_bps: u64,
    pub referrer_rebates_accrued: u64,
}

impl AccountLayout for SpotMarket {
    const KIND: AccountKind = AccountKind::SpotMarket;
    const LEN: usize = 388;

    fn read(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        let account_flags = read_flags(reader, AccountFlags::INITIALIZED | AccountFlags::MARKET)?;
        let market = Self {
            account_flags,
            own_address: reader.pubkey()?,
            vault_signer_nonce: reader.u64()?,
            base_mint: reader.pubkey()?,
            quote_mint: reader.pubkey()?,
            base_vault: reader.pubkey()?,
            base_deposits_total: reader.u64()?,
            base_fees_accrued: reader.u64()?,
            quote_vault: reader.pubkey()?,
            quote_deposits_total: reader.u64()?,
            quote_fees_accrued: reader.u64()?,
            quote_dust_threshold: reader.u64()?,
            request_queue: reader.pubkey()?,
            event_queue: reader.pubkey()?,
            bids: reader.pubkey()?,
            asks: reader.pubkey()?,
            base_lot_size: reader.u64()?,
            quote_lot_size: reader.u64()?,
            fee_rate_bps: reader.u64()?,
            referrer_rebates_accrued: reader.u64()?,
        };
        reader.expect(SERUM_TAIL, "serum tail")?;
        Ok(market)
    }

    fn write(&self, writer: &mut Writer) {
        writer.put_bytes(SERUM_HEAD);
        writer.put_u64(self.account_flags.0);
        writer.put_pubkey(&self.own_address);
        writer.put_u64(self.vault_signer_nonce);
        writer.put_pubkey(&self.base_mint);
        writer.put_pubkey(&self.quote_mint);
        writer.put_pubkey(&self.base_vault);
        writer.put_u64(self.base_deposits_total);
        writer.put_u64(self.base_fees_accrued);
        writer.put_pubkey(&self.quote_vault);
        writer.put_u64(self.quote_deposits_total);
        writer.put_u64(self.quote_fees_accrued);
        writer.put_u64(self.quote_dust_threshold);
        writer.put_pubkey(&self.request_queue);
        writer.put_pubkey(&self.event_queue);
        writer.put_pubkey(&self.bids);
        writer.put_pubkey(&self.asks);
        writer.put_u64(self.base_lot_size);
        writer.put_u64(self.quote_lot_size);
        writer.put_u64(self.fee_rate_bps);
        writer.put_u64(self.referrer_rebates_accrued);
        writer.put_bytes(SERUM_TAIL);
    }
}

// ============================================================================
// Open Orders
// ============================================================================

/// An occupied serum order slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerumOrderSlot {
    pub slot: u8,
    pub order_id: u128,
    pub client_id: u64,
    pub is_bid: bool,
}

impl SerumOrderSlot {
    /// Limit price in lots, packed into the upper half of the order id
    pub fn price_lots(&self) -> u64 {
        (self.order_id >> 64) as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOrders {
    pub account_flags: AccountFlags,
    pub market: Pubkey,
    pub owner: Pubkey,
    pub base_token_free: u64,
    pub base_token_total: u64,
    pub quote_token_free: u64,
    pub quote_token_total: u64,
    /// Occupied slots only, ascending by slot
    pub orders: Vec<SerumOrderSlot>,
    pub referrer_rebates_accrued: u64,
}

impl OpenOrders {
    /// Base tokens locked in resting asks
    pub fn base_locked(&self) -> u64 {
        self.base_token_total.saturating_sub(self.base_token_free)
    }

    /// Quote tokens locked in resting bids
    pub fn quote_locked(&self) -> u64 {
        self.quote_token_total.saturating_sub(self.quote_token_free)
    }
}

impl AccountLayout for OpenOrders {
    const KIND: AccountKind = AccountKind::OpenOrders;
    const LEN: usize = 3228;

    fn read(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        let account_flags = read_flags(reader, AccountFlags::INITIALIZED | AccountFlags::OPEN_ORDERS)?;
        let market = reader.pubkey()?;
        let owner = reader.pubkey()?;
        let base_token_free = reader.u64()?;
        let base_token_total = reader.u64()?;
        let quote_token_free = reader.u64()?;
        let quote_token_total = reader.u64()?;
        if base_token_free > base_token_total || quote_token_free > quote_token_total {
            return Err(reader.malformed("free balance exceeds total"));
        }

        let free_slot_bits = reader.u128()?;
        let is_bid_bits = reader.u128()?;
        let mut order_ids = [0u128; SERUM_ORDER_SLOTS];
        for id in order_ids.iter_mut() {
            *id = reader.u128()?;
        }
        let mut client_ids = [0u64; SERUM_ORDER_SLOTS];
        for id in client_ids.iter_mut() {
            *id = reader.u64()?;
        }
        let referrer_rebates_accrued = reader.u64()?;
        reader.expect(SERUM_TAIL, "serum tail")?;

        let orders = (0..SERUM_ORDER_SLOTS)
            .filter(|slot| free_slot_bits & (1u128 << slot) == 0)
            .map(|slot| SerumOrderSlot {
                slot: slot as u8,
                order_id: order_ids[slot],
                client_id: client_ids[slot],
                is_bid: is_bid_bits & (1u128 << slot) != 0,
            })
            .collect();

        Ok(Self {
            account_flags,
            market,
            owner,
            base_token_free,
            base_token_total,
            quote_token_free,
            quote_token_total,
            orders,
            referrer_rebates_accrued,
        })
    }

    fn write(&self, writer: &mut Writer) {
        let mut free_slot_bits = u128::MAX;
        let mut is_bid_bits = 0u128;
        let mut order_ids = [0u128; SERUM_ORDER_SLOTS];
        let mut client_ids = [0u64; SERUM_ORDER_SLOTS];
        for order in &self.orders {
            let slot = order.slot as usize;
            if slot >= SERUM_ORDER_SLOTS {
                continue;
            }
            free_slot_bits &= !(1u128 << slot);
            if order.is_bid {
                is_bid_bits |= 1u128 << slot;
            }
            order_ids[slot] = order.order_id;
            client_ids[slot] = order.client_id;
        }

        writer.put_bytes(SERUM_HEAD);
        writer.put_u64(self.account_flags.0);
        writer.put_pubkey(&self.market);
        writer.put_pubkey(&self.owner);
        writer.put_u64(self.base_token_free);
        writer.put_u64(self.base_token_total);
        writer.put_u64(self.quote_token_free);
        writer.put_u64(self.quote_token_total);
        writer.put_u128(free_slot_bits);
        writer.put_u128(is_bid_bits);
        for id in order_ids {
            writer.put_u128(id);
        }
        for id in client_ids {
            writer.put_u64(id);
        }
        writer.put_u64(self.referrer_rebates_accrued);
        writer.put_bytes(SERUM_TAIL);
    }
}
