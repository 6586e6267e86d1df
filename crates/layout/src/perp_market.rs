//! Perp market: lot sizes and cumulative funding for one perpetual contract

use crate::constants::PROTOCOL_VERSION;
use crate::cursor::{Packed, Reader, Writer};
use crate::error::LayoutResult;
use crate::kind::AccountKind;
use crate::layout::AccountLayout;
use crate::metadata::{self, DataType};
use fixed::types::I80F48;
use solana_program::pubkey::Pubkey;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiquidityMiningInfo {
    pub rate: I80F48,
    pub max_depth_bps: I80F48,
    pub period_start: u64,
    pub target_period_length: u64,
    pub mngo_left: u64,
    pub mngo_per_period: u64,
}

impl Packed for LiquidityMiningInfo {
    const SIZE: usize = 64;

    fn read_from(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        Ok(Self {
            rate: reader.i80f48()?,
            max_depth_bps: reader.i80f48()?,
            period_start: reader.u64()?,
            target_period_length: reader.u64()?,
            mngo_left: reader.u64()?,
            mngo_per_period: reader.u64()?,
        })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.put_i80f48(self.rate);
        writer.put_i80f48(self.max_depth_bps);
        writer.put_u64(self.period_start);
        writer.put_u64(self.target_period_length);
        writer.put_u64(self.mngo_left);
        writer.put_u64(self.mngo_per_period);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerpMarket {
    pub version: u8,
    pub group: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub event_queue: Pubkey,
    pub quote_lot_size: i64,
    pub base_lot_size: i64,
    /// Cumulative funding paid per base lot by longs
    pub long_funding: I80F48,
    /// Cumulative funding received per base lot by shorts
    pub short_funding: I80F48,
    pub open_interest: i64,
    pub last_updated: u64,
    pub seq_num: u64,
    pub fees_accrued: I80F48,
    pub liquidity_mining_info: LiquidityMiningInfo,
    pub mngo_vault: Pubkey,
}

impl AccountLayout for PerpMarket {
    const KIND: AccountKind = AccountKind::PerpMarket;
    const LEN: usize = 320;

    fn read(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        let version = metadata::read_header(reader, DataType::PerpMarket, &[PROTOCOL_VERSION])?;
        Ok(Self {
            version,
            group: reader.pubkey()?,
            bids: reader.pubkey()?,
            asks: reader.pubkey()?,
            event_queue: reader.pubkey()?,
            quote_lot_size: reader.i64()?,
            base_lot_size: reader.i64()?,
            long_funding: reader.i80f48()?,
            short_funding: reader.i80f48()?,
            open_interest: reader.i64()?,
            last_updated: reader.u64()?,
            seq_num: reader.u64()?,
            fees_accrued: reader.i80f48()?,
            liquidity_mining_info: reader.read()?,
            mngo_vault: reader.pubkey()?,
        })
    }

    fn write(&self, writer: &mut Writer) {
        metadata::write_header(writer, DataType::PerpMarket, self.version);
        writer.put_pubkey(&self.group);
        writer.put_pubkey(&self.bids);
        writer.put_pubkey(&self.asks);
        writer.put_pubkey(&self.event_queue);
        writer.put_i64(self.quote_lot_size);
        writer.put_i64(self.base_lot_size);
        writer.put_i80f48(self.long_funding);
        writer.put_i80f48(self.short_funding);
        writer.put_i64(self.open_interest);
        writer.put_u64(self.last_updated);
        writer.put_u64(self.seq_num);
        writer.put_i80f48(self.fees_accrued);
        writer.write(&self.liquidity_mining_info);
        writer.put_pubkey(&self.mngo_vault);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let market = PerpMarket {
            group: Pubkey::new_unique(),
            quote_lot_size: 100,
            base_lot_size: 10,
            long_funding: I80F48::from_num(0.25),
            short_funding: I80F48::from_num(-0.125),
            open_interest: 77,
            ..PerpMarket::default()
        };
        let bytes = market.pack();
        assert_eq!(bytes.len(), PerpMarket::LEN);
        assert_eq!(PerpMarket::unpack(&bytes).unwrap(), market);
    }

    #[test]
    fn test_wrong_header_rejected() {
        let mut bytes = PerpMarket::default().pack();
        bytes[0] = DataType::RootBank as u8;
        assert!(PerpMarket::unpack(&bytes).is_err());
    }
}
