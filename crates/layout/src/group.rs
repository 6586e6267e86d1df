//! Group: the root configuration shared by every margin account

use crate::constants::{MAX_PAIRS, MAX_TOKENS, PROTOCOL_VERSION, QUOTE_INDEX};
use crate::cursor::{Packed, Reader, Writer};
use crate::error::LayoutResult;
use crate::kind::AccountKind;
use crate::layout::AccountLayout;
use crate::metadata::{self, DataType};
use fixed::types::I80F48;
use solana_program::pubkey::Pubkey;

// ============================================================================
// Per-Token and Per-Market Entries
// ============================================================================

/// A token slot. Empty slots carry the default mint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenInfo {
    pub mint: Pubkey,
    pub root_bank: Pubkey,
    pub decimals: u8,
}

impl TokenInfo {
    pub fn is_empty(&self) -> bool {
        self.mint == Pubkey::default()
    }
}

impl Packed for TokenInfo {
    const SIZE: usize = 72;

    fn read_from(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        let mint = reader.pubkey()?;
        let root_bank = reader.pubkey()?;
        let decimals = reader.u8()?;
        reader.skip(7)?;
        Ok(Self {
            mint,
            root_bank,
            decimals,
        })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.put_pubkey(&self.mint);
        writer.put_pubkey(&self.root_bank);
        writer.put_u8(self.decimals);
        writer.put_zeros(7);
    }
}

/// Spot market slot with its risk weights
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpotMarketInfo {
    pub spot_market: Pubkey,
    pub maint_asset_weight: I80F48,
    pub init_asset_weight: I80F48,
    pub maint_liab_weight: I80F48,
    pub init_liab_weight: I80F48,
    pub liquidation_fee: I80F48,
}

impl SpotMarketInfo {
    pub fn is_empty(&self) -> bool {
        self.spot_market == Pubkey::default()
    }
}

impl Packed for SpotMarketInfo {
    const SIZE: usize = 112;

    fn read_from(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        Ok(Self {
            spot_market: reader.pubkey()?,
            maint_asset_weight: reader.i80f48()?,
            init_asset_weight: reader.i80f48()?,
            maint_liab_weight: reader.i80f48()?,
            init_liab_weight: reader.i80f48()?,
            liquidation_fee: reader.i80f48()?,
        })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.put_pubkey(&self.spot_market);
        writer.put_i80f48(self.maint_asset_weight);
        writer.put_i80f48(self.init_asset_weight);
        writer.put_i80f48(self.maint_liab_weight);
        writer.put_i80f48(self.init_liab_weight);
        writer.put_i80f48(self.liquidation_fee);
    }
}

/// Perp market slot with its risk weights, fees and lot sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerpMarketInfo {
    pub perp_market: Pubkey,
    pub maint_asset_weight: I80F48,
    pub init_asset_weight: I80F48,
    pub maint_liab_weight: I80F48,
    pub init_liab_weight: I80F48,
    pub liquidation_fee: I80F48,
    pub maker_fee: I80F48,
    pub taker_fee: I80F48,
    pub base_lot_size: i64,
    pub quote_lot_size: i64,
}

impl PerpMarketInfo {
    pub fn is_empty(&self) -> bool {
        self.perp_market == Pubkey::default()
    }
}

impl Packed for PerpMarketInfo {
    const SIZE: usize = 160;

    fn read_from(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        Ok(Self {
            perp_market: reader.pubkey()?,
            maint_asset_weight: reader.i80f48()?,
            init_asset_weight: reader.i80f48()?,
            maint_liab_weight: reader.i80f48()?,
            init_liab_weight: reader.i80f48()?,
            liquidation_fee: reader.i80f48()?,
            maker_fee: reader.i80f48()?,
            taker_fee: reader.i80f48()?,
            base_lot_size: reader.i64()?,
            quote_lot_size: reader.i64()?,
        })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.put_pubkey(&self.perp_market);
        writer.put_i80f48(self.maint_asset_weight);
        writer.put_i80f48(self.init_asset_weight);
        writer.put_i80f48(self.maint_liab_weight);
        writer.put_i80f48(self.init_liab_weight);
        writer.put_i80f48(self.liquidation_fee);
        writer.put_i80f48(self.maker_fee);
        writer.put_i80f48(self.taker_fee);
        writer.put_i64(self.base_lot_size);
        writer.put_i64(self.quote_lot_size);
    }
}

// ============================================================================
// Group
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub version: u8,
    pub num_oracles: u64,
    pub tokens: [TokenInfo; MAX_TOKENS],
    pub spot_markets: [SpotMarketInfo; MAX_PAIRS],
    pub perp_markets: [PerpMarketInfo; MAX_PAIRS],
    pub oracles: [Pubkey; MAX_PAIRS],
    pub signer_nonce: u64,
    pub signer_key: Pubkey,
    pub admin: Pubkey,
    pub dex_program_id: Pubkey,
    pub cache: Pubkey,
    pub valid_interval: u64,
    pub insurance_vault: Pubkey,
    pub srm_vault: Pubkey,
    pub msrm_vault: Pubkey,
    pub fees_vault: Pubkey,
    pub max_accounts: u32,
    pub num_accounts: u32,
    pub ref_surcharge_centibps: u32,
    pub ref_share_centibps: u32,
    pub ref_mngo_required: u64,
}

impl Group {
    pub fn quote_token(&self) -> &TokenInfo {
        &self.tokens[QUOTE_INDEX]
    }

    /// Token at `index`, or `None` for an empty slot
    pub fn token(&self, index: usize) -> Option<&TokenInfo> {
        self.tokens.get(index).filter(|token| !token.is_empty())
    }

    pub fn token_index(&self, mint: &Pubkey) -> Option<usize> {
        self.tokens
            .iter()
            .position(|token| !token.is_empty() && token.mint == *mint)
    }

    /// Oracle for market `index`; only the first `num_oracles` entries are live
    pub fn oracle(&self, index: usize) -> Option<Pubkey> {
        if (index as u64) >= self.num_oracles {
            return None;
        }
        self.oracles
            .get(index)
            .copied()
            .filter(|oracle| *oracle != Pubkey::default())
    }

    pub fn spot_market(&self, index: usize) -> Option<&SpotMarketInfo> {
        self.spot_markets.get(index).filter(|info| !info.is_empty())
    }

    pub fn perp_market(&self, index: usize) -> Option<&PerpMarketInfo> {
        self.perp_markets.get(index).filter(|info| !info.is_empty())
    }
}

impl AccountLayout for Group {
    const KIND: AccountKind = AccountKind::Group;
    const LEN: usize = 6032;

    fn read(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        let version = metadata::read_header(reader, DataType::Group, &[PROTOCOL_VERSION])?;
        let num_oracles = reader.u64()?;
        if num_oracles > MAX_PAIRS as u64 {
            return Err(reader.malformed(format!("num_oracles {} exceeds {}", num_oracles, MAX_PAIRS)));
        }

        let tokens = reader.read_array()?;
        let spot_markets = reader.read_array()?;
        let perp_markets = reader.read_array()?;
        let oracles = reader.read_array()?;
        let signer_nonce = reader.u64()?;
        let signer_key = reader.pubkey()?;
        let admin = reader.pubkey()?;
        let dex_program_id = reader.pubkey()?;
        let cache = reader.pubkey()?;
        let valid_interval = reader.u64()?;
        let insurance_vault = reader.pubkey()?;
        let srm_vault = reader.pubkey()?;
        let msrm_vault = reader.pubkey()?;
        let fees_vault = reader.pubkey()?;
        let max_accounts = reader.u32()?;
        let num_accounts = reader.u32()?;
        let ref_surcharge_centibps = reader.u32()?;
        let ref_share_centibps = reader.u32()?;
        let ref_mngo_required = reader.u64()?;
        reader.skip(8)?;

        Ok(Self {
            version,
            num_oracles,
            tokens,
            spot_markets,
            perp_markets,
            oracles,
            signer_nonce,
            signer_key,
            admin,
            dex_program_id,
            cache,
            valid_interval,
            insurance_vault,
            srm_vault,
            msrm_vault,
            fees_vault,
            max_accounts,
            num_accounts,
            ref_surcharge_centibps,
            ref_share_centibps,
            ref_mngo_required,
        })
    }

    fn write(&self, writer: &mut Writer) {
        metadata::write_header(writer, DataType::Group, self.version);
        writer.put_u64(self.num_oracles);
        writer.write_all(&self.tokens);
        writer.write_all(&self.spot_markets);
        writer.write_all(&self.perp_markets);
        writer.write_all(&self.oracles);
        writer.put_u64(self.signer_nonce);
        writer.put_pubkey(&self.signer_key);
        writer.put_pubkey(&self.admin);
        writer.put_pubkey(&self.dex_program_id);
        writer.put_pubkey(&self.cache);
        writer.put_u64(self.valid_interval);
        writer.put_pubkey(&self.insurance_vault);
        writer.put_pubkey(&self.srm_vault);
        writer.put_pubkey(&self.msrm_vault);
        writer.put_pubkey(&self.fees_vault);
        writer.put_u32(self.max_accounts);
        writer.put_u32(self.num_accounts);
        writer.put_u32(self.ref_surcharge_centibps);
        writer.put_u32(self.ref_share_centibps);
        writer.put_u64(self.ref_mngo_required);
        writer.put_zeros(8);
    }
}
