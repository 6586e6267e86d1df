//! Pyth price accounts

use crate::constants::{PYTH_MAGIC, PYTH_MAX_COMPONENTS, PYTH_PRICE_ACCOUNT_TYPE, PYTH_VERSION};
use crate::cursor::{Packed, Reader, Writer};
use crate::error::LayoutResult;
use crate::kind::AccountKind;
use crate::layout::AccountLayout;
use crate::units::pow10;
use fixed::types::I80F48;
use solana_program::pubkey::Pubkey;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PriceStatus {
    #[default]
    Unknown = 0,
    Trading = 1,
    Halted = 2,
    Auction = 3,
}

impl PriceStatus {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(PriceStatus::Unknown),
            1 => Some(PriceStatus::Trading),
            2 => Some(PriceStatus::Halted),
            3 => Some(PriceStatus::Auction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceInfo {
    pub price: i64,
    pub conf: u64,
    pub status: PriceStatus,
    pub corp_act: u32,
    pub pub_slot: u64,
}

impl Packed for PriceInfo {
    const SIZE: usize = 32;

    fn read_from(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        let price = reader.i64()?;
        let conf = reader.u64()?;
        let raw_status = reader.u32()?;
        let status = PriceStatus::from_u32(raw_status)
            .ok_or_else(|| reader.malformed(format!("unknown price status {}", raw_status)))?;
        Ok(Self {
            price,
            conf,
            status,
            corp_act: reader.u32()?,
            pub_slot: reader.u64()?,
        })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.put_i64(self.price);
        writer.put_u64(self.conf);
        writer.put_u32(self.status as u32);
        writer.put_u32(self.corp_act);
        writer.put_u64(self.pub_slot);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceComponent {
    pub publisher: Pubkey,
    pub aggregate: PriceInfo,
    pub latest: PriceInfo,
}

impl Packed for PriceComponent {
    const SIZE: usize = 96;

    fn read_from(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        Ok(Self {
            publisher: reader.pubkey()?,
            aggregate: reader.read()?,
            latest: reader.read()?,
        })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.put_pubkey(&self.publisher);
        writer.write(&self.aggregate);
        writer.write(&self.latest);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OraclePrice {
    /// Used size of the account as reported by the publisher program
    pub size: u32,
    pub price_type: u32,
    pub exponent: i32,
    pub curr_slot: u64,
    pub valid_slot: u64,
    pub derivations: [i64; 8],
    pub product: Pubkey,
    pub next: Pubkey,
    pub aggregate_publisher: Pubkey,
    pub aggregate: PriceInfo,
    /// Live publisher components; length is the on-chain `num` field
    pub components: Vec<PriceComponent>,
}

impl Default for OraclePrice {
    fn default() -> Self {
        Self {
            size: OraclePrice::LEN as u32,
            price_type: 1,
            exponent: 0,
            curr_slot: 0,
            valid_slot: 0,
            derivations: [0; 8],
            product: Pubkey::default(),
            next: Pubkey::default(),
            aggregate_publisher: Pubkey::default(),
            aggregate: PriceInfo::default(),
            components: Vec::new(),
        }
    }
}

impl OraclePrice {
    pub fn is_trading(&self) -> bool {
        self.aggregate.status == PriceStatus::Trading
    }

    /// Aggregate price in quote units per whole base token: `price * 10^exponent`.
    /// Returns `None` if the result does not fit the fixed-point range.
    pub fn ui_price(&self) -> Option<I80F48> {
        let mantissa = I80F48::checked_from_num(self.aggregate.price)?;
        let scale = pow10(self.exponent.unsigned_abs())?;
        if self.exponent >= 0 {
            mantissa.checked_mul(scale)
        } else {
            mantissa.checked_div(scale)
        }
    }
}

impl AccountLayout for OraclePrice {
    const KIND: AccountKind = AccountKind::OraclePrice;
    const LEN: usize = 3312;

    fn read(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        let magic = reader.u32()?;
        if magic != PYTH_MAGIC {
            return Err(reader.malformed(format!("bad magic {:#x}", magic)));
        }
        let version = reader.u32()?;
        if version != PYTH_VERSION {
            return Err(reader.malformed(format!("unsupported pyth version {}", version)));
        }
        let account_type = reader.u32()?;
        if account_type != PYTH_PRICE_ACCOUNT_TYPE {
            return Err(reader.malformed(format!("pyth account type {} is not a price", account_type)));
        }
        let size = reader.u32()?;
        let price_type = reader.u32()?;
        let exponent = reader.i32()?;
        let num = reader.u32()?;
        if num as usize > PYTH_MAX_COMPONENTS {
            return Err(reader.malformed(format!("{} components exceeds {}", num, PYTH_MAX_COMPONENTS)));
        }
        reader.skip(4)?;
        let curr_slot = reader.u64()?;
        let valid_slot = reader.u64()?;
        let mut derivations = [0i64; 8];
        for value in derivations.iter_mut() {
            *value = reader.i64()?;
        }
        let product = reader.pubkey()?;
        let next = reader.pubkey()?;
        let aggregate_publisher = reader.pubkey()?;
        let aggregate = reader.read()?;

        let mut components = Vec::with_capacity(num as usize);
        for index in 0..PYTH_MAX_COMPONENTS {
            if index < num as usize {
                components.push(reader.read()?);
            } else {
                reader.skip(PriceComponent::SIZE)?;
            }
        }

        Ok(Self {
            size,
            price_type,
            exponent,
            curr_slot,
            valid_slot,
            derivations,
            product,
            next,
            aggregate_publisher,
            aggregate,
            components,
        })
    }

    fn write(&self, writer: &mut Writer) {
        let components = &self.components[..self.components.len().min(PYTH_MAX_COMPONENTS)];
        writer.put_u32(PYTH_MAGIC);
        writer.put_u32(PYTH_VERSION);
        writer.put_u32(PYTH_PRICE_ACCOUNT_TYPE);
        writer.put_u32(self.size);
        writer.put_u32(self.price_type);
        writer.put_i32(self.exponent);
        writer.put_u32(components.len() as u32);
        writer.put_zeros(4);
        writer.put_u64(self.curr_slot);
        writer.put_u64(self.valid_slot);
        for value in self.derivations {
            writer.put_i64(value);
        }
        writer.put_pubkey(&self.product);
        writer.put_pubkey(&self.next);
        writer.put_pubkey(&self.aggregate_publisher);
        writer.write(&self.aggregate);
        writer.write_all(components);
        writer.put_zeros((PYTH_MAX_COMPONENTS - components.len()) * PriceComponent::SIZE);
    }
}
