//! Root bank: interest-rate parameters and cumulative indices for one token

use crate::constants::{MAX_NODE_BANKS, PROTOCOL_VERSION};
use crate::cursor::{Reader, Writer};
use crate::error::LayoutResult;
use crate::kind::AccountKind;
use crate::layout::AccountLayout;
use crate::metadata::{self, DataType};
use fixed::types::I80F48;
use solana_program::pubkey::Pubkey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootBank {
    pub version: u8,
    pub optimal_util: I80F48,
    pub optimal_rate: I80F48,
    pub max_rate: I80F48,
    pub num_node_banks: u64,
    pub node_banks: [Pubkey; MAX_NODE_BANKS],
    /// Multiplier converting deposit units into native token units
    pub deposit_index: I80F48,
    /// Multiplier converting borrow units into native token units
    pub borrow_index: I80F48,
    pub last_updated: u64,
}

impl Default for RootBank {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            optimal_util: I80F48::ZERO,
            optimal_rate: I80F48::ZERO,
            max_rate: I80F48::ZERO,
            num_node_banks: 0,
            node_banks: [Pubkey::default(); MAX_NODE_BANKS],
            deposit_index: I80F48::ONE,
            borrow_index: I80F48::ONE,
            last_updated: 0,
        }
    }
}

impl RootBank {
    /// Node banks actually in use
    pub fn active_node_banks(&self) -> &[Pubkey] {
        let count = (self.num_node_banks as usize).min(MAX_NODE_BANKS);
        &self.node_banks[..count]
    }
}

impl AccountLayout for RootBank {
    const KIND: AccountKind = AccountKind::RootBank;
    const LEN: usize = 424;

    fn read(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        let version = metadata::read_header(reader, DataType::RootBank, &[PROTOCOL_VERSION])?;
        let optimal_util = reader.i80f48()?;
        let optimal_rate = reader.i80f48()?;
        let max_rate = reader.i80f48()?;
        let num_node_banks = reader.u64()?;
        if num_node_banks > MAX_NODE_BANKS as u64 {
            return Err(reader.malformed(format!("num_node_banks {} exceeds {}", num_node_banks, MAX_NODE_BANKS)));
        }
        let node_banks = reader.read_array()?;
        let deposit_index = reader.i80f48()?;
        let borrow_index = reader.i80f48()?;
        let last_updated = reader.u64()?;
        reader.skip(64)?;

        Ok(Self {
            version,
            optimal_util,
            optimal_rate,
            max_rate,
            num_node_banks,
            node_banks,
            deposit_index,
            borrow_index,
            last_updated,
        })
    }

    fn write(&self, writer: &mut Writer) {
        metadata::write_header(writer, DataType::RootBank, self.version);
        writer.put_i80f48(self.optimal_util);
        writer.put_i80f48(self.optimal_rate);
        writer.put_i80f48(self.max_rate);
        writer.put_u64(self.num_node_banks);
        writer.write_all(&self.node_banks);
        writer.put_i80f48(self.deposit_index);
        writer.put_i80f48(self.borrow_index);
        writer.put_u64(self.last_updated);
        writer.put_zeros(64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let mut bank = RootBank {
            num_node_banks: 2,
            deposit_index: I80F48::from_num(1.05),
            borrow_index: I80F48::from_num(1.2),
            last_updated: 1_650_000_000,
            ..RootBank::default()
        };
        bank.node_banks[0] = Pubkey::new_unique();
        bank.node_banks[1] = Pubkey::new_unique();

        let bytes = bank.pack();
        assert_eq!(bytes.len(), RootBank::LEN);
        let decoded = RootBank::unpack(&bytes).unwrap();
        assert_eq!(decoded, bank);
        assert_eq!(decoded.active_node_banks().len(), 2);
    }

    #[test]
    fn test_node_bank_count_bounded() {
        let bank = RootBank {
            num_node_banks: 9,
            ..RootBank::default()
        };
        assert!(RootBank::unpack(&bank.pack()).is_err());
    }
}
