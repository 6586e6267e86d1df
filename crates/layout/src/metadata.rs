//! The 8-byte metadata header carried by every protocol-owned account

use crate::cursor::{Reader, Writer};
use crate::error::LayoutResult;

/// Size of the header: data type, version, initialized flag, 5 bytes padding
pub const METADATA_LEN: usize = 8;

/// `data_type` values written by the on-chain program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    Group = 0,
    MarginAccount = 1,
    RootBank = 2,
    NodeBank = 3,
    PerpMarket = 4,
    Bids = 5,
    Asks = 6,
    Cache = 7,
    EventQueue = 8,
    AdvancedOrders = 9,
}

/// Read and validate the header, returning the version byte.
///
/// The account must carry the expected data type, a supported version and
/// the initialized flag; uninitialized accounts are treated as malformed.
pub fn read_header(reader: &mut Reader<'_>, expected: DataType, versions: &[u8]) -> LayoutResult<u8> {
    let data_type = reader.u8()?;
    if data_type != expected as u8 {
        return Err(reader.malformed(format!(
            "data type {} does not match expected {:?}",
            data_type, expected
        )));
    }

    let version = reader.u8()?;
    if !versions.contains(&version) {
        return Err(reader.malformed(format!("unsupported version {}", version)));
    }

    if !reader.bool()? {
        return Err(reader.malformed("account is not initialized"));
    }

    reader.skip(5)?;
    Ok(version)
}

pub fn write_header(writer: &mut Writer, data_type: DataType, version: u8) {
    writer.put_u8(data_type as u8);
    writer.put_u8(version);
    writer.put_bool(true);
    writer.put_zeros(5);
}
