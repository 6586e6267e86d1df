//! The contract every top-level account schema implements

use crate::cursor::{Reader, Writer};
use crate::error::{LayoutError, LayoutResult};
use crate::kind::AccountKind;

/// A fixed-size account schema.
///
/// `unpack` enforces the exact length before reading a single field and
/// rejects trailing bytes afterwards, so a payload of the wrong size can never
/// decode into a plausible-looking value.
pub trait AccountLayout: Sized {
    const KIND: AccountKind;
    const LEN: usize;

    fn read(reader: &mut Reader<'_>) -> LayoutResult<Self>;
    fn write(&self, writer: &mut Writer);

    fn unpack(data: &[u8]) -> LayoutResult<Self> {
        if data.len() != Self::LEN {
            return Err(LayoutError::malformed(
                Self::KIND,
                format!("expected {} bytes, got {}", Self::LEN, data.len()),
            ));
        }
        let mut reader = Reader::new(Self::KIND, data);
        let value = Self::read(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }

    fn pack(&self) -> Vec<u8> {
        let mut writer = Writer::with_capacity(Self::LEN);
        self.write(&mut writer);
        debug_assert_eq!(writer.len(), Self::LEN);
        writer.into_inner()
    }
}
