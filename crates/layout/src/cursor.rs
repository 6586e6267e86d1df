//! Bounds-checked little-endian cursors over account payloads

use crate::error::{LayoutError, LayoutResult};
use crate::kind::AccountKind;
use fixed::types::I80F48;
use solana_program::pubkey::Pubkey;

// ============================================================================
// Packed Fields
// ============================================================================

/// A value with a fixed on-chain encoding that can be embedded in an account.
pub trait Packed: Sized {
    const SIZE: usize;

    fn read_from(reader: &mut Reader<'_>) -> LayoutResult<Self>;
    fn write_to(&self, writer: &mut Writer);
}

impl Packed for bool {
    const SIZE: usize = 1;

    fn read_from(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        reader.bool()
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.put_bool(*self);
    }
}

impl Packed for I80F48 {
    const SIZE: usize = 16;

    fn read_from(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        reader.i80f48()
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.put_i80f48(*self);
    }
}

impl Packed for Pubkey {
    const SIZE: usize = 32;

    fn read_from(reader: &mut Reader<'_>) -> LayoutResult<Self> {
        reader.pubkey()
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.put_pubkey(self);
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Sequential reader that reports every failure against the kind being decoded.
pub struct Reader<'a> {
    kind: AccountKind,
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(kind: AccountKind, data: &'a [u8]) -> Self {
        Self {
            kind,
            data,
            offset: 0,
        }
    }

    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Error tagged with the current kind and offset
    pub fn malformed(&self, reason: impl std::fmt::Display) -> LayoutError {
        LayoutError::malformed(self.kind, format!("{} at offset {}", reason, self.offset))
    }

    pub fn take(&mut self, len: usize) -> LayoutResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.malformed(format!(
                "truncated: needed {} bytes, {} left",
                len,
                self.remaining()
            )));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn fixed<const N: usize>(&mut self) -> LayoutResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> LayoutResult<()> {
        self.take(len).map(|_| ())
    }

    /// Consume a literal marker, failing if the bytes differ
    pub fn expect(&mut self, marker: &[u8], what: &str) -> LayoutResult<()> {
        let start = self.offset;
        let found = self.take(marker.len())?;
        if found != marker {
            return Err(LayoutError::malformed(
                self.kind,
                format!("bad {} marker at offset {}", what, start),
            ));
        }
        Ok(())
    }

    pub fn u8(&mut self) -> LayoutResult<u8> {
        Ok(self.fixed::<1>()?[0])
    }

    /// Strict boolean: anything other than 0 or 1 is malformed
    pub fn bool(&mut self) -> LayoutResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => {
                self.offset -= 1;
                Err(self.malformed(format!("invalid bool byte {}", other)))
            }
        }
    }

    pub fn u32(&mut self) -> LayoutResult<u32> {
        Ok(u32::from_le_bytes(self.fixed()?))
    }

    pub fn i32(&mut self) -> LayoutResult<i32> {
        Ok(i32::from_le_bytes(self.fixed()?))
    }

    pub fn u64(&mut self) -> LayoutResult<u64> {
        Ok(u64::from_le_bytes(self.fixed()?))
    }

    pub fn i64(&mut self) -> LayoutResult<i64> {
        Ok(i64::from_le_bytes(self.fixed()?))
    }

    pub fn u128(&mut self) -> LayoutResult<u128> {
        Ok(u128::from_le_bytes(self.fixed()?))
    }

    pub fn i128(&mut self) -> LayoutResult<i128> {
        Ok(i128::from_le_bytes(self.fixed()?))
    }

    pub fn i80f48(&mut self) -> LayoutResult<I80F48> {
        Ok(I80F48::from_le_bytes(self.fixed()?))
    }

    pub fn pubkey(&mut self) -> LayoutResult<Pubkey> {
        Ok(Pubkey::new_from_array(self.fixed()?))
    }

    pub fn read<T: Packed>(&mut self) -> LayoutResult<T> {
        T::read_from(self)
    }

    pub fn read_array<T: Packed + Copy + Default, const N: usize>(
        &mut self,
    ) -> LayoutResult<[T; N]> {
        let mut out = [T::default(); N];
        for item in out.iter_mut() {
            *item = T::read_from(self)?;
        }
        Ok(out)
    }

    /// Fail if any bytes were left unread
    pub fn finish(self) -> LayoutResult<()> {
        if self.remaining() != 0 {
            return Err(self.malformed(format!("{} trailing bytes", self.remaining())));
        }
        Ok(())
    }
}

// ============================================================================
// Writer
// ============================================================================

#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_zeros(&mut self, len: usize) {
        self.buf.resize(self.buf.len() + len, 0);
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_u128(&mut self, value: u128) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_i128(&mut self, value: i128) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_i80f48(&mut self, value: I80F48) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_pubkey(&mut self, value: &Pubkey) {
        self.put_bytes(value.as_ref());
    }

    pub fn write<T: Packed>(&mut self, value: &T) {
        value.write_to(self);
    }

    pub fn write_all<T: Packed>(&mut self, values: &[T]) {
        for value in values {
            value.write_to(self);
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
