//! Little-endian byte encoding helpers for on-disk structures.
//!
//! Everything the store persists (header, free list, pool catalog, typed
//! elements) goes through [`ByteWriter`] and [`ByteReader`]. Reads past the
//! end of the input surface as [`Error::CorruptFile`] rather than panicking,
//! since a short buffer on load always means a damaged file.

use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// First 64 bits of the SHA-256 digest of `bytes`, read little-endian.
/// Used as the metadata and header checksum.
pub fn checksum64(bytes: &[u8]) -> u64 {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(out)
}

/// Append-only little-endian encoder.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a single byte.
    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Appends a `u16`.
    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a `u32`.
    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a `u64`.
    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends raw bytes without a length prefix.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Appends a `u16` length prefix followed by the UTF-8 bytes of `s`.
    pub fn put_str(&mut self, s: &str) {
        self.put_u16(s.len() as u16);
        self.put_bytes(s.as_bytes());
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor-based little-endian decoder over a borrowed buffer.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| Error::corrupt(format!("truncated record at byte {}", self.pos)))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Reads a single byte.
    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a `u16`.
    pub fn get_u16(&mut self) -> Result<u16> {
        let mut out = [0u8; 2];
        out.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(out))
    }

    /// Reads a `u32`.
    pub fn get_u32(&mut self) -> Result<u32> {
        let mut out = [0u8; 4];
        out.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(out))
    }

    /// Reads a `u64`.
    pub fn get_u64(&mut self) -> Result<u64> {
        let mut out = [0u8; 8];
        out.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(out))
    }

    /// Reads `n` raw bytes.
    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Reads a `u16`-length-prefixed UTF-8 string.
    pub fn get_str(&mut self) -> Result<String> {
        let len = self.get_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::corrupt("pool name is not valid UTF-8"))
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// Writes `value` as little-endian into `buf[offset..offset + 8]`.
pub(crate) fn write_u64_at(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Reads a little-endian `u64` from `buf[offset..offset + 8]`.
pub(crate) fn read_u64_at(buf: &[u8], offset: usize) -> u64 {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(out)
}

/// Writes `value` as little-endian into `buf[offset..offset + 4]`.
pub(crate) fn write_u32_at(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Reads a little-endian `u32` from `buf[offset..offset + 4]`.
pub(crate) fn read_u32_at(buf: &[u8], offset: usize) -> u32 {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_known_values() {
        // SHA-256("") starts e3b0c442 98fc1c14, SHA-256("abc") starts ba7816bf 8f01cfea.
        assert_eq!(checksum64(b""), 0x141c_fc98_42c4_b0e3);
        assert_eq!(checksum64(b"abc"), 0xeacf_018f_bf16_78ba);
        assert_ne!(checksum64(b"abd"), checksum64(b"abc"));
    }

    #[test]
    fn writer_reader_mixed_fields() {
        let mut w = ByteWriter::new();
        w.put_u8(7);
        w.put_u16(513);
        w.put_u32(0xdead_beef);
        w.put_u64(u64::MAX - 1);
        w.put_str("Channel 1");
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.get_u8().unwrap(), 7);
        assert_eq!(r.get_u16().unwrap(), 513);
        assert_eq!(r.get_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.get_u64().unwrap(), u64::MAX - 1);
        assert_eq!(r.get_str().unwrap(), "Channel 1");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn short_read_is_corrupt() {
        let mut r = ByteReader::new(&[1, 2, 3]);
        assert!(matches!(r.get_u64(), Err(Error::CorruptFile { .. })));
    }

    #[test]
    fn fixed_offset_helpers() {
        let mut buf = [0u8; 16];
        write_u64_at(&mut buf, 4, 42);
        write_u32_at(&mut buf, 12, 9);
        assert_eq!(read_u64_at(&buf, 4), 42);
        assert_eq!(read_u32_at(&buf, 12), 9);
    }
}
