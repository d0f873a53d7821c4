//! Bounds-checked typed views onto pools.
//!
//! [`PoolAccessor`] is the only surface collaborators (effects, translators,
//! clipboard, recorder) use to touch pool contents. Elements are encoded
//! little-endian through [`PoolElement`], so files move between hosts.

use std::marker::PhantomData;

use crate::pool_file::PoolFile;
use crate::{Error, Result};

/// A fixed-size value that can be stored in a pool.
pub trait PoolElement: Copy + Default + Send + Sync + 'static {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Writes `self` into `out[..SIZE]`.
    fn encode(&self, out: &mut [u8]);

    /// Reads a value from `bytes[..SIZE]`.
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_pool_element {
    ($($t:ty),*) => {
        $(
            impl PoolElement for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                #[inline]
                fn encode(&self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_pool_element!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Encodes a slice of elements into a contiguous byte buffer.
pub fn encode_slice<T: PoolElement>(values: &[T]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len() * T::SIZE];
    for (v, chunk) in values.iter().zip(bytes.chunks_exact_mut(T::SIZE)) {
        v.encode(chunk);
    }
    bytes
}

/// Decodes a byte buffer into `out`, one element per `T::SIZE` bytes.
pub fn decode_into<T: PoolElement>(bytes: &[u8], out: &mut [T]) {
    for (v, chunk) in out.iter_mut().zip(bytes.chunks_exact(T::SIZE)) {
        *v = T::decode(chunk);
    }
}

/// Random-access typed view onto one pool of a [`PoolFile`].
///
/// Accessors are cheap to create and hold no lock between calls. Every
/// position is checked against the pool's current length.
pub struct PoolAccessor<'a, T: PoolElement> {
    file: &'a PoolFile,
    name: String,
    _marker: PhantomData<T>,
}

impl<'a, T: PoolElement> PoolAccessor<'a, T> {
    pub(crate) fn new(file: &'a PoolFile, name: &str) -> Self {
        Self {
            file,
            name: name.to_string(),
            _marker: PhantomData,
        }
    }

    /// Name of the underlying pool.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pool file this accessor reads from.
    pub fn file(&self) -> &'a PoolFile {
        self.file
    }

    /// Element count.
    pub fn len(&self) -> Result<u64> {
        self.file.pool_len(&self.name)
    }

    /// Returns true if the pool holds no elements.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads the element at `pos`.
    pub fn get(&self, pos: u64) -> Result<T> {
        let mut out = [T::default()];
        self.read(pos, &mut out)?;
        Ok(out[0])
    }

    /// Overwrites the element at `pos`.
    pub fn set(&self, pos: u64, value: T) -> Result<()> {
        self.write(pos, &[value])
    }

    /// Fills `out` with the elements starting at `pos`.
    pub fn read(&self, pos: u64, out: &mut [T]) -> Result<()> {
        let mut bytes = vec![0u8; out.len() * T::SIZE];
        self.file
            .read_bytes(&self.name, pos, out.len() as u64, &mut bytes)?;
        decode_into(&bytes, out);
        Ok(())
    }

    /// Reads `count` elements starting at `pos` into a new vector.
    pub fn read_vec(&self, pos: u64, count: u64) -> Result<Vec<T>> {
        let mut out = vec![T::default(); count as usize];
        self.read(pos, &mut out)?;
        Ok(out)
    }

    /// Overwrites elements starting at `pos` with `values`.
    pub fn write(&self, pos: u64, values: &[T]) -> Result<()> {
        self.file
            .write_bytes(&self.name, pos, &encode_slice(values))
    }

    /// Sets `[pos, pos + count)` to `T::default()`.
    pub fn zero(&self, pos: u64, count: u64) -> Result<()> {
        const CHUNK: u64 = 4096;
        let zeros = vec![T::default(); CHUNK.min(count) as usize];
        let mut done = 0;
        while done < count {
            let n = CHUNK.min(count - done);
            self.write(pos + done, &zeros[..n as usize])?;
            done += n;
        }
        Ok(())
    }

    /// Grows the pool by `count` elements at `pos`.
    pub fn insert(&self, pos: u64, count: u64, zero_fill: bool) -> Result<()> {
        self.file.insert(&self.name, pos, count, zero_fill)
    }

    /// Appends `count` elements.
    pub fn append(&self, count: u64, zero_fill: bool) -> Result<()> {
        self.file.append(&self.name, count, zero_fill)
    }

    /// Appends `values` at the end of the pool.
    pub fn append_values(&self, values: &[T]) -> Result<()> {
        let at = self.len()?;
        self.append(values.len() as u64, false)?;
        self.write(at, values)
    }

    /// Removes `[pos, pos + count)`.
    pub fn remove(&self, pos: u64, count: u64) -> Result<()> {
        self.file.delete(&self.name, pos, count)
    }

    /// Shrinks or grows the pool to `len` elements.
    pub fn set_len(&self, len: u64, zero_fill: bool) -> Result<()> {
        self.file.set_len(&self.name, len, zero_fill)
    }

    /// Removes every element.
    pub fn clear(&self) -> Result<()> {
        self.file.clear_pool(&self.name)
    }

    /// Overwrites `[dst_pos, dst_pos + count)` with elements read from `src`.
    ///
    /// Works across pool files by staging through a buffer.
    pub fn copy_data(
        &self,
        dst_pos: u64,
        src: &PoolAccessor<'_, T>,
        src_pos: u64,
        count: u64,
    ) -> Result<()> {
        if std::ptr::eq(self.file, src.file) {
            return self
                .file
                .copy_data(&self.name, dst_pos, &src.name, src_pos, count);
        }
        let dst_len = self.len()?;
        if dst_pos.checked_add(count).is_none_or(|end| end > dst_len) {
            return Err(Error::OutOfRange {
                pos: dst_pos,
                count,
                len: dst_len,
            });
        }
        const CHUNK: u64 = 16384;
        let mut buf = vec![T::default(); CHUNK.min(count) as usize];
        let mut done = 0;
        while done < count {
            let n = CHUNK.min(count - done) as usize;
            src.read(src_pos + done, &mut buf[..n])?;
            self.write(dst_pos + done, &buf[..n])?;
            done += n as u64;
        }
        Ok(())
    }

    /// Moves `[src_pos, src_pos + count)` out of `src` and inserts it at `dst_pos`.
    ///
    /// Inside one pool file this relocates extents instead of copying
    /// samples. Across files it falls back to insert, copy, delete.
    pub fn move_data(
        &self,
        dst_pos: u64,
        src: &PoolAccessor<'_, T>,
        src_pos: u64,
        count: u64,
    ) -> Result<()> {
        if std::ptr::eq(self.file, src.file) {
            return self
                .file
                .move_data(&self.name, dst_pos, &src.name, src_pos, count);
        }
        let src_len = src.len()?;
        if src_pos.checked_add(count).is_none_or(|end| end > src_len) {
            return Err(Error::OutOfRange {
                pos: src_pos,
                count,
                len: src_len,
            });
        }
        self.insert(dst_pos, count, false)?;
        self.copy_data(dst_pos, src, src_pos, count)?;
        src.remove(src_pos, count)
    }
}

impl<T: PoolElement> std::fmt::Debug for PoolAccessor<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolAccessor")
            .field("pool", &self.name)
            .field("element_size", &T::SIZE)
            .finish()
    }
}
