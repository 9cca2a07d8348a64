use std::io::Cursor;

use binrw::{BinRead, Endian};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::{DecodeError, Result};

/// Bounds-checked random-access reader over an immutable byte buffer.
///
/// Every header in these formats stores offsets to later sections, both
/// absolute and relative to the record that holds them, so `seek` may move
/// anywhere; the next read re-checks bounds. Reads never panic on malformed
/// input, they return [`DecodeError::OutOfBounds`].
pub struct DataCursor<'a> {
    data: &'a [u8],
    pos: u64,
}

impl<'a> DataCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self { Self { data, pos: 0 } }

    #[inline]
    pub fn position(&self) -> u64 { self.pos }

    #[inline]
    pub fn len(&self) -> u64 { self.data.len() as u64 }

    #[inline]
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    /// Moves the read position. Seeking out of bounds is allowed; the next
    /// read fails instead.
    #[inline]
    pub fn seek(&mut self, offset: u64) { self.pos = offset; }

    /// Reads a little-endian value at the current position and advances.
    pub fn read<T>(&mut self) -> Result<T>
    where T: for<'b> BinRead<Args<'b> = ()> {
        let mut cur = Cursor::new(self.data);
        cur.set_position(self.pos);
        let value = T::read_options(&mut cur, Endian::Little, ()).map_err(|e| self.map_err(e))?;
        self.pos = cur.position();
        Ok(value)
    }

    /// Seeks to `offset` and reads a little-endian value.
    pub fn read_at<T>(&mut self, offset: u64) -> Result<T>
    where T: for<'b> BinRead<Args<'b> = ()> {
        self.seek(offset);
        self.read()
    }

    pub fn read_vec<T>(&mut self, count: usize) -> Result<Vec<T>>
    where T: for<'b> BinRead<Args<'b> = ()> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read()?);
        }
        Ok(out)
    }

    /// Bulk-copies `count` fixed-layout records at the current position.
    /// Used for the large vertex/tangent/index streams where per-field
    /// parsing would be wasteful.
    pub fn read_pod_vec<T>(&mut self, count: usize) -> Result<Vec<T>>
    where T: FromBytes + FromZeroes + AsBytes {
        let mut out = T::new_vec_zeroed(count);
        let bytes = out.as_mut_slice().as_bytes_mut();
        let len = bytes.len() as u64;
        bytes.copy_from_slice(self.slice(self.pos, len)?);
        self.pos += len;
        Ok(out)
    }

    /// Borrows `len` bytes starting at `offset` without moving the position.
    pub fn slice(&self, offset: u64, len: u64) -> Result<&'a [u8]> {
        let end = offset.checked_add(len).ok_or(DecodeError::OutOfBounds {
            offset,
            size: self.len(),
        })?;
        if end > self.len() {
            return Err(DecodeError::OutOfBounds { offset, size: self.len() });
        }
        Ok(&self.data[offset as usize..end as usize])
    }

    /// Reads a null-terminated string at an absolute offset without moving
    /// the position. Offset 0 is the conventional "no string" sentinel in
    /// these formats and yields an empty string.
    pub fn cstr_at(&self, offset: u64) -> Result<String> {
        if offset == 0 {
            return Ok(String::new());
        }
        if offset >= self.len() {
            return Err(DecodeError::OutOfBounds { offset, size: self.len() });
        }
        let tail = &self.data[offset as usize..];
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
    }

    fn map_err(&self, e: binrw::Error) -> DecodeError {
        match e {
            binrw::Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                DecodeError::OutOfBounds { offset: self.pos, size: self.len() }
            }
            e => DecodeError::Read(e),
        }
    }
}

/// Reads a fixed-size, NUL-padded name field.
pub fn fixed_cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
