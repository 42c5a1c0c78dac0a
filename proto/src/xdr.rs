//! XDR (RFC 4506) primitive encoding and decoding.
//!
//! Everything on the NFSv4 wire reduces to the primitives in this module:
//! big-endian fixed-width integers, booleans, opaque byte strings padded to
//! a four-byte boundary, and `bitmap4` word arrays. The reader validates
//! length prefixes against hard caps before allocating.

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};
use thiserror::Error;

/// The XDR alignment in bytes.
pub const ALIGNMENT: usize = 4;

/// Upper bound accepted for a variable-length opaque before allocation.
pub const MAX_OPAQUE_SIZE: usize = 1024 * 1024;

/// Upper bound accepted for a `bitmap4` word count.
pub const MAX_BITMAP_WORDS: usize = 8;

#[derive(Debug, Error)]
pub enum XdrError {
    #[error("unexpected end of XDR stream")]
    UnexpectedEof,
    #[error("enum discriminant {0} has no matching variant")]
    BadDiscriminant(u32),
    #[error("length prefix {length} exceeds limit {limit}")]
    LimitExceeded { length: usize, limit: usize },
    #[error("opaque data is not valid UTF-8")]
    BadUtf8,
    #[error("boolean encoded as {0}")]
    BadBool(u32),
    #[error("attribute {0} is not decodable by this server")]
    UnsupportedAttribute(u32),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type XdrResult<T> = Result<T, XdrError>;

/// Pads `n` up to the next XDR alignment boundary.
pub fn pad_len(n: usize) -> usize {
    (ALIGNMENT - n % ALIGNMENT) % ALIGNMENT
}

/// A cursor over a byte slice yielding XDR primitives.
#[derive(Debug)]
pub struct XdrReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> XdrReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        XdrReader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> XdrResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(XdrError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> XdrResult<u32> {
        let mut bytes = self.take(4)?;
        Ok(bytes.read_u32::<BigEndian>()?)
    }

    pub fn read_i32(&mut self) -> XdrResult<i32> {
        let mut bytes = self.take(4)?;
        Ok(bytes.read_i32::<BigEndian>()?)
    }

    pub fn read_u64(&mut self) -> XdrResult<u64> {
        let mut bytes = self.take(8)?;
        Ok(bytes.read_u64::<BigEndian>()?)
    }

    pub fn read_i64(&mut self) -> XdrResult<i64> {
        let mut bytes = self.take(8)?;
        Ok(bytes.read_i64::<BigEndian>()?)
    }

    pub fn read_bool(&mut self) -> XdrResult<bool> {
        match self.read_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(XdrError::BadBool(v)),
        }
    }

    /// Reads a fixed-length opaque, consuming the trailing pad bytes.
    pub fn read_fixed<const N: usize>(&mut self) -> XdrResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        self.take(pad_len(N))?;
        Ok(out)
    }

    /// Reads a variable-length opaque bounded by [`MAX_OPAQUE_SIZE`].
    pub fn read_opaque(&mut self) -> XdrResult<Vec<u8>> {
        self.read_opaque_max(MAX_OPAQUE_SIZE)
    }

    /// Reads a variable-length opaque with an explicit size bound. The
    /// bound is checked against the length prefix before any allocation.
    pub fn read_opaque_max(&mut self, limit: usize) -> XdrResult<Vec<u8>> {
        let length = self.read_u32()? as usize;
        if length > limit {
            return Err(XdrError::LimitExceeded { length, limit });
        }
        let data = self.take(length)?.to_vec();
        self.take(pad_len(length))?;
        Ok(data)
    }

    pub fn read_string(&mut self) -> XdrResult<String> {
        self.read_string_max(MAX_OPAQUE_SIZE)
    }

    pub fn read_string_max(&mut self, limit: usize) -> XdrResult<String> {
        let bytes = self.read_opaque_max(limit)?;
        String::from_utf8(bytes).map_err(|_| XdrError::BadUtf8)
    }

    /// Reads a `bitmap4`: a word count followed by that many words. Counts
    /// above [`MAX_BITMAP_WORDS`] are rejected.
    pub fn read_bitmap(&mut self) -> XdrResult<Vec<u32>> {
        let words = self.read_u32()? as usize;
        if words > MAX_BITMAP_WORDS {
            return Err(XdrError::LimitExceeded {
                length: words,
                limit: MAX_BITMAP_WORDS,
            });
        }
        let mut bitmap = Vec::with_capacity(words);
        for _ in 0..words {
            bitmap.push(self.read_u32()?);
        }
        Ok(bitmap)
    }

    /// Reads an optional value, encoded as a boolean followed by the value.
    pub fn read_option<T>(
        &mut self,
        cont: impl FnOnce(&mut Self) -> XdrResult<T>,
    ) -> XdrResult<Option<T>> {
        match self.read_bool()? {
            true => Ok(Some(cont(self)?)),
            false => Ok(None),
        }
    }

    /// Skips a variable-length opaque without retaining its contents.
    pub fn skip_opaque(&mut self) -> XdrResult<()> {
        let length = self.read_u32()? as usize;
        self.take(length)?;
        self.take(pad_len(length))?;
        Ok(())
    }
}

/// An append-only XDR output buffer.
#[derive(Debug, Default)]
pub struct XdrWriter {
    buf: Vec<u8>,
}

impl XdrWriter {
    pub fn new() -> Self {
        XdrWriter { buf: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u32(v as u32);
    }

    /// Writes a fixed-length opaque plus zero padding.
    pub fn write_fixed(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
        self.buf.extend_from_slice(&[0u8; ALIGNMENT][..pad_len(v.len())]);
    }

    /// Writes a variable-length opaque: length prefix, bytes, zero padding.
    pub fn write_opaque(&mut self, v: &[u8]) {
        self.write_u32(v.len() as u32);
        self.write_fixed(v);
    }

    pub fn write_string(&mut self, v: &str) {
        self.write_opaque(v.as_bytes());
    }

    pub fn write_bitmap(&mut self, words: &[u32]) {
        self.write_u32(words.len() as u32);
        for word in words {
            self.write_u32(*word);
        }
    }

    /// Appends raw pre-encoded bytes. The caller is responsible for their
    /// internal alignment.
    pub fn write_raw(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn write_option<T>(&mut self, v: &Option<T>, cont: impl FnOnce(&mut Self, &T)) {
        match v {
            Some(inner) => {
                self.write_bool(true);
                cont(self, inner);
            }
            None => self.write_bool(false),
        }
    }
}

/// A type with a fixed XDR wire representation, decodable from a reader.
pub trait XdrDecode: Sized {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self>;
}

/// A type with a fixed XDR wire representation, encodable onto a writer.
pub trait XdrEncode {
    fn encode(&self, writer: &mut XdrWriter);
}

/// Reads and discards padding bytes after `n` bytes of payload.
pub fn padding(src: &mut impl Read, n: usize) -> XdrResult<()> {
    let mut buf = [0u8; ALIGNMENT];
    src.read_exact(&mut buf[..pad_len(n)])
        .map_err(|_| XdrError::UnexpectedEof)
}
