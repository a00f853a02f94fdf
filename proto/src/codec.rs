//! Little-endian binary encoding shared by every message on the wire

use std::{ops::Range, str};

use byteorder::{ByteOrder, LE};
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Largest string or blob that fits behind a 16-bit length prefix
pub const MAX_BLOB_LEN: usize = u16::MAX as usize;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer underrun: needed {needed} bytes, {remaining} remaining")]
    BufferUnderrun { needed: usize, remaining: usize },
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown request type {0}")]
    UnknownRequest(u8),
    #[error("unexpected response tag {0}")]
    UnexpectedTag(u8),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{len} bytes exceeds the 16-bit length prefix")]
    PayloadTooLarge { len: usize },
    #[error("{count} items exceeds the count prefix")]
    TooManyItems { count: usize },
}

/// A value that can be appended to a [`Writer`]
pub trait Encode {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError>;
}

/// A value that can be read from a [`Reader`]
pub trait Decode: Sized {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError>;
}

/// Append-only message builder
///
/// The finished message is exactly the bytes written so far, never the spare capacity behind them.
#[derive(Debug, Default)]
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_bool(&mut self, x: bool) {
        self.buf.put_u8(x as u8);
    }

    pub fn put_u8(&mut self, x: u8) {
        self.buf.put_u8(x);
    }

    pub fn put_i16(&mut self, x: i16) {
        self.buf.put_i16_le(x);
    }

    pub fn put_u16(&mut self, x: u16) {
        self.buf.put_u16_le(x);
    }

    pub fn put_i32(&mut self, x: i32) {
        self.buf.put_i32_le(x);
    }

    pub fn put_u32(&mut self, x: u32) {
        self.buf.put_u32_le(x);
    }

    pub fn put_i64(&mut self, x: i64) {
        self.buf.put_i64_le(x);
    }

    pub fn put_u64(&mut self, x: u64) {
        self.buf.put_u64_le(x);
    }

    pub fn put_f32(&mut self, x: f32) {
        self.buf.put_f32_le(x);
    }

    pub fn put_f64(&mut self, x: f64) {
        self.buf.put_f64_le(x);
    }

    /// Write a UTF-8 string behind a byte-length prefix
    pub fn put_str(&mut self, x: &str) -> Result<(), EncodeError> {
        self.put_bytes(x.as_bytes())
    }

    /// Write an opaque blob behind a byte-length prefix
    pub fn put_bytes(&mut self, x: &[u8]) -> Result<(), EncodeError> {
        let len = u16::try_from(x.len()).map_err(|_| EncodeError::PayloadTooLarge { len: x.len() })?;
        self.buf.put_u16_le(len);
        self.buf.put_slice(x);
        Ok(())
    }

    /// Encode a sub-message with `f` and write it as a length-prefixed blob
    pub fn put_nested<F>(&mut self, f: F) -> Result<(), EncodeError>
    where
        F: FnOnce(&mut Writer) -> Result<(), EncodeError>,
    {
        let mut inner = Writer::new();
        f(&mut inner)?;
        self.put_bytes(&inner.buf)
    }

    pub fn put<T: Encode + ?Sized>(&mut self, x: &T) -> Result<(), EncodeError> {
        x.encode(self)
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over a single received payload
#[derive(Debug, Clone)]
pub struct Reader {
    buf: Bytes,
    pos: usize,
}

impl Reader {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self {
            buf: buf.into(),
            pos: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&[u8], DecodeError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(DecodeError::BufferUnderrun {
                needed: n,
                remaining,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..self.pos])
    }

    pub fn get_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_i16(&mut self) -> Result<i16, DecodeError> {
        self.take(2).map(LE::read_i16)
    }

    pub fn get_u16(&mut self) -> Result<u16, DecodeError> {
        self.take(2).map(LE::read_u16)
    }

    pub fn get_i32(&mut self) -> Result<i32, DecodeError> {
        self.take(4).map(LE::read_i32)
    }

    pub fn get_u32(&mut self) -> Result<u32, DecodeError> {
        self.take(4).map(LE::read_u32)
    }

    pub fn get_i64(&mut self) -> Result<i64, DecodeError> {
        self.take(8).map(LE::read_i64)
    }

    pub fn get_u64(&mut self) -> Result<u64, DecodeError> {
        self.take(8).map(LE::read_u64)
    }

    pub fn get_f32(&mut self) -> Result<f32, DecodeError> {
        self.take(4).map(LE::read_f32)
    }

    pub fn get_f64(&mut self) -> Result<f64, DecodeError> {
        self.take(8).map(LE::read_f64)
    }

    /// Bounds of the next length-prefixed blob; the cursor stays put on failure
    fn blob(&mut self) -> Result<Range<usize>, DecodeError> {
        let mark = self.pos;
        let len = self.get_u16()? as usize;
        match self.take(len) {
            Ok(_) => Ok(mark + 2..self.pos),
            Err(e) => {
                self.pos = mark;
                Err(e)
            }
        }
    }

    pub fn get_string(&mut self) -> Result<String, DecodeError> {
        let mark = self.pos;
        let range = self.blob()?;
        match str::from_utf8(&self.buf[range]) {
            Ok(s) => Ok(s.to_owned()),
            Err(_) => {
                self.pos = mark;
                Err(DecodeError::InvalidUtf8)
            }
        }
    }

    /// Read a length-prefixed blob without copying it
    pub fn get_bytes(&mut self) -> Result<Bytes, DecodeError> {
        let range = self.blob()?;
        Ok(self.buf.slice(range))
    }

    /// Read a length-prefixed blob and return a fresh cursor over its contents
    pub fn get_nested(&mut self) -> Result<Reader, DecodeError> {
        self.get_bytes().map(Reader::new)
    }

    pub fn get<T: Decode>(&mut self) -> Result<T, DecodeError> {
        T::decode(self)
    }
}
