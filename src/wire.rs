//! Wire primitives: typed little-endian sink and source.
//!
//! Every codec in this crate writes through [`Sink`] and reads through
//! [`Source`].  Both operate on private, per-call byte buffers — no shared
//! state, no I/O, no blocking.  A `Sink` can only grow; a `Source` can only
//! advance.  All multi-byte integers are little-endian.  This is fixed by
//! the format and never negotiated.
//!
//! # Varints
//! Unsigned varints are LEB128: 7 payload bits per byte, high bit set on
//! continuation bytes, at most 10 bytes for a u64.  Signed varints are
//! zigzag-folded first so small negative values stay short.
//!
//! # Strings
//! A string is a varint byte length followed by that many UTF-8 bytes.  The
//! reader validates the length against the remaining input *before*
//! allocating, so a corrupt length prefix cannot trigger an oversized
//! allocation.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

use crate::codec::CodecError;

/// Maximum encoded length of a u64 varint.
const MAX_VARINT_BYTES: u32 = 10;

// ── Sink ─────────────────────────────────────────────────────────────────────

/// Growable output buffer with typed primitive writes.
///
/// Writes cannot partially fail: the backing store is in-memory, so every
/// method either appends its full encoding or (on the unreachable error
/// path) appends nothing the caller may rely on.
#[derive(Debug, Default)]
pub struct Sink {
    buf: Vec<u8>,
}

impl Sink {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap) }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the sink, yielding the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), CodecError> {
        self.buf.write_u8(v)?;
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), CodecError> {
        self.buf.write_u32::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<(), CodecError> {
        self.buf.write_u64::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<(), CodecError> {
        self.buf.write_i64::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<(), CodecError> {
        self.buf.write_f64::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_var_u64(&mut self, mut v: u64) -> Result<(), CodecError> {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.write_u8(byte)?;
                return Ok(());
            }
            self.buf.write_u8(byte | 0x80)?;
        }
    }

    pub fn write_var_u32(&mut self, v: u32) -> Result<(), CodecError> {
        self.write_var_u64(u64::from(v))
    }

    /// Zigzag-folded signed varint.
    pub fn write_var_i64(&mut self, v: i64) -> Result<(), CodecError> {
        self.write_var_u64(((v << 1) ^ (v >> 63)) as u64)
    }

    /// Varint byte length followed by UTF-8 bytes.
    pub fn write_str(&mut self, s: &str) -> Result<(), CodecError> {
        self.write_var_u64(s.len() as u64)?;
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

// ── Source ───────────────────────────────────────────────────────────────────

/// Read cursor over an immutable byte slice with typed primitive reads.
///
/// Every shortfall — exhausted input, overlong varint, length prefix past
/// the end of the buffer, invalid UTF-8 — surfaces as
/// [`CodecError::MalformedPayload`].  Corrupt input is never retried.
#[derive(Debug)]
pub struct Source<'a> {
    cur: Cursor<&'a [u8]>,
}

impl<'a> Source<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { cur: Cursor::new(data) }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        let data = self.cur.get_ref();
        data.len().saturating_sub(self.cur.position() as usize)
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.cur.position() as usize
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.cur.read_u8()?)
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(self.cur.read_u32::<LittleEndian>()?)
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(self.cur.read_u64::<LittleEndian>()?)
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(self.cur.read_i64::<LittleEndian>()?)
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(self.cur.read_f64::<LittleEndian>()?)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, CodecError> {
        if n > self.remaining() {
            return Err(CodecError::MalformedPayload(format!(
                "byte run of {n} exceeds {} remaining",
                self.remaining()
            )));
        }
        let mut out = vec![0u8; n];
        self.cur.read_exact(&mut out)?;
        Ok(out)
    }

    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<(), CodecError> {
        self.cur.read_exact(out)?;
        Ok(())
    }

    pub fn read_var_u64(&mut self) -> Result<u64, CodecError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.cur.read_u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= MAX_VARINT_BYTES * 7 {
                return Err(CodecError::MalformedPayload(
                    "varint exceeds 10 bytes".into(),
                ));
            }
        }
    }

    pub fn read_var_u32(&mut self) -> Result<u32, CodecError> {
        let v = self.read_var_u64()?;
        u32::try_from(v).map_err(|_| {
            CodecError::MalformedPayload(format!("varint {v} out of u32 range"))
        })
    }

    pub fn read_var_i64(&mut self) -> Result<i64, CodecError> {
        let v = self.read_var_u64()?;
        Ok(((v >> 1) as i64) ^ -((v & 1) as i64))
    }

    pub fn read_str(&mut self) -> Result<String, CodecError> {
        let len = self.read_var_u64()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes)
            .map_err(|e| CodecError::MalformedPayload(format!("invalid UTF-8 string: {e}")))
    }
}
