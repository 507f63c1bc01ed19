// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Primitive reader/writer for the jute wire encoding used by ZooKeeper:
//! big-endian integers, one-byte booleans, length-prefixed byte buffers and
//! UTF-8 strings. Record types compose these primitives; nothing here knows
//! about framing or opcodes.

use anyhow::{Context, Result, bail};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Append-only encoder over a growable buffer.
#[derive(Debug, Default)]
pub struct WriteArchive {
    buf: BytesMut,
}

impl WriteArchive {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(cap),
        }
    }

    #[inline]
    pub fn write_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    #[inline]
    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    #[inline]
    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    /// Length-prefixed byte buffer.
    pub fn write_buffer(&mut self, b: &[u8]) {
        self.buf.put_i32(b.len() as i32);
        self.buf.put_slice(b);
    }

    /// UTF-8 string encoded as a buffer.
    pub fn write_string(&mut self, s: &str) {
        self.write_buffer(s.as_bytes());
    }

    /// `i32` element count followed by the encoded strings.
    pub fn write_string_vec(&mut self, items: &[String]) {
        self.buf.put_i32(items.len() as i32);
        for it in items {
            self.write_string(it);
        }
    }

    #[inline]
    pub fn write_raw(&mut self, b: &[u8]) {
        self.buf.put_slice(b);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Bounds-checked decoder over a frame payload. Truncated input is reported
/// as an error, never a panic; framing-level code treats any decode failure
/// as a broken stream.
#[derive(Debug)]
pub struct ReadArchive {
    buf: Bytes,
}

impl ReadArchive {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    #[inline]
    fn ensure(&self, n: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < n {
            bail!(
                "truncated record: need {n} bytes for {what}, {} left",
                self.buf.remaining()
            );
        }
        Ok(())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4, "i32")?;
        Ok(self.buf.get_i32())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure(8, "i64")?;
        Ok(self.buf.get_i64())
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.ensure(1, "bool")?;
        Ok(self.buf.get_u8() != 0)
    }

    /// Length-prefixed buffer; a negative length denotes an absent buffer
    /// and decodes as empty.
    pub fn read_buffer(&mut self) -> Result<Bytes> {
        let len = self.read_i32()?;
        if len < 0 {
            return Ok(Bytes::new());
        }
        let len = len as usize;
        self.ensure(len, "buffer body")?;
        Ok(self.buf.split_to(len))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let raw = self.read_buffer()?;
        String::from_utf8(raw.to_vec()).context("string is not valid UTF-8")
    }

    pub fn read_string_vec(&mut self) -> Result<Vec<String>> {
        let count = self.read_i32()?;
        if count < 0 {
            return Ok(Vec::new());
        }
        let count = count as usize;
        // Each element costs at least its 4-byte length prefix.
        self.ensure(count.saturating_mul(4), "string vector")?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_string()?);
        }
        Ok(out)
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Hand back whatever trails the fields parsed so far.
    pub fn into_rest(self) -> Bytes {
        self.buf
    }
}
