//! Byte sources and the FLAC bit reader.
//!
//! The decoder pulls bits from a [`BitReader`], which in turn pulls bytes
//! from a [`ByteSource`]. The reader keeps a 64-bit accumulator refilled one
//! byte at a time and extracts MSB-first, which matches FLAC's big-endian
//! bit packing. Every byte pulled from the source also feeds running CRC-8
//! and CRC-16 hashers so the decoder can checkpoint checksums at frame
//! boundaries without buffering whole frames.

use std::io::{self, Read};

use crate::crc::{Crc16, Crc8};
use crate::error::{BitstreamErrorKind, FlacError, Result};

/// A sequential byte source the decoder can drain.
///
/// This is the full capability set the decoder needs from its input:
/// one-byte lookahead, consuming reads, and forward skips (used only to
/// step over unwanted metadata).
pub trait ByteSource {
    /// Return the next byte without consuming it, or `None` at end of
    /// stream.
    fn peek(&mut self) -> Result<Option<u8>>;

    /// Consume and return one byte. Fails with
    /// [`FlacError::UnexpectedEof`] at end of stream.
    fn read_byte(&mut self) -> Result<u8>;

    /// Advance past `n` bytes. Fails with [`FlacError::UnexpectedEof`] if
    /// the source ends first.
    fn skip(&mut self, n: u64) -> Result<()>;
}

/// Adapter exposing any [`std::io::Read`] as a [`ByteSource`].
///
/// Lookahead is a single buffered byte; no `Seek` bound is required, so
/// network streams and pipes work unchanged.
#[derive(Debug)]
pub struct IoByteSource<R> {
    inner: R,
    peeked: Option<u8>,
}

impl<R: Read> IoByteSource<R> {
    /// Wrap a reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: None,
        }
    }

    fn read_inner_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<R: Read> ByteSource for IoByteSource<R> {
    fn peek(&mut self) -> Result<Option<u8>> {
        if self.peeked.is_none() {
            self.peeked = self.read_inner_byte()?;
        }
        Ok(self.peeked)
    }

    fn read_byte(&mut self) -> Result<u8> {
        if let Some(byte) = self.peeked.take() {
            return Ok(byte);
        }
        self.read_inner_byte()?.ok_or(FlacError::UnexpectedEof)
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        let mut remaining = n;
        if remaining > 0 && self.peeked.take().is_some() {
            remaining -= 1;
        }
        let mut buf = [0u8; 512];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            match self.inner.read(&mut buf[..want]) {
                Ok(0) => return Err(FlacError::UnexpectedEof),
                Ok(got) => remaining -= got as u64,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// MSB-first bit reader over a [`ByteSource`].
pub struct BitReader<S> {
    source: S,
    /// Accumulator; the low `bits` bits are valid, extraction comes from
    /// the top of that window.
    acc: u64,
    bits: u32,
    crc8: Crc8,
    crc16: Crc16,
}

impl<S: ByteSource> BitReader<S> {
    /// Create a reader over a byte source.
    pub fn new(source: S) -> Self {
        Self {
            source,
            acc: 0,
            bits: 0,
            crc8: Crc8::new(),
            crc16: Crc16::new(),
        }
    }

    fn refill_byte(&mut self) -> Result<()> {
        let byte = self.source.read_byte()?;
        self.crc8.update(byte);
        self.crc16.update(byte);
        self.acc = (self.acc << 8) | u64::from(byte);
        self.bits += 8;
        Ok(())
    }

    /// Read `n` bits as an unsigned integer, MSB first. `n == 0` returns 0.
    pub fn read_unsigned(&mut self, n: u32) -> Result<u64> {
        if n > 64 {
            return Err(FlacError::InvalidArgument(format!(
                "cannot read {n} bits at once (max 64)"
            )));
        }
        if n == 0 {
            return Ok(0);
        }
        // The byte-at-a-time refill can hold at most 63 valid bits before
        // overflowing, so wide reads go in two pulls.
        if n > 56 {
            let high = self.read_unsigned(n - 32)?;
            let low = self.read_unsigned(32)?;
            return Ok((high << 32) | low);
        }
        while self.bits < n {
            self.refill_byte()?;
        }
        let shift = self.bits - n;
        let mask = (1u64 << n) - 1;
        let value = (self.acc >> shift) & mask;
        self.bits -= n;
        Ok(value)
    }

    /// Read `n` bits and sign-extend from the top bit. `n == 0` returns 0.
    pub fn read_signed(&mut self, n: u32) -> Result<i64> {
        if n == 0 {
            return Ok(0);
        }
        let value = self.read_unsigned(n)?;
        let shift = 64 - n;
        Ok(((value << shift) as i64) >> shift)
    }

    /// Count zero bits up to and including the terminating one bit.
    pub fn read_unary(&mut self) -> Result<u64> {
        let mut count = 0u64;
        while self.read_unsigned(1)? == 0 {
            count += 1;
        }
        Ok(count)
    }

    /// Read a Rice-coded signed integer with parameter `k` and undo the
    /// zig-zag folding.
    pub fn read_rice(&mut self, k: u32) -> Result<i64> {
        let quotient = self.read_unary()?;
        let remainder = self.read_unsigned(k)?;
        let folded = (quotient << k) | remainder;
        if folded & 1 == 0 {
            Ok((folded >> 1) as i64)
        } else {
            Ok(-((folded >> 1) as i64) - 1)
        }
    }

    /// Read a UTF-8-style coded number of 1..=7 bytes (up to 36 bits of
    /// payload). Must be called at a byte boundary.
    pub fn read_utf8_coded(&mut self) -> Result<u64> {
        let first = self.read_unsigned(8)? as u8;
        if first & 0x80 == 0 {
            return Ok(u64::from(first));
        }

        let leading_ones = first.leading_ones();
        if !(2..=7).contains(&leading_ones) {
            return Err(FlacError::InvalidBitstream(
                BitstreamErrorKind::MalformedUtf8,
            ));
        }

        let mut value = u64::from(first & (0xFF >> (leading_ones + 1)));
        for _ in 1..leading_ones {
            let byte = self.read_unsigned(8)? as u8;
            if byte & 0xC0 != 0x80 {
                return Err(FlacError::InvalidBitstream(
                    BitstreamErrorKind::MalformedUtf8,
                ));
            }
            value = (value << 6) | u64::from(byte & 0x3F);
        }
        Ok(value)
    }

    /// Read one byte. Must be called at a byte boundary, or after buffered
    /// bits leave a whole byte in the accumulator.
    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_unsigned(8)? as u8)
    }

    /// Discard buffered bits below the next byte boundary. Never touches
    /// the source.
    pub fn align_to_byte(&mut self) {
        self.bits -= self.bits % 8;
    }

    /// True when the reader is byte-aligned.
    pub fn is_byte_aligned(&self) -> bool {
        self.bits % 8 == 0
    }

    /// True when no bits remain buffered and the source is exhausted.
    pub fn eos(&mut self) -> Result<bool> {
        Ok(self.bits == 0 && self.source.peek()?.is_none())
    }

    /// Advance past `n` bytes. Only valid at a byte boundary.
    pub fn skip_bytes(&mut self, n: u64) -> Result<()> {
        if !self.is_byte_aligned() {
            return Err(FlacError::InvalidArgument(
                "skip_bytes while not byte-aligned".into(),
            ));
        }
        let mut remaining = n;
        while remaining > 0 && self.bits > 0 {
            self.read_unsigned(8)?;
            remaining -= 1;
        }
        if remaining > 0 {
            self.source.skip(remaining)?;
        }
        Ok(())
    }

    /// Reset both running checksums. Called at the start of each frame.
    pub(crate) fn reset_crc(&mut self) {
        self.crc8.reset();
        self.crc16.reset();
    }

    /// CRC-8 over bytes pulled since the last reset. Only meaningful at a
    /// byte-aligned, fully-consumed position.
    pub(crate) fn crc8(&self) -> u8 {
        self.crc8.value()
    }

    /// CRC-16 over bytes pulled since the last reset. Only meaningful at a
    /// byte-aligned, fully-consumed position.
    pub(crate) fn crc16(&self) -> u16 {
        self.crc16.value()
    }
}
