//! Checksummed 4-byte frame decoder
//!
//! Frame layout: `[0xFF, value_hi, value_lo, checksum]` with
//! `checksum == (b0 + b1 + b2) & 0xFF`.
//!
//! On a bad checksum exactly one byte is dropped and scanning resumes at the
//! next offset, so a marker byte hiding inside noise cannot swallow the real
//! frame that follows it.

use std::collections::VecDeque;

pub const FRAME_MARKER: u8 = 0xFF;
pub const FRAME_LEN: usize = 4;

/// Accumulates raw bytes and yields verified frame values
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: VecDeque<u8>,
    checksum_failures: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().copied());
    }

    /// Number of bytes waiting to be scanned
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Checksum mismatches seen so far
    pub fn checksum_failures(&self) -> usize {
        self.checksum_failures
    }

    /// Next verified big-endian 16-bit value, consuming its frame.
    ///
    /// Returns `None` once fewer than `FRAME_LEN` bytes remain; whatever is
    /// left stays buffered.
    pub fn next_value(&mut self) -> Option<u16> {
        while self.buf.len() >= FRAME_LEN {
            if self.buf[0] != FRAME_MARKER {
                self.buf.pop_front();
                continue;
            }

            let (b0, b1, b2, sum) = (self.buf[0], self.buf[1], self.buf[2], self.buf[3]);
            let expected = (u16::from(b0) + u16::from(b1) + u16::from(b2)) as u8;
            if expected != sum {
                self.checksum_failures += 1;
                tracing::debug!(
                    "frame checksum mismatch: {} (want {:02x})",
                    hex::encode([b0, b1, b2, sum]),
                    expected
                );
                self.buf.pop_front();
                continue;
            }

            self.buf.drain(..FRAME_LEN);
            return Some(u16::from_be_bytes([b1, b2]));
        }
        None
    }
}

/// Builds a valid frame for `value`
pub fn encode(value: u16) -> [u8; FRAME_LEN] {
    let [hi, lo] = value.to_be_bytes();
    let sum = (u16::from(FRAME_MARKER) + u16::from(hi) + u16::from(lo)) as u8;
    [FRAME_MARKER, hi, lo, sum]
}
