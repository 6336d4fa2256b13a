// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Bit-level I/O for JPEG entropy-coded data.
//!
//! Provides [`BitReader`] for decoding and [`BitWriter`] for encoding the
//! entropy-coded scan data. Both handle JPEG byte-stuffing (0xFF -> 0xFF 0x00)
//! and operate in MSB-first bit order.
//!
//! The reader never fails on running out of data. Past the end of the input,
//! or past a marker, it supplies zero bits and records how many of them were
//! handed out so the scan loop can stop and report a truncated image.

/// Bit-level reader for JPEG entropy-coded data.
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    /// Bit buffer, MSB-aligned. Valid bits are in the low `bits_left` positions.
    buf: u32,
    bits_left: u8,
    /// Zero bits fed into `buf` after data ended. They sit below real bits.
    phantom_bits: u32,
    /// Set when a marker (0xFF followed by a non-zero byte) stops the data.
    marker_found: Option<u8>,
}

impl<'a> BitReader<'a> {
    /// Create a reader starting at `pos`, the first entropy-coded byte after an SOS header.
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos,
            buf: 0,
            bits_left: 0,
            phantom_bits: 0,
            marker_found: None,
        }
    }

    /// Read `count` bits (1–16) and return them right-aligned.
    pub fn read_bits(&mut self, count: u8) -> u16 {
        debug_assert!((1..=16).contains(&count));
        self.fill(count);
        self.bits_left -= count;
        ((self.buf >> self.bits_left) & ((1u32 << count) - 1)) as u16
    }

    /// Read a single bit.
    pub fn read_bit(&mut self) -> bool {
        self.read_bits(1) != 0
    }

    /// Peek at the top `count` bits without consuming them.
    pub fn peek_bits(&mut self, count: u8) -> u16 {
        debug_assert!((1..=16).contains(&count));
        self.fill(count);
        ((self.buf >> (self.bits_left - count)) & ((1u32 << count) - 1)) as u16
    }

    /// Discard `count` bits (must have been peeked already).
    pub fn skip_bits(&mut self, count: u8) {
        debug_assert!(count <= self.bits_left);
        self.bits_left -= count;
    }

    /// Discard the rest of the current byte.
    pub fn byte_align(&mut self) {
        self.bits_left = 0;
        self.buf = 0;
        self.phantom_bits = 0;
    }

    /// Current byte position in the underlying data.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The marker that terminated the entropy-coded data, if reached.
    pub fn marker_found(&self) -> Option<u8> {
        self.marker_found
    }

    /// True once bits beyond the real data have been consumed.
    pub fn is_overrun(&self) -> bool {
        self.phantom_bits > self.bits_left as u32
    }

    /// Consume a restart marker (0xFFD0–0xFFD7) at the current byte position.
    ///
    /// Discards the remaining bits of the current byte and any 0xFF fill
    /// bytes first. Returns the marker's low nibble, or `None` if the next
    /// thing in the stream is not a restart marker.
    pub fn check_restart_marker(&mut self) -> Option<u8> {
        self.byte_align();
        let mut pos = self.pos;
        while pos + 1 < self.data.len() && self.data[pos] == 0xFF {
            let next = self.data[pos + 1];
            if next == 0xFF {
                pos += 1;
                continue;
            }
            if (0xD0..=0xD7).contains(&next) {
                self.pos = pos + 2;
                self.marker_found = None;
                return Some(next & 0x07);
            }
            break;
        }
        None
    }

    fn fill(&mut self, count: u8) {
        while self.bits_left < count {
            self.fill_byte();
        }
    }

    fn fill_byte(&mut self) {
        let byte = match self.next_data_byte() {
            Some(b) => b,
            None => {
                self.phantom_bits = self.phantom_bits.saturating_add(8);
                0
            }
        };
        self.buf = (self.buf << 8) | byte as u32;
        self.bits_left += 8;
    }

    fn next_data_byte(&mut self) -> Option<u8> {
        if self.marker_found.is_some() || self.pos >= self.data.len() {
            return None;
        }
        let byte = self.data[self.pos];
        if byte != 0xFF {
            self.pos += 1;
            return Some(byte);
        }
        match self.data.get(self.pos + 1) {
            Some(0x00) => {
                self.pos += 2;
                Some(0xFF)
            }
            Some(&next) => {
                // Leave `pos` on the marker so the caller can resume there
                self.marker_found = Some(next);
                None
            }
            None => {
                self.pos = self.data.len();
                None
            }
        }
    }
}

/// Bit-level writer for JPEG entropy-coded data.
///
/// Bits collect in a 32-bit accumulator; complete bytes are flushed as soon
/// as they are available, each 0xFF followed by a stuffed 0x00.
pub struct BitWriter {
    output: Vec<u8>,
    acc: u32,
    bit_count: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            output: Vec::with_capacity(capacity),
            acc: 0,
            bit_count: 0,
        }
    }

    /// Append the low `count` bits (0–16) of `bits`.
    pub fn emit(&mut self, bits: u32, count: u8) {
        debug_assert!(count <= 16);
        if count == 0 {
            return;
        }
        let bits = bits & ((1u32 << count) - 1);
        self.bit_count += count;
        self.acc |= bits << (32 - self.bit_count as u32);
        while self.bit_count >= 8 {
            let byte = (self.acc >> 24) as u8;
            self.output.push(byte);
            if byte == 0xFF {
                self.output.push(0x00);
            }
            self.acc <<= 8;
            self.bit_count -= 8;
        }
    }

    /// Pad the partial byte with 1-bits.
    pub fn pad_to_byte(&mut self) {
        if self.bit_count > 0 {
            self.emit(0x7F, 8 - self.bit_count);
        }
    }

    /// Pad, then write a marker verbatim (no stuffing).
    pub fn write_marker(&mut self, marker: u8) {
        self.pad_to_byte();
        self.output.push(0xFF);
        self.output.push(marker);
    }

    /// Pad remaining bits with 1s and return the bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.pad_to_byte();
        self.output
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_basic_bits() {
        // 0xA5 = 1010_0101
        let data = [0xA5];
        let mut r = BitReader::new(&data, 0);
        assert_eq!(r.read_bits(4), 0b1010);
        assert_eq!(r.read_bits(4), 0b0101);
        assert!(!r.is_overrun());
    }

    #[test]
    fn read_cross_byte_unstuffed() {
        let data = [0xFF, 0x00, 0x80];
        let mut r = BitReader::new(&data, 0);
        assert_eq!(r.read_bits(12), 0xFF8);
    }

    #[test]
    fn marker_stops_data() {
        let data = [0xAB, 0xFF, 0xD9];
        let mut r = BitReader::new(&data, 0);
        assert_eq!(r.read_bits(8), 0xAB);
        assert_eq!(r.read_bits(8), 0);
        assert_eq!(r.marker_found(), Some(0xD9));
        assert!(r.is_overrun());
        // Position stays on the marker
        assert_eq!(r.position(), 1);
    }

    #[test]
    fn peek_past_end_is_not_overrun() {
        let data = [0xA5];
        let mut r = BitReader::new(&data, 0);
        assert_eq!(r.peek_bits(16), 0xA500);
        r.skip_bits(8);
        assert!(!r.is_overrun());
        r.read_bits(1);
        assert!(r.is_overrun());
    }

    #[test]
    fn restart_marker_consumed() {
        let data = [0b1100_0000, 0xFF, 0xFF, 0xD3, 0x80];
        let mut r = BitReader::new(&data, 0);
        assert_eq!(r.read_bits(2), 0b11);
        assert_eq!(r.check_restart_marker(), Some(3));
        assert_eq!(r.read_bits(1), 1);
    }

    #[test]
    fn restart_marker_absent() {
        let data = [0x00, 0x12];
        let mut r = BitReader::new(&data, 0);
        r.read_bits(8);
        assert_eq!(r.check_restart_marker(), None);
    }

    #[test]
    fn restart_marker_after_prefetch() {
        // Peeking 16 bits runs into the RST marker; it must still be found
        let data = [0xA0, 0xFF, 0xD0, 0x40];
        let mut r = BitReader::new(&data, 0);
        assert_eq!(r.peek_bits(16) >> 8, 0xA0);
        r.skip_bits(3);
        assert_eq!(r.check_restart_marker(), Some(0));
        assert_eq!(r.read_bits(2), 0b01);
    }

    #[test]
    fn write_basic() {
        let mut w = BitWriter::new();
        w.emit(0b1010, 4);
        w.emit(0b0101, 4);
        assert_eq!(w.finish(), vec![0xA5]);
    }

    #[test]
    fn write_byte_stuffing() {
        let mut w = BitWriter::new();
        w.emit(0xFF, 8);
        assert_eq!(w.finish(), vec![0xFF, 0x00]);
    }

    #[test]
    fn write_padding() {
        let mut w = BitWriter::new();
        w.emit(0b110, 3);
        // 110_11111
        assert_eq!(w.finish(), vec![0xDF]);
    }

    #[test]
    fn write_cross_byte() {
        let mut w = BitWriter::new();
        w.emit(0b1111_1111_1000, 12);
        assert_eq!(w.finish(), vec![0xFF, 0x00, 0x8F]);
    }

    #[test]
    fn padding_can_create_stuffed_byte() {
        let mut w = BitWriter::new();
        w.emit(0b1, 1);
        assert_eq!(w.finish(), vec![0xFF, 0x00]);
    }

    #[test]
    fn marker_written_verbatim() {
        let mut w = BitWriter::new();
        w.emit(0b0, 1);
        w.write_marker(0xD0);
        w.emit(0x12, 8);
        assert_eq!(w.finish(), vec![0x7F, 0xFF, 0xD0, 0x12]);
    }
}
