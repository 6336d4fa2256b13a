// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Huffman coding tables for JPEG entropy decoding and encoding.
//!
//! Codes are canonical (ITU-T T.81 Annex C): within a length they are
//! consecutive, and each length continues from the previous one shifted
//! left by one bit.

use std::collections::VecDeque;

use super::bitio::BitReader;
use super::error::{JpegError, Result};
use super::tables::HuffmanSpec;

/// Width of the fast lookup prefix.
const FAST_BITS: u8 = 8;

/// Huffman decode table with two-level lookup.
///
/// Level 1: 8-bit fast lookup table (covers most codes).
/// Level 2: canonical `maxcode`/`valptr` walk for longer codes.
pub struct HuffmanDecodeTable {
    /// Indexed by the next 8 bits of the stream: (symbol, code_length).
    /// A length of 0 means the code is longer than 8 bits (or invalid).
    fast: [(u8, u8); 256],
    /// Largest code of each length (index 1–16), -1 if the length is unused.
    maxcode: [i32; 17],
    /// `huffval` index of the first code of each length minus that code.
    valoffset: [i32; 17],
    huffval: Vec<u8>,
}

impl HuffmanDecodeTable {
    /// Build a decode table from JPEG-style counts and symbols.
    ///
    /// `bits`: counts[i] = number of codes of length i+1 (16 entries).
    /// `huffval`: the symbols, in order of increasing code length.
    pub fn build(bits: &[u8; 16], huffval: &[u8]) -> Result<Self> {
        let total: usize = bits.iter().map(|&b| b as usize).sum();
        if total == 0 || total > 256 || total > huffval.len() {
            return Err(JpegError::InvalidSegment("bad Huffman code counts"));
        }

        let mut fast = [(0u8, 0u8); 256];
        let mut maxcode = [-1i32; 17];
        let mut valoffset = [0i32; 17];

        let mut code: u32 = 0;
        let mut si = 0usize;
        for length in 1..=16u8 {
            let count = bits[(length - 1) as usize] as usize;
            if count > 0 {
                valoffset[length as usize] = si as i32 - code as i32;
                for _ in 0..count {
                    // Codes of this length may not overflow their bit width
                    if code >= 1u32 << length {
                        return Err(JpegError::InvalidSegment("over-subscribed Huffman table"));
                    }
                    if length <= FAST_BITS {
                        // This code, left-aligned to 8 bits, covers 2^(8-length) entries
                        let base = (code << (FAST_BITS - length)) as usize;
                        let fill = 1usize << (FAST_BITS - length);
                        for entry in &mut fast[base..base + fill] {
                            *entry = (huffval[si], length);
                        }
                    }
                    si += 1;
                    code += 1;
                }
                maxcode[length as usize] = code as i32 - 1;
            }
            code <<= 1;
        }

        Ok(Self {
            fast,
            maxcode,
            valoffset,
            huffval: huffval[..total].to_vec(),
        })
    }

    /// Decode one Huffman symbol from the bit stream.
    pub fn decode(&self, reader: &mut BitReader) -> Result<u8> {
        let peek = reader.peek_bits(FAST_BITS);
        let (symbol, length) = self.fast[peek as usize];
        if length > 0 {
            reader.skip_bits(length);
            return Ok(symbol);
        }

        // Longer than 8 bits: extend the prefix one bit at a time
        reader.skip_bits(FAST_BITS);
        let mut code = peek as i32;
        for length in (FAST_BITS as usize + 1)..=16 {
            code = (code << 1) | reader.read_bits(1) as i32;
            if code <= self.maxcode[length] {
                let idx = (code + self.valoffset[length]) as usize;
                return self.huffval.get(idx).copied().ok_or(JpegError::HuffmanDecode);
            }
        }
        Err(JpegError::HuffmanDecode)
    }
}

/// Huffman encode table: maps symbol → (code_bits, code_length).
pub struct HuffmanEncodeTable {
    /// For each of the 256 possible symbols: (code, length).
    /// Length 0 means the symbol is not in the table.
    table: [(u16, u8); 256],
}

impl HuffmanEncodeTable {
    /// Build an encode table from JPEG-style counts and symbols.
    pub fn build(bits: &[u8; 16], huffval: &[u8]) -> Self {
        let mut table = [(0u16, 0u8); 256];
        let mut code: u32 = 0;
        let mut symbols = huffval.iter();

        for length in 1..=16u8 {
            for _ in 0..bits[(length - 1) as usize] {
                if let Some(&symbol) = symbols.next() {
                    table[symbol as usize] = (code as u16, length);
                }
                code += 1;
            }
            code <<= 1;
        }

        Self { table }
    }

    pub fn from_spec(spec: &HuffmanSpec) -> Self {
        Self::build(&spec.bits, &spec.huffval)
    }

    /// Encode a symbol: returns (code_bits, code_length).
    pub fn encode(&self, symbol: u8) -> Result<(u16, u8)> {
        match self.table[symbol as usize] {
            (_, 0) => Err(JpegError::InvalidSegment("Huffman table missing code for symbol")),
            entry => Ok(entry),
        }
    }
}

/// Number of significant bits of each byte value: the magnitude category.
const BIT_COUNT: [u8; 256] = {
    let mut lut = [0u8; 256];
    let mut i = 1;
    while i < 256 {
        lut[i] = lut[i / 2] + 1;
        i += 1;
    }
    lut
};

/// Magnitude category (bit length) of `value`.
pub fn bit_count(value: u16) -> u8 {
    if value < 256 {
        BIT_COUNT[value as usize]
    } else {
        8 + BIT_COUNT[(value >> 8) as usize]
    }
}

/// Extend a signed value from its JPEG "additional bits" representation.
///
/// Per ITU-T T.81 Table F.1: if the high bit is 0, the value is negative.
pub fn extend_sign(value: u16, bits: u8) -> i16 {
    if bits == 0 {
        return 0;
    }
    let half = 1i32 << (bits - 1);
    if (value as i32) < half {
        (value as i32 - (1i32 << bits) + 1) as i16
    } else {
        value as i16
    }
}

/// Encode a signed value into JPEG "additional bits" representation.
/// Returns (magnitude_bits, category/size).
pub fn encode_value(value: i32) -> (u16, u8) {
    if value == 0 {
        return (0, 0);
    }
    let size = bit_count(value.unsigned_abs().min(u16::MAX as u32) as u16);
    // Negative values are sent as the one's complement of their magnitude
    let bits = if value > 0 { value } else { value - 1 };
    ((bits as u32 & ((1u32 << size) - 1)) as u16, size)
}

/// Build a length-limited optimal Huffman spec from symbol frequencies.
///
/// Implements Annex K.2 (Figures K.1–K.4) with a reserved pseudo-symbol of
/// frequency 1 so that no real symbol receives the all-ones codeword and
/// the 16-bit length limit can always be met.
pub fn build_optimal_spec(class: u8, id: u8, freq: &[u32; 256]) -> HuffmanSpec {
    let mut symbols: Vec<(u16, u32)> = freq
        .iter()
        .enumerate()
        .filter(|&(_, &f)| f > 0)
        .map(|(sym, &f)| (sym as u16, f))
        .collect();

    if symbols.is_empty() {
        symbols.push((0, 1));
    }
    symbols.push((256, 1));

    let n = symbols.len();
    // Ties go to the higher symbol, so the pseudo-symbol sinks deepest
    symbols.sort_by_key(|&(sym, f)| (f, sym));

    // Two-queue merge: leaves in q1 (sorted), internal nodes in q2 (monotone)
    let total_nodes = 2 * n - 1;
    let mut parent = vec![0usize; total_nodes];
    let mut q1: VecDeque<(u64, usize)> = symbols
        .iter()
        .enumerate()
        .map(|(idx, &(_, f))| (f as u64, idx))
        .collect();
    let mut q2: VecDeque<(u64, usize)> = VecDeque::with_capacity(n);

    fn pick_min(q1: &mut VecDeque<(u64, usize)>, q2: &mut VecDeque<(u64, usize)>) -> (u64, usize) {
        let from_q1 = match (q1.front(), q2.front()) {
            (Some(a), Some(b)) => a.0 <= b.0,
            (Some(_), None) => true,
            _ => false,
        };
        let picked = if from_q1 { q1.pop_front() } else { q2.pop_front() };
        picked.unwrap_or((0, 0))
    }

    for next_internal in n..total_nodes {
        let (f1, idx1) = pick_min(&mut q1, &mut q2);
        let (f2, idx2) = pick_min(&mut q1, &mut q2);
        parent[idx1] = next_internal;
        parent[idx2] = next_internal;
        q2.push_back((f1 + f2, next_internal));
    }

    let root = total_nodes - 1;
    let mut code_lengths = vec![0usize; n];
    for (leaf, len) in code_lengths.iter_mut().enumerate() {
        let mut node = leaf;
        while node != root {
            node = parent[node];
            *len += 1;
        }
    }

    // Annex K.3 Adjust_BITS: push codes longer than 16 bits up the tree
    let max_len = code_lengths.iter().copied().max().unwrap_or(0);
    let mut bits_count = vec![0u32; max_len.max(16) + 1];
    for &len in &code_lengths {
        bits_count[len] += 1;
    }
    if max_len > 16 {
        let mut i = max_len;
        while i > 16 {
            while bits_count[i] > 0 {
                let mut j = i - 2;
                while j > 0 && bits_count[j] == 0 {
                    j -= 1;
                }
                if j == 0 {
                    bits_count[16] += bits_count[i];
                    bits_count[i] = 0;
                    break;
                }
                bits_count[i] -= 2;
                bits_count[i - 1] += 1;
                bits_count[j + 1] += 2;
                bits_count[j] -= 1;
            }
            i -= 1;
        }
        // Least frequent symbols (lowest indices) take the longest codes
        let mut pos = 0;
        for len in (1..=16usize).rev() {
            for _ in 0..bits_count[len] {
                code_lengths[pos] = len;
                pos += 1;
            }
        }
    }

    let mut sym_len: Vec<(u16, usize)> = symbols
        .iter()
        .zip(code_lengths.iter())
        .map(|(&(sym, _), &len)| (sym, len))
        .collect();
    sym_len.sort_by_key(|&(sym, len)| (len, sym));

    let mut bits = [0u8; 16];
    let mut huffval = Vec::with_capacity(n);
    for &(sym, len) in &sym_len {
        if sym == 256 || !(1..=16).contains(&len) {
            continue;
        }
        bits[len - 1] += 1;
        huffval.push(sym as u8);
    }

    HuffmanSpec {
        class,
        id,
        bits,
        huffval,
    }
}
