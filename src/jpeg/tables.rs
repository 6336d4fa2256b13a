// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Quantization and Huffman table parsing/serialization.
//!
//! Handles DQT (Define Quantization Table) and DHT (Define Huffman Table)
//! marker segments. Supports both 8-bit and 16-bit quantization precision
//! and multiple tables per marker segment. Also carries the Annex K.3–K.6
//! reference Huffman tables used by the encoder.

use super::dct::QuantTable;
use super::error::{JpegError, Result};
use super::marker;
use super::zigzag::to_zigzag;

/// Parse a DQT marker segment body (after the 2-byte length).
///
/// Returns a list of (table_id, QuantTable) pairs. A single DQT segment
/// can contain multiple tables.
pub fn parse_dqt(data: &[u8]) -> Result<Vec<(u8, QuantTable)>> {
    let mut tables = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let pq_tq = data[pos];
        pos += 1;
        let precision = pq_tq >> 4;
        let table_id = pq_tq & 0x0F;

        if table_id > 3 {
            return Err(JpegError::InvalidSegment("Bad Tq value"));
        }
        let entry_size = match precision {
            0 => 1,
            1 => 2,
            _ => return Err(JpegError::InvalidSegment("Bad Pq value")),
        };
        let body = data
            .get(pos..pos + 64 * entry_size)
            .ok_or(JpegError::InvalidSegment("DQT has wrong length"))?;

        let mut zz = [0u16; 64];
        for (zi, v) in zz.iter_mut().enumerate() {
            *v = if entry_size == 1 {
                body[zi] as u16
            } else {
                u16::from_be_bytes([body[zi * 2], body[zi * 2 + 1]])
            };
        }
        pos += 64 * entry_size;

        tables.push((table_id, QuantTable::from_zigzag(&zz)));
    }

    Ok(tables)
}

/// Write one DQT marker segment (including 0xFFDB and length) holding all
/// the given tables.
pub fn write_dqt(tables: &[(u8, &QuantTable)]) -> Vec<u8> {
    let mut body = Vec::with_capacity(tables.len() * 129);
    for &(table_id, qt) in tables {
        let precision = if qt.is_8bit() { 0u8 } else { 1u8 };
        body.push((precision << 4) | (table_id & 0x0F));
        for v in to_zigzag(&qt.values) {
            if precision == 0 {
                body.push(v as u8);
            } else {
                body.extend_from_slice(&v.to_be_bytes());
            }
        }
    }
    marker::segment(marker::DQT, &body)
}

/// Parsed Huffman table specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanSpec {
    /// Table class: 0 = DC, 1 = AC.
    pub class: u8,
    /// Table ID (0–3).
    pub id: u8,
    /// Number of codes of each length (1–16).
    pub bits: [u8; 16],
    /// Symbol values in order of increasing code length.
    pub huffval: Vec<u8>,
}

impl HuffmanSpec {
    fn reference(class: u8, id: u8, bits: [u8; 16], huffval: &[u8]) -> Self {
        Self {
            class,
            id,
            bits,
            huffval: huffval.to_vec(),
        }
    }
}

/// Parse a DHT marker segment body (after the 2-byte length).
///
/// Table ids 2 and 3 are only legal in progressive frames.
pub fn parse_dht(data: &[u8], progressive: bool) -> Result<Vec<HuffmanSpec>> {
    let mut specs = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        if data.len() - pos < 17 {
            return Err(JpegError::InvalidSegment("DHT has wrong length"));
        }
        let tc_th = data[pos];
        let class = tc_th >> 4;
        let id = tc_th & 0x0F;
        if class > 1 {
            return Err(JpegError::InvalidSegment("Bad Tc value"));
        }
        if id > 3 || (!progressive && id > 1) {
            return Err(JpegError::InvalidSegment("Bad Th value"));
        }

        let mut bits = [0u8; 16];
        bits.copy_from_slice(&data[pos + 1..pos + 17]);
        pos += 17;

        let total: usize = bits.iter().map(|&b| b as usize).sum();
        if total == 0 {
            return Err(JpegError::InvalidSegment("Huffman table has zero length"));
        }
        if total > 256 {
            return Err(JpegError::InvalidSegment("Huffman table has excessive length"));
        }
        let huffval = data
            .get(pos..pos + total)
            .ok_or(JpegError::InvalidSegment("DHT has wrong length"))?
            .to_vec();
        pos += total;

        specs.push(HuffmanSpec {
            class,
            id,
            bits,
            huffval,
        });
    }

    Ok(specs)
}

/// Write one DHT marker segment (including 0xFFC4 and length) holding all
/// the given tables.
pub fn write_dht(specs: &[HuffmanSpec]) -> Vec<u8> {
    let mut body = Vec::new();
    for spec in specs {
        body.push((spec.class << 4) | (spec.id & 0x0F));
        body.extend_from_slice(&spec.bits);
        body.extend_from_slice(&spec.huffval);
    }
    marker::segment(marker::DHT, &body)
}

const STD_DC_LUMINANCE_BITS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
const STD_DC_CHROMINANCE_BITS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
const STD_DC_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

const STD_AC_LUMINANCE_BITS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 125];
const STD_AC_LUMINANCE_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

const STD_AC_CHROMINANCE_BITS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 119];
const STD_AC_CHROMINANCE_VALUES: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34, 0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Annex K.3 luminance DC table (class 0, id 0).
pub fn std_dc_luminance() -> HuffmanSpec {
    HuffmanSpec::reference(0, 0, STD_DC_LUMINANCE_BITS, &STD_DC_VALUES)
}

/// Annex K.4 chrominance DC table (class 0, id 1).
pub fn std_dc_chrominance() -> HuffmanSpec {
    HuffmanSpec::reference(0, 1, STD_DC_CHROMINANCE_BITS, &STD_DC_VALUES)
}

/// Annex K.5 luminance AC table (class 1, id 0).
pub fn std_ac_luminance() -> HuffmanSpec {
    HuffmanSpec::reference(1, 0, STD_AC_LUMINANCE_BITS, &STD_AC_LUMINANCE_VALUES)
}

/// Annex K.6 chrominance AC table (class 1, id 1).
pub fn std_ac_chrominance() -> HuffmanSpec {
    HuffmanSpec::reference(1, 1, STD_AC_CHROMINANCE_BITS, &STD_AC_CHROMINANCE_VALUES)
}

/// All four reference tables: luma DC, luma AC, chroma DC, chroma AC.
pub fn standard_specs() -> [HuffmanSpec; 4] {
    [
        std_dc_luminance(),
        std_ac_luminance(),
        std_dc_chrominance(),
        std_ac_chrominance(),
    ]
}
