// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Coefficient storage and quantization tables.
//!
//! [`DctGrid`] holds one component's quantized DCT coefficients in
//! block-raster order; it is filled by the scan decoder (possibly over many
//! progressive scans) and by the encoder's forward transform. [`QuantTable`]
//! is a 64-entry quantization matrix, including the Annex K reference
//! matrices and IJG-style quality scaling.

use super::zigzag::to_natural;

/// Annex K.1 luminance quantization matrix, natural order.
pub const STD_LUMINANCE_QT: [u16; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61,
    12, 12, 14, 19, 26, 58, 60, 55,
    14, 13, 16, 24, 40, 57, 69, 56,
    14, 17, 22, 29, 51, 87, 80, 62,
    18, 22, 37, 56, 68, 109, 103, 77,
    24, 35, 55, 64, 81, 104, 113, 92,
    49, 64, 78, 87, 103, 121, 120, 101,
    72, 92, 95, 98, 112, 100, 103, 99,
];

/// Annex K.2 chrominance quantization matrix, natural order.
pub const STD_CHROMINANCE_QT: [u16; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99,
    18, 21, 26, 66, 99, 99, 99, 99,
    24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
];

/// Quantization table: 64 values in natural (row-major) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTable {
    /// Quantization values, indexed by row * 8 + col.
    pub values: [u16; 64],
}

impl QuantTable {
    pub fn new(values: [u16; 64]) -> Self {
        Self { values }
    }

    /// Build from 64 values in zigzag (bitstream) order.
    pub fn from_zigzag(zz: &[u16; 64]) -> Self {
        Self { values: to_natural(zz) }
    }

    /// Scale a reference matrix for `quality` (clamped to 1–100).
    ///
    /// Quality below 50 scales by `5000 / q` percent, above by `200 - 2q`
    /// percent; every entry is rounded and clamped to 1–255 so the table
    /// always fits the 8-bit DQT form.
    pub fn scaled(base: &[u16; 64], quality: u8) -> Self {
        let q = quality.clamp(1, 100) as u32;
        let scale = if q < 50 { 5000 / q } else { 200 - q * 2 };
        let mut values = [0u16; 64];
        for (out, &b) in values.iter_mut().zip(base.iter()) {
            *out = ((b as u32 * scale + 50) / 100).clamp(1, 255) as u16;
        }
        Self { values }
    }

    /// Standard luminance table at the given quality.
    pub fn luminance(quality: u8) -> Self {
        Self::scaled(&STD_LUMINANCE_QT, quality)
    }

    /// Standard chrominance table at the given quality.
    pub fn chrominance(quality: u8) -> Self {
        Self::scaled(&STD_CHROMINANCE_QT, quality)
    }

    /// Whether every entry fits the 8-bit (Pq = 0) DQT form.
    pub fn is_8bit(&self) -> bool {
        self.values.iter().all(|&v| v <= 255)
    }
}

/// Grid of quantized DCT coefficients for one image component.
///
/// Coefficients are stored in block-raster order. Within each block,
/// the 64 coefficients are in natural (row-major) order, i.e. index = row * 8 + col.
#[derive(Debug, Clone)]
pub struct DctGrid {
    blocks_wide: usize,
    blocks_tall: usize,
    /// Flat storage: blocks_tall * blocks_wide * 64 coefficients.
    coeffs: Vec<i16>,
}

impl DctGrid {
    /// Create a new grid initialized to zero.
    pub fn new(blocks_wide: usize, blocks_tall: usize) -> Self {
        Self {
            blocks_wide,
            blocks_tall,
            coeffs: vec![0i16; blocks_wide * blocks_tall * 64],
        }
    }

    pub fn blocks_wide(&self) -> usize {
        self.blocks_wide
    }

    pub fn blocks_tall(&self) -> usize {
        self.blocks_tall
    }

    /// Get a coefficient: block (`br`, `bc`), frequency row `i`, column `j`.
    pub fn get(&self, br: usize, bc: usize, i: usize, j: usize) -> i16 {
        self.coeffs[self.index(br, bc) + i * 8 + j]
    }

    /// The 64-coefficient block at (br, bc).
    pub fn block(&self, br: usize, bc: usize) -> &[i16] {
        let start = self.index(br, bc);
        &self.coeffs[start..start + 64]
    }

    /// Mutable 64-coefficient block at (br, bc).
    pub fn block_mut(&mut self, br: usize, bc: usize) -> &mut [i16] {
        let start = self.index(br, bc);
        &mut self.coeffs[start..start + 64]
    }

    /// Total number of blocks.
    pub fn total_blocks(&self) -> usize {
        self.blocks_wide * self.blocks_tall
    }

    /// Raw access to all coefficients.
    ///
    /// Each 64-element chunk is one 8×8 block, so rows of blocks are
    /// `blocks_wide * 64` long. Used with Rayon `par_chunks`.
    pub fn coeffs(&self) -> &[i16] {
        &self.coeffs
    }

    /// Raw mutable access to all coefficients.
    pub fn coeffs_mut(&mut self) -> &mut [i16] {
        &mut self.coeffs
    }

    fn index(&self, br: usize, bc: usize) -> usize {
        debug_assert!(br < self.blocks_tall, "block row {br} >= {}", self.blocks_tall);
        debug_assert!(bc < self.blocks_wide, "block col {bc} >= {}", self.blocks_wide);
        (br * self.blocks_wide + bc) * 64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_block_access() {
        let mut grid = DctGrid::new(2, 3);
        assert_eq!(grid.total_blocks(), 6);
        assert_eq!(grid.coeffs().len(), 6 * 64);

        let blk = grid.block_mut(1, 1);
        blk[0] = 100;
        blk[63] = -50;
        assert_eq!(grid.get(1, 1, 0, 0), 100);
        assert_eq!(grid.get(1, 1, 7, 7), -50);
        assert_eq!(grid.block(1, 0)[0], 0);
        assert_eq!(grid.block(0, 1)[0], 0);
    }

    #[test]
    fn quality_50_is_reference() {
        let qt = QuantTable::luminance(50);
        assert_eq!(qt.values, STD_LUMINANCE_QT);
    }

    #[test]
    fn quality_100_is_all_ones() {
        assert!(QuantTable::luminance(100).values.iter().all(|&v| v == 1));
        assert!(QuantTable::chrominance(100).values.iter().all(|&v| v == 1));
    }

    #[test]
    fn scaled_entries_stay_in_range() {
        for q in 0..=255u8 {
            for qt in [QuantTable::luminance(q), QuantTable::chrominance(q)] {
                assert!(qt.values.iter().all(|&v| (1..=255).contains(&v)), "quality {q}");
                assert!(qt.is_8bit());
            }
        }
    }

    #[test]
    fn low_quality_scales_up() {
        // q=10 → 500%: 16 * 5 = 80, 99 * 5 clamps to 255
        let qt = QuantTable::luminance(10);
        assert_eq!(qt.values[0], 80);
        assert_eq!(QuantTable::chrominance(10).values[63], 255);
    }

    #[test]
    fn from_zigzag_order() {
        let zz: [u16; 64] = std::array::from_fn(|i| i as u16 + 1);
        let qt = QuantTable::from_zigzag(&zz);
        assert_eq!(qt.values[0], 1);
        assert_eq!(qt.values[1], 2);
        assert_eq!(qt.values[8], 3);
    }
}
