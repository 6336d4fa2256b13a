// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Zigzag scan order mapping between bitstream order and natural order.

/// Maps zigzag index (0–63) to natural row-major index (0–63).
///
/// Coefficients and DQT entries are serialized in zigzag order; this table
/// converts a zigzag position to the corresponding (row * 8 + col) position.
pub const ZIGZAG_TO_NATURAL: [usize; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

/// Maps natural row-major index (0–63) to zigzag index (0–63).
///
/// Inverse of [`ZIGZAG_TO_NATURAL`].
pub const NATURAL_TO_ZIGZAG: [usize; 64] = {
    let mut table = [0usize; 64];
    let mut i = 0;
    while i < 64 {
        table[ZIGZAG_TO_NATURAL[i]] = i;
        i += 1;
    }
    table
};

/// Reorder a block from zigzag to natural order.
pub fn to_natural<T: Copy + Default>(zz: &[T; 64]) -> [T; 64] {
    let mut out = [T::default(); 64];
    for (zi, &v) in zz.iter().enumerate() {
        out[ZIGZAG_TO_NATURAL[zi]] = v;
    }
    out
}

/// Reorder a block from natural to zigzag order.
pub fn to_zigzag<T: Copy + Default>(natural: &[T]) -> [T; 64] {
    let mut out = [T::default(); 64];
    for (zi, slot) in out.iter_mut().enumerate() {
        *slot = natural[ZIGZAG_TO_NATURAL[zi]];
    }
    out
}
