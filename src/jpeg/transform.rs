// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! 8×8 block transforms: dequantize + IDCT and forward DCT + quantize.
//!
//! Both directions use the accurate integer ("islow") factorization of
//! Loeffler, Ligtenberg and Moschytz with 13-bit fixed-point constants.
//! Intermediates are `i64`, so out-of-range coefficients from corrupt
//! streams saturate at the final clamp instead of wrapping.
//!
//! Blocks are in natural (row-major) order.

const CONST_BITS: u32 = 13;
const PASS1_BITS: u32 = 2;

const FIX_0_298631336: i64 = 2446;
const FIX_0_390180644: i64 = 3196;
const FIX_0_541196100: i64 = 4433;
const FIX_0_765366865: i64 = 6270;
const FIX_0_899976223: i64 = 7373;
const FIX_1_175875602: i64 = 9633;
const FIX_1_501321110: i64 = 12299;
const FIX_1_847759065: i64 = 15137;
const FIX_1_961570560: i64 = 16069;
const FIX_2_053119869: i64 = 16819;
const FIX_2_562915447: i64 = 20995;
const FIX_3_072711026: i64 = 25172;

#[inline]
fn descale(x: i64, n: u32) -> i64 {
    (x + (1 << (n - 1))) >> n
}

/// Even part of the inverse transform: inputs 0, 2, 4, 6.
/// Returns (tmp10, tmp11, tmp12, tmp13), scaled up by 2^CONST_BITS.
#[inline]
fn idct_even(d0: i64, d2: i64, d4: i64, d6: i64) -> [i64; 4] {
    let z1 = (d2 + d6) * FIX_0_541196100;
    let tmp2 = z1 - d6 * FIX_1_847759065;
    let tmp3 = z1 + d2 * FIX_0_765366865;
    let tmp0 = (d0 + d4) << CONST_BITS;
    let tmp1 = (d0 - d4) << CONST_BITS;
    [tmp0 + tmp3, tmp1 + tmp2, tmp1 - tmp2, tmp0 - tmp3]
}

/// Odd part of the inverse transform: inputs 1, 3, 5, 7.
/// Returns (tmp0, tmp1, tmp2, tmp3) pairing with outputs 3/4, 2/5, 1/6, 0/7.
#[inline]
fn idct_odd(d1: i64, d3: i64, d5: i64, d7: i64) -> [i64; 4] {
    let z1 = d7 + d1;
    let z2 = d5 + d3;
    let z3 = d7 + d3;
    let z4 = d5 + d1;
    let z5 = (z3 + z4) * FIX_1_175875602;

    let z1 = -z1 * FIX_0_899976223;
    let z2 = -z2 * FIX_2_562915447;
    let z3 = -z3 * FIX_1_961570560 + z5;
    let z4 = -z4 * FIX_0_390180644 + z5;

    [
        d7 * FIX_0_298631336 + z1 + z3,
        d5 * FIX_2_053119869 + z2 + z4,
        d3 * FIX_3_072711026 + z2 + z3,
        d1 * FIX_1_501321110 + z1 + z4,
    ]
}

/// Dequantize a coefficient block and transform it to 64 samples (0–255).
///
/// `coeffs` and `qt` are in natural order.
pub fn idct_block(coeffs: &[i16], qt: &[u16; 64]) -> [u8; 64] {
    debug_assert_eq!(coeffs.len(), 64);
    let mut ws = [0i64; 64];

    // Pass 1: columns, results scaled up by 2^PASS1_BITS
    for col in 0..8 {
        let d = |row: usize| coeffs[row * 8 + col] as i64 * qt[row * 8 + col] as i64;
        if (1..8).all(|row| coeffs[row * 8 + col] == 0) {
            let dc = d(0) << PASS1_BITS;
            for row in 0..8 {
                ws[row * 8 + col] = dc;
            }
            continue;
        }
        let [t10, t11, t12, t13] = idct_even(d(0), d(2), d(4), d(6));
        let [t0, t1, t2, t3] = idct_odd(d(1), d(3), d(5), d(7));
        let shift = CONST_BITS - PASS1_BITS;
        ws[col] = descale(t10 + t3, shift);
        ws[7 * 8 + col] = descale(t10 - t3, shift);
        ws[8 + col] = descale(t11 + t2, shift);
        ws[6 * 8 + col] = descale(t11 - t2, shift);
        ws[2 * 8 + col] = descale(t12 + t1, shift);
        ws[5 * 8 + col] = descale(t12 - t1, shift);
        ws[3 * 8 + col] = descale(t13 + t0, shift);
        ws[4 * 8 + col] = descale(t13 - t0, shift);
    }

    // Pass 2: rows, removing PASS1_BITS and the factor of 8
    let mut out = [0u8; 64];
    let shift = CONST_BITS + PASS1_BITS + 3;
    let clamp = |v: i64| (v + 128).clamp(0, 255) as u8;
    for row in 0..8 {
        let w = &ws[row * 8..row * 8 + 8];
        let [t10, t11, t12, t13] = idct_even(w[0], w[2], w[4], w[6]);
        let [t0, t1, t2, t3] = idct_odd(w[1], w[3], w[5], w[7]);
        let o = &mut out[row * 8..row * 8 + 8];
        o[0] = clamp(descale(t10 + t3, shift));
        o[7] = clamp(descale(t10 - t3, shift));
        o[1] = clamp(descale(t11 + t2, shift));
        o[6] = clamp(descale(t11 - t2, shift));
        o[2] = clamp(descale(t12 + t1, shift));
        o[5] = clamp(descale(t12 - t1, shift));
        o[3] = clamp(descale(t13 + t0, shift));
        o[4] = clamp(descale(t13 - t0, shift));
    }
    out
}

/// One forward 1-D pass over 8 values. The first pass leaves its results
/// scaled up by 2^PASS1_BITS, the second removes that scaling.
#[inline]
fn fdct_1d(d: [i64; 8], out: &mut [i64; 8], first_pass: bool) {
    let tmp0 = d[0] + d[7];
    let tmp7 = d[0] - d[7];
    let tmp1 = d[1] + d[6];
    let tmp6 = d[1] - d[6];
    let tmp2 = d[2] + d[5];
    let tmp5 = d[2] - d[5];
    let tmp3 = d[3] + d[4];
    let tmp4 = d[3] - d[4];

    let tmp10 = tmp0 + tmp3;
    let tmp13 = tmp0 - tmp3;
    let tmp11 = tmp1 + tmp2;
    let tmp12 = tmp1 - tmp2;

    let shift = if first_pass {
        out[0] = (tmp10 + tmp11) << PASS1_BITS;
        out[4] = (tmp10 - tmp11) << PASS1_BITS;
        CONST_BITS - PASS1_BITS
    } else {
        out[0] = descale(tmp10 + tmp11, PASS1_BITS);
        out[4] = descale(tmp10 - tmp11, PASS1_BITS);
        CONST_BITS + PASS1_BITS
    };

    let z1 = (tmp12 + tmp13) * FIX_0_541196100;
    out[2] = descale(z1 + tmp13 * FIX_0_765366865, shift);
    out[6] = descale(z1 - tmp12 * FIX_1_847759065, shift);

    let z1 = tmp4 + tmp7;
    let z2 = tmp5 + tmp6;
    let z3 = tmp4 + tmp6;
    let z4 = tmp5 + tmp7;
    let z5 = (z3 + z4) * FIX_1_175875602;

    let z1 = -z1 * FIX_0_899976223;
    let z2 = -z2 * FIX_2_562915447;
    let z3 = -z3 * FIX_1_961570560 + z5;
    let z4 = -z4 * FIX_0_390180644 + z5;

    out[7] = descale(tmp4 * FIX_0_298631336 + z1 + z3, shift);
    out[5] = descale(tmp5 * FIX_2_053119869 + z2 + z4, shift);
    out[3] = descale(tmp6 * FIX_3_072711026 + z2 + z3, shift);
    out[1] = descale(tmp7 * FIX_1_501321110 + z1 + z4, shift);
}

/// Forward DCT of 64 samples (0–255) followed by quantization.
///
/// The transform output carries an extra factor of 8, folded into the
/// divisor. Division rounds to nearest, symmetrically around zero.
pub fn fdct_quantize(samples: &[u8; 64], qt: &[u16; 64]) -> [i16; 64] {
    let mut ws = [0i64; 64];

    for row in 0..8 {
        let d: [i64; 8] = std::array::from_fn(|x| samples[row * 8 + x] as i64 - 128);
        let mut o = [0i64; 8];
        fdct_1d(d, &mut o, true);
        ws[row * 8..row * 8 + 8].copy_from_slice(&o);
    }

    let mut out = [0i16; 64];
    for col in 0..8 {
        let d: [i64; 8] = std::array::from_fn(|y| ws[y * 8 + col]);
        let mut o = [0i64; 8];
        fdct_1d(d, &mut o, false);
        for (row, &v) in o.iter().enumerate() {
            let idx = row * 8 + col;
            out[idx] = quantize(v, qt[idx].max(1) as i64 * 8);
        }
    }
    out
}

#[inline]
fn quantize(value: i64, divisor: i64) -> i16 {
    let q = if value < 0 {
        -((-value + divisor / 2) / divisor)
    } else {
        (value + divisor / 2) / divisor
    };
    q.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT_QT: [u16; 64] = [1; 64];

    #[test]
    fn flat_block_roundtrip() {
        for level in [0u8, 1, 50, 128, 200, 255] {
            let samples = [level; 64];
            let coeffs = fdct_quantize(&samples, &UNIT_QT);
            assert_eq!(coeffs[0], (level as i16 - 128) * 8);
            assert!(coeffs[1..].iter().all(|&c| c == 0));
            assert_eq!(idct_block(&coeffs, &UNIT_QT), samples);
        }
    }

    #[test]
    fn gradient_roundtrip_unit_quant() {
        let samples: [u8; 64] = std::array::from_fn(|i| ((i % 8) * 20 + (i / 8) * 9) as u8);
        let coeffs = fdct_quantize(&samples, &UNIT_QT);
        let back = idct_block(&coeffs, &UNIT_QT);
        for (a, b) in samples.iter().zip(back.iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 2, "{a} vs {b}");
        }
    }

    #[test]
    fn dc_only_idct() {
        let mut coeffs = [0i16; 64];
        coeffs[0] = 10;
        // 10 * 16 / 8 = 20 above mid-grey
        let qt: [u16; 64] = [16; 64];
        assert!(idct_block(&coeffs, &qt).iter().all(|&v| v == 148));
    }

    #[test]
    fn extreme_coefficients_clamp() {
        let coeffs = [i16::MAX; 64];
        let qt = [u16::MAX; 64];
        let out = idct_block(&coeffs, &qt);
        assert!(out.iter().any(|&v| v == 255));
        let neg = [i16::MIN; 64];
        let out = idct_block(&neg, &qt);
        assert!(out.iter().any(|&v| v == 0));
    }

    #[test]
    fn quantize_rounds_symmetrically() {
        assert_eq!(quantize(12, 8), 2);
        assert_eq!(quantize(-12, 8), -2);
        assert_eq!(quantize(11, 8), 1);
        assert_eq!(quantize(-11, 8), -1);
        assert_eq!(quantize(0, 8), 0);
    }

    #[test]
    fn horizontal_cosine_lands_in_one_coefficient() {
        let samples: [u8; 64] = std::array::from_fn(|i| {
            let x = (i % 8) as f64;
            (128.0 + 60.0 * ((2.0 * x + 1.0) * std::f64::consts::PI / 16.0).cos()).round() as u8
        });
        let coeffs = fdct_quantize(&samples, &UNIT_QT);
        let energy_01 = coeffs[1].unsigned_abs() as u32;
        let rest: u32 = coeffs
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != 1)
            .map(|(_, c)| c.unsigned_abs() as u32)
            .sum();
        assert!(energy_01 > 150, "{energy_01}");
        assert!(rest < 20, "{rest}");
    }
}
