// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Colour model detection and YCbCr/RGB/CMYK/YCCK conversion.
//!
//! Conversions use 16-bit fixed point (ITU-R BT.601 full range, as in JFIF).
//! The decoder side is table-driven; the tables are built once on first use.

use std::sync::OnceLock;

use super::error::{JpegError, Result};
use super::frame::FrameInfo;
use super::metadata::Metadata;

/// Colour model of the coded components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Grayscale,
    YCbCr,
    /// Three components stored without colour transform.
    Rgb,
    /// Adobe CMYK, stored inverted.
    Cmyk,
    /// Adobe YCCK: CMY as inverted YCbCr plus a K channel.
    Ycck,
}

impl ColorSpace {
    /// Pick the colour model from the component count, component ids and
    /// JFIF/Adobe markers.
    pub fn detect(frame: &FrameInfo, metadata: &Metadata) -> Result<Self> {
        match frame.components.len() {
            1 => Ok(Self::Grayscale),
            3 => {
                // A JFIF stream is always YCbCr
                let ids: Vec<u8> = frame.components.iter().map(|c| c.id).collect();
                let rgb = metadata.adobe_transform == Some(0) || ids == b"RGB";
                if rgb && !metadata.is_jfif {
                    Ok(Self::Rgb)
                } else {
                    Ok(Self::YCbCr)
                }
            }
            4 => match metadata.adobe_transform {
                Some(2) => Ok(Self::Ycck),
                Some(_) => Ok(Self::Cmyk),
                None => Err(JpegError::UnknownColorModel),
            },
            n => Err(JpegError::InvalidSegment(if n == 0 {
                "frame has no components"
            } else {
                "wrong number of components"
            })),
        }
    }

    /// Channels of the decoded output: 1 for grayscale, otherwise RGB.
    pub fn output_channels(self) -> usize {
        match self {
            Self::Grayscale => 1,
            _ => 3,
        }
    }
}

const SCALE_BITS: u32 = 16;
const ONE_HALF: i32 = 1 << (SCALE_BITS - 1);

#[inline]
fn fix(x: f64) -> i32 {
    (x * (1 << SCALE_BITS) as f64 + 0.5) as i32
}

struct YccTables {
    cr_r: [i32; 256],
    cb_b: [i32; 256],
    cr_g: [i32; 256],
    cb_g: [i32; 256],
}

static YCC_TABLES: OnceLock<YccTables> = OnceLock::new();

fn ycc_tables() -> &'static YccTables {
    YCC_TABLES.get_or_init(|| {
        let mut t = YccTables {
            cr_r: [0; 256],
            cb_b: [0; 256],
            cr_g: [0; 256],
            cb_g: [0; 256],
        };
        for i in 0..256 {
            let x = i as i32 - 128;
            t.cr_r[i] = (fix(1.40200) * x + ONE_HALF) >> SCALE_BITS;
            t.cb_b[i] = (fix(1.77200) * x + ONE_HALF) >> SCALE_BITS;
            t.cr_g[i] = -fix(0.71414) * x;
            t.cb_g[i] = -fix(0.34414) * x + ONE_HALF;
        }
        t
    })
}

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Convert one YCbCr sample triple to RGB.
#[inline]
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let t = ycc_tables();
    let y = y as i32;
    let (cb, cr) = (cb as usize, cr as usize);
    [
        clamp_u8(y + t.cr_r[cr]),
        clamp_u8(y + ((t.cb_g[cb] + t.cr_g[cr]) >> SCALE_BITS)),
        clamp_u8(y + t.cb_b[cb]),
    ]
}

/// Convert one RGB pixel to YCbCr.
#[inline]
pub fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> [u8; 3] {
    const CBCR_OFFSET: i32 = 128 << SCALE_BITS;
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = (fix(0.29900) * r + fix(0.58700) * g + fix(0.11400) * b + ONE_HALF) >> SCALE_BITS;
    let cb = (-fix(0.16874) * r - fix(0.33126) * g + fix(0.5) * b + CBCR_OFFSET + ONE_HALF - 1) >> SCALE_BITS;
    let cr = (fix(0.5) * r - fix(0.41869) * g - fix(0.08131) * b + CBCR_OFFSET + ONE_HALF - 1) >> SCALE_BITS;
    [clamp_u8(y), clamp_u8(cb), clamp_u8(cr)]
}

/// Adobe (inverted) CMYK to RGB: each channel is scaled by K.
#[inline]
pub fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let k = k as u32;
    let scale = |v: u8| ((v as u32 * k + 127) / 255) as u8;
    [scale(c), scale(m), scale(y)]
}

/// Adobe YCCK to RGB: YCbCr gives inverted CMY, then K is applied.
#[inline]
pub fn ycck_to_rgb(y: u8, cb: u8, cr: u8, k: u8) -> [u8; 3] {
    let [r, g, b] = ycbcr_to_rgb(y, cb, cr);
    cmyk_to_rgb(255 - r, 255 - g, 255 - b, k)
}

/// Convert one row of interleaved component samples into output pixels.
///
/// `samples` holds `components` values per pixel; `out` receives
/// `color_space.output_channels()` values per pixel.
pub fn convert_row(color_space: ColorSpace, samples: &[u8], out: &mut [u8]) {
    match color_space {
        ColorSpace::Grayscale => out.copy_from_slice(&samples[..out.len()]),
        ColorSpace::Rgb => out.copy_from_slice(&samples[..out.len()]),
        ColorSpace::YCbCr => {
            for (px, s) in out.chunks_exact_mut(3).zip(samples.chunks_exact(3)) {
                px.copy_from_slice(&ycbcr_to_rgb(s[0], s[1], s[2]));
            }
        }
        ColorSpace::Cmyk => {
            for (px, s) in out.chunks_exact_mut(3).zip(samples.chunks_exact(4)) {
                px.copy_from_slice(&cmyk_to_rgb(s[0], s[1], s[2], s[3]));
            }
        }
        ColorSpace::Ycck => {
            for (px, s) in out.chunks_exact_mut(3).zip(samples.chunks_exact(4)) {
                px.copy_from_slice(&ycck_to_rgb(s[0], s[1], s[2], s[3]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::frame::Component;

    fn frame(ids: &[u8]) -> FrameInfo {
        let comps = ids.iter().map(|&id| Component::new(id, 1, 1, 0)).collect();
        FrameInfo::new(8, 8, comps, false).unwrap()
    }

    #[test]
    fn primaries_roundtrip() {
        for rgb in [[0u8, 0, 0], [255, 255, 255], [255, 0, 0], [0, 255, 0], [0, 0, 255], [200, 100, 50]] {
            let [y, cb, cr] = rgb_to_ycbcr(rgb[0], rgb[1], rgb[2]);
            let back = ycbcr_to_rgb(y, cb, cr);
            for c in 0..3 {
                assert!((back[c] as i32 - rgb[c] as i32).abs() <= 2, "{rgb:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn grey_has_neutral_chroma() {
        for v in [0u8, 77, 128, 255] {
            assert_eq!(rgb_to_ycbcr(v, v, v), [v, 128, 128]);
            assert_eq!(ycbcr_to_rgb(v, 128, 128), [v, v, v]);
        }
    }

    #[test]
    fn cmyk_scaling() {
        assert_eq!(cmyk_to_rgb(255, 255, 255, 255), [255, 255, 255]);
        assert_eq!(cmyk_to_rgb(255, 0, 128, 0), [0, 0, 0]);
        assert_eq!(cmyk_to_rgb(255, 0, 255, 255), [255, 0, 255]);
        assert_eq!(ycck_to_rgb(0, 128, 128, 255), [255, 255, 255]);
    }

    #[test]
    fn detect_models() {
        let md = Metadata::default();
        assert_eq!(ColorSpace::detect(&frame(&[1]), &md).unwrap(), ColorSpace::Grayscale);
        assert_eq!(ColorSpace::detect(&frame(&[1, 2, 3]), &md).unwrap(), ColorSpace::YCbCr);
        assert_eq!(ColorSpace::detect(&frame(b"RGB"), &md).unwrap(), ColorSpace::Rgb);
        assert!(matches!(
            ColorSpace::detect(&frame(&[1, 2, 3, 4]), &md),
            Err(JpegError::UnknownColorModel)
        ));

        let adobe = |t: u8, jfif: bool| {
            let mut md = Metadata::default();
            md.adobe_transform = Some(t);
            md.is_jfif = jfif;
            md
        };
        assert_eq!(ColorSpace::detect(&frame(&[1, 2, 3]), &adobe(0, false)).unwrap(), ColorSpace::Rgb);
        assert_eq!(ColorSpace::detect(&frame(&[1, 2, 3]), &adobe(0, true)).unwrap(), ColorSpace::YCbCr);
        assert_eq!(ColorSpace::detect(&frame(&[1, 2, 3, 4]), &adobe(0, false)).unwrap(), ColorSpace::Cmyk);
        assert_eq!(ColorSpace::detect(&frame(&[1, 2, 3, 4]), &adobe(2, false)).unwrap(), ColorSpace::Ycck);
    }

    #[test]
    fn jfif_overrides_rgb_ids() {
        let mut jfif = Metadata::default();
        jfif.is_jfif = true;
        assert_eq!(ColorSpace::detect(&frame(b"RGB"), &jfif).unwrap(), ColorSpace::YCbCr);
    }

    #[test]
    fn convert_rows() {
        let mut out = [0u8; 6];
        convert_row(ColorSpace::Rgb, &[1, 2, 3, 4, 5, 6], &mut out);
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
        convert_row(ColorSpace::Cmyk, &[255, 255, 255, 255, 0, 0, 0, 255], &mut out);
        assert_eq!(out, [255, 255, 255, 0, 0, 0]);
        let mut grey = [0u8; 2];
        convert_row(ColorSpace::Grayscale, &[9, 10], &mut grey);
        assert_eq!(grey, [9, 10]);
    }
}
