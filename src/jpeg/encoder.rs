// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Baseline JPEG encoder.
//!
//! Converts RGB(A) or grayscale pixels to YCbCr planes, optionally
//! subsamples chroma 4:2:0, runs forward DCT + quantization per block and
//! writes a single interleaved baseline scan with reference or optimized
//! Huffman tables.

use std::io::Write;

use log::debug;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::color::rgb_to_ycbcr;
use super::dct::{DctGrid, QuantTable};
use super::error::{JpegError, Result};
use super::frame::{write_sof0, Component, FrameInfo};
use super::huffman::{build_optimal_spec, HuffmanEncodeTable};
use super::marker::{self, ScanHeader, ScanSelector, SosParams};
use super::metadata::{write_exif, write_icc, write_jfif, Density};
use super::scan::{count_symbols, encode_scan, ScanComponent};
use super::tables::{standard_specs, write_dht, write_dqt, HuffmanSpec};
use super::transform::fdct_quantize;
use crate::image::{Image, PixelFormat};

/// Chroma resolution of colour output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromaSubsampling {
    /// Full-resolution chroma.
    Yuv444,
    /// Chroma halved in both directions.
    #[default]
    Yuv420,
}

/// Encoder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// 1 (worst) to 100 (best).
    pub quality: u8,
    pub subsampling: ChromaSubsampling,
    /// Build per-image Huffman tables in a second pass.
    pub optimize_huffman: bool,
    /// MCUs between restart markers, 0 for none.
    pub restart_interval: u16,
    /// JFIF density. `None` writes a 1:1 aspect ratio.
    pub density: Option<Density>,
    pub exif: Option<Vec<u8>>,
    pub icc_profile: Option<Vec<u8>>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: 75,
            subsampling: ChromaSubsampling::default(),
            optimize_huffman: false,
            restart_interval: 0,
            density: None,
            exif: None,
            icc_profile: None,
        }
    }
}

impl EncoderConfig {
    /// Set quality, clamped to 1–100.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn with_subsampling(mut self, subsampling: ChromaSubsampling) -> Self {
        self.subsampling = subsampling;
        self
    }

    pub fn with_optimize_huffman(mut self, optimize: bool) -> Self {
        self.optimize_huffman = optimize;
        self
    }

    pub fn with_restart_interval(mut self, interval: u16) -> Self {
        self.restart_interval = interval;
        self
    }

    pub fn with_density(mut self, density: Density) -> Self {
        self.density = Some(density);
        self
    }

    pub fn with_exif(mut self, exif: Vec<u8>) -> Self {
        self.exif = Some(exif);
        self
    }

    pub fn with_icc_profile(mut self, profile: Vec<u8>) -> Self {
        self.icc_profile = Some(profile);
        self
    }
}

/// Baseline JPEG encoder.
#[derive(Debug, Clone, Default)]
pub struct JpegEncoder {
    config: EncoderConfig,
}

impl JpegEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode `image` and write the JPEG stream to `writer`.
    pub fn encode<W: Write>(&self, image: &Image, mut writer: W) -> Result<()> {
        let bytes = self.encode_to_vec(image)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Encode `image` to an in-memory JPEG stream.
    pub fn encode_to_vec(&self, image: &Image) -> Result<Vec<u8>> {
        let (width, height) = (image.width, image.height);
        if width == 0 || height == 0 || width >= 65535 || height >= 65535 {
            return Err(JpegError::InvalidDimensions { width, height });
        }
        image.check_buffer()?;
        let cfg = &self.config;
        let quality = cfg.quality.clamp(1, 100);
        let grayscale = image.format == PixelFormat::Gray8;

        let components = if grayscale {
            vec![Component::new(1, 1, 1, 0)]
        } else {
            let luma = match cfg.subsampling {
                ChromaSubsampling::Yuv444 => 1,
                ChromaSubsampling::Yuv420 => 2,
            };
            vec![
                Component::new(1, luma, luma, 0),
                Component::new(2, 1, 1, 1),
                Component::new(3, 1, 1, 1),
            ]
        };
        let frame = FrameInfo::new(width as u16, height as u16, components, false)?;
        debug!(
            "encoding {width}x{height}, {} components, quality {quality}, {} MCUs",
            frame.components.len(),
            frame.mcus_wide as usize * frame.mcus_tall as usize
        );

        let quant = [QuantTable::luminance(quality), QuantTable::chrominance(quality)];
        let grids: Vec<DctGrid> = sample_planes(image, &frame)
            .iter()
            .zip(&frame.components)
            .map(|(plane, comp)| forward_transform(plane, &quant[comp.quant_table_id as usize]))
            .collect();

        let scan_components: Vec<ScanComponent> = (0..frame.components.len())
            .map(|i| {
                let table = usize::from(i > 0);
                ScanComponent {
                    comp_idx: i,
                    dc_table: table,
                    ac_table: table,
                }
            })
            .collect();
        let num_tables = if grayscale { 1 } else { 2 };

        let specs: Vec<HuffmanSpec> = if cfg.optimize_huffman {
            let counts = count_symbols(&frame, &scan_components, &grids, cfg.restart_interval)?;
            (0..num_tables)
                .flat_map(|id| {
                    [
                        build_optimal_spec(0, id as u8, &counts.dc[id]),
                        build_optimal_spec(1, id as u8, &counts.ac[id]),
                    ]
                })
                .collect()
        } else {
            standard_specs().into_iter().take(num_tables * 2).collect()
        };
        let table_for = |class: u8, id: usize| {
            specs
                .iter()
                .find(|s| s.class == class && s.id as usize == id)
                .map(HuffmanEncodeTable::from_spec)
                .ok_or(JpegError::MissingHuffmanTable {
                    class: if class == 0 { "DC" } else { "AC" },
                    id: id as u8,
                })
        };
        let dc_tables = (0..num_tables).map(|id| table_for(0, id)).collect::<Result<Vec<_>>>()?;
        let ac_tables = (0..num_tables).map(|id| table_for(1, id)).collect::<Result<Vec<_>>>()?;

        let entropy = encode_scan(
            &frame,
            &scan_components,
            &grids,
            &dc_tables,
            &ac_tables,
            cfg.restart_interval,
        )?;

        let mut out = Vec::with_capacity(entropy.len() + 1024);
        out.extend_from_slice(&[0xFF, marker::SOI]);
        out.extend_from_slice(&write_jfif(&cfg.density.unwrap_or_default()));
        if let Some(exif) = &cfg.exif {
            out.extend_from_slice(&write_exif(exif)?);
        }
        if let Some(icc) = &cfg.icc_profile {
            out.extend_from_slice(&write_icc(icc)?);
        }
        let dqt: Vec<(u8, &QuantTable)> = quant.iter().enumerate().take(num_tables).map(|(i, q)| (i as u8, q)).collect();
        out.extend_from_slice(&write_dqt(&dqt));
        out.extend_from_slice(&write_sof0(&frame));
        out.extend_from_slice(&write_dht(&specs));
        if cfg.restart_interval > 0 {
            out.extend_from_slice(&marker::write_dri(cfg.restart_interval));
        }
        let header = ScanHeader {
            selectors: frame
                .components
                .iter()
                .zip(&scan_components)
                .map(|(comp, sc)| ScanSelector {
                    component_id: comp.id,
                    dc_table: sc.dc_table as u8,
                    ac_table: sc.ac_table as u8,
                })
                .collect(),
            params: SosParams::SEQUENTIAL,
        };
        out.extend_from_slice(&marker::write_sos(&header));
        out.extend_from_slice(&entropy);
        out.extend_from_slice(&[0xFF, marker::EOI]);
        debug!("encoded {} bytes ({} entropy-coded)", out.len(), entropy.len());
        Ok(out)
    }
}

/// Samples of one component, padded to whole MCUs.
struct Plane {
    data: Vec<u8>,
    stride: usize,
}

/// Convert pixels to component planes. Pixels beyond the image edge
/// replicate the last column and row.
fn sample_planes(image: &Image, frame: &FrameInfo) -> Vec<Plane> {
    let pw = frame.mcus_wide as usize * frame.mcu_width as usize;
    let ph = frame.mcus_tall as usize * frame.mcu_height as usize;
    let (w, h) = (image.width as usize, image.height as usize);
    let bpp = image.bytes_per_pixel();

    if image.format == PixelFormat::Gray8 {
        let mut data = vec![0u8; pw * ph];
        for (y, row) in data.chunks_exact_mut(pw).enumerate() {
            let src = image.row(y.min(h - 1) as u32);
            for (x, v) in row.iter_mut().enumerate() {
                *v = src[x.min(w - 1)];
            }
        }
        return vec![Plane { data, stride: pw }];
    }

    let mut ycc = vec![0u8; pw * ph * 3];
    let convert = |(y, row): (usize, &mut [u8])| {
        let src = image.row(y.min(h - 1) as u32);
        for (x, out) in row.chunks_exact_mut(3).enumerate() {
            let p = &src[x.min(w - 1) * bpp..];
            out.copy_from_slice(&rgb_to_ycbcr(p[0], p[1], p[2]));
        }
    };
    #[cfg(feature = "parallel")]
    ycc.par_chunks_mut(pw * 3).enumerate().for_each(convert);
    #[cfg(not(feature = "parallel"))]
    ycc.chunks_mut(pw * 3).enumerate().for_each(convert);

    let (rx, ry) = frame.subsampling_ratio(1);
    (0..3)
        .map(|c| {
            if c == 0 || (rx, ry) == (1, 1) {
                let data = ycc.iter().skip(c).step_by(3).copied().collect();
                Plane { data, stride: pw }
            } else {
                downsample(&ycc, c, pw, ph, rx, ry)
            }
        })
        .collect()
}

/// Box-filter one channel of interleaved YCbCr by (rx, ry).
fn downsample(ycc: &[u8], channel: usize, pw: usize, ph: usize, rx: usize, ry: usize) -> Plane {
    let (cw, ch) = (pw / rx, ph / ry);
    let area = (rx * ry) as u32;
    let mut data = vec![0u8; cw * ch];
    for (cy, row) in data.chunks_exact_mut(cw).enumerate() {
        for (cx, v) in row.iter_mut().enumerate() {
            let mut sum = 0u32;
            for dy in 0..ry {
                for dx in 0..rx {
                    sum += ycc[((cy * ry + dy) * pw + cx * rx + dx) * 3 + channel] as u32;
                }
            }
            *v = ((sum + area / 2) / area) as u8;
        }
    }
    Plane { data, stride: cw }
}

/// Forward DCT + quantization of every block of a plane.
fn forward_transform(plane: &Plane, qt: &QuantTable) -> DctGrid {
    let bw = plane.stride / 8;
    let bt = plane.data.len() / plane.stride / 8;
    let mut grid = DctGrid::new(bw, bt);

    let process_block = |(i, block): (usize, &mut [i16])| {
        let (br, bc) = (i / bw, i % bw);
        let mut samples = [0u8; 64];
        for (y, dst) in samples.chunks_exact_mut(8).enumerate() {
            let start = (br * 8 + y) * plane.stride + bc * 8;
            dst.copy_from_slice(&plane.data[start..start + 8]);
        }
        block.copy_from_slice(&fdct_quantize(&samples, &qt.values));
    };

    #[cfg(feature = "parallel")]
    grid.coeffs_mut().par_chunks_mut(64).enumerate().for_each(process_block);
    #[cfg(not(feature = "parallel"))]
    grid.coeffs_mut().chunks_mut(64).enumerate().for_each(process_block);
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_is_clamped() {
        assert_eq!(EncoderConfig::default().with_quality(0).quality, 1);
        assert_eq!(EncoderConfig::default().with_quality(200).quality, 100);
    }

    #[test]
    fn rejects_bad_dimensions() {
        let enc = JpegEncoder::default();
        let img = Image::new(0, 4, PixelFormat::Rgb8, Vec::new()).unwrap();
        assert!(matches!(
            enc.encode_to_vec(&img),
            Err(JpegError::InvalidDimensions { width: 0, height: 4 })
        ));
        let img = Image::new(65535, 1, PixelFormat::Gray8, vec![0; 65535]).unwrap();
        assert!(matches!(enc.encode_to_vec(&img), Err(JpegError::InvalidDimensions { .. })));
    }

    #[test]
    fn rejects_short_buffer() {
        // Fields set directly, bypassing Image::new
        let img = Image {
            width: 16,
            height: 16,
            format: PixelFormat::Rgb8,
            data: vec![0; 10],
        };
        assert!(matches!(
            JpegEncoder::default().encode_to_vec(&img),
            Err(JpegError::BufferSize { expected: 768, actual: 10 })
        ));
    }

    #[test]
    fn edge_replication() {
        // 3x2 grey image: padding repeats the last column/row
        let img = Image::new(3, 2, PixelFormat::Gray8, vec![10, 20, 30, 40, 50, 60]).unwrap();
        let frame = FrameInfo::new(3, 2, vec![Component::new(1, 1, 1, 0)], false).unwrap();
        let planes = sample_planes(&img, &frame);
        assert_eq!(planes.len(), 1);
        let p = &planes[0];
        assert_eq!(p.stride, 8);
        assert_eq!(&p.data[..8], &[10, 20, 30, 30, 30, 30, 30, 30]);
        assert_eq!(&p.data[8..16], &[40, 50, 60, 60, 60, 60, 60, 60]);
        assert_eq!(&p.data[7 * 8..], &[40, 50, 60, 60, 60, 60, 60, 60]);
    }

    #[test]
    fn chroma_is_averaged_420() {
        let ycc: Vec<u8> = (0..4 * 2).flat_map(|i| [0u8, i as u8 * 10, 0]).collect();
        // 4x2 plane, channel 1 holds 0,10,20,30 / 40,50,60,70
        let plane = downsample(&ycc, 1, 4, 2, 2, 2);
        assert_eq!(plane.stride, 2);
        // (0+10+40+50)/4 = 25, (20+30+60+70)/4 = 45
        assert_eq!(plane.data, vec![25, 45]);
    }

    #[test]
    fn segment_order() {
        let img = Image::new(8, 8, PixelFormat::Rgb8, vec![90; 192]).unwrap();
        let cfg = EncoderConfig::default()
            .with_exif(b"II*\0".to_vec())
            .with_icc_profile(vec![1, 2, 3])
            .with_restart_interval(1);
        let bytes = JpegEncoder::new(cfg).encode_to_vec(&img).unwrap();

        let mut reader = marker::SegmentReader::new(&bytes);
        reader.expect_soi().unwrap();
        let mut order = Vec::new();
        while let Some(m) = reader.next_marker() {
            order.push(m);
            if m == marker::SOS || m == marker::EOI {
                break;
            }
            reader.read_segment().unwrap();
        }
        assert_eq!(
            order,
            vec![
                marker::APP0,
                marker::APP1,
                marker::APP2,
                marker::DQT,
                marker::SOF0,
                marker::DHT,
                marker::DRI,
                marker::SOS
            ]
        );
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, marker::EOI]);
    }
}
