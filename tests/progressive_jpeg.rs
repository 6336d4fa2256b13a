// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Tests for progressive JPEG (SOF2) decoding.
//!
//! Progressive streams are assembled by hand from the coefficients of a
//! baseline encode: spectral selection and successive approximation must
//! reproduce exactly the same coefficients, and therefore the same pixels,
//! as the baseline stream.

use phasm_jpeg::jpeg::bitio::BitWriter;
use phasm_jpeg::jpeg::frame::{write_sof0, Component, FrameInfo};
use phasm_jpeg::jpeg::huffman::{encode_value, HuffmanEncodeTable};
use phasm_jpeg::jpeg::marker::{self, write_sos, ScanHeader, ScanSelector, SosParams};
use phasm_jpeg::jpeg::tables::{standard_specs, write_dht, write_dqt};
use phasm_jpeg::jpeg::zigzag::ZIGZAG_TO_NATURAL;
use phasm_jpeg::{CoefficientImage, EncoderConfig, Image, JpegDecoder, JpegEncoder, PixelFormat};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn noise_image(width: u32, height: u32, seed: u64) -> Image {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data = (0..width * height * 3)
        .map(|i| ((i / 3 % width) * 4) as u8 / 2 + rng.gen_range(0..64))
        .collect();
    Image::new(width, height, PixelFormat::Rgb8, data).unwrap()
}

struct Tables {
    dc: [HuffmanEncodeTable; 2],
    ac: [HuffmanEncodeTable; 2],
}

impl Tables {
    fn standard() -> Self {
        let [dc0, ac0, dc1, ac1] = standard_specs();
        Self {
            dc: [HuffmanEncodeTable::from_spec(&dc0), HuffmanEncodeTable::from_spec(&dc1)],
            ac: [HuffmanEncodeTable::from_spec(&ac0), HuffmanEncodeTable::from_spec(&ac1)],
        }
    }
}

fn put(w: &mut BitWriter, table: &HuffmanEncodeTable, symbol: u8) {
    let (code, len) = table.encode(symbol).unwrap();
    w.emit(code as u32, len);
}

fn put_value(w: &mut BitWriter, table: &HuffmanEncodeTable, run: u8, value: i32) {
    let (bits, size) = encode_value(value);
    put(w, table, (run << 4) | size);
    w.emit(bits as u32, size);
}

fn sos(frame: &FrameInfo, comps: &[usize], ss: u8, se: u8, ah: u8, al: u8) -> Vec<u8> {
    let header = ScanHeader {
        selectors: comps
            .iter()
            .map(|&ci| ScanSelector {
                component_id: frame.components[ci].id,
                dc_table: (ci > 0) as u8,
                ac_table: (ci > 0) as u8,
            })
            .collect(),
        params: SosParams { ss, se, ah, al },
    };
    write_sos(&header)
}

/// Visit every block of an interleaved scan in MCU order.
fn for_each_mcu_block(frame: &FrameInfo, mut f: impl FnMut(usize, usize, usize)) {
    for my in 0..frame.mcus_tall as usize {
        for mx in 0..frame.mcus_wide as usize {
            for (ci, comp) in frame.components.iter().enumerate() {
                let (h, v) = (comp.h_sampling as usize, comp.v_sampling as usize);
                for by in 0..v {
                    for bx in 0..h {
                        f(ci, my * v + by, mx * h + bx);
                    }
                }
            }
        }
    }
}

fn dc_first(frame: &FrameInfo, coeffs: &CoefficientImage, tables: &Tables, al: u8) -> Vec<u8> {
    let mut w = BitWriter::new();
    let mut pred = [0i32; 4];
    for_each_mcu_block(frame, |ci, br, bc| {
        let dc = coeffs.components[ci].grid.get(br, bc, 0, 0) as i32 >> al;
        put_value(&mut w, &tables.dc[(ci > 0) as usize], 0, dc - pred[ci]);
        pred[ci] = dc;
    });
    w.finish()
}

fn dc_refine(frame: &FrameInfo, coeffs: &CoefficientImage, al: u8) -> Vec<u8> {
    let mut w = BitWriter::new();
    for_each_mcu_block(frame, |ci, br, bc| {
        let dc = coeffs.components[ci].grid.get(br, bc, 0, 0);
        w.emit(((dc >> al) & 1) as u32, 1);
    });
    w.finish()
}

/// AC band [ss, se] at full precision, one EOB per block.
fn ac_first(frame: &FrameInfo, coeffs: &CoefficientImage, ci: usize, tables: &Tables, ss: usize, se: usize) -> Vec<u8> {
    let table = &tables.ac[(ci > 0) as usize];
    let grid = &coeffs.components[ci].grid;
    let mut w = BitWriter::new();
    for br in 0..frame.scan_blocks_tall(ci) {
        for bc in 0..frame.scan_blocks_wide(ci) {
            let block = grid.block(br, bc);
            let mut run = 0u8;
            for &ni in &ZIGZAG_TO_NATURAL[ss..=se] {
                let v = block[ni];
                if v == 0 {
                    run += 1;
                    continue;
                }
                while run >= 16 {
                    put(&mut w, table, 0xF0);
                    run -= 16;
                }
                put_value(&mut w, table, run, v as i32);
                run = 0;
            }
            if run > 0 {
                put(&mut w, table, 0x00);
            }
        }
    }
    w.finish()
}

fn progressive_header(coeffs: &CoefficientImage) -> (FrameInfo, Vec<u8>) {
    let comps = coeffs
        .components
        .iter()
        .enumerate()
        .map(|(i, c)| Component::new(c.id, c.h_sampling, c.v_sampling, (i > 0) as u8))
        .collect();
    let frame = FrameInfo::new(coeffs.info.width as u16, coeffs.info.height as u16, comps, true).unwrap();

    let mut out = vec![0xFF, marker::SOI];
    out.extend(write_dqt(&[
        (0, &coeffs.components[0].quant_table),
        (1, &coeffs.components[1].quant_table),
    ]));
    let mut sof = write_sof0(&frame);
    sof[1] = marker::SOF2;
    out.extend(sof);
    out.extend(write_dht(&standard_specs()));
    (frame, out)
}

/// DC in two passes (Al=1 then refinement), AC in two bands per component.
fn progressive_stream(coeffs: &CoefficientImage) -> Vec<u8> {
    let tables = Tables::standard();
    let (frame, mut out) = progressive_header(coeffs);
    out.extend(sos(&frame, &[0, 1, 2], 0, 0, 0, 1));
    out.extend(dc_first(&frame, coeffs, &tables, 1));
    for ci in 0..3 {
        out.extend(sos(&frame, &[ci], 1, 5, 0, 0));
        out.extend(ac_first(&frame, coeffs, ci, &tables, 1, 5));
    }
    out.extend(sos(&frame, &[0, 1, 2], 0, 0, 1, 0));
    out.extend(dc_refine(&frame, coeffs, 0));
    for ci in 0..3 {
        out.extend(sos(&frame, &[ci], 6, 63, 0, 0));
        out.extend(ac_first(&frame, coeffs, ci, &tables, 6, 63));
    }
    out.extend([0xFF, marker::EOI]);
    out
}

fn baseline(width: u32, height: u32) -> (Vec<u8>, CoefficientImage) {
    let bytes = JpegEncoder::new(EncoderConfig::default())
        .encode_to_vec(&noise_image(width, height, 42))
        .unwrap();
    let coeffs = JpegDecoder::default().decode_coefficients(&bytes).unwrap();
    (bytes, coeffs)
}

#[test]
fn progressive_matches_baseline_coefficients() {
    let (_, coeffs) = baseline(32, 32);
    let stream = progressive_stream(&coeffs);
    let decoded = JpegDecoder::default().decode_coefficients(&stream).unwrap();
    assert!(decoded.info.is_progressive);
    assert!(!decoded.truncated);
    for (a, b) in decoded.components.iter().zip(&coeffs.components) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.quant_table, b.quant_table);
        assert_eq!(a.grid.coeffs(), b.grid.coeffs(), "component {}", a.id);
    }
}

#[test]
fn progressive_matches_baseline_pixels() {
    let (bytes, coeffs) = baseline(32, 32);
    let expected = JpegDecoder::default().decode(&bytes).unwrap();
    let decoded = JpegDecoder::default().decode(&progressive_stream(&coeffs)).unwrap();
    assert_eq!(decoded.image.width, 32);
    assert_eq!(decoded.image.data, expected.image.data);
}

#[test]
fn progressive_info() {
    let (_, coeffs) = baseline(32, 32);
    let info = JpegDecoder::default().read_info(&progressive_stream(&coeffs)).unwrap();
    assert!(info.is_progressive);
    assert_eq!((info.width, info.height, info.components), (32, 32, 3));
}

#[test_log::test]
fn progressive_stream_cut_after_dc() {
    let (_, coeffs) = baseline(32, 32);
    let tables = Tables::standard();
    let (frame, mut out) = progressive_header(&coeffs);
    out.extend(sos(&frame, &[0, 1, 2], 0, 0, 0, 0));
    out.extend(dc_first(&frame, &coeffs, &tables, 0));

    let decoded = JpegDecoder::default().decode_coefficients(&out).unwrap();
    assert!(decoded.truncated);
    for (a, b) in decoded.components.iter().zip(&coeffs.components) {
        for (ba, bb) in a.grid.coeffs().chunks(64).zip(b.grid.coeffs().chunks(64)) {
            assert_eq!(ba[0], bb[0]);
            assert!(ba[1..].iter().all(|&c| c == 0));
        }
    }

    let image = JpegDecoder::default().decode(&out).unwrap();
    assert!(image.truncated);
    assert_eq!(image.image.data.len(), 32 * 32 * 3);
}

#[test]
fn ac_scan_with_two_components_rejected() {
    let (_, coeffs) = baseline(16, 16);
    let (frame, mut out) = progressive_header(&coeffs);
    out.extend(sos(&frame, &[0, 1], 1, 63, 0, 0));
    out.extend([0x00, 0xFF, marker::EOI]);
    let err = JpegDecoder::default().decode(&out);
    assert!(matches!(
        err,
        Err(phasm_jpeg::JpegError::InvalidSegment("AC scan must have one component"))
    ));
}
