// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! JPEG frame header (SOF) parsing and writing.
//!
//! Extracts image dimensions, component information, and sampling factors
//! from the Start of Frame marker segment, and derives the MCU grid
//! geometry, which is immutable once the header has been read.

use super::error::{JpegError, Result};
use super::marker;

/// Information about one image component from SOF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Component ID (typically 1=Y, 2=Cb, 3=Cr).
    pub id: u8,
    /// Horizontal sampling factor (1, 2 or 4).
    pub h_sampling: u8,
    /// Vertical sampling factor (1, 2 or 4).
    pub v_sampling: u8,
    /// Quantization table ID (0–3).
    pub quant_table_id: u8,
}

impl Component {
    pub fn new(id: u8, h_sampling: u8, v_sampling: u8, quant_table_id: u8) -> Self {
        Self {
            id,
            h_sampling,
            v_sampling,
            quant_table_id,
        }
    }
}

/// Frame information parsed from a SOF0/SOF1/SOF2 marker.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    /// Sample precision in bits (always 8).
    pub precision: u8,
    /// Image height in pixels.
    pub height: u16,
    /// Image width in pixels.
    pub width: u16,
    /// Components in the frame.
    pub components: Vec<Component>,
    /// Maximum horizontal sampling factor across all components.
    pub max_h_sampling: u8,
    /// Maximum vertical sampling factor across all components.
    pub max_v_sampling: u8,
    /// MCU width in pixels (= max_h_sampling * 8).
    pub mcu_width: u16,
    /// MCU height in pixels (= max_v_sampling * 8).
    pub mcu_height: u16,
    /// Number of MCUs horizontally.
    pub mcus_wide: u16,
    /// Number of MCUs vertically.
    pub mcus_tall: u16,
    /// Whether this is a progressive JPEG (SOF2).
    pub is_progressive: bool,
}

impl FrameInfo {
    /// Build a frame and derive its MCU geometry.
    pub fn new(width: u16, height: u16, components: Vec<Component>, is_progressive: bool) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(JpegError::InvalidDimensions {
                width: width as u32,
                height: height as u32,
            });
        }
        let max_h = components.iter().map(|c| c.h_sampling).max().unwrap_or(1).max(1);
        let max_v = components.iter().map(|c| c.v_sampling).max().unwrap_or(1).max(1);
        let mcu_width = max_h as u16 * 8;
        let mcu_height = max_v as u16 * 8;

        Ok(Self {
            precision: 8,
            height,
            width,
            components,
            max_h_sampling: max_h,
            max_v_sampling: max_v,
            mcu_width,
            mcu_height,
            mcus_wide: width.div_ceil(mcu_width),
            mcus_tall: height.div_ceil(mcu_height),
            is_progressive,
        })
    }

    /// Number of 8×8 blocks wide for a component, padded to whole MCUs.
    pub fn blocks_wide(&self, comp_idx: usize) -> usize {
        self.mcus_wide as usize * self.components[comp_idx].h_sampling as usize
    }

    /// Number of 8×8 blocks tall for a component, padded to whole MCUs.
    pub fn blocks_tall(&self, comp_idx: usize) -> usize {
        self.mcus_tall as usize * self.components[comp_idx].v_sampling as usize
    }

    /// Sample columns of a component: ceil(width * h / max_h).
    pub fn component_width(&self, comp_idx: usize) -> usize {
        let h = self.components[comp_idx].h_sampling as usize;
        (self.width as usize * h).div_ceil(self.max_h_sampling as usize)
    }

    /// Sample rows of a component: ceil(height * v / max_v).
    pub fn component_height(&self, comp_idx: usize) -> usize {
        let v = self.components[comp_idx].v_sampling as usize;
        (self.height as usize * v).div_ceil(self.max_v_sampling as usize)
    }

    /// Blocks per row covered by a single-component (non-interleaved) scan.
    pub fn scan_blocks_wide(&self, comp_idx: usize) -> usize {
        self.component_width(comp_idx).div_ceil(8)
    }

    /// Block rows covered by a single-component (non-interleaved) scan.
    pub fn scan_blocks_tall(&self, comp_idx: usize) -> usize {
        self.component_height(comp_idx).div_ceil(8)
    }

    /// Ratio of the full resolution to a component's resolution: (x, y).
    pub fn subsampling_ratio(&self, comp_idx: usize) -> (usize, usize) {
        let comp = &self.components[comp_idx];
        (
            (self.max_h_sampling / comp.h_sampling.max(1)) as usize,
            (self.max_v_sampling / comp.v_sampling.max(1)) as usize,
        )
    }

    /// Total pixel count.
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Index of the component with the given identifier.
    pub fn component_index(&self, id: u8) -> Option<usize> {
        self.components.iter().position(|c| c.id == id)
    }
}

/// Parse a SOF marker segment body (after the 2-byte length).
/// `progressive` should be true for SOF2 markers.
pub fn parse_sof(data: &[u8], progressive: bool) -> Result<FrameInfo> {
    if data.len() < 6 {
        return Err(JpegError::InvalidSegment("SOF has wrong length"));
    }
    let num_components = match data.len() {
        9 => 1,
        15 => 3,
        18 => 4,
        _ => return Err(JpegError::InvalidSegment("wrong number of components")),
    };

    let precision = data[0];
    if precision != 8 {
        return Err(JpegError::UnsupportedPrecision(precision));
    }
    let height = u16::from_be_bytes([data[1], data[2]]);
    let width = u16::from_be_bytes([data[3], data[4]]);
    if data[5] as usize != num_components {
        return Err(JpegError::InvalidSegment("SOF has wrong length"));
    }

    let mut components: Vec<Component> = Vec::with_capacity(num_components);
    for (i, entry) in data[6..].chunks_exact(3).enumerate() {
        let id = entry[0];
        let mut h = entry[1] >> 4;
        let mut v = entry[1] & 0x0F;
        let quant_table_id = entry[2];

        if components.iter().any(|c| c.id == id) {
            return Err(JpegError::InvalidSegment("Repeated component identifier"));
        }
        if quant_table_id > 3 {
            return Err(JpegError::InvalidSegment("Bad Tq value"));
        }
        if !(1..=4).contains(&h) || !(1..=4).contains(&v) || h == 3 || v == 3 {
            return Err(JpegError::InvalidSegment("Bad sampling factor"));
        }

        match num_components {
            // Sampling factors are meaningless for a lone component
            1 => {
                h = 1;
                v = 1;
            }
            3 => check_ycbcr_sampling(&components, i, h, v)?,
            _ => check_cmyk_sampling(&components, i, h, v)?,
        }

        components.push(Component::new(id, h, v, quant_table_id));
    }

    FrameInfo::new(width, height, components, progressive)
}

fn check_ycbcr_sampling(prev: &[Component], i: usize, h: u8, v: u8) -> Result<()> {
    let ok = match i {
        0 => v != 4,
        // Chroma must divide luma evenly
        1 => prev[0].h_sampling % h == 0 && prev[0].v_sampling % v == 0,
        _ => prev[1].h_sampling == h && prev[1].v_sampling == v,
    };
    if ok {
        Ok(())
    } else {
        Err(JpegError::InvalidSegment("unsupported luma/chroma subsampling ratio"))
    }
}

fn check_cmyk_sampling(prev: &[Component], i: usize, h: u8, v: u8) -> Result<()> {
    let hv = (h << 4) | v;
    let ok = match i {
        0 => hv == 0x11 || hv == 0x22,
        1 | 2 => hv == 0x11,
        _ => prev[0].h_sampling == h && prev[0].v_sampling == v,
    };
    if ok {
        Ok(())
    } else {
        Err(JpegError::InvalidSegment("unsupported CMYK subsampling ratio"))
    }
}

/// Write a baseline SOF0 segment (including marker and length).
pub fn write_sof0(frame: &FrameInfo) -> Vec<u8> {
    let mut body = Vec::with_capacity(6 + frame.components.len() * 3);
    body.push(frame.precision);
    body.extend_from_slice(&frame.height.to_be_bytes());
    body.extend_from_slice(&frame.width.to_be_bytes());
    body.push(frame.components.len() as u8);
    for comp in &frame.components {
        body.push(comp.id);
        body.push((comp.h_sampling << 4) | comp.v_sampling);
        body.push(comp.quant_table_id);
    }
    marker::segment(marker::SOF0, &body)
}
