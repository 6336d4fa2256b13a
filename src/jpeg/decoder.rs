// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Marker-driven JPEG decoder.
//!
//! Walks the segment stream from SOI to EOI, collecting tables and
//! metadata, decodes each scan into per-component coefficient grids and
//! finally reconstructs pixels (dequantize + IDCT, chroma upsampling and
//! colour conversion). Baseline, extended sequential (SOF1, 8-bit) and
//! progressive (SOF2) Huffman-coded frames are supported.

use std::io::Read;

use log::{debug, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::color::{convert_row, ColorSpace};
use super::dct::{DctGrid, QuantTable};
use super::error::{JpegError, Result};
use super::frame::{self, FrameInfo};
use super::marker::{self, ScanHeader, SegmentReader, SosParams};
use super::metadata::{Density, Metadata};
use super::scan::{self, HuffmanTables, Scan, ScanComponent};
use super::tables::{parse_dht, parse_dqt};
use super::transform::idct_block;
use crate::image::{Image, PixelFormat};

/// Decoder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Frames with more pixels than this are rejected before any allocation.
    pub max_pixels: u64,
    /// Skip capturing EXIF and ICC payloads.
    pub ignore_metadata: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_pixels: 1 << 28,
            ignore_metadata: false,
        }
    }
}

impl DecoderOptions {
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn with_ignore_metadata(mut self, ignore: bool) -> Self {
        self.ignore_metadata = ignore;
        self
    }
}

/// Read-only description of a JPEG stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Number of coded components (1, 3 or 4).
    pub components: usize,
    pub color_space: ColorSpace,
    pub is_progressive: bool,
    /// MCUs per restart interval (0 = none). Reflects the last DRI seen.
    pub restart_interval: u16,
    pub density: Option<Density>,
    pub adobe_transform: Option<u8>,
    pub exif: Option<Vec<u8>>,
    pub icc_profile: Option<Vec<u8>>,
}

/// Pixels plus stream description.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Gray8 for single-component streams, Rgb8 otherwise.
    pub image: Image,
    pub info: ImageInfo,
    /// Entropy data ended early; missing blocks decode as flat grey.
    pub truncated: bool,
}

/// Quantized coefficients of one component.
#[derive(Debug, Clone)]
pub struct ComponentCoefficients {
    pub id: u8,
    pub h_sampling: u8,
    pub v_sampling: u8,
    /// Table the coefficients were quantized with, natural order.
    pub quant_table: QuantTable,
    /// Blocks padded to whole MCUs, natural order within each block.
    pub grid: DctGrid,
}

/// All coefficient planes of a stream, before any IDCT.
#[derive(Debug, Clone)]
pub struct CoefficientImage {
    pub info: ImageInfo,
    pub components: Vec<ComponentCoefficients>,
    pub truncated: bool,
}

/// JPEG decoder. Holds only options; each call is an independent session.
#[derive(Debug, Clone, Default)]
pub struct JpegDecoder {
    options: DecoderOptions,
}

impl JpegDecoder {
    pub fn new(options: DecoderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Decode a complete JPEG file to pixels.
    pub fn decode(&self, data: &[u8]) -> Result<DecodedImage> {
        let session = self.run(data)?;
        let (frame, color_space) = session.frame_and_color()?;
        let quant = session.component_quant_tables()?;

        let planes: Vec<Plane> = session
            .grids
            .iter()
            .zip(&quant)
            .map(|(grid, qt)| Plane::from_grid(grid, qt))
            .collect();
        let image = assemble(frame, color_space, &planes)?;

        Ok(DecodedImage {
            image,
            info: session.info(frame, color_space),
            truncated: session.truncated,
        })
    }

    /// Read the whole stream from `reader`, then decode it.
    pub fn decode_from_reader<R: Read>(&self, mut reader: R) -> Result<DecodedImage> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.decode(&data)
    }

    /// Parse headers up to the frame header and describe the image.
    ///
    /// No scan data is touched. Metadata segments after SOF are not seen.
    pub fn read_info(&self, data: &[u8]) -> Result<ImageInfo> {
        let mut session = Session::new(data, &self.options);
        let mut reader = SegmentReader::new(data);
        reader.expect_soi()?;
        loop {
            let m = reader.next_marker().ok_or(JpegError::UnexpectedEof)?;
            match m {
                marker::EOI | marker::SOS => return Err(JpegError::MissingFrame),
                _ => session.handle(&mut reader, m)?,
            }
            if let Some(frame) = &session.frame {
                let color_space = ColorSpace::detect(frame, &session.metadata)?;
                return Ok(session.info(frame, color_space));
            }
        }
    }

    /// Entropy-decode all scans and return the quantized coefficients.
    pub fn decode_coefficients(&self, data: &[u8]) -> Result<CoefficientImage> {
        let session = self.run(data)?;
        let (frame, color_space) = session.frame_and_color()?;
        let quant = session.component_quant_tables()?;
        let info = session.info(frame, color_space);

        let components = frame
            .components
            .iter()
            .zip(quant)
            .zip(session.grids.iter().cloned())
            .map(|((comp, quant_table), grid)| ComponentCoefficients {
                id: comp.id,
                h_sampling: comp.h_sampling,
                v_sampling: comp.v_sampling,
                quant_table,
                grid,
            })
            .collect();

        Ok(CoefficientImage {
            info,
            components,
            truncated: session.truncated,
        })
    }

    fn run<'a>(&'a self, data: &'a [u8]) -> Result<Session<'a>> {
        let mut session = Session::new(data, &self.options);
        let mut reader = SegmentReader::new(data);
        reader.expect_soi()?;

        loop {
            let Some(m) = reader.next_marker() else {
                if session.scans == 0 {
                    return Err(JpegError::UnexpectedEof);
                }
                warn!("data ended without EOI after {} scans", session.scans);
                session.truncated = true;
                break;
            };
            if m == marker::EOI {
                let trailing = data.len() - reader.position();
                if trailing > 0 {
                    warn!("{trailing} bytes of trailing data after EOI ignored");
                }
                break;
            }
            session.handle(&mut reader, m)?;
        }

        if session.frame.is_none() {
            return Err(JpegError::MissingFrame);
        }
        if session.scans == 0 {
            return Err(JpegError::MissingScan);
        }
        Ok(session)
    }
}

/// State of one decode call.
struct Session<'a> {
    data: &'a [u8],
    options: &'a DecoderOptions,
    frame: Option<FrameInfo>,
    metadata: Metadata,
    color_space: Option<ColorSpace>,
    quant_tables: [Option<QuantTable>; 4],
    huffman: HuffmanTables,
    restart_interval: u16,
    /// Quantization table of each component, fixed at its first scan.
    component_quant: Vec<Option<QuantTable>>,
    grids: Vec<DctGrid>,
    scans: usize,
    truncated: bool,
}

impl<'a> Session<'a> {
    fn new(data: &'a [u8], options: &'a DecoderOptions) -> Self {
        Self {
            data,
            options,
            frame: None,
            metadata: Metadata::default(),
            color_space: None,
            quant_tables: Default::default(),
            huffman: HuffmanTables::default(),
            restart_interval: 0,
            component_quant: Vec::new(),
            grids: Vec::new(),
            scans: 0,
            truncated: false,
        }
    }

    /// Dispatch one marker (other than EOI) whose code was just read.
    fn handle(&mut self, reader: &mut SegmentReader<'a>, m: u8) -> Result<()> {
        match m {
            marker::SOF0 | marker::SOF1 | marker::SOF2 => {
                let body = reader.read_segment()?;
                if self.frame.is_some() {
                    return Err(JpegError::InvalidSegment("Multiple SOF markers"));
                }
                let frame = frame::parse_sof(body, m == marker::SOF2)?;
                if frame.pixel_count() > self.options.max_pixels {
                    return Err(JpegError::ImageTooLarge {
                        pixels: frame.pixel_count(),
                        limit: self.options.max_pixels,
                    });
                }
                debug!(
                    "SOF{}: {}x{}, {} components, MCU {}x{}",
                    m - marker::SOF0,
                    frame.width,
                    frame.height,
                    frame.components.len(),
                    frame.mcu_width,
                    frame.mcu_height
                );
                self.frame = Some(frame);
            }
            m if marker::is_unsupported_sof(m) => return Err(JpegError::UnsupportedProcess(m)),
            marker::DHT => {
                let body = reader.read_segment()?;
                // Tables may precede the frame header; the scan check catches
                // baseline scans that select slots 2 and 3
                let progressive = self.frame.as_ref().map_or(true, |f| f.is_progressive);
                for spec in parse_dht(body, progressive)? {
                    debug!("DHT class {} id {}", spec.class, spec.id);
                    self.huffman.install(&spec)?;
                }
            }
            marker::DQT => {
                for (id, qt) in parse_dqt(reader.read_segment()?)? {
                    debug!("DQT id {id}");
                    self.quant_tables[id as usize] = Some(qt);
                }
            }
            marker::DRI => {
                self.restart_interval = marker::parse_dri(reader.read_segment()?)?;
                debug!("DRI {}", self.restart_interval);
            }
            marker::SOS => {
                let body = reader.read_segment()?;
                let end = self.decode_scan(body, reader.position())?;
                reader.set_position(end);
            }
            marker::COM => {
                reader.read_segment()?;
            }
            m if marker::is_app(m) => {
                let body = reader.read_segment()?;
                self.metadata.parse_app(m, body, !self.options.ignore_metadata);
            }
            m if marker::is_restart(m) => warn!("stray RST{} outside entropy data", m - marker::RST0),
            m if m < marker::SOF0 => return Err(JpegError::UnknownMarker(m)),
            m => return Err(JpegError::UnsupportedMarker(m)),
        }
        Ok(())
    }

    /// Validate an SOS header, decode its entropy data and return the offset
    /// of the next marker.
    fn decode_scan(&mut self, body: &[u8], scan_start: usize) -> Result<usize> {
        let frame = self.frame.as_ref().ok_or(JpegError::MissingFrame)?;
        let header = marker::parse_sos(body)?;
        let components = scan_components(frame, &header)?;
        check_scan_params(frame, &header.params, components.len())?;

        if self.color_space.is_none() {
            self.color_space = Some(ColorSpace::detect(frame, &self.metadata)?);
        }
        if self.grids.is_empty() {
            self.grids = (0..frame.components.len())
                .map(|i| DctGrid::new(frame.blocks_wide(i), frame.blocks_tall(i)))
                .collect();
            self.component_quant = vec![None; frame.components.len()];
        }
        for sc in &components {
            if self.component_quant[sc.comp_idx].is_none() {
                let tq = frame.components[sc.comp_idx].quant_table_id;
                let qt = self.quant_tables[tq as usize].clone();
                self.component_quant[sc.comp_idx] = Some(qt.ok_or(JpegError::MissingQuantTable(tq))?);
            }
        }

        let p = header.params;
        debug!(
            "SOS: {} components, Ss={} Se={} Ah={} Al={}",
            components.len(),
            p.ss,
            p.se,
            p.ah,
            p.al
        );
        let scan = Scan {
            components,
            params: p,
            restart_interval: self.restart_interval,
        };
        let outcome = scan::decode_scan(self.data, scan_start, frame, &scan, &self.huffman, &mut self.grids)?;
        self.scans += 1;
        self.truncated |= outcome.truncated;
        Ok(marker::skip_entropy_data(self.data, outcome.end))
    }

    fn frame_and_color(&self) -> Result<(&FrameInfo, ColorSpace)> {
        let frame = self.frame.as_ref().ok_or(JpegError::MissingFrame)?;
        let color_space = match self.color_space {
            Some(cs) => cs,
            None => ColorSpace::detect(frame, &self.metadata)?,
        };
        Ok((frame, color_space))
    }

    /// Quantization table per frame component. Components that never
    /// appeared in a scan fall back to the table currently defined.
    fn component_quant_tables(&self) -> Result<Vec<QuantTable>> {
        let frame = self.frame.as_ref().ok_or(JpegError::MissingFrame)?;
        frame
            .components
            .iter()
            .enumerate()
            .map(|(i, comp)| {
                let latched = self.component_quant.get(i).cloned().flatten();
                latched
                    .or_else(|| self.quant_tables[comp.quant_table_id as usize].clone())
                    .ok_or(JpegError::MissingQuantTable(comp.quant_table_id))
            })
            .collect()
    }

    fn info(&self, frame: &FrameInfo, color_space: ColorSpace) -> ImageInfo {
        ImageInfo {
            width: frame.width as u32,
            height: frame.height as u32,
            components: frame.components.len(),
            color_space,
            is_progressive: frame.is_progressive,
            restart_interval: self.restart_interval,
            density: self.metadata.density,
            adobe_transform: self.metadata.adobe_transform,
            exif: self.metadata.exif.clone(),
            icc_profile: self.metadata.icc_profile(),
        }
    }
}

/// Resolve SOS selectors against the frame.
fn scan_components(frame: &FrameInfo, header: &ScanHeader) -> Result<Vec<ScanComponent>> {
    let max_table = if frame.is_progressive { 3 } else { 1 };
    let mut components: Vec<ScanComponent> = Vec::with_capacity(header.selectors.len());
    for sel in &header.selectors {
        let comp_idx = frame
            .component_index(sel.component_id)
            .ok_or(JpegError::UnknownComponentId(sel.component_id))?;
        if components.iter().any(|c| c.comp_idx == comp_idx) {
            return Err(JpegError::InvalidSegment("Repeated component selector"));
        }
        if sel.dc_table > max_table {
            return Err(JpegError::InvalidSegment("Bad Td value"));
        }
        if sel.ac_table > max_table {
            return Err(JpegError::InvalidSegment("Bad Ta value"));
        }
        components.push(ScanComponent {
            comp_idx,
            dc_table: sel.dc_table as usize,
            ac_table: sel.ac_table as usize,
        });
    }
    Ok(components)
}

fn check_scan_params(frame: &FrameInfo, p: &SosParams, num_components: usize) -> Result<()> {
    if p.ss > p.se || p.se > 63 {
        return Err(JpegError::InvalidSegment("Bad spectral selection"));
    }
    if !frame.is_progressive {
        if *p != SosParams::SEQUENTIAL {
            return Err(JpegError::InvalidSegment("Bad spectral selection"));
        }
        return Ok(());
    }
    if p.ss == 0 && p.se != 0 {
        return Err(JpegError::InvalidSegment("Bad spectral selection"));
    }
    if p.ss > 0 && num_components != 1 {
        return Err(JpegError::InvalidSegment("AC scan must have one component"));
    }
    if p.al > 13 || p.ah > 13 || (p.ah != 0 && p.al + 1 != p.ah) {
        return Err(JpegError::InvalidSegment("Bad successive approximation"));
    }
    Ok(())
}

/// Reconstructed samples of one component, padded to whole MCUs.
struct Plane {
    data: Vec<u8>,
    stride: usize,
}

impl Plane {
    /// Dequantize and inverse-transform every block of `grid`.
    fn from_grid(grid: &DctGrid, qt: &QuantTable) -> Self {
        let stride = grid.blocks_wide() * 8;
        let mut data = vec![0u8; stride * grid.blocks_tall() * 8];

        let idct_band = |(br, band): (usize, &mut [u8])| {
            for bc in 0..grid.blocks_wide() {
                let px = idct_block(grid.block(br, bc), &qt.values);
                for (y, src) in px.chunks_exact(8).enumerate() {
                    let start = y * stride + bc * 8;
                    band[start..start + 8].copy_from_slice(src);
                }
            }
        };

        if stride > 0 {
            #[cfg(feature = "parallel")]
            data.par_chunks_mut(stride * 8).enumerate().for_each(idct_band);
            #[cfg(not(feature = "parallel"))]
            data.chunks_mut(stride * 8).enumerate().for_each(idct_band);
        }
        Self { data, stride }
    }
}

/// Upsample chroma (nearest neighbour) and convert to the output format.
fn assemble(frame: &FrameInfo, color_space: ColorSpace, planes: &[Plane]) -> Result<Image> {
    let width = frame.width as usize;
    let channels = color_space.output_channels();
    let nc = planes.len();
    let ratios: Vec<(usize, usize)> = (0..nc).map(|i| frame.subsampling_ratio(i)).collect();
    let mut out = vec![0u8; width * frame.height as usize * channels];

    let convert = |(y, row): (usize, &mut [u8])| {
        let mut samples = vec![0u8; width * nc];
        for (c, (plane, &(rx, ry))) in planes.iter().zip(&ratios).enumerate() {
            let src = &plane.data[(y / ry) * plane.stride..];
            for x in 0..width {
                samples[x * nc + c] = src[x / rx];
            }
        }
        convert_row(color_space, &samples, row);
    };

    #[cfg(feature = "parallel")]
    out.par_chunks_mut(width * channels).enumerate().for_each(convert);
    #[cfg(not(feature = "parallel"))]
    out.chunks_mut(width * channels).enumerate().for_each(convert);

    let format = if channels == 1 {
        PixelFormat::Gray8
    } else {
        PixelFormat::Rgb8
    };
    Image::new(frame.width as u32, frame.height as u32, format, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::frame::Component;

    fn progressive_frame() -> FrameInfo {
        let comps = vec![Component::new(1, 1, 1, 0), Component::new(2, 1, 1, 1)];
        FrameInfo::new(16, 16, comps, true).unwrap()
    }

    #[test]
    fn scan_params_validation() {
        let frame = progressive_frame();
        let params = |ss, se, ah, al| SosParams { ss, se, ah, al };
        assert!(check_scan_params(&frame, &params(0, 0, 0, 1), 2).is_ok());
        assert!(check_scan_params(&frame, &params(1, 5, 0, 2), 1).is_ok());
        assert!(check_scan_params(&frame, &params(1, 5, 2, 1), 1).is_ok());
        assert!(matches!(
            check_scan_params(&frame, &params(0, 5, 0, 0), 1),
            Err(JpegError::InvalidSegment("Bad spectral selection"))
        ));
        assert!(matches!(
            check_scan_params(&frame, &params(1, 5, 0, 0), 2),
            Err(JpegError::InvalidSegment("AC scan must have one component"))
        ));
        assert!(matches!(
            check_scan_params(&frame, &params(6, 5, 0, 0), 1),
            Err(JpegError::InvalidSegment("Bad spectral selection"))
        ));
        assert!(matches!(
            check_scan_params(&frame, &params(1, 63, 0, 14), 1),
            Err(JpegError::InvalidSegment("Bad successive approximation"))
        ));

        let mut baseline = progressive_frame();
        baseline.is_progressive = false;
        assert!(check_scan_params(&baseline, &SosParams::SEQUENTIAL, 2).is_ok());
        assert!(check_scan_params(&baseline, &params(0, 0, 0, 0), 2).is_err());
    }

    #[test]
    fn scan_selectors_validation() {
        let frame = progressive_frame();
        let header = |sels: &[(u8, u8)]| ScanHeader {
            selectors: sels
                .iter()
                .map(|&(id, tables)| marker::ScanSelector {
                    component_id: id,
                    dc_table: tables >> 4,
                    ac_table: tables & 0x0F,
                })
                .collect(),
            params: SosParams { ss: 0, se: 0, ah: 0, al: 0 },
        };
        let comps = scan_components(&frame, &header(&[(2, 0x11), (1, 0x00)])).unwrap();
        assert_eq!(comps[0].comp_idx, 1);
        assert_eq!(comps[1].comp_idx, 0);

        assert!(matches!(
            scan_components(&frame, &header(&[(9, 0x00)])),
            Err(JpegError::UnknownComponentId(9))
        ));
        assert!(matches!(
            scan_components(&frame, &header(&[(1, 0x00), (1, 0x00)])),
            Err(JpegError::InvalidSegment("Repeated component selector"))
        ));

        let mut baseline = progressive_frame();
        baseline.is_progressive = false;
        assert!(matches!(
            scan_components(&baseline, &header(&[(1, 0x20)])),
            Err(JpegError::InvalidSegment("Bad Td value"))
        ));
    }

    #[test]
    fn plane_from_flat_grid() {
        let mut grid = DctGrid::new(2, 1);
        grid.block_mut(0, 1)[0] = 8;
        let plane = Plane::from_grid(&grid, &QuantTable::new([1; 64]));
        assert_eq!(plane.stride, 16);
        assert_eq!(plane.data[0], 128);
        assert_eq!(plane.data[8], 129);
        assert_eq!(plane.data[7 * 16 + 15], 129);
    }
}
